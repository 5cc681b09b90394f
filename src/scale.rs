//! Universal pose scaling.
//!
//! Poses from different subjects are normalised to a common body size so
//! that scale-ambiguous predictions can be compared fairly.

use ndarray::{Array2, ArrayView2};

use crate::skeleton::Skeleton;

/// The universal scale is taken to be 910 mm along limbs between knee and neck.
pub const UNIV_KNEE_NECK_HEIGHT: f64 = 910.0;

/// Scale joints to universal scale, transforming about the origin.
#[must_use]
pub fn to_univ_scale(joints_3d: ArrayView2<'_, f32>, skeleton: &Skeleton) -> Array2<f32> {
    let k = (UNIV_KNEE_NECK_HEIGHT / skeleton.knee_neck_height(joints_3d)) as f32;
    joints_3d.mapv(|v| v * k)
}

/// Scale joints to universal scale, transforming about the root joint location.
#[must_use]
pub fn to_root_relative_univ_scale(joints_3d: ArrayView2<'_, f32>, skeleton: &Skeleton) -> Array2<f32> {
    let root_id = skeleton.root_joint_id();
    let root = joints_3d.row(root_id).to_owned();
    let mut relative = joints_3d.to_owned();
    for mut row in relative.rows_mut() {
        row -= &root;
    }
    let mut univ = to_univ_scale(relative.view(), skeleton);
    for mut row in univ.rows_mut() {
        row += &root;
    }
    univ
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::ASPSET_17J;
    use ndarray::array;

    // One pose from clip 04ac-0026.
    fn fixture_joints_3d() -> Array2<f32> {
        array![
            [-5.18131775e+02, 1.12147400e+03, 1.85388398e+04],
            [-4.73199890e+02, 7.00602722e+02, 1.85234902e+04],
            [-4.23036896e+02, 3.08107239e+02, 1.85275508e+04],
            [-2.80203583e+02, 1.95340317e+02, 1.84224238e+04],
            [-4.86079163e+02, 6.23998604e+01, 1.83367559e+04],
            [-3.91279541e+02, -1.83917984e+02, 1.83915391e+04],
            [-5.05070129e+02, 1.01266479e+03, 1.87362852e+04],
            [-2.35622971e+02, 6.76157654e+02, 1.86908340e+04],
            [-3.80700531e+02, 3.06988159e+02, 1.86746523e+04],
            [-2.01497665e+02, 9.60998917e+01, 1.86923438e+04],
            [-3.99593689e+02, 5.71454849e+01, 1.87760781e+04],
            [-4.34380341e+02, -1.88396454e+02, 1.87668672e+04],
            [-4.12053192e+02, -5.11558380e+02, 1.85718145e+04],
            [-3.89499725e+02, -3.58688873e+02, 1.85686406e+04],
            [-4.15598541e+02, -2.77202179e+02, 1.85831680e+04],
            [-4.56611267e+02, 6.73956985e+01, 1.86147578e+04],
            [-4.72049225e+02, 2.43091171e+02, 1.86294688e+04],
        ]
    }

    #[test]
    fn test_to_univ_scale() {
        let joints = fixture_joints_3d();
        let univ = to_univ_scale(joints.view(), &ASPSET_17J);
        let height = ASPSET_17J.knee_neck_height(univ.view());
        assert!((height - UNIV_KNEE_NECK_HEIGHT).abs() < 1e-2, "height was {height}");
        // The joints were scaled uniformly about the origin.
        let reference = joints[[0, 0]] / univ[[0, 0]];
        for (original, scaled) in joints.iter().zip(univ.iter()) {
            assert!((original / scaled - reference).abs() < 1e-4);
        }
    }

    #[test]
    fn test_to_root_relative_univ_scale() {
        let joints = fixture_joints_3d();
        let univ = to_root_relative_univ_scale(joints.view(), &ASPSET_17J);
        let height = ASPSET_17J.knee_neck_height(univ.view());
        assert!((height - UNIV_KNEE_NECK_HEIGHT).abs() < 1e-2, "height was {height}");
        // The root joint location has not changed.
        let root_id = ASPSET_17J.root_joint_id();
        for axis in 0..3 {
            assert!((univ[[root_id, axis]] - joints[[root_id, axis]]).abs() < 1e-2);
        }
    }
}
