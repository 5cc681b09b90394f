//! Calibrated camera model for projecting 3D joint annotations into images.

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde_json::Value;

use crate::error::{Aspset510Error, Result};
use crate::geometry::ensure_homogeneous;

/// A calibrated camera with separate intrinsic and extrinsic parameters.
///
/// The intrinsic matrix is 3x4 and the extrinsic matrix is 4x4, matching the
/// camera JSON files shipped with the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    intrinsic_matrix: Array2<f64>,
    extrinsic_matrix: Array2<f64>,
}

impl Camera {
    /// Create a camera from its intrinsic (3x4) and extrinsic (4x4) matrices.
    ///
    /// # Errors
    /// Returns an error if either matrix has the wrong shape.
    pub fn new(intrinsic_matrix: Array2<f64>, extrinsic_matrix: Array2<f64>) -> Result<Self> {
        if intrinsic_matrix.shape() != [3, 4] {
            return Err(Aspset510Error::invalid_config(format!(
                "intrinsic matrix must be 3x4, got {:?}",
                intrinsic_matrix.shape()
            )));
        }
        if extrinsic_matrix.shape() != [4, 4] {
            return Err(Aspset510Error::invalid_config(format!(
                "extrinsic matrix must be 4x4, got {:?}",
                extrinsic_matrix.shape()
            )));
        }
        Ok(Self { intrinsic_matrix, extrinsic_matrix })
    }

    /// Load a camera from one of the dataset's camera JSON files.
    ///
    /// The matrices are stored as arrays of numbers, either flat or nested;
    /// both layouts are accepted.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Aspset510Error::file_io_error("read camera file", path, &e))?;
        let json: Value = serde_json::from_str(&contents)?;
        let intrinsic = matrix_from_json(&json, "intrinsic_matrix", 3, 4)?;
        let extrinsic = matrix_from_json(&json, "extrinsic_matrix", 4, 4)?;
        Self::new(intrinsic, extrinsic)
    }

    /// The 3x4 intrinsic matrix.
    #[must_use]
    pub fn intrinsic_matrix(&self) -> ArrayView2<'_, f64> {
        self.intrinsic_matrix.view()
    }

    /// The 4x4 extrinsic matrix.
    #[must_use]
    pub fn extrinsic_matrix(&self) -> ArrayView2<'_, f64> {
        self.extrinsic_matrix.view()
    }

    /// The combined 3x4 projection matrix (intrinsic x extrinsic).
    #[must_use]
    pub fn projection_matrix(&self) -> Array2<f64> {
        self.intrinsic_matrix.dot(&self.extrinsic_matrix)
    }

    /// Transform points from 3D world space to homogeneous 3D camera space.
    #[must_use]
    pub fn world_to_camera_space(&self, points_3d: ArrayView2<'_, f64>) -> Array2<f64> {
        ensure_homogeneous(points_3d, 3).dot(&self.extrinsic_matrix.t())
    }

    /// Transform points from 3D camera space to homogeneous 2D image space.
    #[must_use]
    pub fn camera_to_image_space(&self, points_3d: ArrayView2<'_, f64>) -> Array2<f64> {
        ensure_homogeneous(points_3d, 3).dot(&self.intrinsic_matrix.t())
    }

    /// Transform points from 3D world space to homogeneous 2D image space.
    #[must_use]
    pub fn world_to_image_space(&self, points_3d: ArrayView2<'_, f64>) -> Array2<f64> {
        ensure_homogeneous(points_3d, 3).dot(&self.projection_matrix().t())
    }
}

/// Read an `(rows, cols)` matrix stored under `key`, flattening any nesting.
fn matrix_from_json(json: &Value, key: &str, rows: usize, cols: usize) -> Result<Array2<f64>> {
    let value = json
        .get(key)
        .ok_or_else(|| Aspset510Error::dataset(format!("camera file is missing '{key}'")))?;
    let mut flat = Vec::with_capacity(rows * cols);
    flatten_numbers(value, &mut flat)
        .ok_or_else(|| Aspset510Error::dataset(format!("'{key}' contains non-numeric values")))?;
    if flat.len() != rows * cols {
        return Err(Aspset510Error::dataset(format!(
            "'{key}' has {} values, expected {}",
            flat.len(),
            rows * cols
        )));
    }
    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| Aspset510Error::dataset(format!("'{key}' has invalid shape: {e}")))
}

fn flatten_numbers(value: &Value, out: &mut Vec<f64>) -> Option<()> {
    match value {
        Value::Number(n) => {
            out.push(n.as_f64()?);
            Some(())
        },
        Value::Array(items) => {
            for item in items {
                flatten_numbers(item, out)?;
            }
            Some(())
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::to_cartesian;
    use ndarray::array;

    // Calibration data for the 04ac-right camera.
    fn fixture_camera() -> Camera {
        let intrinsic = array![
            [3908.201416, 0.000000, 1907.136108, 0.000000],
            [0.000000, 3904.395020, 1082.651855, 0.000000],
            [0.000000, 0.000000, 1.000000, 0.000000],
        ];
        let extrinsic = array![
            [0.355310, -0.037651, 0.933990, -16513.444863],
            [0.010982, 0.999288, 0.036106, -694.394037],
            [-0.934684, -0.002572, 0.355470, 12560.579233],
            [0.000000, 0.000000, 0.000000, 1.000000],
        ];
        Camera::new(intrinsic, extrinsic).unwrap()
    }

    // One pose from clip 04ac-0026 and its reference projection through the
    // 04ac-right camera.
    fn fixture_joints_3d() -> Array2<f64> {
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

    fn fixture_joints_2d() -> Array2<f64> {
        array![
            [2021.66769504, 1299.42125245],
            [2025.42582034, 1216.08135107],
            [2032.97349219, 1138.15800483],
            [2025.36732586, 1115.48445298],
            [1994.74109751, 1087.58712550],
            [2013.94834306, 1038.83602741],
            [2059.66599634, 1278.66144259],
            [2075.03514310, 1214.02638229],
            [2063.36670926, 1139.05195129],
            [2082.42262712, 1097.61661095],
            [2082.35171422, 1089.87025071],
            [2079.75317487, 1040.93403303],
            [2048.13982880, 974.88781273],
            [2048.16161323, 1005.33527749],
            [2048.19522635, 1021.75662551],
            [2048.23529122, 1090.62699530],
            [2048.42372027, 1125.62374581],
        ]
    }

    #[test]
    fn test_world_to_image_space() {
        let camera = fixture_camera();
        let projected = to_cartesian(camera.world_to_image_space(fixture_joints_3d().view()).view(), 2);
        let expected = fixture_joints_2d();
        for (actual, expected) in projected.iter().zip(expected.iter()) {
            assert!(
                (actual - expected).abs() < 1e-5,
                "projection mismatch: {actual} vs {expected}"
            );
        }
    }

    #[test]
    fn test_projection_matrix_shape() {
        let camera = fixture_camera();
        assert_eq!(camera.projection_matrix().shape(), [3, 4]);
    }

    #[test]
    fn test_world_to_camera_then_image_matches_direct_projection() {
        let camera = fixture_camera();
        let joints = fixture_joints_3d();
        let camera_space = to_cartesian(camera.world_to_camera_space(joints.view()).view(), 3);
        let via_camera = camera.camera_to_image_space(camera_space.view());
        let direct = camera.world_to_image_space(joints.view());
        for (a, b) in via_camera.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let bad = Camera::new(Array2::eye(4), Array2::eye(4));
        assert!(bad.is_err());
    }

    #[test]
    fn test_load_accepts_flat_and_nested_matrices() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested.json");
        std::fs::write(
            &nested,
            r#"{
                "intrinsic_matrix": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]],
                "extrinsic_matrix": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]
            }"#,
        )
        .unwrap();
        let flat = dir.path().join("flat.json");
        std::fs::write(
            &flat,
            r#"{
                "intrinsic_matrix": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0],
                "extrinsic_matrix": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]
            }"#,
        )
        .unwrap();
        let from_nested = Camera::load(&nested).unwrap();
        let from_flat = Camera::load(&flat).unwrap();
        assert_eq!(from_nested, from_flat);
        assert_eq!(from_nested.extrinsic_matrix(), Array2::<f64>::eye(4).view());
    }

    #[test]
    fn test_load_rejects_wrong_value_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"intrinsic_matrix": [1, 2, 3], "extrinsic_matrix": []}"#,
        )
        .unwrap();
        assert!(Camera::load(&path).is_err());
    }
}
