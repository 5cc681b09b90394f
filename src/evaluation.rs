//! Accuracy evaluation of 3D pose predictions against dataset ground truth.

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use tracing::debug;
use walkdir::WalkDir;

use crate::dataset::{Aspset510, Clip};
use crate::error::{Aspset510Error, Result};
use crate::mocap::{load_mocap, Mocap};
use crate::scale::to_univ_scale;
use crate::skeleton::Skeleton;

/// Default PCK distance threshold in millimetres.
pub const DEFAULT_PCK_THRESHOLD: f64 = 150.0;

/// Calculate the average mean per joint position error for a set of poses.
#[must_use]
pub fn calculate_mpjpe(actual_poses: &[Array2<f32>], expected_poses: &[Array2<f32>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (actual, expected) in actual_poses.iter().zip(expected_poses.iter()) {
        total += joint_distances(actual.view(), expected.view()).iter().sum::<f64>()
            / actual.nrows() as f64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

/// Calculate the average percentage of correct keypoints for a set of poses.
///
/// A keypoint is correct when it lies within `threshold` of the expected
/// location.
#[must_use]
pub fn calculate_pck(actual_poses: &[Array2<f32>], expected_poses: &[Array2<f32>], threshold: f64) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (actual, expected) in actual_poses.iter().zip(expected_poses.iter()) {
        let dists = joint_distances(actual.view(), expected.view());
        let correct = dists.iter().filter(|&&d| d <= threshold).count();
        total += correct as f64 / dists.len() as f64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

/// Per-joint euclidean distances between two poses.
fn joint_distances(actual: ArrayView2<'_, f32>, expected: ArrayView2<'_, f32>) -> Vec<f64> {
    actual
        .rows()
        .into_iter()
        .zip(expected.rows())
        .map(|(a, e)| {
            a.iter()
                .zip(e.iter())
                .map(|(&a, &e)| (f64::from(a) - f64::from(e)).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}

/// Translate a pose so that the root joint sits at the origin.
#[must_use]
pub fn absolute_to_root_relative(pose: ArrayView2<'_, f32>, skeleton: &Skeleton) -> Array2<f32> {
    let root = pose.row(skeleton.root_joint_id()).to_owned();
    let mut relative = pose.to_owned();
    for mut row in relative.rows_mut() {
        row -= &root;
    }
    relative
}

/// Align `actual` to `expected` with the similarity transform (rotation,
/// uniform scale, translation) minimising the squared point distances.
#[must_use]
pub fn procrustes(expected: ArrayView2<'_, f32>, actual: ArrayView2<'_, f32>) -> Array2<f32> {
    let n = expected.nrows();
    assert_eq!(actual.nrows(), n, "pose sizes must match");
    let to_f64 = |points: ArrayView2<'_, f32>| points.mapv(f64::from);
    let expected = to_f64(expected);
    let actual = to_f64(actual);

    let mu_x = expected.mean_axis(Axis(0)).expect("non-empty pose");
    let mu_y = actual.mean_axis(Axis(0)).expect("non-empty pose");
    let mut x0 = expected;
    let mut y0 = actual;
    for mut row in x0.rows_mut() {
        row -= &mu_x;
    }
    for mut row in y0.rows_mut() {
        row -= &mu_y;
    }

    let norm_x = x0.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm_y = y0.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm_x < f64::EPSILON || norm_y < f64::EPSILON {
        // Degenerate poses carry no orientation information; the best
        // alignment is a pure translation.
        let mut aligned = Array2::<f64>::zeros((n, 3));
        for mut row in aligned.rows_mut() {
            row += &mu_x;
        }
        return aligned.mapv(|v| v as f32);
    }
    x0.mapv_inplace(|v| v / norm_x);
    y0.mapv_inplace(|v| v / norm_y);

    // Cross-covariance between the normalised point sets.
    let cov = x0.t().dot(&y0);
    let mut a: Mat3 = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            a[r][c] = cov[[r, c]];
        }
    }
    let (u, s, vt) = svd3(&a);
    // Optimal rotation (reflection corrected), scale, and translation.
    let mut rotation = mat3_mul(&u, &vt);
    let mut trace_s = s[0] + s[1] + s[2];
    if det3(&rotation) < 0.0 {
        // Flip the sign of the smallest singular value's column.
        let mut u_fixed = u;
        for row in &mut u_fixed {
            row[2] = -row[2];
        }
        rotation = mat3_mul(&u_fixed, &vt);
        trace_s = s[0] + s[1] - s[2];
    }

    let scale = norm_x * trace_s;
    let mut aligned = Array2::<f64>::zeros((n, 3));
    for (i, row) in y0.rows().into_iter().enumerate() {
        for r in 0..3 {
            let mut value = 0.0;
            for c in 0..3 {
                value += rotation[r][c] * row[c];
            }
            aligned[[i, r]] = scale * value + mu_x[r];
        }
    }
    aligned.mapv(|v| v as f32)
}

type Mat3 = [[f64; 3]; 3];

fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            for k in 0..3 {
                out[r][c] += a[r][k] * b[k][c];
            }
        }
    }
    out
}

fn transpose3(m: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = m[c][r];
        }
    }
    out
}

fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Singular value decomposition of a 3x3 matrix: `a = u * diag(s) * vt`.
///
/// Uses a Jacobi eigen-decomposition of `a' a`; singular values are sorted
/// in descending order.
fn svd3(a: &Mat3) -> (Mat3, [f64; 3], Mat3) {
    // b = a' a is symmetric positive semi-definite.
    let mut b = mat3_mul(&transpose3(a), a);
    let mut v: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    // Cyclic Jacobi sweeps.
    for _ in 0..32 {
        let off = b[0][1].powi(2) + b[0][2].powi(2) + b[1][2].powi(2);
        if off < 1e-30 {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if b[p][q].abs() < 1e-30 {
                continue;
            }
            let theta = (b[q][q] - b[p][p]) / (2.0 * b[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;
            // Apply the rotation on both sides of b and accumulate into v.
            for k in 0..3 {
                let bkp = b[k][p];
                let bkq = b[k][q];
                b[k][p] = c * bkp - s * bkq;
                b[k][q] = s * bkp + c * bkq;
            }
            for k in 0..3 {
                let bpk = b[p][k];
                let bqk = b[q][k];
                b[p][k] = c * bpk - s * bqk;
                b[q][k] = s * bpk + c * bqk;
            }
            for k in 0..3 {
                let vkp = v[k][p];
                let vkq = v[k][q];
                v[k][p] = c * vkp - s * vkq;
                v[k][q] = s * vkp + c * vkq;
            }
        }
    }

    // Sort eigenvalues (columns of v) in descending order.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| b[j][j].partial_cmp(&b[i][i]).unwrap_or(std::cmp::Ordering::Equal));
    let mut s = [0.0f64; 3];
    let mut v_sorted: Mat3 = [[0.0; 3]; 3];
    for (col, &idx) in order.iter().enumerate() {
        s[col] = b[idx][idx].max(0.0).sqrt();
        for row in 0..3 {
            v_sorted[row][col] = v[row][idx];
        }
    }

    // u columns: a v / s, re-orthogonalised for tiny singular values.
    let mut u: Mat3 = [[0.0; 3]; 3];
    for col in 0..3 {
        if s[col] > 1e-12 {
            for row in 0..3 {
                let mut value = 0.0;
                for k in 0..3 {
                    value += a[row][k] * v_sorted[k][col];
                }
                u[row][col] = value / s[col];
            }
        } else {
            // Complete u with the cross product of the other two columns.
            let c1 = (col + 1) % 3;
            let c2 = (col + 2) % 3;
            u[0][col] = u[1][c1] * u[2][c2] - u[2][c1] * u[1][c2];
            u[1][col] = u[2][c1] * u[0][c2] - u[0][c1] * u[2][c2];
            u[2][col] = u[0][c1] * u[1][c2] - u[1][c1] * u[0][c2];
        }
    }

    (u, s, transpose3(&v_sorted))
}

/// Accumulates prediction/ground-truth pose pairs and reports accuracy
/// metrics over all of them.
pub struct Joints3dEvaluator {
    skeleton: &'static Skeleton,
    actual_poses: Vec<Array2<f32>>,
    pa_actual_poses: Vec<Array2<f32>>,
    expected_poses: Vec<Array2<f32>>,
}

impl Joints3dEvaluator {
    /// Create an evaluator for poses of the given skeleton.
    #[must_use]
    pub fn new(skeleton: &'static Skeleton) -> Self {
        Self {
            skeleton,
            actual_poses: Vec::new(),
            pa_actual_poses: Vec::new(),
            expected_poses: Vec::new(),
        }
    }

    /// Number of pose pairs added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actual_poses.len()
    }

    /// Whether any pose pairs have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actual_poses.is_empty()
    }

    /// Add a single predicted/expected pose pair.
    ///
    /// # Errors
    /// Returns an error if either pose does not match the skeleton.
    pub fn add(&mut self, actual: ArrayView2<'_, f32>, expected: ArrayView2<'_, f32>) -> Result<()> {
        self.skeleton.check_plausible_pose(actual)?;
        self.skeleton.check_plausible_pose(expected)?;
        self.pa_actual_poses.push(procrustes(expected, actual));
        self.actual_poses.push(actual.to_owned());
        self.expected_poses.push(expected.to_owned());
        Ok(())
    }

    /// Add every frame of a predicted/expected pose sequence pair.
    ///
    /// # Errors
    /// Returns an error if the sequences differ in length or do not match
    /// the skeleton.
    pub fn add_sequence(&mut self, actual: ArrayView3<'_, f32>, expected: ArrayView3<'_, f32>) -> Result<()> {
        if actual.shape() != expected.shape() {
            return Err(Aspset510Error::dataset(format!(
                "prediction sequence shape {:?} does not match ground truth {:?}",
                actual.shape(),
                expected.shape()
            )));
        }
        for (actual_pose, expected_pose) in actual.outer_iter().zip(expected.outer_iter()) {
            self.add(actual_pose, expected_pose)?;
        }
        Ok(())
    }

    fn to_root_relative(&self, poses: &[Array2<f32>]) -> Vec<Array2<f32>> {
        poses
            .iter()
            .map(|pose| absolute_to_root_relative(pose.view(), self.skeleton))
            .collect()
    }

    /// Average mean per joint position error.
    #[must_use]
    pub fn mpjpe(&self) -> f64 {
        calculate_mpjpe(&self.actual_poses, &self.expected_poses)
    }

    /// Root-relative average mean per joint position error.
    #[must_use]
    pub fn rr_mpjpe(&self) -> f64 {
        calculate_mpjpe(
            &self.to_root_relative(&self.actual_poses),
            &self.to_root_relative(&self.expected_poses),
        )
    }

    /// Procrustes-aligned average mean per joint position error.
    #[must_use]
    pub fn pa_mpjpe(&self) -> f64 {
        calculate_mpjpe(&self.pa_actual_poses, &self.expected_poses)
    }

    /// Average percentage of correct keypoints.
    #[must_use]
    pub fn pck(&self, threshold: f64) -> f64 {
        calculate_pck(&self.actual_poses, &self.expected_poses, threshold)
    }

    /// Root-relative average percentage of correct keypoints.
    #[must_use]
    pub fn rr_pck(&self, threshold: f64) -> f64 {
        calculate_pck(
            &self.to_root_relative(&self.actual_poses),
            &self.to_root_relative(&self.expected_poses),
            threshold,
        )
    }

    /// Procrustes-aligned average percentage of correct keypoints.
    #[must_use]
    pub fn pa_pck(&self, threshold: f64) -> f64 {
        calculate_pck(&self.pa_actual_poses, &self.expected_poses, threshold)
    }

    /// Collect all metrics as name/value pairs in reporting order.
    #[must_use]
    pub fn collect_results(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("MPJPE", self.mpjpe()),
            ("Root-relative MPJPE", self.rr_mpjpe()),
            ("Procrustes-aligned MPJPE", self.pa_mpjpe()),
            ("PCK", self.pck(DEFAULT_PCK_THRESHOLD)),
            ("Root-relative PCK", self.rr_pck(DEFAULT_PCK_THRESHOLD)),
            ("Procrustes-aligned PCK", self.pa_pck(DEFAULT_PCK_THRESHOLD)),
        ]
    }
}

/// Find all prediction files for a clip/camera combination.
///
/// Matches any file under `preds_dir` (recursively) whose stem is
/// `<subject>-<clip>-<camera>`, plus `<subject>-<clip>` when
/// `include_unknown_camera` is set.
pub fn find_prediction_files(
    preds_dir: &Path,
    subject_id: &str,
    clip_id: &str,
    camera_id: &str,
    include_unknown_camera: bool,
) -> Result<Vec<PathBuf>> {
    let full_stem = format!("{subject_id}-{clip_id}-{camera_id}");
    let short_stem = format!("{subject_id}-{clip_id}");
    let mut matches = Vec::new();
    for entry in WalkDir::new(preds_dir) {
        let entry = entry.map_err(|e| {
            Aspset510Error::dataset(format!("failed to scan predictions directory: {e}"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let stem = entry.path().file_stem().and_then(|s| s.to_str());
        let matched = match stem {
            Some(stem) => stem == full_stem || (include_unknown_camera && stem == short_stem),
            None => false,
        };
        if matched {
            matches.push(entry.path().to_path_buf());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Find and load motion capture data from a directory of prediction files.
///
/// # Errors
/// Returns an error when no prediction file matches, or when more than one
/// does.
pub fn find_and_load_prediction(
    preds_dir: &Path,
    subject_id: &str,
    clip_id: &str,
    camera_id: &str,
    include_unknown_camera: bool,
) -> Result<Mocap> {
    let files = find_prediction_files(preds_dir, subject_id, clip_id, camera_id, include_unknown_camera)?;
    match files.as_slice() {
        [] => Err(Aspset510Error::dataset(format!(
            "no prediction file found for {subject_id}-{clip_id}-{camera_id}"
        ))),
        [path] => load_mocap(path),
        _ => Err(Aspset510Error::dataset(format!(
            "multiple prediction files found for {subject_id}-{clip_id}-{camera_id}"
        ))),
    }
}

/// One full evaluation pass: predictions for every camera of every clip in a
/// split, compared against ground truth mocap.
pub struct EvaluationRun<'a> {
    aspset: &'a Aspset510,
    preds_dir: PathBuf,
    split: String,
    univ: bool,
    skip_missing: bool,
}

impl<'a> EvaluationRun<'a> {
    /// Configure an evaluation over `split` using predictions in `preds_dir`.
    pub fn new(
        aspset: &'a Aspset510,
        preds_dir: &Path,
        split: &str,
        univ: bool,
        skip_missing: bool,
    ) -> Self {
        Self {
            aspset,
            preds_dir: preds_dir.to_path_buf(),
            split: split.to_string(),
            univ,
            skip_missing,
        }
    }

    /// Clips belonging to the evaluated split.
    pub fn clips(&self) -> Result<Vec<Clip<'a>>> {
        self.aspset.split_clips(&self.split)
    }

    /// Evaluate one clip, feeding all of its camera predictions into
    /// `evaluator`. Returns the number of prediction files used.
    pub fn evaluate_clip(&self, clip: &Clip<'_>, evaluator: &mut Joints3dEvaluator) -> Result<usize> {
        let gt_mocap = clip.load_mocap()?;
        let skeleton = skeleton_for(&gt_mocap)?;
        let gt = self.maybe_univ(gt_mocap.joint_positions(), skeleton);
        let mut used = 0usize;
        for camera_id in Aspset510::CAMERA_IDS {
            let files = find_prediction_files(
                &self.preds_dir,
                clip.subject_id(),
                clip.clip_id(),
                camera_id,
                true,
            )?;
            let path = match files.as_slice() {
                [] if self.skip_missing => {
                    debug!(
                        subject = clip.subject_id(),
                        clip = clip.clip_id(),
                        camera = camera_id,
                        "skipping missing prediction"
                    );
                    continue;
                },
                [] => {
                    return Err(Aspset510Error::dataset(format!(
                        "no prediction file found for {}-{}-{}",
                        clip.subject_id(),
                        clip.clip_id(),
                        camera_id
                    )))
                },
                [path] => path,
                _ => {
                    return Err(Aspset510Error::dataset(format!(
                        "multiple prediction files found for {}-{}-{}",
                        clip.subject_id(),
                        clip.clip_id(),
                        camera_id
                    )))
                },
            };
            let pred_mocap = load_mocap(path)?;
            let pred = self.maybe_univ(pred_mocap.joint_positions(), skeleton);
            evaluator.add_sequence(pred.view(), gt.view())?;
            used += 1;
        }
        Ok(used)
    }

    fn maybe_univ(&self, poses: ArrayView3<'_, f32>, skeleton: &Skeleton) -> ndarray::Array3<f32> {
        if !self.univ {
            return poses.to_owned();
        }
        let mut out = poses.to_owned();
        for (frame, pose) in poses.outer_iter().enumerate() {
            out.index_axis_mut(Axis(0), frame)
                .assign(&to_univ_scale(pose, skeleton));
        }
        out
    }
}

fn skeleton_for(mocap: &Mocap) -> Result<&'static Skeleton> {
    crate::skeleton::skeleton_registry(mocap.skeleton_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocap::save_mocap;
    use crate::skeleton::ASPSET_17J;
    use ndarray::{array, Array3};

    #[test]
    fn test_calculate_mpjpe() {
        let actual = vec![array![[1.0f32, 1.0, 1.0], [0.0, 0.0, 2.0]]];
        let expected = vec![array![[1.0f32, 1.0, 1.0], [3.0, 4.0, 2.0]]];
        assert!((calculate_mpjpe(&actual, &expected) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_pck() {
        let actual = vec![array![[1.0f32, 1.0, 1.0], [0.0, 0.0, 2.0]]];
        let expected = vec![array![[1.0f32, 1.0, 1.0], [3.0, 4.0, 2.0]]];
        assert!((calculate_pck(&actual, &expected, 4.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let evaluator = Joints3dEvaluator::new(&ASPSET_17J);
        for (_, value) in evaluator.collect_results() {
            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn test_absolute_to_root_relative() {
        let mut pose = ndarray::Array2::<f32>::zeros((17, 3));
        pose[[ASPSET_17J.root_joint_id(), 0]] = 5.0;
        pose[[0, 0]] = 7.0;
        let relative = absolute_to_root_relative(pose.view(), &ASPSET_17J);
        assert_eq!(relative[[ASPSET_17J.root_joint_id(), 0]], 0.0);
        assert_eq!(relative[[0, 0]], 2.0);
    }

    #[test]
    fn test_procrustes_recovers_similarity_transform() {
        // A non-degenerate reference pose.
        let expected = array![
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 3.0],
            [1.0, 1.0, 1.0],
        ];
        // Rotate 90 degrees about z, scale by 2, translate.
        let mut actual = ndarray::Array2::<f32>::zeros((5, 3));
        for (i, row) in expected.rows().into_iter().enumerate() {
            actual[[i, 0]] = -2.0 * row[1] + 10.0;
            actual[[i, 1]] = 2.0 * row[0] - 4.0;
            actual[[i, 2]] = 2.0 * row[2] + 1.5;
        }
        let aligned = procrustes(expected.view(), actual.view());
        for (a, e) in aligned.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-4, "aligned {a} != expected {e}");
        }
    }

    #[test]
    fn test_procrustes_does_not_mirror() {
        let expected = array![
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        // A reflected copy cannot be aligned perfectly by a rotation.
        let mut actual = expected.clone();
        for mut row in actual.rows_mut() {
            row[0] = -row[0];
        }
        let aligned = procrustes(expected.view(), actual.view());
        let residual = calculate_mpjpe(&[aligned], &[expected]);
        assert!(residual > 1e-3);
    }

    #[test]
    fn test_evaluator_sequences() {
        let mut evaluator = Joints3dEvaluator::new(&ASPSET_17J);
        let gt = Array3::<f32>::zeros((4, 17, 3));
        let mut pred = Array3::<f32>::zeros((4, 17, 3));
        pred.mapv_inplace(|_| 1.0);
        evaluator.add_sequence(pred.view(), gt.view()).unwrap();
        assert_eq!(evaluator.len(), 4);
        let expected_error = 3.0f64.sqrt();
        assert!((evaluator.mpjpe() - expected_error).abs() < 1e-6);
        assert!((evaluator.pck(DEFAULT_PCK_THRESHOLD) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluator_rejects_mismatched_shapes() {
        let mut evaluator = Joints3dEvaluator::new(&ASPSET_17J);
        let gt = Array3::<f32>::zeros((4, 17, 3));
        let pred = Array3::<f32>::zeros((3, 17, 3));
        assert!(evaluator.add_sequence(pred.view(), gt.view()).is_err());
    }

    fn write_prediction_fixtures(dir: &Path) {
        let mocap = crate::mocap::Mocap::new(Array3::zeros((5, 17, 3)), "aspset_17j", 50.0).unwrap();
        for filename in ["1e28-0001.c3d", "1e28-0001-right.c3d", "8a59-0035-left.c3d"] {
            save_mocap(&mocap, &dir.join(filename)).unwrap();
        }
    }

    #[test]
    fn test_find_and_load_prediction() {
        let dir = tempfile::tempdir().unwrap();
        write_prediction_fixtures(dir.path());

        assert!(find_and_load_prediction(dir.path(), "8a59", "0035", "left", false).is_ok());
        assert!(find_and_load_prediction(dir.path(), "1e28", "0001", "right", false).is_ok());
        assert!(find_and_load_prediction(dir.path(), "1e28", "0001", "left", true).is_ok());

        let err = find_and_load_prediction(dir.path(), "8a59", "0035", "right", false).unwrap_err();
        assert!(err.to_string().contains("no prediction file found for 8a59-0035-right"));

        let err = find_and_load_prediction(dir.path(), "1e28", "0001", "right", true).unwrap_err();
        assert!(err.to_string().contains("multiple prediction files found for 1e28-0001-right"));
    }
}
