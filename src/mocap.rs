//! Motion capture sequences of 3D joint positions.

use std::path::Path;

use ndarray::{Array3, ArrayView3};

use crate::error::{Aspset510Error, Result};

/// A motion capture sequence: per-frame 3D joint positions plus the skeleton
/// they belong to and the capture sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Mocap {
    joint_positions: Array3<f32>,
    skeleton_name: String,
    sample_rate: f32,
}

impl Mocap {
    /// Create a mocap sequence from a `(frames, joints, 3)` position array.
    ///
    /// # Errors
    /// Returns an error if the array is not three values wide per joint.
    pub fn new(joint_positions: Array3<f32>, skeleton_name: &str, sample_rate: f32) -> Result<Self> {
        if joint_positions.shape()[2] != 3 {
            return Err(Aspset510Error::mocap(format!(
                "joint positions must be (frames, joints, 3), got {:?}",
                joint_positions.shape()
            )));
        }
        Ok(Self {
            joint_positions,
            skeleton_name: skeleton_name.to_string(),
            sample_rate,
        })
    }

    /// Joint positions as a `(frames, joints, 3)` array.
    #[must_use]
    pub fn joint_positions(&self) -> ArrayView3<'_, f32> {
        self.joint_positions.view()
    }

    /// Name of the skeleton the joints belong to (e.g. `aspset_17j`).
    #[must_use]
    pub fn skeleton_name(&self) -> &str {
        &self.skeleton_name
    }

    /// Capture sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of frames in the sequence.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.joint_positions.shape()[0]
    }

    /// Number of joints per frame.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joint_positions.shape()[1]
    }
}

/// Load motion capture data from a file, dispatching on the file extension.
///
/// Currently only C3D files are supported.
pub fn load_mocap(path: &Path) -> Result<Mocap> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("c3d") => crate::c3d::load_c3d_mocap(path),
        other => Err(Aspset510Error::mocap(format!(
            "unsupported mocap file format '{}' for '{}'",
            other.unwrap_or("<none>"),
            path.display()
        ))),
    }
}

/// Save motion capture data to a file, dispatching on the file extension.
pub fn save_mocap(mocap: &Mocap, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("c3d") => crate::c3d::save_c3d_mocap(mocap, path),
        other => Err(Aspset510Error::mocap(format!(
            "unsupported mocap file format '{}' for '{}'",
            other.unwrap_or("<none>"),
            path.display()
        ))),
    }
}
