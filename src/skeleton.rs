//! Skeleton metadata for the joint annotations shipped with the dataset.

use ndarray::ArrayView2;

use crate::error::{Aspset510Error, Result};

/// Laterality group of a joint, used to colour bones when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointGroup {
    Centre,
    Left,
    Right,
}

/// A named skeleton: joint names, parent links, and laterality groups.
///
/// Parent links form a tree rooted at `root_joint_id` (the root is its own
/// parent).
#[derive(Debug)]
pub struct Skeleton {
    name: &'static str,
    joint_names: &'static [&'static str],
    parents: &'static [usize],
    groups: &'static [JointGroup],
    root_joint_id: usize,
}

/// The 17-joint skeleton used by ASPset-510 annotations.
pub static ASPSET_17J: Skeleton = Skeleton {
    name: "aspset_17j",
    joint_names: &[
        "left_ankle",
        "left_knee",
        "left_hip",
        "right_hip",
        "right_knee",
        "right_ankle",
        "left_wrist",
        "left_elbow",
        "left_shoulder",
        "right_shoulder",
        "right_elbow",
        "right_wrist",
        "head_top",
        "head",
        "neck",
        "spine",
        "pelvis",
    ],
    parents: &[1, 2, 16, 16, 3, 4, 7, 8, 14, 14, 9, 10, 13, 14, 15, 16, 16],
    groups: &[
        JointGroup::Left,
        JointGroup::Left,
        JointGroup::Left,
        JointGroup::Right,
        JointGroup::Right,
        JointGroup::Right,
        JointGroup::Left,
        JointGroup::Left,
        JointGroup::Left,
        JointGroup::Right,
        JointGroup::Right,
        JointGroup::Right,
        JointGroup::Centre,
        JointGroup::Centre,
        JointGroup::Centre,
        JointGroup::Centre,
        JointGroup::Centre,
    ],
    root_joint_id: 16,
};

/// Look up a built-in skeleton by name.
///
/// # Errors
/// Returns an error for unknown skeleton names.
pub fn skeleton_registry(name: &str) -> Result<&'static Skeleton> {
    match name {
        "aspset_17j" => Ok(&ASPSET_17J),
        _ => Err(Aspset510Error::dataset(format!("unknown skeleton '{name}'"))),
    }
}

impl Skeleton {
    /// Skeleton name as registered.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Joint names in annotation order.
    #[must_use]
    pub fn joint_names(&self) -> &'static [&'static str] {
        self.joint_names
    }

    /// Number of joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joint_names.len()
    }

    /// Parent joint id of `joint_id`.
    #[must_use]
    pub fn parent(&self, joint_id: usize) -> usize {
        self.parents[joint_id]
    }

    /// Laterality group of `joint_id`.
    #[must_use]
    pub fn group(&self, joint_id: usize) -> JointGroup {
        self.groups[joint_id]
    }

    /// Root joint id (the pelvis for `aspset_17j`).
    #[must_use]
    pub fn root_joint_id(&self) -> usize {
        self.root_joint_id
    }

    /// Find a joint id by name.
    #[must_use]
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|&n| n == name)
    }

    /// Check that a pose array has one 3D row per joint.
    ///
    /// # Errors
    /// Returns an error if the shape does not match the skeleton.
    pub fn check_plausible_pose(&self, pose: ArrayView2<'_, f32>) -> Result<()> {
        if pose.shape() != [self.joint_count(), 3] {
            return Err(Aspset510Error::dataset(format!(
                "pose shape {:?} does not match skeleton '{}' ({} joints)",
                pose.shape(),
                self.name,
                self.joint_count()
            )));
        }
        Ok(())
    }

    /// Distance from knee to neck along the skeleton.
    ///
    /// Sums the mean knee-to-hip and hip-to-pelvis limb lengths with the
    /// pelvis-to-spine and spine-to-neck lengths. Used as a subject-invariant
    /// height measure for universal pose scaling.
    #[must_use]
    pub fn knee_neck_height(&self, joints_3d: ArrayView2<'_, f32>) -> f64 {
        let joint = |name: &str| {
            let id = self
                .joint_index(name)
                .unwrap_or_else(|| panic!("skeleton '{}' has no joint '{name}'", self.name));
            [f64::from(joints_3d[[id, 0]]), f64::from(joints_3d[[id, 1]]), f64::from(joints_3d[[id, 2]])]
        };
        let dist = |a: [f64; 3], b: [f64; 3]| {
            ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
        };
        let left_shin = dist(joint("left_knee"), joint("left_hip"));
        let right_shin = dist(joint("right_knee"), joint("right_hip"));
        let left_waist = dist(joint("left_hip"), joint("pelvis"));
        let right_waist = dist(joint("right_hip"), joint("pelvis"));
        (left_shin + right_shin) / 2.0
            + (left_waist + right_waist) / 2.0
            + dist(joint("pelvis"), joint("spine"))
            + dist(joint("spine"), joint("neck"))
    }
}
