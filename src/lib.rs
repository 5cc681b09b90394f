#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # ASPset-510 Dataset Tools
//!
//! A Rust library and CLI for working with ASPset-510, a large-scale video
//! dataset for 3D human pose estimation in sports, captured outdoors from
//! three calibrated camera viewpoints.
//!
//! The library covers the practical chores around the dataset:
//!
//! - **Download**: fetch and verify the official archives from a mirror, and
//!   extract them into the standard directory layout
//! - **Access**: open a data directory and resolve clips, splits, camera
//!   calibration files, videos, and 3D joint annotations
//! - **Mocap I/O**: read and write joint sequences as C3D files
//! - **Geometry**: full-perspective camera projection and region-of-interest
//!   helpers
//! - **Evaluation**: MPJPE and PCK metrics over prediction directories,
//!   including root-relative and Procrustes-aligned variants
//! - **Rendering**: 2D skeleton overlays and simple 3D pose figures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aspset510::{Aspset510, skeleton_registry, to_cartesian};
//!
//! # fn example() -> anyhow::Result<()> {
//! let aspset = Aspset510::from_data_dir("/data/aspset510".as_ref())?;
//! let clip = aspset.clip("04ac", "0026");
//!
//! let mocap = clip.load_mocap()?;
//! let camera = clip.load_camera("right")?;
//! let skeleton = skeleton_registry(mocap.skeleton_name())?;
//!
//! // Project the first frame's joints into image space.
//! let joints_3d = mocap.joint_positions().index_axis_move(ndarray::Axis(0), 0);
//! let joints_2d = to_cartesian(
//!     camera.world_to_image_space(joints_3d.mapv(f64::from).view()).view(),
//!     2,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! - **Library usage**: dataset access, mocap I/O, geometry, and evaluation
//!   are available by default
//! - **CLI usage**: the `cli` feature (default) adds the `aspset510` binary
//!   with `download`, `browse`, `evaluate`, `pose`, and `info` subcommands
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress reporting, and the
//!   terminal clip browser
//! - `video-support`: decode video frames for annotated-frame export
//!   (requires system FFmpeg libraries)
//!
//! To use only as a library without CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! aspset510 = { version = "0.1", default-features = false }
//! ```

pub mod c3d;
pub mod camera;
#[cfg(feature = "cli")]
pub mod cli;
pub mod dataset;
pub mod download;
pub mod error;
pub mod evaluation;
pub mod extract;
pub mod geometry;
pub mod mocap;
pub mod render;
pub mod scale;
pub mod skeleton;
#[cfg(feature = "cli")]
pub mod tracing_config;
#[cfg(feature = "video-support")]
pub mod video;

// Public API exports
pub use camera::Camera;
pub use dataset::{Aspset510, Clip};
pub use download::{
    collect_archives, extracted_files_exist, ArchiveInfo, DatasetDownloader, DownloadOptions,
    ProgressIndicator, ALL_FIELDS, ALL_PARTITIONS, CURRENT_VERSION,
};
pub use error::{Aspset510Error, Result};
pub use evaluation::{
    absolute_to_root_relative, calculate_mpjpe, calculate_pck, find_and_load_prediction,
    procrustes, EvaluationRun, Joints3dEvaluator,
};
pub use extract::extract_tgz;
pub use geometry::{
    roi_containing_points_2d, square_containing_rectangle, to_cartesian, zoom_roi, Rect,
};
pub use mocap::{load_mocap, save_mocap, Mocap};
pub use render::{draw_joints_2d, render_pose_3d};
pub use scale::{to_root_relative_univ_scale, to_univ_scale, UNIV_KNEE_NECK_HEIGHT};
pub use skeleton::{skeleton_registry, JointGroup, Skeleton, ASPSET_17J};

#[cfg(feature = "cli")]
pub use tracing_config::TracingConfig;
