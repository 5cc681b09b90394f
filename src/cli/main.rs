//! ASPset-510 dataset tools
//!
//! Command-line interface for downloading, browsing, and evaluating against
//! the dataset.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Axis;
use tracing::{info, warn};

use crate::dataset::Aspset510;
use crate::download::{DatasetDownloader, DownloadOptions, ALL_FIELDS, ALL_PARTITIONS};
use crate::evaluation::{EvaluationRun, Joints3dEvaluator};
use crate::geometry::{
    roi_containing_points_2d, square_containing_rectangle, to_cartesian, transform_points_2d,
};
use crate::geometry::mat3;
use crate::render::{draw_joints_2d, render_pose_3d};
use crate::skeleton::skeleton_registry;
use crate::tracing_config::TracingConfig;

/// ASPset-510 dataset tools
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "aspset510")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download and extract dataset archives from a mirror
    Download(DownloadArgs),
    /// Browse clips and their pose annotations interactively
    Browse(BrowseArgs),
    /// Evaluate 3D pose predictions against ground truth
    Evaluate(EvaluateArgs),
    /// Render or inspect a single annotated pose
    Pose(PoseArgs),
    /// Summarise the contents of a dataset directory
    Info(InfoArgs),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct DownloadArgs {
    /// Path to the base dataset directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Path for the downloaded archives [default: {DATA_DIR}/archives]
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Base URL of the archive mirror
    #[arg(long, value_name = "URL")]
    pub mirror: String,

    /// Partitions to download [default: all]
    #[arg(long, value_delimiter = ',')]
    pub partitions: Vec<String>,

    /// Fields to download [default: all]
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Skip archives which have been extracted previously [default: enabled]
    #[arg(long, overrides_with = "no_skip_existing")]
    pub skip_existing: bool,
    #[arg(long, hide = true)]
    pub no_skip_existing: bool,

    /// Skip downloading existing archives [default: enabled]
    #[arg(long, overrides_with = "no_skip_download_existing")]
    pub skip_download_existing: bool,
    #[arg(long, hide = true)]
    pub no_skip_download_existing: bool,

    /// Skip checking archive integrity [default: disabled]
    #[arg(long, overrides_with = "no_skip_checksum")]
    pub skip_checksum: bool,
    #[arg(long, hide = true)]
    pub no_skip_checksum: bool,

    /// Skip extracting files [default: disabled]
    #[arg(long, overrides_with = "no_skip_extraction")]
    pub skip_extraction: bool,
    #[arg(long, hide = true)]
    pub no_skip_extraction: bool,
}

#[derive(Args)]
pub struct BrowseArgs {
    /// Path to the base dataset directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to the base dataset directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Directory containing predicted pose files
    #[arg(long, value_name = "DIR")]
    pub predictions: PathBuf,

    /// Split to evaluate on
    #[arg(long, default_value = "test")]
    pub split: String,

    /// Rescale poses to universal skeleton size before comparison [default: disabled]
    #[arg(long, overrides_with = "no_univ")]
    pub univ: bool,
    #[arg(long, hide = true)]
    pub no_univ: bool,

    /// Skip clips with missing predictions instead of failing [default: disabled]
    #[arg(long, overrides_with = "no_skip_missing")]
    pub skip_missing: bool,
    #[arg(long, hide = true)]
    pub no_skip_missing: bool,
}

#[derive(Args)]
pub struct PoseArgs {
    /// Path to the base dataset directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Subject identifier (e.g. 04ac)
    #[arg(long)]
    pub subject: String,

    /// Clip identifier (e.g. 0026)
    #[arg(long)]
    pub clip: String,

    /// Frame index within the clip
    #[arg(long, default_value_t = 0)]
    pub frame: usize,

    /// Camera to project through (renders a 3D front view when omitted)
    #[arg(long)]
    pub camera: Option<String>,

    /// Output image file; pose statistics are printed when omitted
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Path to the base dataset directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,
}

// Resolves a --flag / --no-flag pair against its default.
fn flag_pair(positive: bool, negative: bool, default: bool) -> bool {
    if positive {
        true
    } else if negative {
        false
    } else {
        default
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .init()
        .context("Failed to initialize tracing")?;

    match cli.command {
        Command::Download(args) => download(args).await,
        Command::Browse(args) => browse(&args),
        Command::Evaluate(args) => evaluate(&args),
        Command::Pose(args) => pose(&args),
        Command::Info(args) => info_command(&args),
    }
}

async fn download(args: DownloadArgs) -> Result<()> {
    let archive_dir = args
        .archive_dir
        .clone()
        .unwrap_or_else(|| args.data_dir.join("archives"));
    let partitions = name_list(&args.partitions, &ALL_PARTITIONS);
    let fields = name_list(&args.fields, &ALL_FIELDS);
    let options = DownloadOptions {
        skip_existing: flag_pair(args.skip_existing, args.no_skip_existing, true),
        skip_download_existing: flag_pair(
            args.skip_download_existing,
            args.no_skip_download_existing,
            true,
        ),
        skip_checksum: flag_pair(args.skip_checksum, args.no_skip_checksum, false),
        skip_extraction: flag_pair(args.skip_extraction, args.no_skip_extraction, false),
        show_progress: true,
    };

    info!(mirror = %args.mirror, "starting dataset download");
    let downloader = DatasetDownloader::new().context("Failed to create downloader")?;
    downloader
        .download_and_extract_archives(
            &args.data_dir,
            &archive_dir,
            &args.mirror,
            &partitions,
            &fields,
            &options,
        )
        .await
        .context("Failed to download dataset archives")?;
    Ok(())
}

fn name_list<'a>(selected: &'a [String], all: &[&'a str]) -> Vec<&'a str> {
    if selected.is_empty() {
        all.to_vec()
    } else {
        selected.iter().map(String::as_str).collect()
    }
}

fn browse(args: &BrowseArgs) -> Result<()> {
    let aspset = open_dataset(&args.data_dir)?;
    super::browse::run(&aspset)
}

fn evaluate(args: &EvaluateArgs) -> Result<()> {
    let aspset = open_dataset(&args.data_dir)?;
    let univ = flag_pair(args.univ, args.no_univ, false);
    let skip_missing = flag_pair(args.skip_missing, args.no_skip_missing, false);
    let run = EvaluationRun::new(&aspset, &args.predictions, &args.split, univ, skip_missing);

    let clips = run
        .clips()
        .with_context(|| format!("Failed to list clips for split '{}'", args.split))?;
    let progress = ProgressBar::new(clips.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} clips {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut evaluator = Joints3dEvaluator::new(skeleton_registry("aspset_17j")?);
    let mut file_count = 0usize;
    for clip in &clips {
        progress.set_message(format!("{}-{}", clip.subject_id(), clip.clip_id()));
        file_count += run
            .evaluate_clip(clip, &mut evaluator)
            .with_context(|| {
                format!(
                    "Failed to evaluate clip {}-{}",
                    clip.subject_id(),
                    clip.clip_id()
                )
            })?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    if evaluator.is_empty() {
        warn!("no predictions were evaluated");
    }
    println!(
        "Evaluated {} poses from {} prediction files.",
        evaluator.len(),
        file_count
    );
    for (name, value) in evaluator.collect_results() {
        println!("{name}: {value:.4}");
    }
    Ok(())
}

fn pose(args: &PoseArgs) -> Result<()> {
    let aspset = open_dataset(&args.data_dir)?;
    let clip = aspset.clip(&args.subject, &args.clip);
    let mocap = clip
        .load_mocap()
        .with_context(|| format!("Failed to load annotations for {}-{}", args.subject, args.clip))?;
    let skeleton = skeleton_registry(mocap.skeleton_name())?;
    if args.frame >= mocap.frame_count() {
        anyhow::bail!(
            "frame {} is out of range ({} frames in clip)",
            args.frame,
            mocap.frame_count()
        );
    }
    let joints_3d = mocap.joint_positions().index_axis_move(Axis(0), args.frame);

    let Some(output) = &args.output else {
        println!("clip: {}-{}", args.subject, args.clip);
        println!("split: {}", clip.split()?);
        println!("skeleton: {}", mocap.skeleton_name());
        println!("frames: {} @ {} Hz", mocap.frame_count(), mocap.sample_rate());
        println!(
            "knee-neck height: {:.1} mm",
            skeleton.knee_neck_height(joints_3d.view())
        );
        for (joint_id, name) in skeleton.joint_names().iter().enumerate() {
            println!(
                "{name}: ({:.1}, {:.1}, {:.1})",
                joints_3d[[joint_id, 0]],
                joints_3d[[joint_id, 1]],
                joints_3d[[joint_id, 2]]
            );
        }
        return Ok(());
    };

    let image = match &args.camera {
        Some(camera_id) => {
            let camera = clip
                .load_camera(camera_id)
                .with_context(|| format!("Failed to load camera '{camera_id}'"))?;
            let joints_2d = to_cartesian(
                camera
                    .world_to_image_space(joints_3d.mapv(f64::from).view())
                    .view(),
                2,
            );
            #[cfg(feature = "video-support")]
            if let Ok(video_path) = clip.video_path(camera_id) {
                if video_path.is_file() {
                    let mut frame = crate::video::decode_frame(&video_path, args.frame)
                        .with_context(|| {
                            format!("Failed to decode frame from '{}'", video_path.display())
                        })?;
                    draw_joints_2d(&mut frame, joints_2d.view(), skeleton);
                    frame.save(output).context("Failed to save output image")?;
                    println!("Wrote {}", output.display());
                    return Ok(());
                }
            }
            // No video frame available: draw on a blank canvas cropped to
            // the pose.
            let (x1, y1, x2, y2) =
                square_containing_rectangle(roi_containing_points_2d(joints_2d.view(), 0.75));
            let shifted = transform_points_2d(joints_2d.view(), mat3::translate(-x1, -y1).view());
            let mut canvas = image::RgbImage::from_pixel(
                (x2 - x1).ceil().max(1.0) as u32,
                (y2 - y1).ceil().max(1.0) as u32,
                image::Rgb([255, 255, 255]),
            );
            draw_joints_2d(&mut canvas, shifted.view(), skeleton);
            canvas
        },
        None => render_pose_3d(joints_3d.view(), skeleton, 512, 512),
    };
    image.save(output).context("Failed to save output image")?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn info_command(args: &InfoArgs) -> Result<()> {
    let aspset = open_dataset(&args.data_dir)?;
    println!("data directory: {}", aspset.data_dir().display());
    println!("cameras: {}", Aspset510::CAMERA_IDS.join(", "));

    let mut total_clips = 0usize;
    let mut rows: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for split in aspset.split_names() {
        let clips = aspset.split_clips(split)?;
        let subjects: std::collections::BTreeSet<&str> =
            clips.iter().map(|c| c.subject_id()).collect();
        total_clips += clips.len();
        rows.insert(split, (clips.len(), subjects.len()));
    }
    for (split, (clip_count, subject_count)) in &rows {
        println!("{split}: {clip_count} clips from {subject_count} subjects");
    }
    println!("total: {total_clips} clips");
    Ok(())
}

fn open_dataset(data_dir: &Path) -> Result<Aspset510> {
    Aspset510::from_data_dir(data_dir)
        .with_context(|| format!("Failed to open dataset at '{}'", data_dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flag_pair_defaults() {
        assert!(flag_pair(false, false, true));
        assert!(!flag_pair(false, false, false));
        assert!(flag_pair(true, false, false));
        assert!(!flag_pair(false, true, true));
    }

    #[test]
    fn test_download_flag_parsing() {
        let cli = Cli::parse_from([
            "aspset510",
            "download",
            "--data-dir",
            "/tmp/aspset",
            "--mirror",
            "https://mirror.example.com/",
            "--no-skip-existing",
            "--skip-checksum",
        ]);
        let Command::Download(args) = cli.command else {
            panic!("expected download subcommand");
        };
        assert!(!flag_pair(args.skip_existing, args.no_skip_existing, true));
        assert!(flag_pair(args.skip_checksum, args.no_skip_checksum, false));
        assert!(flag_pair(
            args.skip_download_existing,
            args.no_skip_download_existing,
            true
        ));
    }

    #[test]
    fn test_partition_list_parsing() {
        let cli = Cli::parse_from([
            "aspset510",
            "download",
            "--data-dir",
            "/tmp/aspset",
            "--mirror",
            "https://mirror.example.com/",
            "--partitions",
            "trainval",
            "--fields",
            "cameras,joints_3d",
        ]);
        let Command::Download(args) = cli.command else {
            panic!("expected download subcommand");
        };
        assert_eq!(name_list(&args.partitions, &ALL_PARTITIONS), vec!["trainval"]);
        assert_eq!(
            name_list(&args.fields, &ALL_FIELDS),
            vec!["cameras", "joints_3d"]
        );
    }
}
