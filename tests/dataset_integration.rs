//! End-to-end tests over a synthetic dataset directory: archive extraction,
//! clip access, annotation round-trips, and prediction evaluation.

use std::fs;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array3, Axis};
use tempfile::TempDir;

use aspset510::evaluation::{Joints3dEvaluator, DEFAULT_PCK_THRESHOLD};
use aspset510::{
    extract_tgz, load_mocap, save_mocap, skeleton_registry, Aspset510, Camera, EvaluationRun,
    Mocap,
};

const IDENTITY_CAMERA_JSON: &str = r#"{
    "intrinsic_matrix": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]],
    "extrinsic_matrix": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]
}"#;

/// A smooth, full-rank joint trajectory so metrics have non-trivial values.
fn synthetic_mocap(frames: usize) -> Mocap {
    let mut joints = Array3::<f32>::zeros((frames, 17, 3));
    for frame in 0..frames {
        for joint in 0..17 {
            joints[[frame, joint, 0]] = joint as f32 * 10.0 + frame as f32;
            joints[[frame, joint, 1]] = (joint as f32).sin() * 100.0;
            joints[[frame, joint, 2]] = 1000.0 + joint as f32;
        }
    }
    Mocap::new(joints, "aspset_17j", 50.0).unwrap()
}

fn write_fixture_dataset(data_dir: &Path) {
    fs::write(
        data_dir.join("splits.csv"),
        "04ac,0026,train\n04ac,0031,val\n8a59,0035,test\n",
    )
    .unwrap();
    for (partition, subject, clip) in [
        ("trainval", "04ac", "0026"),
        ("trainval", "04ac", "0031"),
        ("test", "8a59", "0035"),
    ] {
        let joints_dir = data_dir.join(partition).join("joints_3d").join(subject);
        fs::create_dir_all(&joints_dir).unwrap();
        save_mocap(
            &synthetic_mocap(8),
            &joints_dir.join(format!("{subject}-{clip}.c3d")),
        )
        .unwrap();

        let cameras_dir = data_dir.join(partition).join("cameras").join(subject);
        fs::create_dir_all(&cameras_dir).unwrap();
        for camera_id in Aspset510::CAMERA_IDS {
            fs::write(
                cameras_dir.join(format!("{subject}-{camera_id}.json")),
                IDENTITY_CAMERA_JSON,
            )
            .unwrap();
        }
    }
}

#[test]
fn test_clip_annotations_round_trip() {
    let dir = TempDir::new().unwrap();
    write_fixture_dataset(dir.path());

    let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
    assert_eq!(aspset.all_clips().unwrap().len(), 3);

    let clip = aspset.clip("8a59", "0035");
    assert_eq!(clip.split().unwrap(), "test");
    let mocap = clip.load_mocap().unwrap();
    assert_eq!(mocap.frame_count(), 8);
    assert_eq!(mocap.skeleton_name(), "aspset_17j");
    assert!((mocap.sample_rate() - 50.0).abs() < 1e-6);

    // The C3D file preserves positions through a write/read cycle.
    let reloaded = load_mocap(&clip.mocap_path().unwrap()).unwrap();
    let original = synthetic_mocap(8);
    for (a, b) in reloaded
        .joint_positions()
        .iter()
        .zip(original.joint_positions().iter())
    {
        assert!((a - b).abs() < 1e-3);
    }

    let camera = clip.load_camera("mid").unwrap();
    assert_eq!(camera, Camera::load(&clip.camera_path("mid").unwrap()).unwrap());
}

#[test]
fn test_extract_archive_then_open_dataset() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    write_fixture_dataset(&staging);

    // Pack the fixture under the distribution's top-level directory.
    let archive_path = dir.path().join("aspset510_v1_test-joints_3d.tar.gz");
    let encoder = GzEncoder::new(fs::File::create(&archive_path).unwrap(), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all("ASPset-510", &staging).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let data_dir = dir.path().join("data");
    extract_tgz(&archive_path, &data_dir, "ASPset-510").unwrap();

    let aspset = Aspset510::from_data_dir(&data_dir).unwrap();
    let mocap = aspset.clip("04ac", "0026").load_mocap().unwrap();
    assert_eq!(mocap.frame_count(), 8);
}

#[test]
fn test_evaluation_over_prediction_directory() {
    let dir = TempDir::new().unwrap();
    write_fixture_dataset(dir.path());

    // Predictions for every camera of the test clip, offset from ground
    // truth by (3, 4, 0): per-joint error 5.
    let preds_dir = dir.path().join("preds");
    fs::create_dir_all(&preds_dir).unwrap();
    let gt = synthetic_mocap(8);
    let mut offset = gt.joint_positions().to_owned();
    for mut xyz in offset.lanes_mut(Axis(2)) {
        xyz[0] += 3.0;
        xyz[1] += 4.0;
    }
    let prediction = Mocap::new(offset, "aspset_17j", 50.0).unwrap();
    for camera_id in Aspset510::CAMERA_IDS {
        save_mocap(&prediction, &preds_dir.join(format!("8a59-0035-{camera_id}.c3d"))).unwrap();
    }

    let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
    let run = EvaluationRun::new(&aspset, &preds_dir, "test", false, false);
    let clips = run.clips().unwrap();
    assert_eq!(clips.len(), 1);

    let mut evaluator = Joints3dEvaluator::new(skeleton_registry("aspset_17j").unwrap());
    let mut files = 0;
    for clip in &clips {
        files += run.evaluate_clip(clip, &mut evaluator).unwrap();
    }
    assert_eq!(files, 3);
    // 8 frames from each of the 3 cameras.
    assert_eq!(evaluator.len(), 24);
    assert!((evaluator.mpjpe() - 5.0).abs() < 1e-3);
    // A constant offset disappears under root-relative alignment.
    assert!(evaluator.rr_mpjpe() < 1e-3);
    assert!(evaluator.pa_mpjpe() < 1e-2);
    assert!((evaluator.pck(DEFAULT_PCK_THRESHOLD) - 1.0).abs() < 1e-9);
}

#[test]
fn test_evaluation_missing_predictions() {
    let dir = TempDir::new().unwrap();
    write_fixture_dataset(dir.path());
    let preds_dir = dir.path().join("preds");
    fs::create_dir_all(&preds_dir).unwrap();

    let aspset = Aspset510::from_data_dir(dir.path()).unwrap();
    let skeleton = skeleton_registry("aspset_17j").unwrap();

    // Without skip_missing an empty predictions directory is an error.
    let strict = EvaluationRun::new(&aspset, &preds_dir, "test", false, false);
    let mut evaluator = Joints3dEvaluator::new(skeleton);
    let clip = &strict.clips().unwrap()[0];
    let err = strict.evaluate_clip(clip, &mut evaluator).unwrap_err();
    assert!(err.to_string().contains("no prediction file found for 8a59-0035-left"));

    // With skip_missing the clip is silently skipped.
    let lenient = EvaluationRun::new(&aspset, &preds_dir, "test", false, true);
    let mut evaluator = Joints3dEvaluator::new(skeleton);
    assert_eq!(lenient.evaluate_clip(clip, &mut evaluator).unwrap(), 0);
    assert!(evaluator.is_empty());
}
