//! End-to-end capture runs against the synthetic sensor.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Parser;
use rgbd_capture::capture::CaptureOptions;
use rgbd_capture::cli::{body_with_sensor, rgbd_with_sensor, Args, RunError};
use rgbd_capture::frame::FrameDescription;
use rgbd_capture::synthetic::{SyntheticConfig, SyntheticSensor};
use rgbd_capture::traits::{CameraError, StreamKind};
use rgbd_capture::validation::{validate_session, SessionLayout};

const COLOR: (u32, u32) = (64, 48);
const DEPTH: (u32, u32) = (32, 24);

fn sensor(config: SyntheticConfig) -> SyntheticSensor {
    SyntheticSensor::new(
        config
            .with_resolution(COLOR, DEPTH)
            .with_frame_interval(None),
    )
}

fn args(root: &Path, extra: &[&str]) -> Args {
    let root = root.to_str().expect("utf-8 tempdir");
    let argv = ["rgbd-capture", "--source", "synthetic", "--output-root", root];
    Args::try_parse_from(argv.iter().chain(extra)).expect("arguments should parse")
}

/// The single session directory created under `root`.
fn session_dir(root: &Path) -> PathBuf {
    let entries: Vec<PathBuf> = fs::read_dir(root)
        .expect("read root")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(entries.len(), 1, "expected one session directory: {entries:?}");
    entries.into_iter().next().expect("session directory")
}

fn rgbd_layout() -> SessionLayout {
    SessionLayout::rgbd(
        FrameDescription::new(COLOR.0, COLOR.1, 4),
        FrameDescription::new(DEPTH.0, DEPTH.1, 2),
    )
}

#[test]
fn test_rgbd_session_files() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:50", "--max-frames", "4"]);
    let stop = AtomicBool::new(false);

    let summary = rgbd_with_sensor(
        &sensor(SyntheticConfig::default()),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    )
    .expect("capture");
    assert_eq!(summary.frames_written, 4);
    assert_eq!(summary.skipped, 0);

    let dir = session_dir(root.path());
    let name = dir.file_name().and_then(|n| n.to_str()).expect("dir name");
    assert_eq!(name.len(), 15, "YYYYMMDD_hhmmss expected, got {name}");
    assert_eq!(name.as_bytes()[8], b'_');
    assert!(name.chars().filter(char::is_ascii_digit).count() == 14);

    assert_eq!(validate_session(&dir, &rgbd_layout()).expect("valid session"), 4);
    assert!(dir.join("color_01.raw").is_file());
    assert!(dir.join("infra_04.raw").is_file());
    assert!(!dir.join("depth_05.raw").exists());
}

#[test]
fn test_rgbd_pacing_respects_rate() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:20", "--max-frames", "3"]);
    let stop = AtomicBool::new(false);

    let summary = rgbd_with_sensor(
        &sensor(SyntheticConfig::default()),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    )
    .expect("capture");

    // Two full periods separate the first and the third write.
    assert_eq!(summary.frames_written, 3);
    assert!(
        summary.elapsed >= Duration::from_millis(100),
        "capture too fast: {:?}",
        summary.elapsed
    );
    let fps = summary.average_fps().expect("average rate");
    assert!(fps <= 31.0, "average {fps} fps above the requested rate");
}

#[test]
fn test_rgbd_dropped_depth_frames_keep_numbering() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:100", "--max-frames", "5"]);
    let stop = AtomicBool::new(false);

    let summary = rgbd_with_sensor(
        &sensor(SyntheticConfig::default().with_drops(StreamKind::Depth, 2)),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    )
    .expect("capture");

    assert_eq!(summary.frames_written, 5);
    assert!(summary.skipped > 0);
    let dir = session_dir(root.path());
    assert_eq!(validate_session(&dir, &rgbd_layout()).expect("valid session"), 5);
}

#[test]
fn test_rgbd_every_frame() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:100", "--max-frames", "2", "--every-frame", "3"]);
    let stop = AtomicBool::new(false);

    let summary = rgbd_with_sensor(
        &sensor(SyntheticConfig::default()),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    )
    .expect("capture");

    assert_eq!(summary.frames_written, 2);
    assert_eq!(summary.polls, 6);
    let dir = session_dir(root.path());
    assert_eq!(validate_session(&dir, &rgbd_layout()).expect("valid session"), 2);
}

#[test]
fn test_reader_failure_is_init_failure() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["--max-frames", "1"]);
    let stop = AtomicBool::new(false);

    let result = rgbd_with_sensor(
        &sensor(SyntheticConfig::default().with_failing_reader(StreamKind::Infrared)),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    );

    let err = result.expect_err("reader open failure");
    assert_eq!(err.exit_code(), -1);
    assert!(
        matches!(
            err,
            RunError::Init(CameraError::ReaderOpenFailed {
                stream: StreamKind::Infrared,
                ..
            })
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(fs::read_dir(root.path()).expect("read root").count(), 0);
}

#[test]
fn test_stop_before_start_writes_nothing() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &[]);
    let stop = AtomicBool::new(true);

    let summary = rgbd_with_sensor(
        &sensor(SyntheticConfig::default()),
        &args,
        &args.options(CaptureOptions::rgbd()),
        &stop,
    )
    .expect("capture");

    assert_eq!(summary.frames_written, 0);
    assert_eq!(summary.average_fps(), None);
    let dir = session_dir(root.path());
    assert_eq!(fs::read_dir(dir).expect("read session").count(), 0);
}

#[test]
fn test_body_session_files() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:100", "--max-frames", "2"]);
    let stop = AtomicBool::new(false);

    let summary = body_with_sensor(
        &sensor(SyntheticConfig::default().with_tracked_bodies(2)),
        &args,
        &args.options(CaptureOptions::body()),
        &stop,
    )
    .expect("capture");
    assert_eq!(summary.frames_written, 2);

    let dir = session_dir(root.path());
    let layout = SessionLayout::body(FrameDescription::new(COLOR.0, COLOR.1, 4));
    assert_eq!(validate_session(&dir, &layout).expect("valid session"), 2);

    let jpeg = image::open(dir.join("body_01.jpg")).expect("decode body jpeg");
    assert_eq!((jpeg.width(), jpeg.height()), COLOR);
    assert!(!dir.join("depth_01.raw").exists());
}

#[test]
fn test_body_without_tracked_bodies_still_writes() {
    let root = tempfile::tempdir().expect("tempdir");
    let args = args(root.path(), &["fps:100", "--max-frames", "1"]);
    let stop = AtomicBool::new(false);

    let summary = body_with_sensor(
        &sensor(SyntheticConfig::default().with_tracked_bodies(0)),
        &args,
        &args.options(CaptureOptions::body()),
        &stop,
    )
    .expect("capture");

    assert_eq!(summary.frames_written, 1);
    let dir = session_dir(root.path());
    assert!(dir.join("body_01.jpg").is_file());
    assert!(dir.join("color_01.raw").is_file());
}
