//! Command line handling shared by the capture binaries.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::capture::{run_body_capture, run_rgbd_capture, CaptureOptions, CaptureSummary};
use crate::device::{V4l2Config, V4l2Sensor};
use crate::output::SessionDir;
use crate::synthetic::{SyntheticConfig, SyntheticSensor};
use crate::traits::{CameraError, Sensor};

/// Exit code for any failure before capture starts.
pub const EXIT_INIT_FAILURE: i32 = -1;

/// Exit code for a failure while writing frames.
pub const EXIT_CAPTURE_FAILURE: i32 = 1;

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Kernel V4L2 nodes of the depth camera.
    V4l2,
    /// Generated test patterns, no hardware needed.
    Synthetic,
}

/// A positional argument: `fps:<n>` sets the rate, anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateToken {
    /// Requested frames per second.
    Fps(NonZeroU32),
    /// Unrecognized token.
    Ignored(String),
}

/// Parse one positional token.
pub fn parse_rate_token(token: &str) -> Result<RateToken, String> {
    match token.strip_prefix("fps:") {
        Some(value) => value
            .parse::<NonZeroU32>()
            .map(RateToken::Fps)
            .map_err(|err| format!("invalid frame rate `{value}`: {err}")),
        None => Ok(RateToken::Ignored(token.to_owned())),
    }
}

/// Arguments of both capture binaries.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Capture rate as `fps:<n>`; the last one wins.
    #[arg(value_name = "fps:N", value_parser = parse_rate_token)]
    pub rate: Vec<RateToken>,

    /// Frame source.
    #[arg(long, value_enum, default_value_t = SourceKind::V4l2)]
    pub source: SourceKind,

    /// V4L2 node of the color camera.
    #[arg(long, default_value = "/dev/video0")]
    pub color_device: PathBuf,

    /// V4L2 node of the depth camera.
    #[arg(long, default_value = "/dev/video1")]
    pub depth_device: PathBuf,

    /// V4L2 node of the infrared camera.
    #[arg(long, default_value = "/dev/video2")]
    pub infrared_device: PathBuf,

    /// Directory in which the timestamped session directory is created.
    #[arg(long, default_value = ".")]
    pub output_root: PathBuf,

    /// Write one of every N complete acquisitions.
    #[arg(long, default_value_t = NonZeroU32::MIN)]
    pub every_frame: NonZeroU32,

    /// Stop after writing this many frames.
    #[arg(long)]
    pub max_frames: Option<u32>,
}

impl Args {
    /// Requested rate, if any `fps:` token was given.
    #[must_use]
    pub fn fps(&self) -> Option<NonZeroU32> {
        self.rate.iter().rev().find_map(|token| match token {
            RateToken::Fps(fps) => Some(*fps),
            RateToken::Ignored(_) => None,
        })
    }

    /// Capture options on top of the variant's defaults.
    #[must_use]
    pub fn options(&self, defaults: CaptureOptions) -> CaptureOptions {
        defaults
            .with_fps(self.fps().unwrap_or(defaults.fps))
            .with_every_frame(self.every_frame)
            .with_max_frames(self.max_frames)
    }

    /// V4L2 node configuration; depth and infrared only when `with_depth`.
    #[must_use]
    pub fn v4l2_config(&self, with_depth: bool) -> V4l2Config {
        V4l2Config {
            color: self.color_device.clone(),
            depth: with_depth.then(|| self.depth_device.clone()),
            infrared: with_depth.then(|| self.infrared_device.clone()),
            ..V4l2Config::default()
        }
    }
}

/// Initialize `env_logger` with `info` as the default level.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Install a Ctrl-C handler that raises the returned flag.
#[must_use]
pub fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    }) {
        log::warn!("failed to install Ctrl-C handler: {err}");
    }
    stop
}

/// Failure of a capture run, split by when it happened.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Sensor, reader, mapper or output directory setup failed.
    #[error("initialization failed: {0}")]
    Init(CameraError),
    /// Writing frames failed.
    #[error("capture failed: {0}")]
    Capture(CameraError),
}

impl RunError {
    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Init(_) => EXIT_INIT_FAILURE,
            Self::Capture(_) => EXIT_CAPTURE_FAILURE,
        }
    }
}

/// Color, depth and infrared capture on the selected source.
pub fn run_rgbd(args: &Args, stop: &AtomicBool) -> Result<CaptureSummary, RunError> {
    let options = args.options(CaptureOptions::rgbd());
    match args.source {
        SourceKind::Synthetic => {
            rgbd_with_sensor(&SyntheticSensor::new(SyntheticConfig::default()), args, &options, stop)
        }
        SourceKind::V4l2 => {
            let sensor = V4l2Sensor::open(&args.v4l2_config(true)).map_err(RunError::Init)?;
            rgbd_with_sensor(&sensor, args, &options, stop)
        }
    }
}

/// Color and body capture on the selected source.
pub fn run_body(args: &Args, stop: &AtomicBool) -> Result<CaptureSummary, RunError> {
    let options = args.options(CaptureOptions::body());
    match args.source {
        SourceKind::Synthetic => {
            body_with_sensor(&SyntheticSensor::new(SyntheticConfig::default()), args, &options, stop)
        }
        SourceKind::V4l2 => {
            let sensor = V4l2Sensor::open(&args.v4l2_config(false)).map_err(RunError::Init)?;
            body_with_sensor(&sensor, args, &options, stop)
        }
    }
}

/// Open the color, depth and infrared readers of `sensor` and capture.
pub fn rgbd_with_sensor<S: Sensor>(
    sensor: &S,
    args: &Args,
    options: &CaptureOptions,
    stop: &AtomicBool,
) -> Result<CaptureSummary, RunError> {
    log::info!("sensor: {}", sensor.description());
    let mut color = sensor.open_color_reader().map_err(RunError::Init)?;
    let mut depth = sensor.open_depth_reader().map_err(RunError::Init)?;
    let mut infrared = sensor.open_infrared_reader().map_err(RunError::Init)?;
    let session = SessionDir::create(&args.output_root, &chrono::Local::now()).map_err(RunError::Init)?;

    log::info!("capturing at {} fps, press Ctrl-C to stop", options.fps);
    run_rgbd_capture(&mut color, &mut depth, &mut infrared, &session, options, stop)
        .map_err(RunError::Capture)
}

/// Open the body and color readers and the mapper of `sensor` and capture.
pub fn body_with_sensor<S: Sensor>(
    sensor: &S,
    args: &Args,
    options: &CaptureOptions,
    stop: &AtomicBool,
) -> Result<CaptureSummary, RunError> {
    log::info!("sensor: {}", sensor.description());
    let mapper = sensor.coordinate_mapper().map_err(RunError::Init)?;
    let mut body = sensor.open_body_reader().map_err(RunError::Init)?;
    let mut color = sensor.open_color_reader().map_err(RunError::Init)?;
    let session = SessionDir::create(&args.output_root, &chrono::Local::now()).map_err(RunError::Init)?;

    log::info!("capturing at {} fps, press Ctrl-C to stop", options.fps);
    run_body_capture(&mut color, &mut body, &mapper, &session, options, stop)
        .map_err(RunError::Capture)
}

/// Log the outcome of a run and turn it into a process exit code.
#[must_use]
pub fn report(result: &Result<CaptureSummary, RunError>) -> i32 {
    match result {
        Ok(summary) => {
            log::info!(
                "{} frames written, {} of {} polls skipped",
                summary.frames_written,
                summary.skipped,
                summary.polls
            );
            if let Some(fps) = summary.average_fps() {
                log::info!("Average {fps:.1} fps");
            }
            0
        }
        Err(err) => {
            log::error!("{err}");
            err.exit_code()
        }
    }
}
