//! RGBD-Capture: frame capture for depth cameras
//!
//! This library records color, depth, infrared and body tracking frames
//! from a depth camera into a timestamped session directory. Cameras sit
//! behind the [`Sensor`] trait, with a V4L2 backend for real hardware and a
//! synthetic backend for testing without one.

pub mod body;
pub mod capture;
pub mod cli;
pub mod convert;
pub mod device;
pub mod frame;
pub mod output;
pub mod pacing;
pub mod skeleton;
pub mod synthetic;
pub mod traits;
pub mod validation;

pub use capture::{run_body_capture, run_rgbd_capture, CaptureOptions, CaptureSummary};
pub use device::{V4l2Config, V4l2Sensor};
pub use frame::{BodyFrame, ColorFrame, DepthFrame, FrameDescription, InfraredFrame};
pub use output::{FileKind, SessionDir};
pub use synthetic::{SyntheticConfig, SyntheticSensor};
pub use traits::{CameraError, CoordinateMapper, FourCC, FrameReader, Sensor, StreamKind};
