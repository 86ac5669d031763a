//! Core traits and error type for the sensor abstraction.

use crate::body::{CameraSpacePoint, ColorSpacePoint};
use crate::frame::{BodyFrame, ColorFrame, DepthFrame, InfraredFrame};

/// Pixel format representation of a V4L2 node (e.g., YUYV, Y16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed), the raw color format.
    pub const YUYV: Self = Self::new(b"YUYV");
    /// 16-bit greyscale, used for depth and infrared nodes.
    pub const Y16: Self = Self::new(b"Y16 ");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Sensor modality a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Color camera.
    Color,
    /// Depth camera.
    Depth,
    /// Infrared camera.
    Infrared,
    /// Body tracker.
    Body,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Color => "color",
            Self::Depth => "depth",
            Self::Infrared => "infrared",
            Self::Body => "body",
        };
        f.write_str(name)
    }
}

/// Error type for sensor and capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// No sensor was found at the given location.
    #[error("sensor not found: {0}")]
    DeviceNotFound(String),
    /// The sensor exists but could not be opened.
    #[error("failed to open sensor: {0}")]
    DeviceOpenFailed(String),
    /// A frame reader could not be opened.
    #[error("failed to open {stream} frame reader: {reason}")]
    ReaderOpenFailed {
        /// Modality of the reader.
        stream: StreamKind,
        /// Underlying cause.
        reason: String,
    },
    /// The sensor does not provide this capability.
    #[error("{0} is not supported by this sensor")]
    Unsupported(&'static str),
    /// The driver refused the requested pixel format.
    #[error("format not supported: {0}")]
    FormatNotSupported(FourCC),
    /// No new frame since the last acquisition.
    #[error("no new frame available")]
    FrameNotReady,
    /// Error during a streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JPEG encoding error.
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl CameraError {
    /// Whether the error is expected during normal polling.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::FrameNotReady | Self::Timeout)
    }
}

/// Result type for sensor operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Polls one frame source for its newest frame.
pub trait FrameReader {
    /// Frame type produced by this reader.
    type Frame;

    /// Acquire the newest frame.
    ///
    /// Returns `CameraError::FrameNotReady` when nothing new arrived since the
    /// previous call.
    fn acquire_latest_frame(&mut self) -> Result<Self::Frame>;
}

/// Maps points from the depth camera's 3D space into color image pixels.
pub trait CoordinateMapper {
    /// Project a camera-space point onto the color image plane.
    fn map_camera_point_to_color_space(&self, point: CameraSpacePoint) -> ColorSpacePoint;
}

/// An opened depth-sensing camera.
pub trait Sensor {
    /// Reader type for color frames.
    type ColorReader<'a>: FrameReader<Frame = ColorFrame>
    where
        Self: 'a;
    /// Reader type for depth frames.
    type DepthReader<'a>: FrameReader<Frame = DepthFrame>
    where
        Self: 'a;
    /// Reader type for infrared frames.
    type InfraredReader<'a>: FrameReader<Frame = InfraredFrame>
    where
        Self: 'a;
    /// Reader type for body frames.
    type BodyReader<'a>: FrameReader<Frame = BodyFrame>
    where
        Self: 'a;
    /// Coordinate mapper type.
    type Mapper: CoordinateMapper;

    /// Human-readable identity of the sensor.
    fn description(&self) -> String;

    /// Open a reader on the color source.
    fn open_color_reader(&self) -> Result<Self::ColorReader<'_>>;

    /// Open a reader on the depth source.
    fn open_depth_reader(&self) -> Result<Self::DepthReader<'_>>;

    /// Open a reader on the infrared source.
    fn open_infrared_reader(&self) -> Result<Self::InfraredReader<'_>>;

    /// Open a reader on the body tracking source.
    fn open_body_reader(&self) -> Result<Self::BodyReader<'_>>;

    /// Get the sensor's coordinate mapper.
    fn coordinate_mapper(&self) -> Result<Self::Mapper>;
}

/// Reader type for sources a sensor cannot provide. It has no values.
#[derive(Debug)]
pub enum Unavailable {}

impl FrameReader for Unavailable {
    type Frame = BodyFrame;

    fn acquire_latest_frame(&mut self) -> Result<BodyFrame> {
        match *self {}
    }
}
