//! V4L2-backed sensor using the v4l crate.
//!
//! Each modality of the depth camera is exposed by the kernel driver as its
//! own video node: a YUYV color node and 16-bit greyscale depth and infrared
//! nodes. Body tracking is not available through V4L2.

use std::io::{self, ErrorKind};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use v4l::buffer::Type;
use v4l::device::Handle;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::body::PinholeMapper;
use crate::frame::{ColorFrame, ColorImageFormat, DepthFrame, FrameDescription, InfraredFrame};
use crate::traits::{CameraError, FourCC, FrameReader, Result, Sensor, StreamKind, Unavailable};

/// Longest wait for a buffer the driver has not delivered yet.
///
/// Only the first frame of a stream is waited for; later acquisitions dequeue
/// buffers the driver already reported as done.
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Video format negotiated with a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a format for a packed 2-bytes-per-pixel layout (YUYV, Y16).
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width * 2;
        Self {
            width,
            height,
            fourcc,
            stride,
            size: stride * height,
        }
    }
}

impl From<v4l::Format> for Format {
    fn from(fmt: v4l::Format) -> Self {
        Self {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        }
    }
}

/// Device capability flags of a node.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Node paths and requested formats.
#[derive(Debug, Clone)]
pub struct V4l2Config {
    /// Color node.
    pub color: PathBuf,
    /// Depth node, if depth is captured.
    pub depth: Option<PathBuf>,
    /// Infrared node, if infrared is captured.
    pub infrared: Option<PathBuf>,
    /// Requested color size.
    pub color_size: (u32, u32),
    /// Requested depth and infrared size.
    pub depth_size: (u32, u32),
    /// Number of mmap buffers per stream.
    pub buffer_count: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            color: PathBuf::from("/dev/video0"),
            depth: Some(PathBuf::from("/dev/video1")),
            infrared: Some(PathBuf::from("/dev/video2")),
            color_size: (1920, 1080),
            depth_size: (512, 424),
            buffer_count: 4,
        }
    }
}

/// One opened video node.
struct Node {
    path: PathBuf,
    device: Device,
    capabilities: DeviceCapabilities,
    format: Format,
}

impl Node {
    fn open(path: &Path, requested: &Format) -> Result<Self> {
        let device = Device::with_path(path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                CameraError::DeviceNotFound(path.display().to_string())
            } else {
                CameraError::DeviceOpenFailed(format!("{}: {err}", path.display()))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        if !capabilities.can_capture || !capabilities.can_stream {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{} cannot stream video capture",
                path.display()
            )));
        }

        let mut fmt = device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;
        fmt.width = requested.width;
        fmt.height = requested.height;
        fmt.fourcc = requested.fourcc.into();

        let format = Format::from(
            device
                .set_format(&fmt)
                .map_err(|err| CameraError::StreamError(err.to_string()))?,
        );
        if format.fourcc != requested.fourcc {
            return Err(CameraError::FormatNotSupported(requested.fourcc));
        }
        if format.width != requested.width || format.height != requested.height {
            log::warn!(
                "{}: driver chose {}x{} instead of {}x{}",
                path.display(),
                format.width,
                format.height,
                requested.width,
                requested.height
            );
        }

        log::info!(
            "{}: {} ({}) {}x{} {}",
            path.display(),
            capabilities.card,
            capabilities.driver,
            format.width,
            format.height,
            format.fourcc
        );

        Ok(Self {
            path: path.to_path_buf(),
            device,
            capabilities,
            format,
        })
    }
}

/// Depth camera exposed as separate V4L2 nodes per modality.
pub struct V4l2Sensor {
    color: Node,
    depth: Option<Node>,
    infrared: Option<Node>,
    buffer_count: u32,
}

impl V4l2Sensor {
    /// Open every node named in `config`.
    pub fn open(config: &V4l2Config) -> Result<Self> {
        let (color_w, color_h) = config.color_size;
        let (depth_w, depth_h) = config.depth_size;
        let depth_format = Format::new(depth_w, depth_h, FourCC::Y16);

        let color = Node::open(&config.color, &Format::new(color_w, color_h, FourCC::YUYV))?;
        let depth = config
            .depth
            .as_deref()
            .map(|path| Node::open(path, &depth_format))
            .transpose()?;
        let infrared = config
            .infrared
            .as_deref()
            .map(|path| Node::open(path, &depth_format))
            .transpose()?;

        Ok(Self {
            color,
            depth,
            infrared,
            buffer_count: config.buffer_count,
        })
    }

    /// Capabilities of the color node.
    #[must_use]
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.color.capabilities
    }

    fn reader<'a, F>(
        &'a self,
        node: Option<&'a Node>,
        stream: StreamKind,
    ) -> Result<V4l2Reader<'a, F>> {
        let node = node.ok_or_else(|| CameraError::ReaderOpenFailed {
            stream,
            reason: "no device node configured".to_owned(),
        })?;
        let open_failed = |err: &dyn std::fmt::Display| CameraError::ReaderOpenFailed {
            stream,
            reason: format!("{}: {err}", node.path.display()),
        };

        let mut handle = Stream::with_buffers(&node.device, Type::VideoCapture, self.buffer_count)
            .map_err(|err| open_failed(&err))?;
        handle.set_timeout(DEQUEUE_TIMEOUT);
        let mut reader = V4l2Reader {
            poll_handle: handle.handle(),
            stream: handle,
            format: node.format.clone(),
            pending: None,
            _frame: PhantomData,
        };

        // Start streaming; the first frame is kept for the first acquisition.
        let first = reader.dequeue_newest().map_err(|err| open_failed(&err))?;
        reader.pending = Some(first);
        Ok(reader)
    }
}

impl Sensor for V4l2Sensor {
    type ColorReader<'a> = V4l2Reader<'a, ColorFrame>;
    type DepthReader<'a> = V4l2Reader<'a, DepthFrame>;
    type InfraredReader<'a> = V4l2Reader<'a, InfraredFrame>;
    type BodyReader<'a> = Unavailable;
    type Mapper = PinholeMapper;

    fn description(&self) -> String {
        format!(
            "{} ({}, {})",
            self.color.capabilities.card,
            self.color.capabilities.driver,
            self.color.capabilities.bus_info
        )
    }

    fn open_color_reader(&self) -> Result<Self::ColorReader<'_>> {
        self.reader(Some(&self.color), StreamKind::Color)
    }

    fn open_depth_reader(&self) -> Result<Self::DepthReader<'_>> {
        self.reader(self.depth.as_ref(), StreamKind::Depth)
    }

    fn open_infrared_reader(&self) -> Result<Self::InfraredReader<'_>> {
        self.reader(self.infrared.as_ref(), StreamKind::Infrared)
    }

    fn open_body_reader(&self) -> Result<Self::BodyReader<'_>> {
        Err(CameraError::Unsupported("body tracking"))
    }

    fn coordinate_mapper(&self) -> Result<Self::Mapper> {
        Err(CameraError::Unsupported("coordinate mapping"))
    }
}

/// V4L2 capture stream producing frames of type `F`.
///
/// Acquisition never blocks on the driver: a poll without a finished buffer
/// reports `FrameNotReady`, and when several buffers finished since the last
/// poll all but the newest are recycled.
pub struct V4l2Reader<'a, F> {
    stream: Stream<'a>,
    poll_handle: Arc<Handle>,
    format: Format,
    pending: Option<(Vec<u8>, u32)>,
    _frame: PhantomData<F>,
}

impl<F> V4l2Reader<'_, F> {
    /// Whether the driver holds a finished buffer.
    fn frame_ready(&self) -> Result<bool> {
        buffer_ready(&self.poll_handle)
    }

    /// Newest finished buffer, or `FrameNotReady`.
    fn next_buffer(&mut self) -> Result<(Vec<u8>, u32)> {
        if !self.frame_ready()? {
            return self.pending.take().ok_or(CameraError::FrameNotReady);
        }
        self.pending = None;
        self.dequeue_newest()
    }

    /// Dequeue buffers until none is left finished and copy out the last one.
    fn dequeue_newest(&mut self) -> Result<(Vec<u8>, u32)> {
        let expected = self.format.size as usize;
        loop {
            let (buf, meta) = self.stream.next().map_err(stream_error)?;
            if buffer_ready(&self.poll_handle)? {
                continue;
            }
            let data = buf.get(..expected).ok_or_else(|| {
                CameraError::StreamError(format!("short frame: {} of {expected} bytes", buf.len()))
            })?;
            return Ok((data.to_vec(), meta.sequence));
        }
    }

    fn description(&self, bytes_per_pixel: u32) -> FrameDescription {
        FrameDescription::new(self.format.width, self.format.height, bytes_per_pixel)
    }
}

impl FrameReader for V4l2Reader<'_, ColorFrame> {
    type Frame = ColorFrame;

    fn acquire_latest_frame(&mut self) -> Result<ColorFrame> {
        let (data, sequence) = self.next_buffer()?;
        Ok(ColorFrame {
            description: self.description(4),
            format: ColorImageFormat::Yuy2,
            data: packed_rows(&data, self.format.width as usize * 2, self.format.stride),
            sequence,
        })
    }
}

impl FrameReader for V4l2Reader<'_, DepthFrame> {
    type Frame = DepthFrame;

    fn acquire_latest_frame(&mut self) -> Result<DepthFrame> {
        let (data, sequence) = self.next_buffer()?;
        Ok(DepthFrame {
            description: self.description(2),
            data: y16_samples(&data, self.format.width, self.format.stride),
            sequence,
        })
    }
}

impl FrameReader for V4l2Reader<'_, InfraredFrame> {
    type Frame = InfraredFrame;

    fn acquire_latest_frame(&mut self) -> Result<InfraredFrame> {
        let (data, sequence) = self.next_buffer()?;
        Ok(InfraredFrame {
            description: self.description(2),
            data: y16_samples(&data, self.format.width, self.format.stride),
            sequence,
        })
    }
}

fn buffer_ready(handle: &Handle) -> Result<bool> {
    handle
        .poll(libc::POLLIN, 0)
        .map(|ready| ready > 0)
        .map_err(stream_error)
}

fn stream_error(err: io::Error) -> CameraError {
    if err.kind() == ErrorKind::TimedOut {
        CameraError::Timeout
    } else {
        CameraError::StreamError(err.to_string())
    }
}

/// Copy `row_bytes` of every `stride`-long row, dropping the padding.
fn packed_rows(data: &[u8], row_bytes: usize, stride: u32) -> Vec<u8> {
    let stride = (stride as usize).max(row_bytes);
    if stride == row_bytes {
        return data.to_vec();
    }
    data.chunks(stride)
        .flat_map(|row| row.get(..row_bytes).unwrap_or(row))
        .copied()
        .collect()
}

/// Unpack little-endian 16-bit samples, dropping any row padding.
fn y16_samples(data: &[u8], width: u32, stride: u32) -> Vec<u16> {
    packed_rows(data, width as usize * 2, stride)
        .chunks_exact(2)
        .map(|pair| match *pair {
            [lo, hi] => u16::from_le_bytes([lo, hi]),
            _ => 0,
        })
        .collect()
}
