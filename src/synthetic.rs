//! Synthetic sensor for dry runs and testing without hardware.
//!
//! Produces YUY2 test patterns on the color stream, a depth ramp, an
//! infrared gradient and a set of standing skeletons whose arms sway from
//! frame to frame. Each stream can be slowed to a native frame interval or
//! made to drop every k-th poll, which exercises the loop's skip path.

use std::time::{Duration, Instant};

use crate::body::{Body, CameraSpacePoint, PinholeMapper, BODY_COUNT, JOINT_COUNT};
use crate::frame::{
    BodyFrame, ColorFrame, ColorImageFormat, DepthFrame, FrameDescription, InfraredFrame,
};
use crate::traits::{CameraError, FrameReader, Result, Sensor, StreamKind};

/// Native frame interval of the reference sensor (30 Hz).
pub const NATIVE_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Test pattern types for synthetic color frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Configuration of a synthetic sensor.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Color frame size (BGRA output).
    pub color: FrameDescription,
    /// Depth and infrared frame size.
    pub depth: FrameDescription,
    /// Minimum time between two frames of one stream; `None` delivers on every poll.
    pub frame_interval: Option<Duration>,
    /// Color test pattern.
    pub pattern: TestPattern,
    /// Number of tracked bodies, capped at `BODY_COUNT`.
    pub tracked_bodies: usize,
    /// Per-stream drop period: every k-th poll of that stream fails.
    pub drops: Vec<(StreamKind, u32)>,
    /// Stream whose reader fails to open.
    pub failing_reader: Option<StreamKind>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            color: FrameDescription::new(1920, 1080, 4),
            depth: FrameDescription::new(512, 424, 2),
            frame_interval: Some(NATIVE_FRAME_INTERVAL),
            pattern: TestPattern::ColorBars,
            tracked_bodies: 1,
            drops: Vec::new(),
            failing_reader: None,
        }
    }
}

impl SyntheticConfig {
    /// Set the color and depth frame sizes.
    #[must_use]
    pub fn with_resolution(mut self, color: (u32, u32), depth: (u32, u32)) -> Self {
        self.color = FrameDescription::new(color.0, color.1, 4);
        self.depth = FrameDescription::new(depth.0, depth.1, 2);
        self
    }

    /// Set the native frame interval.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the color test pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the number of tracked bodies.
    #[must_use]
    pub fn with_tracked_bodies(mut self, count: usize) -> Self {
        self.tracked_bodies = count;
        self
    }

    /// Make every `period`-th poll of `stream` report no new frame.
    #[must_use]
    pub fn with_drops(mut self, stream: StreamKind, period: u32) -> Self {
        self.drops.push((stream, period));
        self
    }

    /// Make opening the reader of `stream` fail.
    #[must_use]
    pub fn with_failing_reader(mut self, stream: StreamKind) -> Self {
        self.failing_reader = Some(stream);
        self
    }

    fn drop_period(&self, stream: StreamKind) -> Option<u32> {
        self.drops
            .iter()
            .find(|(kind, _)| *kind == stream)
            .map(|(_, period)| *period)
            .filter(|period| *period > 0)
    }
}

/// Synthetic sensor.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSensor {
    config: SyntheticConfig,
}

impl SyntheticSensor {
    /// Create a synthetic sensor with the given configuration.
    #[must_use]
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    fn cadence(&self, stream: StreamKind) -> Result<Cadence> {
        if self.config.failing_reader == Some(stream) {
            return Err(CameraError::ReaderOpenFailed {
                stream,
                reason: "synthetic failure".to_owned(),
            });
        }
        Ok(Cadence {
            interval: self.config.frame_interval,
            drop_every: self.config.drop_period(stream),
            polls: 0,
            last_frame: None,
            sequence: 0,
        })
    }
}

impl Sensor for SyntheticSensor {
    type ColorReader<'a> = SyntheticColorReader<'a>;
    type DepthReader<'a> = SyntheticDepthReader<'a>;
    type InfraredReader<'a> = SyntheticInfraredReader<'a>;
    type BodyReader<'a> = SyntheticBodyReader<'a>;
    type Mapper = PinholeMapper;

    fn description(&self) -> String {
        format!(
            "synthetic sensor ({}x{} color, {}x{} depth)",
            self.config.color.width,
            self.config.color.height,
            self.config.depth.width,
            self.config.depth.height
        )
    }

    fn open_color_reader(&self) -> Result<Self::ColorReader<'_>> {
        Ok(SyntheticColorReader {
            config: &self.config,
            cadence: self.cadence(StreamKind::Color)?,
        })
    }

    fn open_depth_reader(&self) -> Result<Self::DepthReader<'_>> {
        Ok(SyntheticDepthReader {
            config: &self.config,
            cadence: self.cadence(StreamKind::Depth)?,
        })
    }

    fn open_infrared_reader(&self) -> Result<Self::InfraredReader<'_>> {
        Ok(SyntheticInfraredReader {
            config: &self.config,
            cadence: self.cadence(StreamKind::Infrared)?,
        })
    }

    fn open_body_reader(&self) -> Result<Self::BodyReader<'_>> {
        Ok(SyntheticBodyReader {
            config: &self.config,
            cadence: self.cadence(StreamKind::Body)?,
        })
    }

    fn coordinate_mapper(&self) -> Result<Self::Mapper> {
        Ok(PinholeMapper::for_resolution(
            self.config.color.width,
            self.config.color.height,
        ))
    }
}

/// Decides whether a poll yields a frame.
#[derive(Debug)]
struct Cadence {
    interval: Option<Duration>,
    drop_every: Option<u32>,
    polls: u32,
    last_frame: Option<Instant>,
    sequence: u32,
}

impl Cadence {
    /// Returns the sequence number of the delivered frame.
    fn poll(&mut self) -> Result<u32> {
        self.polls = self.polls.wrapping_add(1);
        if self.drop_every.is_some_and(|period| self.polls % period == 0) {
            return Err(CameraError::FrameNotReady);
        }
        let now = Instant::now();
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            if now.duration_since(last) < interval {
                return Err(CameraError::FrameNotReady);
            }
        }
        self.last_frame = Some(now);
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(sequence)
    }
}

/// Synthetic color reader.
#[derive(Debug)]
pub struct SyntheticColorReader<'a> {
    config: &'a SyntheticConfig,
    cadence: Cadence,
}

impl FrameReader for SyntheticColorReader<'_> {
    type Frame = ColorFrame;

    fn acquire_latest_frame(&mut self) -> Result<ColorFrame> {
        let sequence = self.cadence.poll()?;
        let description = self.config.color;
        Ok(ColorFrame {
            description,
            format: ColorImageFormat::Yuy2,
            data: generate_test_frame(description.width, description.height, self.config.pattern),
            sequence,
        })
    }
}

/// Synthetic depth reader.
#[derive(Debug)]
pub struct SyntheticDepthReader<'a> {
    config: &'a SyntheticConfig,
    cadence: Cadence,
}

impl FrameReader for SyntheticDepthReader<'_> {
    type Frame = DepthFrame;

    fn acquire_latest_frame(&mut self) -> Result<DepthFrame> {
        let sequence = self.cadence.poll()?;
        let description = self.config.depth;
        Ok(DepthFrame {
            description,
            data: generate_depth_ramp(description.width, description.height, sequence),
            sequence,
        })
    }
}

/// Synthetic infrared reader.
#[derive(Debug)]
pub struct SyntheticInfraredReader<'a> {
    config: &'a SyntheticConfig,
    cadence: Cadence,
}

impl FrameReader for SyntheticInfraredReader<'_> {
    type Frame = InfraredFrame;

    fn acquire_latest_frame(&mut self) -> Result<InfraredFrame> {
        let sequence = self.cadence.poll()?;
        let description = self.config.depth;
        Ok(InfraredFrame {
            description,
            data: generate_infrared_gradient(description.width, description.height),
            sequence,
        })
    }
}

/// Synthetic body reader.
#[derive(Debug)]
pub struct SyntheticBodyReader<'a> {
    config: &'a SyntheticConfig,
    cadence: Cadence,
}

impl FrameReader for SyntheticBodyReader<'_> {
    type Frame = BodyFrame;

    fn acquire_latest_frame(&mut self) -> Result<BodyFrame> {
        let sequence = self.cadence.poll()?;
        let count = self.config.tracked_bodies.min(BODY_COUNT);
        let mut frame = BodyFrame {
            sequence,
            ..BodyFrame::default()
        };
        for (slot, body) in frame.bodies.iter_mut().take(count).enumerate() {
            *body = Some(standing_body(slot, count, sequence));
        }
        Ok(frame)
    }
}

/// Joint offsets (x, y) in metres of a standing person, in `JointType::ALL` order.
const SKELETON: [(f32, f32); JOINT_COUNT] = [
    (0.0, -0.20),   // SpineBase
    (0.0, 0.10),    // SpineMid
    (0.0, 0.42),    // Neck
    (0.0, 0.55),    // Head
    (-0.18, 0.35),  // ShoulderLeft
    (-0.30, 0.10),  // ElbowLeft
    (-0.35, -0.12), // WristLeft
    (-0.36, -0.18), // HandLeft
    (0.18, 0.35),   // ShoulderRight
    (0.30, 0.10),   // ElbowRight
    (0.35, -0.12),  // WristRight
    (0.36, -0.18),  // HandRight
    (-0.10, -0.22), // HipLeft
    (-0.11, -0.62), // KneeLeft
    (-0.12, -1.00), // AnkleLeft
    (-0.12, -1.06), // FootLeft
    (0.10, -0.22),  // HipRight
    (0.11, -0.62),  // KneeRight
    (0.12, -1.00),  // AnkleRight
    (0.12, -1.06),  // FootRight
    (0.0, 0.35),    // SpineShoulder
    (-0.37, -0.26), // HandTipLeft
    (-0.32, -0.20), // ThumbLeft
    (0.37, -0.26),  // HandTipRight
    (0.32, -0.20),  // ThumbRight
];

/// Indices of the joints below the elbows, which sway.
const SWAYING_JOINTS: [usize; 10] = [5, 6, 7, 9, 10, 11, 21, 22, 23, 24];

/// Distance of the synthetic people from the sensor, in metres.
const BODY_DISTANCE: f32 = 2.5;

fn standing_body(slot: usize, count: usize, sequence: u32) -> Body {
    #[allow(clippy::cast_precision_loss)]
    let center_x = (slot as f32 - (count.saturating_sub(1)) as f32 / 2.0) * 0.8;
    #[allow(clippy::cast_precision_loss)]
    let sway = (sequence as f32 * 0.2).sin() * 0.1;

    let mut index = 0;
    let positions = SKELETON.map(|(x, y)| {
        let lift = if SWAYING_JOINTS.contains(&index) { sway } else { 0.0 };
        index += 1;
        CameraSpacePoint::new(center_x + x, y + lift, BODY_DISTANCE)
    });
    Body::from_positions(true, positions)
}

/// Generate YUY2 test frame data based on pattern.
fn generate_test_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let size = width as usize * height as usize * 2;
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => generate_color_bars(&mut data, width),
        TestPattern::Gradient => generate_gradient(&mut data, width),
        TestPattern::Solid(y, u, v) => fill_pairs(&mut data, |_| (y, u, v)),
    }

    data
}

/// Fill every YUYV pixel pair; `pick` receives the x coordinate of the pair.
fn fill_pairs<F: Fn(usize) -> (u8, u8, u8)>(data: &mut [u8], pick: F) {
    for (pair, group) in data.chunks_exact_mut(4).enumerate() {
        let (y, u, v) = pick(pair);
        group.copy_from_slice(&[y, u, y, v]);
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32) {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];

    let width = width as usize;
    let pairs_per_row = (width / 2).max(1);
    let bar_width = (width / 8).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        BARS.get((x / bar_width).min(7)).copied().unwrap_or((16, 128, 128))
    });
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32) {
    let width = width as usize;
    let pairs_per_row = (width / 2).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        #[allow(clippy::cast_possible_truncation)]
        let y = ((x * 255) / width.max(1)) as u8;
        (y, 128, 128)
    });
}

/// Depth ramp from 500 mm at the left edge to 4500 mm at the right edge.
fn generate_depth_ramp(width: u32, height: u32, sequence: u32) -> Vec<u16> {
    let width = width as usize;
    let shift = sequence % 100;
    (0..width * height as usize)
        .map(|i| {
            let x = i % width;
            #[allow(clippy::cast_possible_truncation)]
            let depth = 500 + (x * 4000 / width.max(1)) as u32 + shift;
            u16::try_from(depth).unwrap_or(u16::MAX)
        })
        .collect()
}

/// Vertical infrared gradient, dark at the top.
fn generate_infrared_gradient(width: u32, height: u32) -> Vec<u16> {
    let width = width as usize;
    let height = height as usize;
    (0..width * height)
        .map(|i| {
            let y = i / width.max(1);
            u16::try_from(y * usize::from(u16::MAX) / height.max(1)).unwrap_or(u16::MAX)
        })
        .collect()
}
