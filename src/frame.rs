//! Frame types for each sensor modality.

use crate::body::{Body, BODY_COUNT};
use crate::convert::{yuv_to_rgb, yuy2_to_bgra};

/// Dimensions of a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescription {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel of the buffer this description belongs to.
    pub bytes_per_pixel: u32,
}

impl FrameDescription {
    /// Create a new frame description.
    #[must_use]
    pub const fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Number of pixels in one frame.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one frame in bytes.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.pixel_count() * self.bytes_per_pixel as usize
    }
}

/// Raw layout of color frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorImageFormat {
    /// 4 bytes per pixel, blue first.
    Bgra,
    /// YUYV 4:2:2, 2 bytes per pixel.
    Yuy2,
}

impl ColorImageFormat {
    /// Bytes per pixel of the raw layout.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Bgra => 4,
            Self::Yuy2 => 2,
        }
    }
}

/// A color frame in the sensor's raw format.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    /// Width and height; `bytes_per_pixel` refers to the BGRA output.
    pub description: FrameDescription,
    /// Layout of `data`.
    pub format: ColorImageFormat,
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Sequence number assigned by the source.
    pub sequence: u32,
}

impl ColorFrame {
    /// Copy the frame into a BGRA buffer, converting from the raw format if needed.
    #[must_use]
    pub fn copy_converted_to_bgra(&self) -> Vec<u8> {
        match self.format {
            ColorImageFormat::Bgra => self.data.clone(),
            ColorImageFormat::Yuy2 => yuy2_to_bgra(&self.data),
        }
    }

    /// Get RGB values for a pixel of a YUY2 frame.
    ///
    /// Returns `None` for out-of-range coordinates or non-YUY2 frames. For odd
    /// x coordinates the Y value of the second pixel of the pair is used.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        let FrameDescription { width, height, .. } = self.description;
        if self.format != ColorImageFormat::Yuy2 || x >= width || y >= height {
            return None;
        }
        // YUYV format: [Y0 U Y1 V] repeats
        let pair_x = (x & !1) as usize;
        let offset = (y as usize)
            .checked_mul(width as usize)?
            .checked_add(pair_x)?
            .checked_mul(2)?;

        let y_val = if x % 2 == 0 {
            *self.data.get(offset)?
        } else {
            *self.data.get(offset + 2)?
        };
        let u = *self.data.get(offset + 1)?;
        let v = *self.data.get(offset + 3)?;

        Some(yuv_to_rgb(y_val, u, v))
    }
}

/// A depth frame: distance per pixel in millimetres.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Frame dimensions.
    pub description: FrameDescription,
    /// One value per pixel.
    pub data: Vec<u16>,
    /// Sequence number assigned by the source.
    pub sequence: u32,
}

/// An infrared frame: intensity per pixel.
#[derive(Debug, Clone)]
pub struct InfraredFrame {
    /// Frame dimensions.
    pub description: FrameDescription,
    /// One value per pixel.
    pub data: Vec<u16>,
    /// Sequence number assigned by the source.
    pub sequence: u32,
}

/// Skeleton data for every body slot.
#[derive(Debug, Clone, Default)]
pub struct BodyFrame {
    /// Body slots; `None` slots hold no body data.
    pub bodies: [Option<Body>; BODY_COUNT],
    /// Sequence number assigned by the source.
    pub sequence: u32,
}

impl BodyFrame {
    /// Iterate over the bodies currently tracked.
    pub fn tracked_bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter().flatten().filter(|body| body.tracked)
    }
}
