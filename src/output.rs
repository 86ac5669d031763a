//! Session directory layout and frame file writers.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::traits::Result;

/// `strftime` pattern for session directory names.
pub const SESSION_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// JPEG quality used for annotated body snapshots.
pub const JPEG_QUALITY: u8 = 90;

/// Kind of file written per captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `color_NN.raw`, BGRA8.
    Color,
    /// `depth_NN.raw`, u16 per pixel.
    Depth,
    /// `infra_NN.raw`, u16 per pixel.
    Infrared,
    /// `body_NN.jpg`, annotated snapshot.
    Body,
}

impl FileKind {
    /// File name prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Depth => "depth",
            Self::Infrared => "infra",
            Self::Body => "body",
        }
    }

    /// File name extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Body => "jpg",
            Self::Color | Self::Depth | Self::Infrared => "raw",
        }
    }

    /// Parse a file name produced by `frame_file_name`.
    #[must_use]
    pub fn parse_file_name(name: &str) -> Option<(Self, u32)> {
        let (stem, extension) = name.rsplit_once('.')?;
        let (prefix, number) = stem.rsplit_once('_')?;
        let kind = [Self::Color, Self::Depth, Self::Infrared, Self::Body]
            .into_iter()
            .find(|kind| kind.prefix() == prefix && kind.extension() == extension)?;
        if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((kind, number.parse().ok()?))
    }
}

/// File name for frame `frame_no` of the given kind, e.g. `color_01.raw`.
#[must_use]
pub fn frame_file_name(kind: FileKind, frame_no: u32) -> String {
    format!("{}_{frame_no:02}.{}", kind.prefix(), kind.extension())
}

/// Name of the session directory for a run started at `started`.
#[must_use]
pub fn session_dir_name(started: &DateTime<Local>) -> String {
    started.format(SESSION_DIR_FORMAT).to_string()
}

/// Per-run output directory named after the local start time.
#[derive(Debug, Clone)]
pub struct SessionDir {
    path: PathBuf,
}

impl SessionDir {
    /// Create `root/YYYYMMDD_hhmmss` for a run started at `started`.
    ///
    /// An existing directory with the same name is reused.
    pub fn create(root: &Path, started: &DateTime<Local>) -> Result<Self> {
        let path = root.join(session_dir_name(started));
        fs::create_dir_all(&path)?;
        log::info!("writing frames to {}", path.display());
        Ok(Self { path })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of a frame file in this session.
    #[must_use]
    pub fn frame_path(&self, kind: FileKind, frame_no: u32) -> PathBuf {
        self.path.join(frame_file_name(kind, frame_no))
    }

    /// Write a BGRA color buffer as `color_NN.raw`.
    pub fn write_color_raw(&self, frame_no: u32, bgra: &[u8]) -> Result<PathBuf> {
        let path = self.frame_path(FileKind::Color, frame_no);
        write_raw(&path, bgra)?;
        Ok(path)
    }

    /// Write a 16-bit buffer as `depth_NN.raw` or `infra_NN.raw`.
    ///
    /// Values are written in host byte order.
    pub fn write_u16_raw(&self, kind: FileKind, frame_no: u32, data: &[u16]) -> Result<PathBuf> {
        let path = self.frame_path(kind, frame_no);
        write_raw(&path, bytemuck::cast_slice(data))?;
        Ok(path)
    }

    /// Encode an annotated snapshot as `body_NN.jpg`.
    pub fn write_body_jpeg(&self, frame_no: u32, image: &RgbImage) -> Result<PathBuf> {
        let path = self.frame_path(FileKind::Body, frame_no);
        let mut writer = BufWriter::new(File::create(&path)?);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(image)?;
        writer.flush()?;
        Ok(path)
    }
}

fn write_raw(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}
