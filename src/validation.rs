//! Checks over captured data.
//!
//! This module verifies that a session directory is complete: every frame
//! kind is numbered contiguously from 1, all kinds hold the same number of
//! frames, and raw dumps have the size their frame description implies. It
//! also validates color test patterns and frame ordering, which is useful
//! against synthetic sensors and virtual cameras.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::frame::{ColorFrame, FrameDescription};
use crate::output::FileKind;
use crate::traits::{CameraError, Result};

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 11),
    (12, 236, 237),
    (13, 237, 13),
    (237, 13, 237),
    (238, 14, 13),
    (15, 15, 239),
    (16, 16, 16),
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u32 = 15;

/// Files every frame of a session consists of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    /// Kind and expected byte length (`None` for encoded files).
    pub files: Vec<(FileKind, Option<usize>)>,
}

impl SessionLayout {
    /// Layout of the color/depth/infrared capture.
    #[must_use]
    pub fn rgbd(color: FrameDescription, depth: FrameDescription) -> Self {
        Self {
            files: vec![
                (FileKind::Color, Some(color.byte_len())),
                (FileKind::Depth, Some(depth.byte_len())),
                (FileKind::Infrared, Some(depth.byte_len())),
            ],
        }
    }

    /// Layout of the color/body capture.
    #[must_use]
    pub fn body(color: FrameDescription) -> Self {
        Self {
            files: vec![
                (FileKind::Color, Some(color.byte_len())),
                (FileKind::Body, None),
            ],
        }
    }
}

/// Validates a session directory and returns the number of frames in it.
///
/// # Errors
///
/// Returns `StreamError` if:
/// - The directory holds no frame of an expected kind
/// - A kind's frame numbers are not `1..=n`
/// - Kinds hold different numbers of frames
/// - A raw file's size differs from the layout
pub fn validate_session(dir: &Path, layout: &SessionLayout) -> Result<u32> {
    let mut found: HashMap<FileKind, Vec<u32>> = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some((kind, number)) = name.to_str().and_then(FileKind::parse_file_name) else {
            continue;
        };
        let Some((_, expected_len)) = layout.files.iter().find(|(k, _)| *k == kind) else {
            continue;
        };
        if let Some(expected_len) = expected_len {
            let len = entry.metadata()?.len();
            if usize::try_from(len).ok() != Some(*expected_len) {
                return Err(CameraError::StreamError(format!(
                    "{}: {len} bytes, expected {expected_len}",
                    entry.path().display()
                )));
            }
        }
        found.entry(kind).or_default().push(number);
    }

    let mut count = None;
    for (kind, _) in &layout.files {
        let mut numbers = found.remove(kind).unwrap_or_default();
        if numbers.is_empty() {
            return Err(CameraError::StreamError(format!(
                "no {} frames in {}",
                kind.prefix(),
                dir.display()
            )));
        }
        numbers.sort_unstable();
        for (expected, actual) in (1u32..).zip(&numbers) {
            if *actual != expected {
                return Err(CameraError::StreamError(format!(
                    "{} frames not contiguous: expected {expected}, got {actual}",
                    kind.prefix()
                )));
            }
        }
        let n = u32::try_from(numbers.len())
            .map_err(|_| CameraError::StreamError("too many frames".to_owned()))?;
        match count {
            None => count = Some(n),
            Some(previous) if previous != n => {
                return Err(CameraError::StreamError(format!(
                    "{} has {n} frames, other kinds have {previous}",
                    kind.prefix()
                )));
            }
            Some(_) => {}
        }
    }

    Ok(count.unwrap_or(0))
}

/// Validates that a YUY2 color frame contains the SMPTE color bar pattern.
///
/// This function checks 8 vertical stripes at their center positions,
/// verifying that each stripe contains the expected color with a tolerance
/// for YUV-to-RGB conversion inaccuracies.
///
/// # Errors
///
/// Returns `StreamError` if any color bar doesn't match the expected color
/// within tolerance.
pub fn validate_color_bars(frame: &ColorFrame) -> Result<()> {
    let bar_width = frame.description.width / 8;
    let center_y = frame.description.height / 2;

    for (bar_idx, expected_rgb) in (0u32..).zip(SMPTE_COLOR_BARS.iter()) {
        let sample_x = (bar_idx * bar_width) + (bar_width / 2);

        let actual_rgb = frame.pixel_at(sample_x, center_y).ok_or_else(|| {
            CameraError::StreamError(format!(
                "Failed to get pixel at ({sample_x}, {center_y})"
            ))
        })?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(CameraError::StreamError(format!(
                "Color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that frame sequence numbers strictly increase.
///
/// Latest-frame polling may skip source frames, so gaps are allowed.
///
/// # Errors
///
/// Returns `StreamError` if the slice is empty or a sequence number does not
/// exceed its predecessor.
pub fn validate_frame_sequence(sequences: &[u32]) -> Result<()> {
    if sequences.is_empty() {
        return Err(CameraError::StreamError(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (index, pair) in sequences.windows(2).enumerate() {
        if let &[prev, curr] = pair {
            if curr <= prev {
                return Err(CameraError::StreamError(format!(
                    "Frame sequence not increasing at index {}: {prev} then {curr}",
                    index + 1
                )));
            }
        }
    }

    Ok(())
}

/// Helper function to check if two RGB colors match within a tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar.abs_diff(er)) <= tolerance
        && u32::from(ag.abs_diff(eg)) <= tolerance
        && u32::from(ab.abs_diff(eb)) <= tolerance
}
