//! Pixel format conversion between the sensor's raw color formats.

/// Convert YUY2 (YUYV 4:2:2 packed) data into BGRA with opaque alpha.
///
/// Each group of four input bytes `[Y0 U Y1 V]` describes two pixels sharing
/// U and V. A trailing partial group is ignored.
#[must_use]
pub fn yuy2_to_bgra(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for group in data.chunks_exact(4) {
        let &[y0, u, y1, v] = group else {
            continue;
        };
        for y in [y0, y1] {
            let (r, g, b) = yuv_to_rgb(y, u, v);
            out.extend_from_slice(&[b, g, r, 255]);
        }
    }
    out
}

/// Convert BGRA data into tightly packed RGB, dropping alpha.
#[must_use]
pub fn bgra_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    for pixel in data.chunks_exact(4) {
        if let &[b, g, r, _] = pixel {
            out.extend_from_slice(&[r, g, b]);
        }
    }
    out
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    let clamp = |val: f32| -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            val.clamp(0.0, 255.0) as u8
        }
    };

    (clamp(r), clamp(g), clamp(b))
}
