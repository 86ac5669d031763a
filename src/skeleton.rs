//! Joint overlay for body snapshots.

use image::{imageops, Rgb, RgbImage};

use crate::body::{Joint, JOINT_COUNT};
use crate::frame::{BodyFrame, ColorFrame};
use crate::traits::CoordinateMapper;

/// Radius of the disc drawn at each joint, in pixels.
pub const JOINT_RADIUS: i64 = 4;

/// Color of the joint markers.
pub const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Draw every joint of one skeleton onto `image`.
///
/// Joints whose projection falls outside the image are skipped.
pub fn draw_skeleton<M: CoordinateMapper>(
    image: &mut RgbImage,
    joints: &[Joint; JOINT_COUNT],
    mapper: &M,
) {
    for joint in joints {
        let point = mapper.map_camera_point_to_color_space(joint.position);
        // Truncation toward zero; non-finite values saturate out of range.
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = (point.x as i64, point.y as i64);
        if x >= 0 && x < i64::from(image.width()) && y >= 0 && y < i64::from(image.height()) {
            fill_disc(image, x, y, JOINT_RADIUS, JOINT_COLOR);
        }
    }
}

/// Build the annotated, mirrored snapshot for one color/body frame pair.
#[must_use]
pub fn annotate_body_frame<M: CoordinateMapper>(
    color: &ColorFrame,
    bodies: &BodyFrame,
    mapper: &M,
) -> Option<RgbImage> {
    let rgb = crate::convert::bgra_to_rgb(&color.copy_converted_to_bgra());
    let mut image = RgbImage::from_raw(color.description.width, color.description.height, rgb)?;

    for body in bodies.tracked_bodies() {
        draw_skeleton(&mut image, &body.joints, mapper);
    }

    imageops::flip_horizontal_in_place(&mut image);
    Some(image)
}

fn fill_disc(image: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
                image.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, CameraSpacePoint, ColorSpacePoint};
    use crate::frame::{ColorImageFormat, FrameDescription};

    /// Maps camera x/y straight to pixel coordinates.
    struct IdentityMapper;

    impl CoordinateMapper for IdentityMapper {
        fn map_camera_point_to_color_space(&self, point: CameraSpacePoint) -> ColorSpacePoint {
            ColorSpacePoint {
                x: point.x,
                y: point.y,
            }
        }
    }

    fn body_at(x: f32, y: f32, tracked: bool) -> Body {
        Body::from_positions(tracked, [CameraSpacePoint::new(x, y, 1.0); JOINT_COUNT])
    }

    fn black_frame(width: u32, height: u32) -> ColorFrame {
        let description = FrameDescription::new(width, height, 4);
        ColorFrame {
            description,
            format: ColorImageFormat::Bgra,
            data: [0, 0, 0, 255].repeat(description.pixel_count()),
            sequence: 0,
        }
    }

    #[test]
    fn test_joint_drawn_as_disc() {
        let mut image = RgbImage::new(32, 32);
        draw_skeleton(&mut image, &body_at(10.0, 12.0, true).joints, &IdentityMapper);

        assert_eq!(*image.get_pixel(10, 12), JOINT_COLOR);
        assert_eq!(*image.get_pixel(14, 12), JOINT_COLOR);
        assert_eq!(*image.get_pixel(10, 8), JOINT_COLOR);
        // Corner of the bounding square lies outside the disc.
        assert_eq!(*image.get_pixel(14, 16), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(15, 12), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_bounds_joint_skipped() {
        let mut image = RgbImage::new(16, 16);
        draw_skeleton(&mut image, &body_at(-1.0, 5.0, true).joints, &IdentityMapper);
        draw_skeleton(&mut image, &body_at(5.0, 16.0, true).joints, &IdentityMapper);
        draw_skeleton(
            &mut image,
            &body_at(f32::NEG_INFINITY, f32::NEG_INFINITY, true).joints,
            &IdentityMapper,
        );

        assert!(image.pixels().all(|pixel| *pixel == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_disc_clipped_at_edge() {
        let mut image = RgbImage::new(8, 8);
        draw_skeleton(&mut image, &body_at(0.0, 0.0, true).joints, &IdentityMapper);
        assert_eq!(*image.get_pixel(0, 0), JOINT_COLOR);
        assert_eq!(*image.get_pixel(4, 0), JOINT_COLOR);
    }

    #[test]
    fn test_annotation_mirrors_and_skips_untracked() {
        let color = black_frame(20, 10);
        let mut bodies = BodyFrame::default();
        bodies.bodies[0] = Some(body_at(4.0, 5.0, true));
        bodies.bodies[1] = Some(body_at(15.0, 5.0, false));

        let image = annotate_body_frame(&color, &bodies, &IdentityMapper).expect("annotated image");
        assert_eq!(image.dimensions(), (20, 10));

        // Tracked joint at x=4 lands at x=15 after mirroring.
        assert_eq!(*image.get_pixel(15, 5), JOINT_COLOR);
        assert_eq!(*image.get_pixel(4, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotation_rejects_short_buffer() {
        let mut color = black_frame(4, 4);
        color.data.truncate(8);
        assert!(annotate_body_frame(&color, &BodyFrame::default(), &IdentityMapper).is_none());
    }
}
