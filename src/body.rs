//! Skeleton types: bodies, joints and the two coordinate spaces.

use crate::traits::CoordinateMapper;

/// Maximum number of simultaneously tracked bodies.
pub const BODY_COUNT: usize = 6;

/// Number of joints in one skeleton.
pub const JOINT_COUNT: usize = 25;

/// Joints of the tracked skeleton, in index order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointType {
    /// All joint types, indexed the same way as `Body::joints`.
    pub const ALL: [Self; JOINT_COUNT] = [
        Self::SpineBase,
        Self::SpineMid,
        Self::Neck,
        Self::Head,
        Self::ShoulderLeft,
        Self::ElbowLeft,
        Self::WristLeft,
        Self::HandLeft,
        Self::ShoulderRight,
        Self::ElbowRight,
        Self::WristRight,
        Self::HandRight,
        Self::HipLeft,
        Self::KneeLeft,
        Self::AnkleLeft,
        Self::FootLeft,
        Self::HipRight,
        Self::KneeRight,
        Self::AnkleRight,
        Self::FootRight,
        Self::SpineShoulder,
        Self::HandTipLeft,
        Self::ThumbLeft,
        Self::HandTipRight,
        Self::ThumbRight,
    ];
}

/// Tracking confidence of a single joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// Joint position is unknown.
    #[default]
    NotTracked,
    /// Joint position is estimated from neighbouring joints.
    Inferred,
    /// Joint position was observed directly.
    Tracked,
}

/// A point in the sensor's 3D space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraSpacePoint {
    /// Horizontal offset.
    pub x: f32,
    /// Vertical offset, positive up.
    pub y: f32,
    /// Distance from the sensor.
    pub z: f32,
}

impl CameraSpacePoint {
    /// Create a new camera-space point.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A point in color image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorSpacePoint {
    /// Column.
    pub x: f32,
    /// Row.
    pub y: f32,
}

impl ColorSpacePoint {
    /// Point returned for camera-space points that cannot be projected.
    pub const UNMAPPABLE: Self = Self {
        x: f32::NEG_INFINITY,
        y: f32::NEG_INFINITY,
    };
}

/// One skeleton joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    /// Which joint this is.
    pub joint_type: JointType,
    /// Position in camera space.
    pub position: CameraSpacePoint,
    /// Tracking confidence.
    pub tracking_state: TrackingState,
}

/// One body slot of a body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Whether the slot currently holds a tracked person.
    pub tracked: bool,
    /// Joint positions, indexed like `JointType::ALL`.
    pub joints: [Joint; JOINT_COUNT],
}

impl Body {
    /// Build a body from joint positions given in `JointType::ALL` order.
    #[must_use]
    pub fn from_positions(tracked: bool, positions: [CameraSpacePoint; JOINT_COUNT]) -> Self {
        let state = if tracked {
            TrackingState::Tracked
        } else {
            TrackingState::NotTracked
        };
        let mut index = 0;
        let joints = positions.map(|position| {
            let joint_type = JointType::ALL.get(index).copied().unwrap_or(JointType::SpineBase);
            index += 1;
            Joint {
                joint_type,
                position,
                tracking_state: state,
            }
        });
        Self { tracked, joints }
    }
}

/// Pinhole projection into the color camera.
///
/// Defaults to the reference sensor's 1920x1080 color intrinsics. Points at or
/// behind the sensor plane map to `ColorSpacePoint::UNMAPPABLE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeMapper {
    /// Focal length in pixels, horizontal.
    pub fx: f32,
    /// Focal length in pixels, vertical.
    pub fy: f32,
    /// Principal point column.
    pub cx: f32,
    /// Principal point row.
    pub cy: f32,
}

impl Default for PinholeMapper {
    fn default() -> Self {
        Self {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
        }
    }
}

impl PinholeMapper {
    /// Intrinsics scaled for a color image of `width` x `height`.
    #[must_use]
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let reference = Self::default();
        #[allow(clippy::cast_precision_loss)]
        let (sx, sy) = (width as f32 / 1920.0, height as f32 / 1080.0);
        Self {
            fx: reference.fx * sx,
            fy: reference.fy * sy,
            cx: (reference.cx + 0.5).mul_add(sx, -0.5),
            cy: (reference.cy + 0.5).mul_add(sy, -0.5),
        }
    }
}

impl CoordinateMapper for PinholeMapper {
    fn map_camera_point_to_color_space(&self, point: CameraSpacePoint) -> ColorSpacePoint {
        if point.z <= 0.0 || !point.z.is_finite() {
            return ColorSpacePoint::UNMAPPABLE;
        }
        ColorSpacePoint {
            x: self.fx.mul_add(point.x / point.z, self.cx),
            y: self.fy.mul_add(-point.y / point.z, self.cy),
        }
    }
}
