//! Z-up pinhole/thin-lens camera
//!
//! Orientation is stored as horizontal/vertical angles; `update()` derives
//! the view direction from them. The ray tracer consumes the basis produced
//! by [`Camera::basis`].

use crate::core::config::CameraConfig;
use crate::core::types::Vec3;

/// Focus distance bounds for runtime adjustment
pub const FOCAL_DISTANCE_RANGE: (f32, f32) = (0.1, 100.0);
/// Largest aperture reachable from the keyboard
pub const MAX_LENS_RADIUS: f32 = 80.0;

/// Smallest distance kept between the vertical angle and the poles
const POLE_EPSILON: f32 = 0.001;

/// Camera with position, orientation angles, and lens parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// World position (voxel units)
    pub position: Vec3,
    /// Unit view direction, derived from the angles
    pub direction: Vec3,
    /// World up axis
    pub up: Vec3,
    /// Rotation around +Z in radians; 0 looks along +Y
    pub horizontal_angle: f32,
    /// Elevation above the XY plane in radians
    pub vertical_angle: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Distance to the plane in focus
    pub focal_distance: f32,
    /// Aperture radius for depth of field
    pub lens_radius: f32,
    pub enable_depth_of_field: bool,
    /// Ignore input while locked
    pub locked: bool,
}

impl Camera {
    /// Create a camera at `position` looking along the given angles
    pub fn new(position: Vec3, horizontal_angle: f32, vertical_angle: f32) -> Self {
        let mut camera = Self {
            position,
            direction: Vec3::Y,
            up: Vec3::Z,
            horizontal_angle,
            vertical_angle,
            fov: 70.0,
            focal_distance: 100.0,
            lens_radius: 0.5,
            enable_depth_of_field: false,
            locked: false,
        };
        camera.update();
        camera
    }

    /// Build from settings
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self::new(
            Vec3::from_array(config.position),
            config.horizontal_angle,
            config.vertical_angle,
        );
        camera.fov = config.fov;
        camera.focal_distance = config.focal_distance;
        camera.lens_radius = config.lens_radius;
        camera.enable_depth_of_field = config.enable_depth_of_field;
        camera
    }

    /// Clamp the vertical angle and recompute the view direction
    pub fn update(&mut self) {
        let limit = std::f32::consts::FRAC_PI_2 - POLE_EPSILON;
        self.vertical_angle = self.vertical_angle.clamp(-limit, limit);

        let (sin_h, cos_h) = self.horizontal_angle.sin_cos();
        let (sin_v, cos_v) = self.vertical_angle.sin_cos();
        self.direction = Vec3::new(cos_v * sin_h, cos_v * cos_h, sin_v).normalize();
    }

    /// Scale the focus distance, kept within [`FOCAL_DISTANCE_RANGE`]
    pub fn scale_focal_distance(&mut self, factor: f32) {
        let (min, max) = FOCAL_DISTANCE_RANGE;
        self.focal_distance = (self.focal_distance * factor).clamp(min, max);
    }

    /// Widen or narrow the aperture; the radius never goes negative
    pub fn adjust_lens_radius(&mut self, delta: f32) {
        self.lens_radius = (self.lens_radius + delta).clamp(0.0, MAX_LENS_RADIUS);
    }

    pub fn toggle_depth_of_field(&mut self) {
        self.enable_depth_of_field = !self.enable_depth_of_field;
    }

    /// Unit vector to the right of the view direction
    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.up).normalize()
    }

    /// Image-plane basis `(right, up)` scaled by the field of view.
    ///
    /// A primary ray through normalized screen coordinates `(u, v)` in
    /// `[-1, 1]` has direction `direction + right * u + up * v`.
    pub fn basis(&self, aspect: f32) -> (Vec3, Vec3) {
        let half_height = (self.fov.to_radians() * 0.5).tan();
        let right = self.right() * half_height * aspect;
        let up = right.cross(self.direction).normalize() * half_height;
        (right, up)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_angles_look_along_y() {
        let camera = Camera::new(Vec3::ZERO, 0.0, 0.0);
        assert!((camera.direction - Vec3::Y).length() < 1e-6);
        assert!((camera.right() - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_vertical_angle_clamped() {
        let mut camera = Camera::new(Vec3::ZERO, 0.0, 0.0);
        camera.vertical_angle = 10.0;
        camera.update();
        assert!(camera.vertical_angle < std::f32::consts::FRAC_PI_2);
        assert!(camera.direction.z > 0.99);
        assert!(camera.right().is_finite());
    }

    #[test]
    fn test_basis_orthogonal_and_scaled() {
        let camera = Camera::new(Vec3::ZERO, 0.7, -0.3);
        let (right, up) = camera.basis(2.0);

        assert!(right.dot(camera.direction).abs() < 1e-5);
        assert!(up.dot(camera.direction).abs() < 1e-5);
        assert!(right.dot(up).abs() < 1e-5);

        let half = (70.0f32.to_radians() * 0.5).tan();
        assert!((up.length() - half).abs() < 1e-5);
        assert!((right.length() - half * 2.0).abs() < 1e-5);
        assert!(up.z > 0.0);
    }

    #[test]
    fn test_depth_of_field_controls_clamped() {
        let mut camera = Camera::default();
        camera.focal_distance = 10.0;
        camera.scale_focal_distance(2.0);
        assert_eq!(camera.focal_distance, 20.0);
        camera.scale_focal_distance(1000.0);
        assert_eq!(camera.focal_distance, FOCAL_DISTANCE_RANGE.1);
        camera.scale_focal_distance(0.0);
        assert_eq!(camera.focal_distance, FOCAL_DISTANCE_RANGE.0);

        camera.lens_radius = 0.05;
        camera.adjust_lens_radius(-1.0);
        assert_eq!(camera.lens_radius, 0.0);

        let enabled = camera.enable_depth_of_field;
        camera.toggle_depth_of_field();
        assert_eq!(camera.enable_depth_of_field, !enabled);
    }
}
