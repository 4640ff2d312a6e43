//! First-person camera controller

use crate::core::camera::Camera;
use crate::core::config::CameraConfig;
use crate::core::input::InputState;
use crate::core::types::Vec3;
use winit::keyboard::KeyCode;

/// FPS-style controller: WASD along the view, Space/Ctrl along +Z/-Z,
/// Shift to sprint, mouse for the angles.
pub struct FpsCameraController {
    /// Movement speed in units per second
    pub speed: f32,
    /// Speed while Shift is held
    pub sprint_speed: f32,
    /// Radians per pixel of mouse motion
    pub sensitivity: f32,
}

impl FpsCameraController {
    /// Create new controller
    pub fn new(speed: f32, sprint_speed: f32, sensitivity: f32) -> Self {
        Self {
            speed,
            sprint_speed,
            sensitivity,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(config.speed, config.sprint_speed, config.sensitivity)
    }

    /// Update camera based on input. Returns true when the camera moved.
    pub fn update(&mut self, camera: &mut Camera, input: &InputState, dt: f32) -> bool {
        if camera.locked {
            return false;
        }
        let before = (camera.position, camera.horizontal_angle, camera.vertical_angle);

        if input.is_mouse_captured() {
            let (dx, dy) = input.mouse_delta();
            camera.horizontal_angle += dx * self.sensitivity;
            camera.vertical_angle -= dy * self.sensitivity;
        }
        camera.update();

        let speed = if input.is_key_pressed(KeyCode::ShiftLeft) || input.is_key_pressed(KeyCode::ShiftRight) {
            self.sprint_speed
        } else {
            self.speed
        };

        let mut velocity = Vec3::ZERO;
        if input.is_key_pressed(KeyCode::KeyW) {
            velocity += camera.direction;
        }
        if input.is_key_pressed(KeyCode::KeyS) {
            velocity -= camera.direction;
        }
        if input.is_key_pressed(KeyCode::KeyA) {
            velocity -= camera.right();
        }
        if input.is_key_pressed(KeyCode::KeyD) {
            velocity += camera.right();
        }
        if input.is_key_pressed(KeyCode::Space) {
            velocity.z += 1.0;
        }
        if input.is_key_pressed(KeyCode::ControlLeft) {
            velocity.z -= 1.0;
        }

        camera.position += velocity * speed * dt;

        before != (camera.position, camera.horizontal_angle, camera.vertical_angle)
    }
}

impl Default for FpsCameraController {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}
