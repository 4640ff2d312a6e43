//! Keyboard and mouse state collected from winit events

use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks keyboard and mouse input state between frames
pub struct InputState {
    /// Currently held keys
    keys_pressed: HashSet<KeyCode>,
    /// Keys that went down this frame
    keys_just_pressed: HashSet<KeyCode>,
    /// Mouse movement delta for the current frame
    mouse_delta: (f32, f32),
    /// Raw motion accumulated since the last `end_frame`
    mouse_delta_accumulated: (f32, f32),
    /// Whether the cursor is grabbed for mouse look
    mouse_captured: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_pressed: HashSet::new(),
            keys_just_pressed: HashSet::new(),
            mouse_delta: (0.0, 0.0),
            mouse_delta_accumulated: (0.0, 0.0),
            mouse_captured: false,
        }
    }

    /// Process a window event
    pub fn process_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput {
            event: KeyEvent {
                physical_key: PhysicalKey::Code(key_code),
                state,
                ..
            },
            ..
        } = event
        {
            match state {
                ElementState::Pressed => self.press_key(*key_code),
                ElementState::Released => {
                    self.keys_pressed.remove(key_code);
                }
            }
        }
    }

    /// Record a key going down
    pub fn press_key(&mut self, key: KeyCode) {
        if self.keys_pressed.insert(key) {
            self.keys_just_pressed.insert(key);
        }
    }

    /// Raw mouse motion from device events
    pub fn process_mouse_motion(&mut self, delta: (f64, f64)) {
        self.mouse_delta_accumulated.0 += delta.0 as f32;
        self.mouse_delta_accumulated.1 += delta.1 as f32;
    }

    /// Latch accumulated motion for the next frame and clear edge state
    pub fn end_frame(&mut self) {
        self.keys_just_pressed.clear();
        self.mouse_delta = if self.mouse_captured {
            self.mouse_delta_accumulated
        } else {
            (0.0, 0.0)
        };
        self.mouse_delta_accumulated = (0.0, 0.0);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keys_just_pressed.contains(&key)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.mouse_delta = (0.0, 0.0);
        self.mouse_delta_accumulated = (0.0, 0.0);
    }

    pub fn is_mouse_captured(&self) -> bool {
        self.mouse_captured
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press() {
        let mut input = InputState::new();
        assert!(!input.is_key_pressed(KeyCode::KeyW));

        input.press_key(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.end_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_mouse_motion_only_when_captured() {
        let mut input = InputState::new();
        input.process_mouse_motion((4.0, -2.0));
        input.end_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.set_mouse_captured(true);
        input.process_mouse_motion((4.0, -2.0));
        input.process_mouse_motion((1.0, 0.0));
        input.end_frame();
        assert_eq!(input.mouse_delta(), (5.0, -2.0));
    }
}
