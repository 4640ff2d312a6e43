//! Frame timing

use std::time::{Duration, Instant};

/// Longest delta handed to camera movement; a stalled frame (first-frame
/// shader compilation, a long halt wait) must not teleport the camera
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Wall-clock frame timer with a once-per-second FPS estimate
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Mark the start of a new frame
    pub fn tick(&mut self) {
        self.advance(Instant::now());
    }

    fn advance(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let window = now.saturating_duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }
    }

    /// Unclamped seconds since the previous frame, for telemetry
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since the previous frame, clamped to [`MAX_FRAME_DELTA`]
    pub fn step_secs(&self) -> f32 {
        self.delta.min(MAX_FRAME_DELTA).as_secs_f32()
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.delta_secs() >= 0.0);
    }

    #[test]
    fn test_stalled_frame_is_clamped() {
        let mut timer = FrameTimer::new();
        let start = timer.last_frame;
        timer.advance(start + Duration::from_secs(3));
        assert_eq!(timer.delta_secs(), 3.0);
        assert_eq!(timer.step_secs(), MAX_FRAME_DELTA.as_secs_f32());
    }

    #[test]
    fn test_fps_updates_after_one_second() {
        let mut timer = FrameTimer::new();
        let start = timer.window_start;
        for i in 1..=10 {
            timer.advance(start + Duration::from_millis(100 * i));
        }
        assert!((timer.fps() - 10.0).abs() < 1e-3);
    }
}
