//! Rolling render/streaming statistics
//!
//! Keeps the last [`HISTORY_LEN`] frame times and per-tick brick loads,
//! plus running totals. The binary logs a summary periodically.

use std::collections::VecDeque;

use serde::Serialize;

/// Samples kept per history
pub const HISTORY_LEN: usize = 200;

/// Fixed-length sample window
#[derive(Clone, Debug)]
pub struct RollingHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn max(&self) -> f32 {
        self.samples.iter().copied().fold(0.0, f32::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

/// Snapshot suitable for logging
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TelemetrySummary {
    pub frames: u64,
    pub avg_frame_ms: f32,
    pub max_frame_ms: f32,
    pub avg_brick_loads: f32,
    pub total_brick_loads: u64,
    pub dropped_requests: u64,
    pub filled_voxels: u64,
}

/// Per-frame counters read by the overlay/log
pub struct Telemetry {
    frame_times_ms: RollingHistory,
    brick_loads: RollingHistory,
    frames: u64,
    total_brick_loads: u64,
    dropped_requests: u64,
    filled_voxels: u64,
}

impl Telemetry {
    pub fn new(filled_voxels: u64) -> Self {
        Self {
            frame_times_ms: RollingHistory::new(HISTORY_LEN),
            brick_loads: RollingHistory::new(HISTORY_LEN),
            frames: 0,
            total_brick_loads: 0,
            dropped_requests: 0,
            filled_voxels,
        }
    }

    /// Record one frame's duration and the bricks loaded by its world tick
    pub fn record_frame(&mut self, frame_secs: f32, brick_loads: u32, dropped: u32) {
        self.frames += 1;
        self.frame_times_ms.push(frame_secs * 1000.0);
        self.brick_loads.push(brick_loads as f32);
        self.total_brick_loads += brick_loads as u64;
        self.dropped_requests += dropped as u64;
    }

    pub fn frame_times_ms(&self) -> &RollingHistory {
        &self.frame_times_ms
    }

    pub fn brick_loads(&self) -> &RollingHistory {
        &self.brick_loads
    }

    pub fn summary(&self) -> TelemetrySummary {
        TelemetrySummary {
            frames: self.frames,
            avg_frame_ms: self.frame_times_ms.average(),
            max_frame_ms: self.frame_times_ms.max(),
            avg_brick_loads: self.brick_loads.average(),
            total_brick_loads: self.total_brick_loads,
            dropped_requests: self.dropped_requests,
            filled_voxels: self.filled_voxels,
        }
    }

    /// Log the summary every `interval` frames
    pub fn maybe_log(&self, interval: u32) {
        if interval == 0 || self.frames == 0 || self.frames % interval as u64 != 0 {
            return;
        }
        let s = self.summary();
        log::info!(
            "frame {}: {:.2}ms avg ({:.2}ms max), {:.1} bricks/tick, {} loaded, {} dropped, {} voxels",
            s.frames, s.avg_frame_ms, s.max_frame_ms, s.avg_brick_loads,
            s.total_brick_loads, s.dropped_requests, s.filled_voxels
        );
    }
}
