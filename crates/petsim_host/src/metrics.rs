use std::time::{Duration, Instant};

use petsim::NotificationCounts;
use serde::Serialize;

use crate::loop_runner::FrameOutcome;

/// Stage activity over one logging window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub depth_passes_per_sec: f32,
    /// Layer values that actually changed across the window's depth passes.
    pub layer_changes: u32,
    pub notifications: NotificationCounts,
    pub shadow_updates: u32,
    pub sweep_corrections: u32,
}

/// Folds per-frame outcomes into a snapshot once per window.
#[derive(Debug)]
pub(crate) struct StageMetrics {
    window: Duration,
    window_start: Instant,
    frames: u32,
    wall_time: Duration,
    totals: FrameOutcome,
}

impl StageMetrics {
    pub(crate) fn new(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            frames: 0,
            wall_time: Duration::ZERO,
            totals: FrameOutcome::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, wall_dt: Duration, outcome: &FrameOutcome) {
        self.frames = self.frames.saturating_add(1);
        self.wall_time = self.wall_time.saturating_add(wall_dt);
        self.totals += *outcome;
    }

    /// Emits and restarts the window once it has run its length.
    pub(crate) fn take_if_due(&mut self, now: Instant) -> Option<StageMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        let window = self.window;
        let finished = std::mem::replace(self, Self::new(window, now));
        Some(finished.snapshot(elapsed))
    }

    fn snapshot(&self, elapsed: Duration) -> StageMetricsSnapshot {
        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let per_second = |count: u32| count as f32 / seconds;
        let frame_time_ms = match self.frames {
            0 => 0.0,
            frames => self.wall_time.as_secs_f32() * 1000.0 / frames as f32,
        };
        StageMetricsSnapshot {
            fps: per_second(self.frames),
            tps: per_second(self.totals.ticks),
            frame_time_ms,
            depth_passes_per_sec: per_second(self.totals.depth_passes),
            layer_changes: self.totals.layer_changes,
            notifications: self.totals.notifications,
            shadow_updates: self.totals.shadow_updates,
            sweep_corrections: self.totals.sweep_corrections,
        }
    }
}
