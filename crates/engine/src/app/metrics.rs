use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use super::SceneStats;

static POISON_WARNED: AtomicBool = AtomicBool::new(false);

/// Takes the value out of a poisoned guard; a panicking writer can only
/// leave a stale snapshot behind.
fn recover<G>(operation: &'static str, poisoned: PoisonError<G>) -> G {
    if !POISON_WARNED.swap(true, Ordering::Relaxed) {
        warn!(operation, "loop_metrics_lock_poisoned");
    }
    poisoned.into_inner()
}

/// Loop health over the last metrics interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub max_frame_time_ms: f32,
    /// Frames in the interval whose tick backlog was dropped.
    pub sim_clamps: u32,
    pub loaded_tiles: usize,
    pub live_entities: usize,
}

/// Shared read access to the latest snapshot, for overlays or tests.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    latest: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *self
            .latest
            .read()
            .unwrap_or_else(|poisoned| recover("read", poisoned))
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *self
            .latest
            .write()
            .unwrap_or_else(|poisoned| recover("write", poisoned)) = snapshot;
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval: Duration,
    started: Instant,
    frames: u32,
    ticks: u32,
    sim_clamps: u32,
    frame_time_total: Duration,
    frame_time_max: Duration,
    scene: SceneStats,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            started: now,
            frames: 0,
            ticks: 0,
            sim_clamps: 0,
            frame_time_total: Duration::ZERO,
            frame_time_max: Duration::ZERO,
            scene: SceneStats::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, scene: SceneStats) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_total = self.frame_time_total.saturating_add(frame_dt);
        self.frame_time_max = self.frame_time_max.max(frame_dt);
        self.scene = scene;
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn record_sim_clamp(&mut self) {
        self.sim_clamps = self.sim_clamps.saturating_add(1);
    }

    /// Closes the interval once it has run its length and starts a new one.
    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.interval {
            return None;
        }

        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let average = match self.frames {
            0 => Duration::ZERO,
            frames => self.frame_time_total / frames,
        };
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / seconds,
            tps: self.ticks as f32 / seconds,
            frame_time_ms: average.as_secs_f32() * 1000.0,
            max_frame_time_ms: self.frame_time_max.as_secs_f32() * 1000.0,
            sim_clamps: self.sim_clamps,
            loaded_tiles: self.scene.loaded_tiles,
            live_entities: self.scene.live_entities,
        };
        *self = Self {
            scene: self.scene,
            ..Self::new(self.interval, now)
        };
        Some(snapshot)
    }
}
