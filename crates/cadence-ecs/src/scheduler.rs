//! Schedulers: sources of wall-clock ticks that drive [`World::tick`](crate::World::tick).
//!
//! A scheduler calls `on_tick(delta_ms)` synchronously until it runs out of
//! ticks or its [`StopHandle`] is signalled. Stopping halts future ticks only;
//! the tick in flight completes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Shared stop flag of a scheduler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates a handle in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the owning scheduler to stop after the current tick.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Source of wall-clock ticks.
pub trait Scheduler {
    /// Calls `on_tick(delta_ms)` until exhausted or stopped.
    fn start(&mut self, on_tick: &mut dyn FnMut(f64));

    /// Halts future ticks.
    fn stop(&mut self) {
        self.stop_handle().stop();
    }

    /// Handle that stops this scheduler from anywhere, including from inside
    /// a tick.
    fn stop_handle(&self) -> StopHandle;
}

/// Scripted deltas, used to drive the loop deterministically.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    deltas: VecDeque<f64>,
    stop: StopHandle,
}

impl ManualScheduler {
    /// Creates a scheduler with no queued ticks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler that will emit `deltas` in order.
    pub fn with_deltas(deltas: impl IntoIterator<Item = f64>) -> Self {
        Self {
            deltas: deltas.into_iter().collect(),
            stop: StopHandle::new(),
        }
    }

    /// Queues one more tick.
    pub fn push(&mut self, delta_ms: f64) {
        self.deltas.push_back(delta_ms);
    }

    /// Emits exactly one queued tick. Returns `false` when the queue is empty.
    pub fn step(&mut self, on_tick: &mut dyn FnMut(f64)) -> bool {
        match self.deltas.pop_front() {
            Some(delta) => {
                on_tick(delta);
                true
            }
            None => false,
        }
    }

    /// Ticks still queued.
    pub fn remaining(&self) -> usize {
        self.deltas.len()
    }
}

impl Scheduler for ManualScheduler {
    fn start(&mut self, on_tick: &mut dyn FnMut(f64)) {
        self.stop.reset();
        while !self.stop.is_stopped() && self.step(on_tick) {}
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

/// Virtual clock: a constant delta for a fixed number of frames, as fast as
/// the host allows.
#[derive(Debug)]
pub struct FixedScheduler {
    delta_ms: f64,
    frames: u64,
    emitted: u64,
    stop: StopHandle,
}

impl FixedScheduler {
    /// Emits `frames` ticks of `delta_ms` each.
    pub fn new(delta_ms: f64, frames: u64) -> Self {
        Self {
            delta_ms,
            frames,
            emitted: 0,
            stop: StopHandle::new(),
        }
    }

    /// Ticks emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Scheduler for FixedScheduler {
    fn start(&mut self, on_tick: &mut dyn FnMut(f64)) {
        self.stop.reset();
        debug!(
            delta_ms = self.delta_ms,
            frames = self.frames,
            "fixed scheduler started"
        );
        while self.emitted < self.frames && !self.stop.is_stopped() {
            on_tick(self.delta_ms);
            self.emitted += 1;
        }
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

/// Wall clock: measures real elapsed time between ticks and sleeps to hold a
/// target rate.
#[derive(Debug)]
pub struct RealTimeScheduler {
    frame_budget: Option<Duration>,
    max_frames: Option<u64>,
    emitted: u64,
    stop: StopHandle,
}

impl RealTimeScheduler {
    /// Targets `target_fps` ticks per second. A non-positive or non-finite
    /// rate disables sleeping.
    pub fn new(target_fps: f64) -> Self {
        let frame_budget = (target_fps.is_finite() && target_fps > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / target_fps));
        Self {
            frame_budget,
            max_frames: None,
            emitted: 0,
            stop: StopHandle::new(),
        }
    }

    /// Stops on its own after `frames` ticks.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Ticks emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Scheduler for RealTimeScheduler {
    fn start(&mut self, on_tick: &mut dyn FnMut(f64)) {
        self.stop.reset();
        info!(budget = ?self.frame_budget, "real-time scheduler started");
        let mut last = Instant::now();
        loop {
            if self.stop.is_stopped() || self.max_frames.is_some_and(|max| self.emitted >= max) {
                break;
            }
            if let Some(budget) = self.frame_budget {
                let spent = last.elapsed();
                if spent < budget {
                    std::thread::sleep(budget - spent);
                }
            }
            let now = Instant::now();
            let delta_ms = now.duration_since(last).as_secs_f64() * 1000.0;
            last = now;
            on_tick(delta_ms);
            self.emitted += 1;
        }
        info!(frames = self.emitted, "real-time scheduler stopped");
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
