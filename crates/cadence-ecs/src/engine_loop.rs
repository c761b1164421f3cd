//! Fixed-timestep / frame-rate dual loop.
//!
//! Decouples simulation (fixed steps) from per-frame work (variable rate)
//! using an accumulator, the "Fix Your Timestep" pattern. Each call to
//! [`EngineLoop::run_frame`] drains zero or more fixed steps, each running
//! `Fixed x {Early, Update, Late}`, then runs `Frame x {Early, Update, Late}`
//! once with an interpolation alpha for smooth presentation between
//! simulation states.

use tracing::{debug, warn};

use crate::{Phase, TickKind};

/// Default fixed step: 60 Hz.
pub const DEFAULT_FIXED_STEP_MS: f64 = 1000.0 / 60.0;

/// Default frame delta clamp. Anything longer is treated as a hitch and
/// accepted as slowdown.
pub const DEFAULT_MAX_FRAME_DT_MS: f64 = 250.0;

/// Default cap on fixed steps drained per frame.
pub const DEFAULT_MAX_FIXED_STEPS_PER_FRAME: u32 = 8;

/// Default length of the perf sampling window.
pub const DEFAULT_PERF_WINDOW_MS: f64 = 1000.0;

/// Timing parameters of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    /// Length of one fixed step in milliseconds.
    pub fixed_step_ms: f64,
    /// Maximum fixed steps drained in one frame.
    pub max_fixed_steps_per_frame: u32,
    /// Raw frame deltas are clamped to `[0, max_frame_dt_ms]`.
    pub max_frame_dt_ms: f64,
    /// Initial time scale.
    pub time_scale: f64,
    /// Length of the fps / steps-per-second sampling window.
    pub perf_window_ms: f64,
}

impl LoopConfig {
    /// Replaces out-of-range values with defaults so the loop can never stall
    /// or spin.
    pub fn sanitized(self) -> Self {
        let positive_or = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        Self {
            fixed_step_ms: positive_or(self.fixed_step_ms, DEFAULT_FIXED_STEP_MS),
            max_fixed_steps_per_frame: self.max_fixed_steps_per_frame.max(1),
            max_frame_dt_ms: if self.max_frame_dt_ms.is_finite() && self.max_frame_dt_ms >= 0.0 {
                self.max_frame_dt_ms
            } else {
                DEFAULT_MAX_FRAME_DT_MS
            },
            time_scale: sanitize_time_scale(self.time_scale),
            perf_window_ms: positive_or(self.perf_window_ms, DEFAULT_PERF_WINDOW_MS),
        }
    }

    /// Fixed step length in seconds, the `dt` passed to fixed callbacks.
    pub fn fixed_dt(&self) -> f64 {
        self.fixed_step_ms / 1000.0
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            fixed_step_ms: DEFAULT_FIXED_STEP_MS,
            max_fixed_steps_per_frame: DEFAULT_MAX_FIXED_STEPS_PER_FRAME,
            max_frame_dt_ms: DEFAULT_MAX_FRAME_DT_MS,
            time_scale: 1.0,
            perf_window_ms: DEFAULT_PERF_WINDOW_MS,
        }
    }
}

fn sanitize_time_scale(scale: f64) -> f64 {
    if scale.is_finite() { scale.max(0.0) } else { 0.0 }
}

/// Figures published at the end of each perf window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfStats {
    /// Frames per second over the last closed window.
    pub fps: f64,
    /// Fixed steps per second over the last closed window.
    pub steps_per_second: f64,
    /// Frame id at which the window closed.
    pub frame_id: u64,
    /// Number of windows closed so far.
    pub windows: u64,
}

/// What one [`EngineLoop::run_frame`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    /// `false` when the loop was paused and nothing ran.
    pub advanced: bool,
    /// Fixed steps drained this frame.
    pub fixed_steps: u32,
    /// Milliseconds dropped by the catch-up guard.
    pub discarded_ms: f64,
    /// `dt` in seconds passed to the frame phases.
    pub frame_dt: f64,
}

#[derive(Debug, Default)]
struct PerfWindow {
    elapsed_ms: f64,
    frames: u32,
    steps: u32,
}

/// Receiver of the phase dispatches of a frame.
///
/// The loop state lives inside the driver so callbacks run during a phase can
/// still read it (for example [`EngineLoop::alpha`]).
pub trait FrameDriver {
    /// The loop state owned by this driver.
    fn engine_loop(&mut self) -> &mut EngineLoop;

    /// Runs every callback of `(kind, phase)` with `dt` in seconds.
    fn run_phase(&mut self, kind: TickKind, phase: Phase, dt: f64);

    /// Called before each fixed step, ahead of its phases.
    fn before_fixed_step(&mut self) {}
}

/// Accumulator, pause / time scale and perf sampling state.
#[derive(Debug)]
pub struct EngineLoop {
    config: LoopConfig,
    accumulator_ms: f64,
    frame_id: u64,
    fixed_steps_total: u64,
    current_kind: Option<TickKind>,
    alpha: f64,
    paused: bool,
    time_scale: f64,
    perf: PerfWindow,
    stats: PerfStats,
}

impl EngineLoop {
    /// Creates a loop with a sanitized copy of `config`.
    pub fn new(config: LoopConfig) -> Self {
        let config = config.sanitized();
        Self {
            config,
            accumulator_ms: 0.0,
            frame_id: 0,
            fixed_steps_total: 0,
            current_kind: None,
            alpha: 0.0,
            paused: false,
            time_scale: config.time_scale,
            perf: PerfWindow::default(),
            stats: PerfStats::default(),
        }
    }

    /// Runs one frame on `driver` for a raw wall-clock delta.
    ///
    /// Steps, in order: clamp and scale the delta, drain fixed steps up to the
    /// per-frame cap, discard the backlog if the cap was hit with a full step
    /// still pending, run the frame phases with the interpolation alpha, then
    /// update the perf window. A paused loop does nothing.
    pub fn run_frame<D: FrameDriver + ?Sized>(driver: &mut D, raw_delta_ms: f64) -> FrameReport {
        let (clamped_ms, scaled_ms, config) = {
            let lp = driver.engine_loop();
            if lp.paused {
                return FrameReport::default();
            }
            let clamped_ms = lp.clamp_delta(raw_delta_ms);
            let scaled_ms = clamped_ms * lp.time_scale;
            lp.frame_id += 1;
            lp.accumulator_ms += scaled_ms;
            (clamped_ms, scaled_ms, lp.config)
        };

        let fixed_dt = config.fixed_dt();
        let mut steps = 0u32;
        while steps < config.max_fixed_steps_per_frame
            && driver.engine_loop().accumulator_ms >= config.fixed_step_ms
        {
            driver.engine_loop().current_kind = Some(TickKind::Fixed);
            driver.before_fixed_step();
            for phase in Phase::ALL {
                driver.run_phase(TickKind::Fixed, phase, fixed_dt);
            }
            let lp = driver.engine_loop();
            lp.accumulator_ms -= config.fixed_step_ms;
            lp.fixed_steps_total += 1;
            steps += 1;
        }

        let frame_dt = scaled_ms / 1000.0;
        let discarded_ms = {
            let lp = driver.engine_loop();
            let mut discarded_ms = 0.0;
            if steps >= config.max_fixed_steps_per_frame
                && lp.accumulator_ms >= config.fixed_step_ms
            {
                discarded_ms = lp.accumulator_ms;
                debug!(
                    frame = lp.frame_id,
                    steps,
                    discarded_ms,
                    "fixed step budget exhausted, discarding backlog"
                );
                lp.accumulator_ms = 0.0;
            }
            lp.alpha = (lp.accumulator_ms / config.fixed_step_ms).clamp(0.0, 1.0);
            lp.current_kind = Some(TickKind::Frame);
            discarded_ms
        };

        for phase in Phase::ALL {
            driver.run_phase(TickKind::Frame, phase, frame_dt);
        }

        let lp = driver.engine_loop();
        lp.current_kind = None;
        lp.sample(clamped_ms, steps);

        FrameReport {
            advanced: true,
            fixed_steps: steps,
            discarded_ms,
            frame_dt,
        }
    }

    fn clamp_delta(&self, raw_delta_ms: f64) -> f64 {
        if !raw_delta_ms.is_finite() || raw_delta_ms <= 0.0 {
            return 0.0;
        }
        if raw_delta_ms > self.config.max_frame_dt_ms {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                raw_delta_ms, self.config.max_frame_dt_ms
            );
            return self.config.max_frame_dt_ms;
        }
        raw_delta_ms
    }

    /// Periodic-reset estimator: counts over a window, publishes, clears.
    fn sample(&mut self, elapsed_ms: f64, steps: u32) {
        self.perf.elapsed_ms += elapsed_ms;
        self.perf.frames += 1;
        self.perf.steps += steps;
        if self.perf.elapsed_ms < self.config.perf_window_ms {
            return;
        }
        let seconds = self.perf.elapsed_ms / 1000.0;
        self.stats = PerfStats {
            fps: f64::from(self.perf.frames) / seconds,
            steps_per_second: f64::from(self.perf.steps) / seconds,
            frame_id: self.frame_id,
            windows: self.stats.windows + 1,
        };
        debug!(
            fps = self.stats.fps,
            steps_per_second = self.stats.steps_per_second,
            "perf window closed"
        );
        self.perf = PerfWindow::default();
    }

    /// Interpolation alpha in `[0, 1)` while a frame phase runs, 0 otherwise.
    pub fn alpha(&self) -> f64 {
        if self.current_kind == Some(TickKind::Frame) {
            self.alpha
        } else {
            0.0
        }
    }

    /// Kind of the phase currently being dispatched, if any.
    pub fn current_kind(&self) -> Option<TickKind> {
        self.current_kind
    }

    /// Frames advanced so far (paused calls do not count).
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Fixed steps run so far.
    pub fn fixed_steps_total(&self) -> u64 {
        self.fixed_steps_total
    }

    /// Unconsumed simulation time in milliseconds.
    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator_ms
    }

    /// Stops accumulation and dispatch until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Re-enables accumulation.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Sets the factor applied to subsequent deltas. Negative values become
    /// 0 and non-finite values become 0.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = sanitize_time_scale(scale);
    }

    /// Current time scale.
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Figures of the last closed perf window.
    pub fn perf_stats(&self) -> PerfStats {
        self.stats
    }

    /// The sanitized configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }
}

impl Default for EngineLoop {
    fn default() -> Self {
        Self::new(LoopConfig::default())
    }
}
