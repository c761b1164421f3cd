//! Systems: world-wide update logic registered under the root entity.
//!
//! Each system declares the kind, phase and order it runs in and what it
//! reads/writes.

use glam::{Quat, Vec3};
use tracing::info;

use crate::query::Query;
use crate::transform::Transform;
use crate::{EntityId, Phase, TickKind, TickResult, World};

/// World-wide update logic with a fixed slot in the dispatch order.
///
/// Registered with [`World::add_system`].
pub trait System: 'static {
    /// Clock driving the system.
    const KIND: TickKind;
    /// Phase the system runs in.
    const PHASE: Phase;
    /// Order bucket within the phase; lower runs first.
    const ORDER: i32 = 0;

    /// Runs once per pass with `dt` in seconds.
    fn update(&mut self, world: &mut World, dt: f64) -> TickResult;
}

/// Constant angular velocity around `axis`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spin {
    /// Rotation axis; need not be normalized. A zero axis disables the spin.
    pub axis: Vec3,
    /// Angular speed; positive is counter-clockwise around `axis`.
    pub radians_per_second: f32,
}

impl Spin {
    /// Creates a spin of `radians_per_second` around `axis`.
    pub fn new(axis: Vec3, radians_per_second: f32) -> Self {
        Self {
            axis,
            radians_per_second,
        }
    }
}

/// Rotates every [`Transform`] carrying a [`Spin`].
///
/// **Runs:** Fixed / Update (reads `Spin`, writes `Transform`).
pub struct SpinSystem {
    query: Query<(Transform, Spin)>,
    pending: Vec<(EntityId, Spin)>,
}

impl SpinSystem {
    /// Creates the system with an empty scratch buffer.
    pub fn new() -> Self {
        Self {
            query: Query::new(),
            pending: Vec::new(),
        }
    }
}

impl Default for SpinSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SpinSystem {
    const KIND: TickKind = TickKind::Fixed;
    const PHASE: Phase = Phase::Update;

    fn update(&mut self, world: &mut World, dt: f64) -> TickResult {
        self.pending.clear();
        self.pending
            .extend(self.query.run(world).map(|(entity, (_, spin))| (entity, *spin)));

        for (entity, spin) in self.pending.drain(..) {
            let Some(axis) = spin.axis.try_normalize() else {
                continue;
            };
            let angle = spin.radians_per_second * dt as f32;
            if let Some(transform) = world.get_mut::<Transform>(entity) {
                transform.rotate(Quat::from_axis_angle(axis, angle));
            }
        }
        Ok(())
    }
}

/// Logs each newly published perf window.
///
/// **Runs:** Frame / Late, last.
#[derive(Debug, Default)]
pub struct PerfLogSystem {
    seen_windows: u64,
}

impl PerfLogSystem {
    /// Creates a system that has logged nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Perf windows logged so far.
    pub fn logged(&self) -> u64 {
        self.seen_windows
    }
}

impl System for PerfLogSystem {
    const KIND: TickKind = TickKind::Frame;
    const PHASE: Phase = Phase::Late;
    const ORDER: i32 = i32::MAX;

    fn update(&mut self, world: &mut World, _dt: f64) -> TickResult {
        let stats = world.perf_stats();
        if stats.windows > self.seen_windows {
            self.seen_windows = stats.windows;
            info!(
                fps = format_args!("{:.1}", stats.fps),
                steps_per_second = format_args!("{:.1}", stats.steps_per_second),
                frame = stats.frame_id,
                "perf"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoopConfig;
    use std::cell::Cell;
    use std::f32::consts::FRAC_PI_2;
    use std::rc::Rc;

    #[test]
    fn test_spin_system_rotates_only_spinning_transforms() {
        let mut world = World::new(LoopConfig {
            fixed_step_ms: 250.0,
            max_frame_dt_ms: 1000.0,
            ..LoopConfig::default()
        });
        let spinning = world.spawn();
        world.insert(spinning, Transform::default()).unwrap();
        world
            .insert(spinning, Spin::new(Vec3::Z, FRAC_PI_2 * 4.0))
            .unwrap();
        let still = world.spawn();
        world.insert(still, Transform::default()).unwrap();
        let no_transform = world.spawn();
        world.insert(no_transform, Spin::new(Vec3::Z, 1.0)).unwrap();

        world.add_system(SpinSystem::new());
        world.tick(250.0);

        let rotated = world.get::<Transform>(spinning).unwrap();
        let expected = Quat::from_rotation_z(FRAC_PI_2);
        assert!(rotated.rotation().angle_between(expected) < 1e-4);
        assert_eq!(rotated.local_version(), 1);
        assert_eq!(world.get::<Transform>(still).unwrap().local_version(), 0);
    }

    #[test]
    fn test_zero_axis_is_ignored() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, Transform::default()).unwrap();
        world.insert(e, Spin::new(Vec3::ZERO, 1.0)).unwrap();
        world.add_system(SpinSystem::new());
        world.tick(100.0);
        assert_eq!(world.get::<Transform>(e).unwrap().local_version(), 0);
    }

    #[test]
    fn test_perf_log_system_tracks_windows() {
        let mut world = World::new(LoopConfig {
            perf_window_ms: 50.0,
            ..LoopConfig::default()
        });
        let logged = Rc::new(Cell::new(0u64));
        let out = Rc::clone(&logged);
        let mut system = PerfLogSystem::new();
        let root = world.root();
        world
            .on_tick(
                root,
                PerfLogSystem::KIND,
                PerfLogSystem::PHASE,
                PerfLogSystem::ORDER,
                move |world, dt| {
                    system.update(world, dt)?;
                    out.set(system.logged());
                    Ok(())
                },
            )
            .unwrap();

        // The third frame closes the first 50 ms window after its phases ran.
        for _ in 0..3 {
            world.tick(20.0);
        }
        assert_eq!(world.perf_stats().windows, 1);
        assert_eq!(logged.get(), 0);

        // Seen on the next frame, once.
        world.tick(20.0);
        assert_eq!(logged.get(), 1);
        world.tick(20.0);
        assert_eq!(logged.get(), 1);

        // Sixth frame closes the second window, seventh logs it.
        world.tick(20.0);
        world.tick(20.0);
        assert_eq!(world.perf_stats().windows, 2);
        assert_eq!(logged.get(), 2);
    }
}
