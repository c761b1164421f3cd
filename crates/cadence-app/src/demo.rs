//! Demo world: a spinning hub with orbiting arms that periodically shed
//! short-lived debris.
//!
//! Exercises every moving part of the core: systems in both kinds, ordered
//! per-entity callbacks, the spawn/despawn queues, hierarchical transforms and
//! frame interpolation.

use std::f32::consts::TAU;

use cadence_config::Config;
use cadence_ecs::{
    DespawnQueue, EntityId, FlushEntityQueues, PerfLogSystem, PerfStats, Phase, Query, Scheduler,
    SpawnQueue, Spin, SpinSystem, System, TickKind, TickResult, Transform, Trs, World, WorldError,
};
use glam::Vec3;
use tracing::{debug, info};

use crate::loop_config;

/// Number of arms attached to the hub.
pub const ARM_COUNT: usize = 3;

/// Sheds a debris child every `every_steps` fixed steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emitter {
    /// Fixed steps between two emissions.
    pub every_steps: u32,
    /// Lifetime given to each emitted child, in fixed steps.
    pub lifetime_steps: u32,
    counter: u32,
}

impl Emitter {
    /// Creates an emitter; `every_steps` is raised to at least 1.
    pub fn new(every_steps: u32, lifetime_steps: u32) -> Self {
        Self {
            every_steps: every_steps.max(1),
            lifetime_steps,
            counter: 0,
        }
    }
}

/// Remaining fixed steps before the entity is despawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    /// Fixed steps until expiry; the entity is queued for despawn at 0.
    pub steps_left: u32,
}

/// Interpolated world position of a tracked entity, refreshed every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackedPose {
    /// World position at the frame's interpolation alpha.
    pub position: Vec3,
    /// Frames sampled so far.
    pub samples: u64,
}

/// Queues debris for every [`Emitter`] whose period elapsed.
///
/// **Runs:** Fixed / Update, before [`SpinSystem`] (writes `Emitter`, queues spawns).
#[derive(Default)]
pub struct EmitterSystem {
    query: Query<(Emitter,)>,
    due: Vec<(EntityId, u32)>,
}

impl System for EmitterSystem {
    const KIND: TickKind = TickKind::Fixed;
    const PHASE: Phase = Phase::Update;
    const ORDER: i32 = -10;

    fn update(&mut self, world: &mut World, _dt: f64) -> TickResult {
        self.due.clear();
        for entity in self.query.entities(world) {
            let Some(emitter) = world.get_mut::<Emitter>(entity) else {
                continue;
            };
            emitter.counter += 1;
            if emitter.counter % emitter.every_steps == 0 {
                self.due.push((entity, emitter.lifetime_steps));
            }
        }

        let queue = world.service_mut::<SpawnQueue>()?;
        for &(parent, steps_left) in &self.due {
            queue.enqueue_child(parent, move |world, debris| {
                world.insert(debris, Transform::from_translation(Vec3::new(0.0, 0.5, 0.0)))?;
                world.insert(debris, Spin::new(Vec3::X, TAU))?;
                world.insert(debris, Lifetime { steps_left })?;
                Ok(())
            });
        }
        Ok(())
    }
}

/// Counts down every [`Lifetime`] and queues expired entities for despawn.
///
/// **Runs:** Fixed / Early (writes `Lifetime`, queues despawns).
#[derive(Default)]
pub struct LifetimeSystem {
    query: Query<(Lifetime,)>,
}

impl System for LifetimeSystem {
    const KIND: TickKind = TickKind::Fixed;
    const PHASE: Phase = Phase::Early;

    fn update(&mut self, world: &mut World, _dt: f64) -> TickResult {
        let mut expired = Vec::new();
        for entity in self.query.entities(world) {
            if let Some(lifetime) = world.get_mut::<Lifetime>(entity) {
                lifetime.steps_left = lifetime.steps_left.saturating_sub(1);
                if lifetime.steps_left == 0 {
                    expired.push(entity);
                }
            }
        }
        let queue = world.service_mut::<DespawnQueue>()?;
        for entity in expired {
            queue.enqueue(entity);
        }
        Ok(())
    }
}

/// Handles to the interesting entities of the demo world.
#[derive(Debug, Clone)]
pub struct DemoScene {
    /// Spinning top-level entity that emits debris.
    pub hub: EntityId,
    /// Children of the hub; the first one carries a [`TrackedPose`].
    pub arms: Vec<EntityId>,
}

/// Builds the demo world for `config`.
pub fn build_demo_world(config: &Config) -> Result<(World, DemoScene), WorldError> {
    let mut world = World::new(loop_config(&config.engine));
    world.add_service(SpawnQueue::default())?;
    world.add_service(DespawnQueue::default())?;

    let hub = world.spawn();
    world.insert(hub, Transform::default())?;
    world.insert(hub, Spin::new(Vec3::Y, 0.5))?;
    world.insert(hub, Emitter::new(30, 90))?;

    let mut arms = Vec::with_capacity(ARM_COUNT);
    for i in 0..ARM_COUNT {
        let arm = world.spawn_child(hub)?;
        let angle = TAU * i as f32 / ARM_COUNT as f32;
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * 4.0;
        world.insert(arm, Transform::from_translation(offset))?;
        world.insert(arm, Spin::new(Vec3::Z, 2.0))?;
        arms.push(arm);
    }

    // The first arm reports its interpolated pose once per frame.
    let tracked = arms[0];
    world.insert(tracked, TrackedPose::default())?;
    world.on_tick(tracked, TickKind::Frame, Phase::Late, 0, move |world, _| {
        let alpha = world.alpha() as f32;
        let mut pose = Trs::IDENTITY;
        world.get_world_trs_into(tracked, alpha, &mut pose)?;
        if let Some(tracked_pose) = world.get_mut::<TrackedPose>(tracked) {
            tracked_pose.position = pose.translation;
            tracked_pose.samples += 1;
        }
        Ok(())
    })?;

    world.add_system(LifetimeSystem::default());
    world.add_system(EmitterSystem::default());
    world.add_system(SpinSystem::new());
    world.add_system(FlushEntityQueues);
    if config.debug.log_perf {
        world.add_system(PerfLogSystem::new());
    }

    debug!(entities = world.entity_count(), "demo world built");
    Ok((world, DemoScene { hub, arms }))
}

/// What a demo run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoSummary {
    /// Frames advanced since the world was built.
    pub frames: u64,
    /// Fixed steps run since the world was built.
    pub fixed_steps: u64,
    /// Live entities at the end of the run, the root included.
    pub entities: usize,
    /// Last published perf window.
    pub perf: PerfStats,
}

/// Runs `world` on `scheduler` until it stops and summarizes the run.
pub fn run_demo(world: &mut World, scheduler: &mut dyn Scheduler) -> DemoSummary {
    world.run(scheduler);
    let summary = DemoSummary {
        frames: world.frame_id(),
        fixed_steps: world.engine_loop().fixed_steps_total(),
        entities: world.entity_count(),
        perf: world.perf_stats(),
    };
    info!(
        frames = summary.frames,
        fixed_steps = summary.fixed_steps,
        entities = summary.entities,
        "demo finished"
    );
    summary
}
