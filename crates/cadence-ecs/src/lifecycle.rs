//! Deferred structural changes: spawn and despawn queues.
//!
//! Callbacks may spawn and despawn directly, but queueing lets a phase finish
//! over a stable entity set and applies all structural changes at one point,
//! typically [`FlushEntityQueues`] at the end of each fixed step.

use tracing::{debug, warn};

use crate::service::Service;
use crate::systems::System;
use crate::{EntityId, Phase, TickKind, TickResult, World, WorldError};

/// Builds a freshly spawned entity (attaches components, registers ticks).
type SpawnFn = Box<dyn FnOnce(&mut World, EntityId) -> Result<(), WorldError>>;

struct SpawnRequest {
    parent: Option<EntityId>,
    build: SpawnFn,
}

/// Spawn requests applied on the next flush.
#[derive(Default)]
pub struct SpawnQueue {
    pending: Vec<SpawnRequest>,
}

impl SpawnQueue {
    /// Queues a top-level entity built by `build`.
    pub fn enqueue<F>(&mut self, build: F)
    where
        F: FnOnce(&mut World, EntityId) -> Result<(), WorldError> + 'static,
    {
        self.pending.push(SpawnRequest {
            parent: None,
            build: Box::new(build),
        });
    }

    /// Queues a child of `parent`. Dropped if `parent` is dead at flush time.
    pub fn enqueue_child<F>(&mut self, parent: EntityId, build: F)
    where
        F: FnOnce(&mut World, EntityId) -> Result<(), WorldError> + 'static,
    {
        self.pending.push(SpawnRequest {
            parent: Some(parent),
            build: Box::new(build),
        });
    }

    /// Returns the number of pending spawn requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if there are no pending spawn requests.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Service for SpawnQueue {}

/// Entities to despawn on the next flush.
#[derive(Debug, Default)]
pub struct DespawnQueue {
    pending: Vec<EntityId>,
}

impl DespawnQueue {
    /// Queues `entity` (and its subtree). Duplicates are harmless.
    pub fn enqueue(&mut self, entity: EntityId) {
        self.pending.push(entity);
    }

    /// Returns the number of pending despawn requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if there are no pending despawn requests.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Service for DespawnQueue {}

/// Applies every pending spawn. Returns the ids of the new entities.
///
/// Requests queued while flushing are kept for the next flush. A failing
/// build despawns its half-built entity.
pub fn flush_spawn_queue(world: &mut World) -> Result<Vec<EntityId>, WorldError> {
    let requests = std::mem::take(&mut world.service_mut::<SpawnQueue>()?.pending);
    let mut spawned = Vec::with_capacity(requests.len());
    for request in requests {
        let entity = match request.parent {
            Some(parent) => match world.spawn_child(parent) {
                Ok(entity) => entity,
                Err(err) => {
                    debug!(%err, "dropping queued spawn");
                    continue;
                }
            },
            None => world.spawn(),
        };
        match (request.build)(world, entity) {
            Ok(()) => spawned.push(entity),
            Err(err) => {
                warn!(%err, "queued spawn failed to build");
                if world.is_alive(entity) {
                    world.despawn(entity)?;
                }
            }
        }
    }
    Ok(spawned)
}

/// Despawns every queued entity. Returns how many entities were destroyed,
/// descendants included; already dead entries are skipped.
pub fn flush_despawn_queue(world: &mut World) -> Result<usize, WorldError> {
    let pending = std::mem::take(&mut world.service_mut::<DespawnQueue>()?.pending);
    let mut destroyed = 0;
    for entity in pending {
        if world.is_alive(entity) {
            destroyed += world.despawn(entity)?;
        }
    }
    Ok(destroyed)
}

/// Flushes spawns, then despawns, for whichever queues are attached.
pub fn flush_entity_queues(world: &mut World) -> Result<(), WorldError> {
    if world.has_service::<SpawnQueue>() {
        flush_spawn_queue(world)?;
    }
    if world.has_service::<DespawnQueue>() {
        flush_despawn_queue(world)?;
    }
    Ok(())
}

/// Applies both queues at the end of each fixed step.
///
/// **Runs:** Fixed / Late, last.
#[derive(Debug, Default)]
pub struct FlushEntityQueues;

impl System for FlushEntityQueues {
    const KIND: TickKind = TickKind::Fixed;
    const PHASE: Phase = Phase::Late;
    const ORDER: i32 = i32::MAX;

    fn update(&mut self, world: &mut World, _dt: f64) -> TickResult {
        flush_entity_queues(world)?;
        Ok(())
    }
}
