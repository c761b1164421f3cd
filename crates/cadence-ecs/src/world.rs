//! The world: composition root of entities, components, ticks and the loop.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::engine_loop::{EngineLoop, FrameDriver, FrameReport, LoopConfig, PerfStats};
use crate::query::{Query, QueryData};
use crate::scheduler::{Scheduler, StopHandle};
use crate::service::{Service, Services};
use crate::systems::System;
use crate::ticker::{TickHandle, Ticker};
use crate::transform::{self, ResolveScratch, Transform, Trs};
use crate::{
    Component, ComponentIndex, ComponentKey, ComponentStorage, EntityId, EntityRegistry, Phase,
    TickKind, TickResult, WorldError,
};

/// Owns every entity, component, tick registration and service of one
/// simulation, plus the loop that drives them.
pub struct World {
    entities: EntityRegistry,
    storage: ComponentStorage,
    index: ComponentIndex,
    ticker: Ticker,
    engine: EngineLoop,
    services: Services,
    root: EntityId,
    resolve_scratch: ResolveScratch,
    stop_handle: Option<StopHandle>,
    /// Nesting depth of `run_phase` calls currently on the stack.
    dispatch_depth: u32,
}

impl World {
    /// Creates an empty world with a root entity and the given loop timing.
    pub fn new(config: LoopConfig) -> Self {
        let mut entities = EntityRegistry::new();
        let root = entities.spawn(None);
        Self {
            entities,
            storage: ComponentStorage::new(),
            index: ComponentIndex::new(),
            ticker: Ticker::new(),
            engine: EngineLoop::new(config),
            services: Services::default(),
            root,
            resolve_scratch: ResolveScratch::default(),
            stop_handle: None,
            dispatch_depth: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Entities and hierarchy
    // ---------------------------------------------------------------------

    /// The root entity. Systems are registered under it; it cannot be
    /// despawned or reparented.
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Spawns a top-level entity.
    pub fn spawn(&mut self) -> EntityId {
        self.entities.spawn(None)
    }

    /// Spawns an entity as the last child of `parent`.
    pub fn spawn_child(&mut self, parent: EntityId) -> Result<EntityId, WorldError> {
        self.ensure_alive(parent)?;
        Ok(self.entities.spawn(Some(parent)))
    }

    /// Moves `child` under `parent`, or to the top level for `None`.
    ///
    /// Cached world transforms below `child` are re-derived on the next read.
    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), WorldError> {
        if child == self.root {
            return Err(WorldError::RootEntity);
        }
        self.entities.set_parent(child, parent)
    }

    /// Detaches `child` from its parent.
    pub fn clear_parent(&mut self, child: EntityId) -> Result<(), WorldError> {
        self.set_parent(child, None)
    }

    /// Parent of `entity`.
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.parent(entity)
    }

    /// Children of `entity` in attachment order.
    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        self.entities.children(entity)
    }

    /// Returns `true` if `entity` is alive in this world.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    /// Number of live entities, the root included.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Destroys `entity` and its whole subtree, children first.
    ///
    /// Each destroyed entity leaves the component index, the component
    /// storage and the ticker in one step. Safe to call from inside a tick
    /// callback. Returns the number of entities destroyed.
    pub fn despawn(&mut self, entity: EntityId) -> Result<usize, WorldError> {
        if entity == self.root {
            return Err(WorldError::RootEntity);
        }
        self.ensure_alive(entity)?;

        let doomed = self.entities.subtree_post_order(entity);
        for &victim in &doomed {
            let keys = self.index.remove_entity(victim);
            self.storage.remove_keys(victim, &keys);
            self.ticker.remove_entity(victim);
            self.entities.remove(victim);
        }
        debug!(?entity, count = doomed.len(), "despawned subtree");
        Ok(doomed.len())
    }

    fn ensure_alive(&self, entity: EntityId) -> Result<(), WorldError> {
        if self.entities.contains(entity) {
            Ok(())
        } else {
            Err(WorldError::EntityNotFound(entity))
        }
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    /// Attaches `component` to `entity`, replacing and returning any previous
    /// value of the same type.
    pub fn insert<T: Component>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<Option<T>, WorldError> {
        self.ensure_alive(entity)?;
        self.index
            .register_component(entity, ComponentKey::of::<T>());
        Ok(self.storage.insert(entity, component))
    }

    /// Detaches and returns the `T` of `entity`.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        let removed = self.storage.remove::<T>(entity)?;
        self.index
            .unregister_component(entity, ComponentKey::of::<T>());
        Some(removed)
    }

    /// The `T` of `entity`, if attached.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.storage.get(entity)
    }

    /// Mutable access to the `T` of `entity`, if attached.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storage.get_mut(entity)
    }

    /// Like [`get`](Self::get), but names the entity and type on failure.
    pub fn get_or_err<T: Component>(&self, entity: EntityId) -> Result<&T, WorldError> {
        self.ensure_alive(entity)?;
        self.storage
            .get(entity)
            .ok_or(WorldError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            })
    }

    /// Returns `true` if `entity` carries a `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.index.has(entity, ComponentKey::of::<T>())
    }

    // ---------------------------------------------------------------------
    // Transforms
    // ---------------------------------------------------------------------

    /// World-space transform of `entity`, recomputing only stale links of its
    /// ancestor chain. A second call with no mutation in between returns the
    /// same cached value.
    pub fn get_world_trs(&mut self, entity: EntityId) -> Result<&Trs, WorldError> {
        self.ensure_alive(entity)?;
        let column = self
            .storage
            .column_mut::<Transform>()
            .ok_or(WorldError::MissingComponent {
                entity,
                component: std::any::type_name::<Transform>(),
            })?;
        transform::resolve_world(column, &self.entities, entity, &mut self.resolve_scratch)
    }

    /// Writes the world transform of `entity` interpolated at `alpha` between
    /// the previous and current local states into `out`.
    pub fn get_world_trs_into(
        &mut self,
        entity: EntityId,
        alpha: f32,
        out: &mut Trs,
    ) -> Result<(), WorldError> {
        self.ensure_alive(entity)?;
        let column = self
            .storage
            .column_mut::<Transform>()
            .ok_or(WorldError::MissingComponent {
                entity,
                component: std::any::type_name::<Transform>(),
            })?;
        transform::resolve_world_interpolated(
            column,
            &self.entities,
            entity,
            alpha,
            out,
            &mut self.resolve_scratch,
        )
    }

    /// Copies every transform's local state into its previous snapshot.
    /// Runs automatically at the start of every fixed step.
    pub fn snapshot_transforms(&mut self) {
        if let Some(column) = self.storage.column_mut::<Transform>() {
            transform::snapshot_all(column);
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Defines a query over this world's component types.
    pub fn query<D: QueryData>(&self) -> Query<D> {
        Query::new()
    }

    /// The live entity set.
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// The component index.
    pub fn index(&self) -> &ComponentIndex {
        &self.index
    }

    /// The component storage.
    pub fn storage(&self) -> &ComponentStorage {
        &self.storage
    }

    // ---------------------------------------------------------------------
    // Tick registrations
    // ---------------------------------------------------------------------

    /// Registers `callback` for `entity` under `(kind, phase, order)`.
    ///
    /// The registration first runs on the next pass over that phase, even
    /// when made from inside a callback of the same phase.
    pub fn on_tick<F>(
        &mut self,
        entity: EntityId,
        kind: TickKind,
        phase: Phase,
        order: i32,
        callback: F,
    ) -> Result<TickHandle, WorldError>
    where
        F: FnMut(&mut World, f64) -> TickResult + 'static,
    {
        self.ensure_alive(entity)?;
        Ok(self
            .ticker
            .register(entity, kind, phase, order, Box::new(callback)))
    }

    /// Registers a system under the root entity.
    pub fn add_system<S: System>(&mut self, mut system: S) -> TickHandle {
        debug!(
            system = std::any::type_name::<S>(),
            kind = ?S::KIND,
            phase = ?S::PHASE,
            order = S::ORDER,
            "registering system"
        );
        self.ticker.register(
            self.root,
            S::KIND,
            S::PHASE,
            S::ORDER,
            Box::new(move |world, dt| system.update(world, dt)),
        )
    }

    /// Disposes a registration. Returns `false` if it was already disposed.
    pub fn dispose_tick(&mut self, handle: TickHandle) -> bool {
        self.ticker.dispose(handle)
    }

    /// Suspends or resumes every registration of `entity`.
    pub fn set_node_enabled(&mut self, entity: EntityId, enabled: bool) -> Result<(), WorldError> {
        self.ensure_alive(entity)?;
        self.ticker.set_node_enabled(entity, enabled);
        Ok(())
    }

    /// Suspends or resumes a whole `(kind, phase)`.
    pub fn set_phase_enabled(&mut self, kind: TickKind, phase: Phase, enabled: bool) {
        self.ticker.set_phase_enabled(kind, phase, enabled);
    }

    /// The tick registry, for diagnostics.
    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Runs every registration of `(kind, phase)` once with `dt` in seconds.
    ///
    /// Order buckets run ascending; within a bucket, registration order. An
    /// error returned or a panic raised by a callback is logged and the pass
    /// continues with the next registration.
    pub fn run_phase(&mut self, kind: TickKind, phase: Phase, dt: f64) {
        let started = Instant::now();
        let Some(mut pass) = self.ticker.begin_pass(kind, phase) else {
            return;
        };
        self.dispatch_depth += 1;

        while let Some(mut walk) = self.ticker.next_lane(&mut pass) {
            while let Some(mut taken) = self.ticker.next_runnable(&pass, &mut walk, &self.entities)
            {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (taken.callback)(self, dt)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        error!(entity = ?taken.entity, ?kind, ?phase, %err, "tick callback failed");
                    }
                    Err(payload) => {
                        error!(
                            entity = ?taken.entity,
                            ?kind,
                            ?phase,
                            panic = panic_message(payload.as_ref()),
                            "tick callback panicked"
                        );
                    }
                }
                self.ticker.restore(taken);
            }
            self.ticker.end_lane(&pass);
        }

        self.ticker.end_pass(pass, started.elapsed());
        self.dispatch_depth -= 1;
    }

    // ---------------------------------------------------------------------
    // Loop
    // ---------------------------------------------------------------------

    /// Advances the loop by one wall-clock tick of `raw_delta_ms`.
    ///
    /// Calling this from inside a callback is ignored.
    pub fn tick(&mut self, raw_delta_ms: f64) -> FrameReport {
        if self.dispatch_depth > 0 || self.engine.current_kind().is_some() {
            warn!("World::tick called during phase dispatch, ignored");
            return FrameReport::default();
        }
        EngineLoop::run_frame(self, raw_delta_ms)
    }

    /// Drives [`tick`](Self::tick) from `scheduler` until it is exhausted or
    /// stopped.
    pub fn run(&mut self, scheduler: &mut dyn Scheduler) {
        self.stop_handle = Some(scheduler.stop_handle());
        scheduler.start(&mut |delta_ms| {
            self.tick(delta_ms);
        });
    }

    /// Stops the scheduler passed to [`run`](Self::run) after the current
    /// tick.
    pub fn stop(&self) {
        if let Some(handle) = &self.stop_handle {
            handle.stop();
        }
    }

    /// Suspends time accumulation and dispatch.
    pub fn pause(&mut self) {
        self.engine.pause();
    }

    /// Resumes after [`pause`](Self::pause).
    pub fn resume(&mut self) {
        self.engine.resume();
    }

    /// Scales subsequent deltas.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.engine.set_time_scale(scale);
    }

    /// Interpolation alpha while a frame phase runs, 0 otherwise.
    pub fn alpha(&self) -> f64 {
        self.engine.alpha()
    }

    /// Frames advanced so far.
    pub fn frame_id(&self) -> u64 {
        self.engine.frame_id()
    }

    /// Last published perf window.
    pub fn perf_stats(&self) -> PerfStats {
        self.engine.perf_stats()
    }

    /// The loop state.
    pub fn engine_loop(&self) -> &EngineLoop {
        &self.engine
    }

    // ---------------------------------------------------------------------
    // Services
    // ---------------------------------------------------------------------

    /// Attaches `service`, calling its `attach` hook first.
    pub fn add_service<S: Service>(&mut self, mut service: S) -> Result<(), WorldError> {
        if self.services.contains::<S>() {
            return Err(WorldError::DuplicateService(std::any::type_name::<S>()));
        }
        service.attach(self);
        self.services.insert(service);
        debug!(service = std::any::type_name::<S>(), "service attached");
        Ok(())
    }

    /// Looks up an attached service.
    pub fn service<S: Service>(&self) -> Result<&S, WorldError> {
        self.services
            .get::<S>()
            .ok_or(WorldError::MissingService(std::any::type_name::<S>()))
    }

    /// Looks up an attached service mutably.
    pub fn service_mut<S: Service>(&mut self) -> Result<&mut S, WorldError> {
        self.services
            .get_mut::<S>()
            .ok_or(WorldError::MissingService(std::any::type_name::<S>()))
    }

    /// Returns `true` if an `S` is attached.
    pub fn has_service<S: Service>(&self) -> bool {
        self.services.contains::<S>()
    }

    /// Detaches and returns a service, calling its `detach` hook.
    pub fn remove_service<S: Service>(&mut self) -> Result<S, WorldError> {
        let mut service = self
            .services
            .remove::<S>()
            .ok_or(WorldError::MissingService(std::any::type_name::<S>()))?;
        service.detach(self);
        debug!(service = std::any::type_name::<S>(), "service detached");
        Ok(service)
    }

    /// Runs `f` with the world and the service `S` borrowed mutably at once.
    ///
    /// The service is absent from lookups while `f` runs and is put back
    /// even if `f` panics; the panic then continues unwinding.
    pub fn service_scope<S: Service, R>(
        &mut self,
        f: impl FnOnce(&mut World, &mut S) -> R,
    ) -> Result<R, WorldError> {
        let mut service = self
            .services
            .take::<S>()
            .ok_or(WorldError::MissingService(std::any::type_name::<S>()))?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self, &mut service)));
        self.services.put_back(service);
        match outcome {
            Ok(result) => Ok(result),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Number of attached services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Detaches every service, most recently attached first.
    pub fn shutdown(&mut self) {
        while let Some((name, service, detach)) = self.services.pop() {
            detach(service, self);
            debug!(service = name, "service detached on shutdown");
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(LoopConfig::default())
    }
}

impl FrameDriver for World {
    fn engine_loop(&mut self) -> &mut EngineLoop {
        &mut self.engine
    }

    fn run_phase(&mut self, kind: TickKind, phase: Phase, dt: f64) {
        World::run_phase(self, kind, phase, dt);
    }

    fn before_fixed_step(&mut self) {
        self.snapshot_transforms();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[derive(Debug, PartialEq)]
    struct Health(u32);

    #[test]
    fn test_new_world_has_only_root() {
        let world = World::default();
        assert_eq!(world.entity_count(), 1);
        assert!(world.is_alive(world.root()));
        assert_eq!(world.frame_id(), 0);
    }

    #[test]
    fn test_insert_registers_in_index() {
        let mut world = World::default();
        let e = world.spawn();
        assert_eq!(world.insert(e, Health(3)).unwrap(), None);
        assert!(world.has::<Health>(e));
        assert_eq!(world.insert(e, Health(4)).unwrap(), Some(Health(3)));
        assert_eq!(world.get::<Health>(e), Some(&Health(4)));

        assert_eq!(world.remove::<Health>(e), Some(Health(4)));
        assert!(!world.has::<Health>(e));
        assert_eq!(world.remove::<Health>(e), None);
    }

    #[test]
    fn test_operations_on_dead_entities_fail() {
        let mut world = World::default();
        let e = world.spawn();
        world.despawn(e).unwrap();

        assert_eq!(world.insert(e, Health(1)), Err(WorldError::EntityNotFound(e)));
        assert_eq!(world.despawn(e), Err(WorldError::EntityNotFound(e)));
        assert!(matches!(
            world.on_tick(e, TickKind::Frame, Phase::Update, 0, |_, _| Ok(())),
            Err(WorldError::EntityNotFound(_))
        ));
        assert!(matches!(world.spawn_child(e), Err(WorldError::EntityNotFound(_))));
    }

    #[test]
    fn test_get_or_err_names_missing_type() {
        let mut world = World::default();
        let e = world.spawn();
        match world.get_or_err::<Health>(e) {
            Err(WorldError::MissingComponent { entity, component }) => {
                assert_eq!(entity, e);
                assert!(component.ends_with("Health"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_despawn_is_recursive_and_cleans_everything() {
        let mut world = World::default();
        let parent = world.spawn();
        let child = world.spawn_child(parent).unwrap();
        let grandchild = world.spawn_child(child).unwrap();
        for e in [parent, child, grandchild] {
            world.insert(e, Health(1)).unwrap();
            world
                .on_tick(e, TickKind::Fixed, Phase::Update, 0, |_, _| Ok(()))
                .unwrap();
        }
        assert_eq!(world.ticker().registration_count(), 3);

        assert_eq!(world.despawn(parent).unwrap(), 3);
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.ticker().registration_count(), 0);
        assert_eq!(world.index().candidate_count(ComponentKey::of::<Health>()), 0);
        assert_eq!(world.storage().count_of(ComponentKey::of::<Health>()), 0);
    }

    #[test]
    fn test_root_is_protected() {
        let mut world = World::default();
        let root = world.root();
        let other = world.spawn();
        assert_eq!(world.despawn(root), Err(WorldError::RootEntity));
        assert_eq!(world.set_parent(root, Some(other)), Err(WorldError::RootEntity));
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut world = World::default();
        let a = world.spawn();
        let b = world.spawn_child(a).unwrap();
        assert_eq!(
            world.set_parent(a, Some(b)),
            Err(WorldError::HierarchyCycle { child: a, parent: b })
        );
        assert_eq!(world.parent(b), Some(a));

        world.clear_parent(b).unwrap();
        assert_eq!(world.parent(b), None);
        assert!(world.children(a).is_empty());
    }

    #[test]
    fn test_reparenting_refreshes_world_transform() {
        let mut world = World::default();
        let left = world.spawn();
        let right = world.spawn();
        let child = world.spawn();
        world
            .insert(left, Transform::from_translation(Vec3::new(-5.0, 0.0, 0.0)))
            .unwrap();
        world
            .insert(right, Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        world
            .insert(child, Transform::from_translation(Vec3::Y))
            .unwrap();

        world.set_parent(child, Some(left)).unwrap();
        assert_eq!(
            world.get_world_trs(child).unwrap().translation,
            Vec3::new(-5.0, 1.0, 0.0)
        );
        world.set_parent(child, Some(right)).unwrap();
        assert_eq!(
            world.get_world_trs(child).unwrap().translation,
            Vec3::new(5.0, 1.0, 0.0)
        );
        world.clear_parent(child).unwrap();
        assert_eq!(world.get_world_trs(child).unwrap().translation, Vec3::Y);
    }

    #[test]
    fn test_world_trs_without_transform_is_missing_component() {
        let mut world = World::default();
        let e = world.spawn();
        assert!(matches!(
            world.get_world_trs(e),
            Err(WorldError::MissingComponent { .. })
        ));
    }

    #[derive(Default)]
    struct Counter {
        attached: u32,
        detached: u32,
    }

    impl Service for Counter {
        fn attach(&mut self, _world: &mut World) {
            self.attached += 1;
        }

        fn detach(&mut self, _world: &mut World) {
            self.detached += 1;
        }
    }

    struct Never;
    impl Service for Never {}

    #[test]
    fn test_service_lifecycle() {
        let mut world = World::default();
        world.add_service(Counter::default()).unwrap();
        assert_eq!(world.service::<Counter>().unwrap().attached, 1);
        assert!(matches!(
            world.add_service(Counter::default()),
            Err(WorldError::DuplicateService(_))
        ));

        let counter = world.remove_service::<Counter>().unwrap();
        assert_eq!((counter.attached, counter.detached), (1, 1));
        assert!(!world.has_service::<Counter>());
    }

    #[test]
    fn test_missing_service_fails_fast() {
        let world = World::default();
        match world.service::<Never>() {
            Err(WorldError::MissingService(name)) => assert!(name.ends_with("Never")),
            _ => panic!("expected MissingService"),
        }
    }

    #[test]
    fn test_service_scope_lends_world_and_service() {
        let mut world = World::default();
        world.add_service(Counter::default()).unwrap();
        let spawned = world
            .service_scope::<Counter, _>(|world, counter| {
                assert!(!world.has_service::<Counter>());
                counter.attached += 10;
                world.spawn()
            })
            .unwrap();
        assert!(world.is_alive(spawned));
        assert_eq!(world.service::<Counter>().unwrap().attached, 11);
    }

    #[test]
    fn test_service_scope_restores_service_after_panic() {
        let mut world = World::default();
        world.add_service(Counter::default()).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            world.service_scope::<Counter, ()>(|_, counter| {
                counter.attached += 1;
                panic!("scope blew up");
            })
        }));
        assert!(outcome.is_err());

        let counter = world.service::<Counter>().unwrap();
        assert_eq!((counter.attached, counter.detached), (2, 0));
        assert_eq!(world.service_count(), 1);
        let counter = world.remove_service::<Counter>().unwrap();
        assert_eq!(counter.detached, 1);
    }

    #[test]
    fn test_shutdown_detaches_everything() {
        let mut world = World::default();
        world.add_service(Counter::default()).unwrap();
        world.add_service(Never).unwrap();
        assert_eq!(world.service_count(), 2);
        world.shutdown();
        assert_eq!(world.service_count(), 0);
    }
}
