//! Tick registry: ordered, per-entity update callbacks.
//!
//! Registrations are filed under `(kind, phase, order)`. Each such triple owns
//! a *lane*, an intrusive doubly linked list threaded through a generational
//! slot arena, so registering and disposing are O(1) and never compact an
//! array. Lanes of one `(kind, phase)` are kept in ascending order.
//!
//! A pass over a lane snapshots the lane tail as its boundary before walking,
//! and skips anything registered after the pass began. Callbacks registered
//! mid-pass therefore first run on the next invocation of that phase.
//! Registrations disposed while their own lane is being walked stay linked
//! (inactive) until the walk finishes, so the walker never follows a freed
//! link.
//!
//! The walking itself lives in [`World::run_phase`](crate::World::run_phase),
//! because callbacks receive `&mut World`.

use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::schedule::{PHASE_SLOTS, phase_slot};
use crate::{EntityId, EntityRegistry, Phase, TickKind, TickResult, World};

/// Update callback: receives the world and the step's `dt` in seconds.
pub type TickFn = dyn FnMut(&mut World, f64) -> TickResult;

slotmap::new_key_type! {
    struct TickId;
}

/// Disposal handle returned by [`Ticker::register`].
///
/// Disposing through [`Ticker::dispose`] is idempotent: the first call
/// unlinks the registration, later calls do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(TickId);

struct TickNode {
    entity: EntityId,
    kind: TickKind,
    phase: Phase,
    order: i32,
    /// Registration serial, compared against a pass's start serial.
    serial: u64,
    active: bool,
    /// Taken out while the callback runs.
    callback: Option<Box<TickFn>>,
    prev: Option<TickId>,
    next: Option<TickId>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Lane {
    head: Option<TickId>,
    tail: Option<TickId>,
}

#[derive(Default)]
struct PhaseTable {
    /// Ascending order keys; every key has an entry in `lanes`.
    orders: Vec<i32>,
    lanes: FxHashMap<i32, Lane>,
    disabled: bool,
    /// Set while a pass over this `(kind, phase)` is running.
    running: bool,
    /// Lane currently being walked.
    walking: Option<i32>,
    last_elapsed: Duration,
}

impl PhaseTable {
    fn lane_mut(&mut self, order: i32) -> &mut Lane {
        if !self.lanes.contains_key(&order) {
            let at = self.orders.partition_point(|o| *o < order);
            self.orders.insert(at, order);
            debug!(order, "created tick lane");
        }
        self.lanes.entry(order).or_default()
    }

    fn next_order_after(&self, order: Option<i32>) -> Option<i32> {
        let at = match order {
            Some(o) => self.orders.partition_point(|k| *k <= o),
            None => 0,
        };
        self.orders.get(at).copied()
    }
}

/// State of one pass over a `(kind, phase)`.
pub(crate) struct PhasePass {
    kind: TickKind,
    phase: Phase,
    /// Registrations with a serial at or above this were added mid-pass.
    start_serial: u64,
    order: Option<i32>,
}

/// Cursor over one lane, bounded by the tail snapshotted when the walk began.
pub(crate) struct LaneWalk {
    next: Option<TickId>,
    boundary: Option<TickId>,
    done: bool,
}

/// A callback taken out of its registration for invocation.
pub(crate) struct TakenCallback {
    id: TickId,
    pub(crate) entity: EntityId,
    pub(crate) callback: Box<TickFn>,
}

/// Registration table of update callbacks.
#[derive(Default)]
pub struct Ticker {
    nodes: SlotMap<TickId, TickNode>,
    tables: [PhaseTable; PHASE_SLOTS],
    by_entity: FxHashMap<EntityId, Vec<TickId>>,
    disabled_entities: FxHashSet<EntityId>,
    /// Disposed while their lane was being walked, tagged with the phase
    /// slot; unlinked when that walk ends.
    deferred: Vec<(usize, TickId)>,
    next_serial: u64,
}

impl Ticker {
    /// Creates an empty ticker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the tail of the `(kind, phase, order)` lane.
    pub fn register(
        &mut self,
        entity: EntityId,
        kind: TickKind,
        phase: Phase,
        order: i32,
        callback: Box<TickFn>,
    ) -> TickHandle {
        let serial = self.next_serial;
        self.next_serial += 1;

        let table = &mut self.tables[phase_slot(kind, phase)];
        let old_tail = table.lane_mut(order).tail;
        let id = self.nodes.insert(TickNode {
            entity,
            kind,
            phase,
            order,
            serial,
            active: true,
            callback: Some(callback),
            prev: old_tail,
            next: None,
        });

        if let Some(tail) = old_tail
            && let Some(node) = self.nodes.get_mut(tail)
        {
            node.next = Some(id);
        }
        let lane = table.lane_mut(order);
        if lane.head.is_none() {
            lane.head = Some(id);
        }
        lane.tail = Some(id);

        self.by_entity.entry(entity).or_default().push(id);
        TickHandle(id)
    }

    /// Disposes a registration. Returns `true` on the first call for a handle
    /// and `false` for every later call.
    pub fn dispose(&mut self, handle: TickHandle) -> bool {
        let id = handle.0;
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !node.active {
            return false;
        }
        node.active = false;
        let (kind, phase, order) = (node.kind, node.phase, node.order);

        let slot = phase_slot(kind, phase);
        if self.tables[slot].walking == Some(order) {
            self.deferred.push((slot, id));
        } else {
            self.unlink(id);
        }
        true
    }

    /// Returns `true` while the registration has not been disposed.
    pub fn is_active(&self, handle: TickHandle) -> bool {
        self.nodes.get(handle.0).is_some_and(|n| n.active)
    }

    /// Disposes every registration owned by `entity`. Returns how many were
    /// disposed.
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        self.disabled_entities.remove(&entity);
        let ids = self.by_entity.remove(&entity).unwrap_or_default();
        ids.into_iter()
            .filter(|id| self.dispose(TickHandle(*id)))
            .count()
    }

    /// Suspends or resumes every registration of `entity` without disposing.
    pub fn set_node_enabled(&mut self, entity: EntityId, enabled: bool) {
        if enabled {
            self.disabled_entities.remove(&entity);
        } else {
            self.disabled_entities.insert(entity);
        }
    }

    /// Returns `false` if `entity` was suspended via [`set_node_enabled`](Self::set_node_enabled).
    pub fn is_node_enabled(&self, entity: EntityId) -> bool {
        !self.disabled_entities.contains(&entity)
    }

    /// Suspends or resumes a whole `(kind, phase)`.
    pub fn set_phase_enabled(&mut self, kind: TickKind, phase: Phase, enabled: bool) {
        self.tables[phase_slot(kind, phase)].disabled = !enabled;
    }

    /// Returns `false` if the `(kind, phase)` is administratively disabled.
    pub fn is_phase_enabled(&self, kind: TickKind, phase: Phase) -> bool {
        !self.tables[phase_slot(kind, phase)].disabled
    }

    /// Wall time spent in the most recent pass over `(kind, phase)`.
    pub fn phase_elapsed(&self, kind: TickKind, phase: Phase) -> Duration {
        self.tables[phase_slot(kind, phase)].last_elapsed
    }

    /// Number of active registrations.
    pub fn registration_count(&self) -> usize {
        self.nodes.values().filter(|n| n.active).count()
    }

    /// Order keys of `(kind, phase)` in execution order.
    pub fn orders(&self, kind: TickKind, phase: Phase) -> &[i32] {
        &self.tables[phase_slot(kind, phase)].orders
    }

    // ---------------------------------------------------------------------
    // Pass protocol driven by `World::run_phase`
    // ---------------------------------------------------------------------

    /// Starts a pass. Returns `None` (recording zero elapsed time) when the
    /// phase is disabled, and `None` for a re-entrant pass over a phase that
    /// is already running.
    pub(crate) fn begin_pass(&mut self, kind: TickKind, phase: Phase) -> Option<PhasePass> {
        let table = &mut self.tables[phase_slot(kind, phase)];
        if table.disabled {
            table.last_elapsed = Duration::ZERO;
            return None;
        }
        if table.running {
            warn!(?kind, ?phase, "re-entrant phase dispatch ignored");
            return None;
        }
        table.running = true;
        Some(PhasePass {
            kind,
            phase,
            start_serial: self.next_serial,
            order: None,
        })
    }

    /// Moves the pass to the next order bucket and snapshots its boundary.
    pub(crate) fn next_lane(&mut self, pass: &mut PhasePass) -> Option<LaneWalk> {
        let table = &mut self.tables[phase_slot(pass.kind, pass.phase)];
        let order = table.next_order_after(pass.order)?;
        pass.order = Some(order);
        table.walking = Some(order);
        let lane = table.lanes.get(&order).copied().unwrap_or_default();
        Some(LaneWalk {
            next: lane.head,
            boundary: lane.tail,
            done: lane.head.is_none(),
        })
    }

    /// Advances `walk` to the next registration that should run, pruning
    /// disposed registrations and those of dead entities on the way, and takes
    /// its callback out.
    pub(crate) fn next_runnable(
        &mut self,
        pass: &PhasePass,
        walk: &mut LaneWalk,
        live: &EntityRegistry,
    ) -> Option<TakenCallback> {
        while !walk.done {
            let Some(id) = walk.next else {
                walk.done = true;
                break;
            };
            let Some(node) = self.nodes.get_mut(id) else {
                walk.done = true;
                break;
            };
            walk.done = walk.boundary == Some(id);
            walk.next = node.next;

            if !node.active || !live.contains(node.entity) {
                // Already behind the cursor, safe to free now.
                self.unlink(id);
                continue;
            }
            if node.serial >= pass.start_serial || self.disabled_entities.contains(&node.entity) {
                continue;
            }
            if let Some(callback) = node.callback.take() {
                return Some(TakenCallback {
                    id,
                    entity: node.entity,
                    callback,
                });
            }
        }
        None
    }

    /// Puts a callback back after it ran.
    pub(crate) fn restore(&mut self, taken: TakenCallback) {
        if let Some(node) = self.nodes.get_mut(taken.id) {
            node.callback = Some(taken.callback);
        }
    }

    /// Finishes the lane walk and unlinks registrations disposed during it.
    pub(crate) fn end_lane(&mut self, pass: &PhasePass) {
        let slot = phase_slot(pass.kind, pass.phase);
        self.tables[slot].walking = None;
        // A nested pass over another phase must leave our pending entries alone.
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(owner, _)| *owner == slot);
        self.deferred = pending;
        for (_, id) in ready {
            self.unlink(id);
        }
    }

    /// Finishes the pass and records its wall time.
    pub(crate) fn end_pass(&mut self, pass: PhasePass, elapsed: Duration) {
        let table = &mut self.tables[phase_slot(pass.kind, pass.phase)];
        table.running = false;
        table.walking = None;
        table.last_elapsed = elapsed;
    }

    /// Removes a node from its lane and from the arena.
    fn unlink(&mut self, id: TickId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(prev) = node.prev
            && let Some(p) = self.nodes.get_mut(prev)
        {
            p.next = node.next;
        }
        if let Some(next) = node.next
            && let Some(n) = self.nodes.get_mut(next)
        {
            n.prev = node.prev;
        }

        let table = &mut self.tables[phase_slot(node.kind, node.phase)];
        if let Some(lane) = table.lanes.get_mut(&node.order) {
            if lane.head == Some(id) {
                lane.head = node.next;
            }
            if lane.tail == Some(id) {
                lane.tail = node.prev;
            }
        }

        if let Some(ids) = self.by_entity.get_mut(&node.entity) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_entity.remove(&node.entity);
            }
        }
    }

    /// Entities-in-lane order, for tests.
    #[cfg(test)]
    fn lane_entities(&self, kind: TickKind, phase: Phase, order: i32) -> Vec<EntityId> {
        let table = &self.tables[phase_slot(kind, phase)];
        let mut out = Vec::new();
        let mut cursor = table.lanes.get(&order).and_then(|l| l.head);
        while let Some(id) = cursor {
            let node = &self.nodes[id];
            out.push(node.entity);
            cursor = node.next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Box<TickFn> {
        Box::new(|_, _| Ok(()))
    }

    fn entities(n: usize) -> (EntityRegistry, Vec<EntityId>) {
        let mut reg = EntityRegistry::new();
        let ids = (0..n).map(|_| reg.spawn(None)).collect();
        (reg, ids)
    }

    #[test]
    fn test_orders_are_kept_sorted() {
        let (_, ids) = entities(1);
        let mut ticker = Ticker::new();
        for order in [5, -3, 10, 0, 5, 7] {
            ticker.register(ids[0], TickKind::Frame, Phase::Update, order, noop());
        }
        assert_eq!(
            ticker.orders(TickKind::Frame, Phase::Update),
            &[-3, 0, 5, 7, 10]
        );
        assert!(ticker.orders(TickKind::Fixed, Phase::Update).is_empty());
    }

    #[test]
    fn test_lane_preserves_registration_order() {
        let (_, ids) = entities(3);
        let mut ticker = Ticker::new();
        for &e in &ids {
            ticker.register(e, TickKind::Fixed, Phase::Early, 0, noop());
        }
        assert_eq!(ticker.lane_entities(TickKind::Fixed, Phase::Early, 0), ids);
    }

    #[test]
    fn test_dispose_is_idempotent_and_relinks_neighbours() {
        let (_, ids) = entities(3);
        let mut ticker = Ticker::new();
        let handles: Vec<_> = ids
            .iter()
            .map(|&e| ticker.register(e, TickKind::Frame, Phase::Late, 0, noop()))
            .collect();

        assert!(ticker.dispose(handles[1]));
        assert!(!ticker.dispose(handles[1]));
        assert!(!ticker.is_active(handles[1]));
        assert_eq!(
            ticker.lane_entities(TickKind::Frame, Phase::Late, 0),
            vec![ids[0], ids[2]]
        );

        // Head and tail removal.
        assert!(ticker.dispose(handles[0]));
        assert!(ticker.dispose(handles[2]));
        assert!(ticker.lane_entities(TickKind::Frame, Phase::Late, 0).is_empty());
        assert_eq!(ticker.registration_count(), 0);

        // A lane emptied this way accepts new registrations.
        ticker.register(ids[0], TickKind::Frame, Phase::Late, 0, noop());
        assert_eq!(
            ticker.lane_entities(TickKind::Frame, Phase::Late, 0),
            vec![ids[0]]
        );
    }

    #[test]
    fn test_remove_entity_disposes_all_its_registrations() {
        let (_, ids) = entities(2);
        let mut ticker = Ticker::new();
        ticker.register(ids[0], TickKind::Fixed, Phase::Update, 0, noop());
        ticker.register(ids[0], TickKind::Frame, Phase::Late, 3, noop());
        let kept = ticker.register(ids[1], TickKind::Fixed, Phase::Update, 0, noop());

        assert_eq!(ticker.remove_entity(ids[0]), 2);
        assert_eq!(ticker.remove_entity(ids[0]), 0);
        assert!(ticker.is_active(kept));
        assert_eq!(ticker.registration_count(), 1);
    }

    #[test]
    fn test_walk_stops_at_boundary_and_skips_new_registrations() {
        let (reg, ids) = entities(3);
        let mut ticker = Ticker::new();
        ticker.register(ids[0], TickKind::Frame, Phase::Update, 0, noop());
        ticker.register(ids[1], TickKind::Frame, Phase::Update, 0, noop());

        let mut pass = ticker.begin_pass(TickKind::Frame, Phase::Update).unwrap();
        let mut walk = ticker.next_lane(&mut pass).unwrap();

        let first = ticker.next_runnable(&pass, &mut walk, &reg).unwrap();
        assert_eq!(first.entity, ids[0]);
        // Registered mid-walk: past the boundary, must not be yielded.
        ticker.register(ids[2], TickKind::Frame, Phase::Update, 0, noop());
        ticker.restore(first);

        let second = ticker.next_runnable(&pass, &mut walk, &reg).unwrap();
        assert_eq!(second.entity, ids[1]);
        ticker.restore(second);
        assert!(ticker.next_runnable(&pass, &mut walk, &reg).is_none());
        ticker.end_lane(&pass);
        ticker.end_pass(pass, Duration::ZERO);
    }

    #[test]
    fn test_dispose_during_walk_is_deferred_until_lane_ends() {
        let (reg, ids) = entities(2);
        let mut ticker = Ticker::new();
        ticker.register(ids[0], TickKind::Frame, Phase::Update, 0, noop());
        let second = ticker.register(ids[1], TickKind::Frame, Phase::Update, 0, noop());

        let mut pass = ticker.begin_pass(TickKind::Frame, Phase::Update).unwrap();
        let mut walk = ticker.next_lane(&mut pass).unwrap();
        let first = ticker.next_runnable(&pass, &mut walk, &reg).unwrap();

        assert!(ticker.dispose(second));
        // Still linked so the cursor can step over it.
        assert_eq!(
            ticker.lane_entities(TickKind::Frame, Phase::Update, 0).len(),
            2
        );
        ticker.restore(first);
        assert!(ticker.next_runnable(&pass, &mut walk, &reg).is_none());
        ticker.end_lane(&pass);
        ticker.end_pass(pass, Duration::ZERO);

        assert_eq!(
            ticker.lane_entities(TickKind::Frame, Phase::Update, 0),
            vec![ids[0]]
        );
    }

    #[test]
    fn test_disabled_phase_does_not_start_pass() {
        let mut ticker = Ticker::new();
        ticker.set_phase_enabled(TickKind::Fixed, Phase::Late, false);
        assert!(!ticker.is_phase_enabled(TickKind::Fixed, Phase::Late));
        assert!(ticker.begin_pass(TickKind::Fixed, Phase::Late).is_none());
        assert_eq!(
            ticker.phase_elapsed(TickKind::Fixed, Phase::Late),
            Duration::ZERO
        );
    }

    #[test]
    fn test_node_enablement_round_trip() {
        let (_, ids) = entities(1);
        let mut ticker = Ticker::new();
        assert!(ticker.is_node_enabled(ids[0]));
        ticker.set_node_enabled(ids[0], false);
        assert!(!ticker.is_node_enabled(ids[0]));
        ticker.set_node_enabled(ids[0], true);
        assert!(ticker.is_node_enabled(ids[0]));
    }
}
