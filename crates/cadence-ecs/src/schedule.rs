//! Tick kinds and phases: the two axes every update callback is filed under.

/// Which clock drives a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TickKind {
    /// Deterministic simulation step with a constant `dt`, run zero or more
    /// times per frame.
    Fixed,
    /// Once per scheduler tick, `dt` is the clamped and scaled wall-clock delta.
    Frame,
}

impl TickKind {
    /// Both kinds in dispatch order.
    pub const ALL: [TickKind; 2] = [TickKind::Fixed, TickKind::Frame];
}

/// Position of a registration within one kind's dispatch.
///
/// Phases run in the order listed, top to bottom, for every fixed step and
/// every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Input consumption, pre-simulation bookkeeping.
    Early,
    /// Gameplay and simulation logic.
    Update,
    /// Follow-up work that reads the results of `Update` (cameras, sync).
    Late,
}

impl Phase {
    /// All phases in dispatch order.
    pub const ALL: [Phase; 3] = [Phase::Early, Phase::Update, Phase::Late];
}

/// Dense slot for a `(kind, phase)` pair, used to index per-phase tables.
pub(crate) fn phase_slot(kind: TickKind, phase: Phase) -> usize {
    let k = match kind {
        TickKind::Fixed => 0,
        TickKind::Frame => 1,
    };
    let p = match phase {
        Phase::Early => 0,
        Phase::Update => 1,
        Phase::Late => 2,
    };
    k * Phase::ALL.len() + p
}

/// Number of distinct `(kind, phase)` slots.
pub(crate) const PHASE_SLOTS: usize = TickKind::ALL.len() * Phase::ALL.len();
