//! Update scheduling and entity/component query core.
//!
//! Provides the [`World`] composition root, the fixed-step / frame
//! [`EngineLoop`], the order-bucketed [`Ticker`], the [`ComponentIndex`] behind
//! [`Query`], and the hierarchical [`Transform`] cache.

mod component;
mod engine_loop;
mod entity;
mod error;
mod index;
mod lifecycle;
pub mod query;
mod schedule;
mod scheduler;
mod service;
mod systems;
mod ticker;
mod transform;
mod world;


pub use component::{Component, ComponentKey, ComponentStorage};
pub use engine_loop::{
    DEFAULT_FIXED_STEP_MS, DEFAULT_MAX_FIXED_STEPS_PER_FRAME, DEFAULT_MAX_FRAME_DT_MS,
    DEFAULT_PERF_WINDOW_MS, EngineLoop, FrameDriver, FrameReport, LoopConfig, PerfStats,
};
pub use entity::{EntityId, EntityRegistry};
pub use error::{BoxError, TickResult, WorldError};
pub use index::ComponentIndex;
pub use lifecycle::{
    DespawnQueue, FlushEntityQueues, SpawnQueue, flush_despawn_queue, flush_entity_queues,
    flush_spawn_queue,
};
pub use query::{Query, QueryData, QueryIter};
pub use schedule::{Phase, TickKind};
pub use scheduler::{FixedScheduler, ManualScheduler, RealTimeScheduler, Scheduler, StopHandle};
pub use service::Service;
pub use systems::{PerfLogSystem, Spin, SpinSystem, System};
pub use ticker::{TickFn, TickHandle, Ticker};
pub use transform::{Transform, Trs};
pub use world::World;
