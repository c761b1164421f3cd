//! Error types surfaced by the world and by tick callbacks.

use crate::EntityId;

/// Boxed error returned by tick callbacks and system updates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of a single tick callback invocation.
///
/// An `Err` is logged at the ticker boundary and never interrupts the phase.
pub type TickResult = Result<(), BoxError>;

/// Errors that can occur when manipulating a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The entity was never spawned in this world or has been despawned.
    #[error("entity {0:?} does not exist")]
    EntityNotFound(EntityId),

    /// The entity exists but carries no component of the requested type.
    #[error("entity {entity:?} has no `{component}` component")]
    MissingComponent {
        /// Entity that was queried.
        entity: EntityId,
        /// Type name of the missing component.
        component: &'static str,
    },

    /// A service was requested that was never attached to this world.
    #[error("service `{0}` is not attached to this world")]
    MissingService(&'static str),

    /// A service of the same type is already attached.
    #[error("service `{0}` is already attached to this world")]
    DuplicateService(&'static str),

    /// Reparenting would make an entity its own ancestor.
    #[error("cannot parent {child:?} under {parent:?}: the hierarchy would contain a cycle")]
    HierarchyCycle {
        /// Entity being reparented.
        child: EntityId,
        /// Requested new parent.
        parent: EntityId,
    },

    /// The world root owns system registrations and cannot be despawned or reparented.
    #[error("the world root entity cannot be despawned or reparented")]
    RootEntity,
}
