//! The error taxonomy of the simulation core.
//!
//! Every variant is a programming error: a violated static invariant in the
//! schema or in an entity's lifecycle. Nothing here is retried; "resource not
//! ready yet" is ordinary control flow and never shows up as an error.

use crate::codec::CodecError;
use crate::entity::Entity;

/// Errors raised by registration, entity, resource and pool operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A component, resource, system, init or serializer name was registered twice.
    #[error("duplicate {kind} name: `{name}`")]
    DuplicateName {
        /// What was being registered (`"component"`, `"resource"`, ...).
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// Registration attempted after the scheduler started ticking.
    #[error("cannot register {kind} `{name}`: the schema is closed once the scheduler starts")]
    LateRegistration {
        /// What was being registered.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A required component is missing from an existing entity.
    #[error("component `{component}` not present on {entity}")]
    ComponentNotPresent {
        /// The entity that was accessed.
        entity: Entity,
        /// Name of the missing component.
        component: String,
    },

    /// The entity id was never issued or has been destroyed.
    #[error("{0} does not exist")]
    UnknownEntity(Entity),

    /// A component kind id that the registry never issued.
    #[error("unknown component kind {0}")]
    UnknownComponent(u32),

    /// A pool using the `crash` policy has no free slot.
    #[error("pool `{pool}` is full (capacity {capacity})")]
    PoolFull {
        /// Pool name.
        pool: String,
        /// Configured capacity.
        capacity: usize,
    },

    /// Despawn of an entity that was never a member of the pool.
    #[error("{entity} is not a member of pool `{pool}`")]
    NotInPool {
        /// Pool name.
        pool: String,
        /// The entity passed to `despawn`.
        entity: Entity,
    },

    /// Despawn of a pool member that is already despawned.
    #[error("{entity} was despawned twice from pool `{pool}` without an intervening spawn")]
    DoubleDespawn {
        /// Pool name.
        pool: String,
        /// The entity passed to `despawn`.
        entity: Entity,
    },

    /// A lazy/eager init ran out of order or broke its publication contract.
    #[error("init `{init}` violated its ordering contract: {reason}")]
    InitOrder {
        /// Init name.
        init: String,
        /// What went wrong.
        reason: String,
    },

    /// Strict access to a resource that has not been published.
    #[error("resource `{0}` has not been published")]
    ResourceNotPublished(String),

    /// A second value was published for a singleton resource.
    #[error("resource `{0}` is already published")]
    ResourceAlreadyPublished(String),

    /// The component kind has no serializer pair registered.
    #[error("component `{0}` has no serializer pair")]
    NoSerializer(String),

    /// Encoding or decoding component bytes failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
