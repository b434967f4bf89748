//! Per-invocation context handed to system and init callbacks.

use engine_component::{EngineError, Entity, ResourceDef};
use engine_world::{Resources, World};

/// Everything a callback may touch during one invocation.
///
/// `entities` is the system's query result as of the moment the callback
/// started. Writes to `world` and `resources` are visible immediately to
/// every later system in the same tick.
#[derive(Debug)]
pub struct SystemContext<'a> {
    /// The current tick ID (1 for the first tick).
    pub tick_id: u64,
    /// Delta time of this tick, in seconds.
    pub dt: f64,
    /// Entities matched by the system's query, oldest membership first.
    pub entities: &'a [Entity],
    /// The entity store.
    pub world: &'a mut World,
    /// The resource store.
    pub resources: &'a mut Resources,
}

impl SystemContext<'_> {
    /// Borrow a resource the system declared as required.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceNotPublished`] if it is not published.
    pub fn resource<T: 'static>(&self, def: &ResourceDef<T>) -> Result<&T, EngineError> {
        self.resources.require(def)
    }

    /// Mutably borrow a resource the system declared as required.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceNotPublished`] if it is not published.
    pub fn resource_mut<T: 'static>(&mut self, def: &ResourceDef<T>) -> Result<&mut T, EngineError> {
        self.resources.require_mut(def)
    }
}
