//! # Entity Pool
//!
//! Fixed-capacity spawn/despawn layer for reusable gameplay objects
//! (projectiles, particles, pickups).
//!
//! A pool owns up to `capacity` entities. Despawning strips an entity down to
//! its marker components and parks its slot on a free list; the next spawn
//! hands the same id back out. Ids therefore survive despawn/respawn cycles.
//!
//! When every slot is live, the [`PoolPolicy`] decides: `Crash` refuses the
//! spawn, `RandDespawn` evicts the slot under a round-robin cursor and reuses
//! it. Eviction order is deterministic.

use std::collections::HashMap;

use engine_component::{ComponentKindId, EngineError, Entity};
use engine_world::World;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What a full pool does on spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolPolicy {
    /// Fail with [`EngineError::PoolFull`].
    #[default]
    Crash,
    /// Despawn the slot under the round-robin cursor and reuse it.
    RandDespawn,
}

/// Pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, used in errors and logs.
    pub name: String,
    /// Maximum number of simultaneously live entities.
    pub capacity: usize,
    /// Overflow behavior.
    #[serde(default)]
    pub policy: PoolPolicy,
    /// Component kinds that survive a despawn. Everything else is detached.
    #[serde(skip)]
    pub keep_on_despawn: Vec<ComponentKindId>,
}

impl PoolConfig {
    /// A `Crash` pool keeping nothing on despawn.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            policy: PoolPolicy::Crash,
            keep_on_despawn: Vec::new(),
        }
    }

    /// Set the overflow policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PoolPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keep these component kinds attached across despawn.
    #[must_use]
    pub fn keep_on_despawn(mut self, kinds: &[ComponentKindId]) -> Self {
        self.keep_on_despawn.extend_from_slice(kinds);
        self
    }
}

/// Builds a fresh pool member.
pub type PoolCreateFn = Box<dyn FnMut(&mut World) -> Result<Entity, EngineError>>;

/// Runs against a pool member on spawn or despawn.
pub type PoolHookFn = Box<dyn FnMut(&mut World, Entity) -> Result<(), EngineError>>;

#[derive(Debug, Clone, Copy)]
struct Slot {
    entity: Entity,
    live: bool,
}

/// A bounded, reusable-entity allocator.
///
/// Pools are usually published as resources so systems can spawn from them:
///
/// ```rust,ignore
/// let pool = ctx.resources.require_mut(&PROJECTILES)?;
/// let bullet = pool.spawn(ctx.world)?;
/// ```
pub struct EntityPool {
    config: PoolConfig,
    slots: Vec<Slot>,
    /// Indices of slots whose entity is parked.
    free_list: Vec<usize>,
    /// Member entity → slot index, live or parked.
    index: HashMap<Entity, usize>,
    live_count: usize,
    /// Next eviction candidate under `RandDespawn`.
    cursor: usize,
    create: PoolCreateFn,
    on_spawn: Option<PoolHookFn>,
    on_despawn: Option<PoolHookFn>,
}

impl std::fmt::Debug for EntityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPool")
            .field("config", &self.config)
            .field("slots", &self.slots.len())
            .field("live_count", &self.live_count)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl EntityPool {
    /// Create an empty pool. Entities are built lazily by `create`.
    pub fn new(
        config: PoolConfig,
        create: impl FnMut(&mut World) -> Result<Entity, EngineError> + 'static,
    ) -> Self {
        info!(
            pool = %config.name,
            capacity = config.capacity,
            policy = ?config.policy,
            "entity pool created"
        );
        Self {
            slots: Vec::with_capacity(config.capacity),
            free_list: Vec::new(),
            index: HashMap::new(),
            live_count: 0,
            cursor: 0,
            config,
            create: Box::new(create),
            on_spawn: None,
            on_despawn: None,
        }
    }

    /// Run `hook` every time an entity is handed out.
    #[must_use]
    pub fn on_spawn(
        mut self,
        hook: impl FnMut(&mut World, Entity) -> Result<(), EngineError> + 'static,
    ) -> Self {
        self.on_spawn = Some(Box::new(hook));
        self
    }

    /// Run `hook` exactly once per despawn, before components are stripped.
    #[must_use]
    pub fn on_despawn(
        mut self,
        hook: impl FnMut(&mut World, Entity) -> Result<(), EngineError> + 'static,
    ) -> Self {
        self.on_despawn = Some(Box::new(hook));
        self
    }

    /// Hand out a live entity, recycled when possible.
    ///
    /// # Errors
    ///
    /// `PoolFull` when every slot is live under `Crash` (or the capacity is
    /// zero), plus anything the create or hook functions return.
    pub fn spawn(&mut self, world: &mut World) -> Result<Entity, EngineError> {
        let slot = match self.free_list.pop() {
            Some(slot) => slot,
            None if self.slots.len() < self.config.capacity => {
                let entity = (self.create)(world)?;
                self.index.insert(entity, self.slots.len());
                self.slots.push(Slot {
                    entity,
                    live: false,
                });
                self.slots.len() - 1
            }
            None => self.evict(world)?,
        };

        // The parked entity may have been destroyed behind the pool's back.
        if !world.contains(self.slots[slot].entity) {
            let stale = self.slots[slot].entity;
            let entity = (self.create)(world)?;
            self.index.remove(&stale);
            self.index.insert(entity, slot);
            self.slots[slot].entity = entity;
            debug!(pool = %self.config.name, %stale, %entity, "replaced destroyed pool member");
        }

        let entity = self.slots[slot].entity;
        if let Some(hook) = self.on_spawn.as_mut()
            && let Err(err) = hook(world, entity)
        {
            self.free_list.push(slot);
            return Err(err);
        }
        self.slots[slot].live = true;
        self.live_count += 1;
        Ok(entity)
    }

    /// Free the slot under the cursor for an immediate respawn.
    fn evict(&mut self, world: &mut World) -> Result<usize, EngineError> {
        if self.config.policy == PoolPolicy::Crash || self.slots.is_empty() {
            return Err(EngineError::PoolFull {
                pool: self.config.name.clone(),
                capacity: self.config.capacity,
            });
        }
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();
        debug!(pool = %self.config.name, slot, entity = %self.slots[slot].entity, "evicting pool member");
        if let Err(err) = self.release(world, slot) {
            self.free_list.push(slot);
            return Err(err);
        }
        Ok(slot)
    }

    /// Return `entity` to the pool.
    ///
    /// # Errors
    ///
    /// `NotInPool` if `entity` was never handed out by this pool,
    /// `DoubleDespawn` if it is already parked, plus anything the
    /// `on_despawn` hook returns.
    pub fn despawn(&mut self, world: &mut World, entity: Entity) -> Result<(), EngineError> {
        let Some(&slot) = self.index.get(&entity) else {
            return Err(EngineError::NotInPool {
                pool: self.config.name.clone(),
                entity,
            });
        };
        if !self.slots[slot].live {
            return Err(EngineError::DoubleDespawn {
                pool: self.config.name.clone(),
                entity,
            });
        }
        let released = self.release(world, slot);
        self.free_list.push(slot);
        released
    }

    /// Park `slot`. The slot is parked even when the hook fails; the hook's
    /// error is returned after the components are stripped.
    fn release(&mut self, world: &mut World, slot: usize) -> Result<(), EngineError> {
        let entity = self.slots[slot].entity;
        self.slots[slot].live = false;
        self.live_count -= 1;
        let hooked = match self.on_despawn.as_mut() {
            Some(hook) => hook(world, entity),
            None => Ok(()),
        };
        world.keep_only(entity, &self.config.keep_on_despawn);
        hooked
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Maximum number of live entities.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Overflow policy.
    #[must_use]
    pub fn policy(&self) -> PoolPolicy {
        self.config.policy
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns `true` if `entity` is a live member of this pool.
    #[must_use]
    pub fn is_live(&self, entity: Entity) -> bool {
        self.index
            .get(&entity)
            .is_some_and(|&slot| self.slots[slot].live)
    }

    /// Live members in slot order.
    pub fn live_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.live)
            .map(|slot| slot.entity)
    }
}
