//! The engine facade: one [`World`], its [`Resources`], and a [`Scheduler`].
//!
//! Startup code registers the schema through the engine (components,
//! resources, serializer pairs, systems, inits), then drives it with
//! [`Engine::tick`]. The first tick closes the schema.

use engine_component::{
    ByteReader, ByteWriter, CodecError, ComponentDef, EngineError, Entity, ResourceDef,
    ResourceKindId,
};
use engine_world::{Resources, WhenResources, World};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{InitDescriptor, SystemDescriptor};
use crate::context::SystemContext;
use crate::pool::EntityPool;
use crate::scheduler::{Scheduler, SchedulerState};

/// Entity store, resource store and scheduler, wired together.
#[derive(Debug, Default)]
pub struct Engine {
    world: World,
    resources: Resources,
    scheduler: Scheduler,
}

impl Engine {
    /// Create an engine with an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity store.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The entity store, mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The resource store.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// The resource store, mutably.
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// Both stores at once, for code running outside a system.
    pub fn split_mut(&mut self) -> (&mut World, &mut Resources) {
        (&mut self.world, &mut self.resources)
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Scheduler lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// ID of the last tick that started.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.scheduler.tick_id()
    }

    // -- Schema --

    /// Register a component kind. See [`engine_component::Registry::define_component`].
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn define_component<T: 'static, A: 'static>(
        &mut self,
        name: &str,
        construct: impl Fn(A) -> T + 'static,
    ) -> Result<ComponentDef<T, A>, EngineError> {
        self.world.registry_mut().define_component(name, construct)
    }

    /// Register a component kind with an in-place update function.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn define_component_with_update<T: 'static, A: 'static>(
        &mut self,
        name: &str,
        construct: impl Fn(A) -> T + 'static,
        update: impl Fn(&mut T, A) + 'static,
    ) -> Result<ComponentDef<T, A>, EngineError> {
        self.world
            .registry_mut()
            .define_component_with_update(name, construct, update)
    }

    /// Register a resource kind whose value is published by someone else
    /// (an init, a system, or startup code).
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn define_resource<T: 'static>(&mut self, name: &str) -> Result<ResourceDef<T>, EngineError> {
        self.world.registry_mut().define_resource(name)
    }

    /// Register a resource kind built by `construct` once every kind in
    /// `deps` is published.
    ///
    /// Construction happens at the start of a tick, never earlier, and may be
    /// registered before its dependencies are published.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn define_constructed_resource<T: 'static>(
        &mut self,
        name: &str,
        deps: &[ResourceKindId],
        construct: impl FnOnce(&Resources) -> T + 'static,
    ) -> Result<ResourceDef<T>, EngineError> {
        let def = self.world.registry_mut().define_resource(name)?;
        self.resources
            .define_constructor(self.world.registry(), &def, deps, construct)?;
        Ok(def)
    }

    /// Attach a serializer pair to a component kind.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if the kind already has one, `LateRegistration` after
    /// the first tick.
    pub fn register_serializer_pair<T: 'static, A: 'static>(
        &mut self,
        def: &ComponentDef<T, A>,
        serialize: impl Fn(&T, &mut ByteWriter) -> Result<(), CodecError> + 'static,
        deserialize: impl Fn(&mut ByteReader<'_>) -> Result<T, CodecError> + 'static,
    ) -> Result<(), EngineError> {
        self.world
            .registry_mut()
            .register_serializer_pair(def, serialize, deserialize)
    }

    /// Attach a MessagePack serializer pair derived from serde.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::register_serializer_pair`].
    pub fn register_serde<T, A>(&mut self, def: &ComponentDef<T, A>) -> Result<(), EngineError>
    where
        T: Serialize + DeserializeOwned + 'static,
        A: 'static,
    {
        self.world.registry_mut().register_serde(def)
    }

    /// Register a system.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn add_system(
        &mut self,
        descriptor: SystemDescriptor,
        callback: impl FnMut(&mut SystemContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Result<(), EngineError> {
        self.scheduler
            .add_system(&mut self.world, descriptor, Box::new(callback))
    }

    /// Register a one-shot init gated on its dependencies and on at least one
    /// entity matching `descriptor.components`.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn add_lazy_init(
        &mut self,
        descriptor: InitDescriptor,
        callback: impl FnOnce(&mut SystemContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Result<(), EngineError> {
        self.scheduler
            .add_init(&mut self.world, descriptor, false, Box::new(callback))
    }

    /// Register a one-shot init gated only on its dependencies.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, or `LateRegistration` after the first tick.
    pub fn add_eager_init(
        &mut self,
        descriptor: InitDescriptor,
        callback: impl FnOnce(&mut SystemContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> Result<(), EngineError> {
        self.scheduler
            .add_init(&mut self.world, descriptor, true, Box::new(callback))
    }

    // -- Runtime --

    /// Publish a resource value.
    ///
    /// # Errors
    ///
    /// `ResourceAlreadyPublished` if it already has a value.
    pub fn add_resource<T: 'static>(&mut self, def: &ResourceDef<T>, value: T) -> Result<(), EngineError> {
        self.resources.add(def, value)
    }

    /// A future resolving once every kind in `kinds` is published.
    pub fn when_resources(&mut self, kinds: &[ResourceKindId]) -> WhenResources {
        self.resources.when_published(kinds)
    }

    /// Spawn from a pool published as a resource.
    ///
    /// # Errors
    ///
    /// `ResourceNotPublished` if the pool is missing, otherwise whatever
    /// [`EntityPool::spawn`] returns.
    pub fn spawn_from(&mut self, pool: &ResourceDef<EntityPool>) -> Result<Entity, EngineError> {
        self.resources.require_mut(pool)?.spawn(&mut self.world)
    }

    /// Return an entity to a pool published as a resource.
    ///
    /// # Errors
    ///
    /// `ResourceNotPublished` if the pool is missing, otherwise whatever
    /// [`EntityPool::despawn`] returns.
    pub fn despawn_into(
        &mut self,
        pool: &ResourceDef<EntityPool>,
        entity: Entity,
    ) -> Result<(), EngineError> {
        self.resources
            .require_mut(pool)?
            .despawn(&mut self.world, entity)
    }

    /// Run one tick with delta time `dt` seconds.
    ///
    /// # Errors
    ///
    /// The first failing init or system, with context naming it.
    pub fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        self.scheduler
            .run_tick(&mut self.world, &mut self.resources, dt)
    }
}
