//! Phase-ordered system execution and one-shot resource inits.
//!
//! Systems are bucketed by [`Phase`]. Each tick first settles resource
//! construction (pending constructors and ready inits, repeated until nothing
//! more can run), then walks phases in ascending order and runs every system
//! of a phase in registration order. A system whose resources are not all
//! published is skipped for the tick; that is not an error.
//!
//! Everything runs on the calling thread, to completion, one callback at a
//! time. A callback error halts the tick and is returned to the caller.

use std::collections::BTreeMap;

use anyhow::Context as _;
use engine_component::{EngineError, Entity};
use engine_world::{QueryHandle, Resources, World};
use tracing::{debug, info, trace, warn};

use crate::config::{InitDescriptor, SystemDescriptor};
use crate::context::SystemContext;
use crate::phase::Phase;

/// A per-tick system callback.
pub type SystemFn = Box<dyn FnMut(&mut SystemContext<'_>) -> anyhow::Result<()>>;

/// A one-shot init callback.
pub type InitFn = Box<dyn FnOnce(&mut SystemContext<'_>) -> anyhow::Result<()>>;

/// Scheduler lifecycle. There is no way back from `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Registration is open.
    Unstarted,
    /// The first tick has begun; the schema is frozen.
    Running,
}

struct SystemEntry {
    descriptor: SystemDescriptor,
    /// `None` for systems with an empty component set.
    query: Option<QueryHandle>,
    callback: SystemFn,
}

enum InitState {
    Pending(InitFn),
    Done,
}

struct InitEntry {
    descriptor: InitDescriptor,
    eager: bool,
    query: Option<QueryHandle>,
    state: InitState,
}

impl InitEntry {
    fn is_pending(&self) -> bool {
        matches!(self.state, InitState::Pending(_))
    }

    /// Dependencies published and, for lazy inits, at least one entity matches.
    fn is_ready(&self, world: &World, resources: &Resources) -> bool {
        if !resources.all_published(&self.descriptor.deps) {
            return false;
        }
        match (self.eager, self.query) {
            (false, Some(handle)) => world.queries().len(handle) > 0,
            _ => true,
        }
    }

    /// Hand out the callback if the init is ready. The init is done from then
    /// on, so a callback is handed out at most once.
    fn take_ready(&mut self, world: &World, resources: &Resources) -> Option<InitFn> {
        if !self.is_ready(world, resources) {
            return None;
        }
        match std::mem::replace(&mut self.state, InitState::Done) {
            InitState::Pending(callback) => Some(callback),
            InitState::Done => None,
        }
    }
}

/// Runs systems and inits against a [`World`] and its [`Resources`].
pub struct Scheduler {
    state: SchedulerState,
    tick_id: u64,
    phases: BTreeMap<Phase, Vec<usize>>,
    systems: Vec<SystemEntry>,
    inits: Vec<InitEntry>,
    /// Reused buffer holding the entity snapshot for the running callback.
    scratch: Vec<Entity>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("tick_id", &self.tick_id)
            .field("systems", &self.system_names().collect::<Vec<_>>())
            .field("inits", &self.inits.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty, unstarted scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Unstarted,
            tick_id: 0,
            phases: BTreeMap::new(),
            systems: Vec::new(),
            inits: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// ID of the last tick that started (0 before the first).
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Number of inits that have not run yet.
    #[must_use]
    pub fn pending_init_count(&self) -> usize {
        self.inits.iter().filter(|init| init.is_pending()).count()
    }

    /// System names in execution order.
    pub fn system_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.phases
            .values()
            .flatten()
            .map(|&index| self.systems[index].descriptor.name.as_str())
    }

    /// Register a system.
    ///
    /// The system's query is memoized in `world` now, so its result is
    /// maintained incrementally from this point on.
    ///
    /// # Errors
    ///
    /// `LateRegistration` once started, `DuplicateName` if a system with the
    /// same name exists.
    pub fn add_system(
        &mut self,
        world: &mut World,
        descriptor: SystemDescriptor,
        callback: SystemFn,
    ) -> Result<(), EngineError> {
        world.registry().ensure_open("system", &descriptor.name)?;
        if self
            .systems
            .iter()
            .any(|entry| entry.descriptor.name == descriptor.name)
        {
            return Err(EngineError::DuplicateName {
                kind: "system",
                name: descriptor.name,
            });
        }

        let query = (!descriptor.components.is_empty()).then(|| world.query(&descriptor.components));
        let index = self.systems.len();
        self.phases.entry(descriptor.phase).or_default().push(index);
        debug!(
            system = %descriptor.name,
            phase = %descriptor.phase,
            components = descriptor.components.len(),
            resources = descriptor.resources.len(),
            "system registered"
        );
        self.systems.push(SystemEntry {
            descriptor,
            query,
            callback,
        });
        Ok(())
    }

    /// Register a one-shot init.
    ///
    /// An eager init runs as soon as its dependencies are published. A lazy
    /// init additionally waits for at least one entity carrying all of
    /// `descriptor.components`.
    ///
    /// # Errors
    ///
    /// `LateRegistration` once started, `DuplicateName` if an init with the
    /// same name exists.
    pub fn add_init(
        &mut self,
        world: &mut World,
        descriptor: InitDescriptor,
        eager: bool,
        callback: InitFn,
    ) -> Result<(), EngineError> {
        world.registry().ensure_open("init", &descriptor.name)?;
        if self
            .inits
            .iter()
            .any(|entry| entry.descriptor.name == descriptor.name)
        {
            return Err(EngineError::DuplicateName {
                kind: "init",
                name: descriptor.name,
            });
        }

        let query = (!descriptor.components.is_empty()).then(|| world.query(&descriptor.components));
        debug!(init = %descriptor.name, eager, "init registered");
        self.inits.push(InitEntry {
            descriptor,
            eager,
            query,
            state: InitState::Pending(callback),
        });
        Ok(())
    }

    /// Freeze the schema and move to `Running`. Idempotent.
    pub fn start(&mut self, world: &mut World) {
        if self.state == SchedulerState::Running {
            return;
        }
        world.registry_mut().close();
        self.state = SchedulerState::Running;
        info!(
            systems = self.systems.len(),
            phases = self.phases.len(),
            inits = self.inits.len(),
            "scheduler started"
        );
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// The first failing init or system callback, with its name and phase as
    /// context. Engine errors stay reachable through `downcast_ref`.
    pub fn run_tick(
        &mut self,
        world: &mut World,
        resources: &mut Resources,
        dt: f64,
    ) -> anyhow::Result<()> {
        self.start(world);
        self.tick_id += 1;
        let tick_id = self.tick_id;

        self.settle(world, resources)?;

        let Self {
            phases,
            systems,
            scratch,
            ..
        } = self;
        let mut ran = 0usize;
        let mut skipped = 0usize;

        for (&phase, indices) in phases.iter() {
            for &index in indices {
                let entry = &mut systems[index];
                let descriptor = &entry.descriptor;
                if !resources.all_published(&descriptor.resources) {
                    trace!(tick_id, system = %descriptor.name, %phase, "resources not ready, skipping");
                    skipped += 1;
                    continue;
                }

                scratch.clear();
                let watched = entry.query.map(|handle| {
                    scratch.extend(world.query_entities(handle));
                    (handle, world.queries().generation(handle))
                });

                let mut ctx = SystemContext {
                    tick_id,
                    dt,
                    entities: scratch.as_slice(),
                    world: &mut *world,
                    resources: &mut *resources,
                };
                (entry.callback)(&mut ctx).with_context(|| {
                    format!("system `{}` failed in phase {phase}", descriptor.name)
                })?;
                ran += 1;

                if let Some((handle, generation)) = watched
                    && !descriptor.allow_query_edit
                    && world.queries().generation(handle) != generation
                {
                    warn!(
                        tick_id,
                        system = %descriptor.name,
                        %phase,
                        "system changed membership of its own query without allow_query_edit"
                    );
                }
            }
        }

        debug!(tick_id, dt, ran, skipped, entities = world.entity_count(), "tick complete");
        Ok(())
    }

    /// Resolve pending resource constructors and ready inits until neither
    /// makes progress.
    fn settle(&mut self, world: &mut World, resources: &mut Resources) -> anyhow::Result<()> {
        loop {
            let constructed = resources.resolve_pending()?;
            let mut fired = 0usize;
            for index in 0..self.inits.len() {
                if let Some(callback) = self.inits[index].take_ready(world, resources) {
                    self.run_init(index, callback, world, resources)?;
                    fired += 1;
                }
            }
            if constructed == 0 && fired == 0 {
                return Ok(());
            }
        }
    }

    /// Run a ready init's callback, then check it published what it declared.
    fn run_init(
        &mut self,
        index: usize,
        callback: InitFn,
        world: &mut World,
        resources: &mut Resources,
    ) -> anyhow::Result<()> {
        let tick_id = self.tick_id;
        let init = &self.inits[index];
        let name = init.descriptor.name.clone();

        self.scratch.clear();
        if !init.eager
            && let Some(handle) = init.query
        {
            self.scratch.extend(world.query_entities(handle));
        }

        let mut ctx = SystemContext {
            tick_id,
            dt: 0.0,
            entities: self.scratch.as_slice(),
            world: &mut *world,
            resources: &mut *resources,
        };
        callback(&mut ctx).with_context(|| format!("init `{name}` failed"))?;

        let missing: Vec<String> = init
            .descriptor
            .produces
            .iter()
            .filter(|&&kind| !resources.is_published(kind))
            .map(|&kind| {
                world
                    .registry()
                    .resource_name(kind)
                    .unwrap_or("?")
                    .to_string()
            })
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::InitOrder {
                init: name,
                reason: format!("returned without publishing {}", missing.join(", ")),
            }
            .into());
        }

        info!(tick_id, init = %name, eager = init.eager, "init complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine_component::{ComponentDef, ResourceDef};

    use super::*;

    struct Fixture {
        world: World,
        resources: Resources,
        scheduler: Scheduler,
        marker: ComponentDef<u32>,
        clock: ResourceDef<f64>,
    }

    fn fixture() -> Fixture {
        let mut world = World::new();
        let marker = world
            .registry_mut()
            .define_component("marker", |(): ()| 0u32)
            .unwrap();
        let clock = world.registry_mut().define_resource::<f64>("clock").unwrap();
        Fixture {
            world,
            resources: Resources::new(),
            scheduler: Scheduler::new(),
            marker,
            clock,
        }
    }

    fn log_system(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> SystemFn {
        let log = Rc::clone(log);
        Box::new(move |_ctx: &mut SystemContext<'_>| {
            log.borrow_mut().push(name.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_phases_run_in_order_then_registration_order() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            ..
        } = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (name, phase) in [
            ("render", Phase::RENDER),
            ("net", Phase::NETWORK),
            ("physics-a", Phase::GAME_WORLD),
            ("physics-b", Phase::GAME_WORLD),
        ] {
            scheduler
                .add_system(&mut world, SystemDescriptor::new(name, phase), log_system(&log, name))
                .unwrap();
        }
        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["net", "physics-a", "physics-b", "render"]
        );
        assert_eq!(
            scheduler.system_names().collect::<Vec<_>>(),
            vec!["net", "physics-a", "physics-b", "render"]
        );
    }

    #[test]
    fn test_system_skipped_until_resources_ready() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            clock,
            ..
        } = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler
            .add_system(
                &mut world,
                SystemDescriptor::new("advance", Phase::PRE_GAME_WORLD).with_resources(&[clock.kind()]),
                log_system(&log, "advance"),
            )
            .unwrap();

        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        assert!(log.borrow().is_empty());

        resources.add(&clock, 0.0).unwrap();
        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_system_sees_query_snapshot() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            marker,
            ..
        } = fixture();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        scheduler
            .add_system(
                &mut world,
                SystemDescriptor::new("count", Phase::GAME_WORLD).with_components(&[marker.kind()]),
                Box::new(move |ctx: &mut SystemContext<'_>| {
                    sink.borrow_mut().push(ctx.entities.len());
                    Ok(())
                }),
            )
            .unwrap();

        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        let e = world.new_entity();
        world.attach_or_update(e, &marker, ()).unwrap();
        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();

        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_registration_after_start_is_late() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            ..
        } = fixture();
        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let err = scheduler
            .add_system(
                &mut world,
                SystemDescriptor::new("late", Phase::RENDER),
                Box::new(|_ctx: &mut SystemContext<'_>| Ok(())),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::LateRegistration { kind: "system", .. }));
    }

    #[test]
    fn test_duplicate_system_name() {
        let Fixture {
            mut world,
            mut scheduler,
            ..
        } = fixture();
        let noop = || -> SystemFn { Box::new(|_ctx: &mut SystemContext<'_>| Ok(())) };
        scheduler
            .add_system(&mut world, SystemDescriptor::new("a", Phase::RENDER), noop())
            .unwrap();
        let err = scheduler
            .add_system(&mut world, SystemDescriptor::new("a", Phase::NETWORK), noop())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName { kind: "system", .. }));
    }

    #[test]
    fn test_callback_error_halts_tick() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            ..
        } = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler
            .add_system(
                &mut world,
                SystemDescriptor::new("boom", Phase::GAME_WORLD),
                Box::new(|_ctx: &mut SystemContext<'_>| -> anyhow::Result<()> {
                    anyhow::bail!("exploded")
                }),
            )
            .unwrap();
        scheduler
            .add_system(
                &mut world,
                SystemDescriptor::new("after", Phase::RENDER),
                log_system(&log, "after"),
            )
            .unwrap();

        let err = scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_lazy_init_waits_for_matching_entity() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            marker,
            clock,
        } = fixture();
        let produced = clock.clone();
        scheduler
            .add_init(
                &mut world,
                InitDescriptor::new("clock")
                    .with_components(&[marker.kind()])
                    .produces(&[clock.kind()]),
                false,
                Box::new(move |ctx: &mut SystemContext<'_>| {
                    ctx.resources.add(&produced, 1.0)?;
                    Ok(())
                }),
            )
            .unwrap();

        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        assert!(!resources.is_published(clock.kind()));
        assert_eq!(scheduler.pending_init_count(), 1);

        let e = world.new_entity();
        world.attach_or_update(e, &marker, ()).unwrap();
        scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        assert!(resources.is_published(clock.kind()));
        assert_eq!(scheduler.pending_init_count(), 0);
    }

    #[test]
    fn test_init_must_publish_what_it_produces() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            clock,
            ..
        } = fixture();
        scheduler
            .add_init(
                &mut world,
                InitDescriptor::new("forgetful").produces(&[clock.kind()]),
                true,
                Box::new(|_ctx: &mut SystemContext<'_>| Ok(())),
            )
            .unwrap();

        let err = scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InitOrder { .. })
        ));
    }

    #[test]
    fn test_init_runs_once() {
        let Fixture {
            mut world,
            mut resources,
            mut scheduler,
            ..
        } = fixture();
        let runs = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&runs);
        scheduler
            .add_init(
                &mut world,
                InitDescriptor::new("once"),
                true,
                Box::new(move |_ctx: &mut SystemContext<'_>| {
                    *counter.borrow_mut() += 1;
                    Ok(())
                }),
            )
            .unwrap();
        for _ in 0..3 {
            scheduler.run_tick(&mut world, &mut resources, 0.016).unwrap();
        }
        assert_eq!(*runs.borrow(), 1);
    }
}
