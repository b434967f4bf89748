//! Singleton resources.
//!
//! A resource is published at most once and then lives for the rest of the
//! process. Two ways to wait for one:
//!
//! - **Constructors** registered with [`Resources::define_constructor`] are
//!   polled by the scheduler through [`Resources::resolve_pending`]; each runs
//!   once, only after all of its dependencies are published.
//! - **[`WhenResources`] futures** from [`Resources::when_published`] resolve
//!   exactly once, the moment the last requested resource is published. They
//!   are the cross-tick boundary collaborators await on.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use engine_component::{EngineError, Registry, ResourceDef, ResourceKindId};
use futures::channel::oneshot;
use tracing::debug;

type ConstructFn = Box<dyn FnOnce(&Resources) -> Box<dyn Any>>;

struct PendingResource {
    kind: ResourceKindId,
    name: String,
    deps: Vec<ResourceKindId>,
    construct: ConstructFn,
}

struct Waiter {
    required: Vec<ResourceKindId>,
    sender: oneshot::Sender<()>,
}

/// Published resource values plus everything waiting on them.
#[derive(Default)]
pub struct Resources {
    values: HashMap<ResourceKindId, Box<dyn Any>>,
    pending: Vec<PendingResource>,
    waiters: Vec<Waiter>,
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("published", &self.values.len())
            .field("pending", &self.pending.len())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

impl Resources {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the value of `def`.
    ///
    /// Waiters whose requirements are now complete are resolved before this
    /// returns.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceAlreadyPublished`] if `def` already has a value.
    pub fn add<T: 'static>(&mut self, def: &ResourceDef<T>, value: T) -> Result<(), EngineError> {
        if self.values.contains_key(&def.kind()) {
            return Err(EngineError::ResourceAlreadyPublished(def.name().to_string()));
        }
        self.publish(def.kind(), def.name(), Box::new(value));
        Ok(())
    }

    fn publish(&mut self, kind: ResourceKindId, name: &str, value: Box<dyn Any>) {
        self.values.insert(kind, value);
        debug!(resource = name, %kind, "resource published");
        self.wake_waiters();
    }

    fn wake_waiters(&mut self) {
        self.prune_waiters();
        let (ready, waiting): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|waiter| {
                waiter
                    .required
                    .iter()
                    .all(|kind| self.values.contains_key(kind))
            });
        self.waiters = waiting;
        for waiter in ready {
            // The receiver may have been dropped since the prune above.
            let _ = waiter.sender.send(());
        }
    }

    /// Drop waiters whose future has been dropped.
    fn prune_waiters(&mut self) {
        self.waiters.retain(|waiter| !waiter.sender.is_canceled());
    }

    /// Register a constructor for `def`, run once every kind in `deps` is
    /// published.
    ///
    /// Registration order does not matter: a constructor may be registered
    /// before the resources it depends on are published.
    ///
    /// # Errors
    ///
    /// [`EngineError::LateRegistration`] once `registry` is closed,
    /// [`EngineError::ResourceAlreadyPublished`] if `def` already has a value,
    /// [`EngineError::DuplicateName`] if `def` already has a constructor.
    pub fn define_constructor<T: 'static>(
        &mut self,
        registry: &Registry,
        def: &ResourceDef<T>,
        deps: &[ResourceKindId],
        construct: impl FnOnce(&Resources) -> T + 'static,
    ) -> Result<(), EngineError> {
        registry.ensure_open("resource constructor", def.name())?;
        if self.values.contains_key(&def.kind()) {
            return Err(EngineError::ResourceAlreadyPublished(def.name().to_string()));
        }
        if self.pending.iter().any(|pending| pending.kind == def.kind()) {
            return Err(EngineError::DuplicateName {
                kind: "resource constructor",
                name: def.name().to_string(),
            });
        }
        self.pending.push(PendingResource {
            kind: def.kind(),
            name: def.name().to_string(),
            deps: deps.to_vec(),
            construct: Box::new(move |resources: &Resources| {
                Box::new(construct(resources)) as Box<dyn Any>
            }),
        });
        Ok(())
    }

    /// Run every constructor whose dependencies are published, repeating
    /// until no more can run. Returns how many resources were constructed.
    ///
    /// Constructors run in registration order within each pass, so a chain
    /// `A → B → C` resolves in a single call once `A` exists.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceAlreadyPublished`] if a resource with a pending
    /// constructor was published by someone else in the meantime.
    pub fn resolve_pending(&mut self) -> Result<usize, EngineError> {
        let mut constructed = 0;
        while let Some(index) = self
            .pending
            .iter()
            .position(|pending| self.all_published(&pending.deps))
        {
            let pending = self.pending.remove(index);
            if self.values.contains_key(&pending.kind) {
                return Err(EngineError::ResourceAlreadyPublished(pending.name));
            }
            let value = (pending.construct)(&*self);
            self.publish(pending.kind, &pending.name, value);
            constructed += 1;
        }
        Ok(constructed)
    }

    /// A future resolving once every kind in `kinds` is published.
    ///
    /// Resolves immediately if they already are.
    pub fn when_published(&mut self, kinds: &[ResourceKindId]) -> WhenResources {
        self.prune_waiters();
        let (sender, receiver) = oneshot::channel();
        if self.all_published(kinds) {
            let _ = sender.send(());
        } else {
            self.waiters.push(Waiter {
                required: kinds.to_vec(),
                sender,
            });
        }
        WhenResources { receiver }
    }

    /// Borrow a published value.
    #[must_use]
    pub fn get<T: 'static>(&self, def: &ResourceDef<T>) -> Option<&T> {
        self.values.get(&def.kind())?.downcast_ref::<T>()
    }

    /// Mutably borrow a published value.
    pub fn get_mut<T: 'static>(&mut self, def: &ResourceDef<T>) -> Option<&mut T> {
        self.values.get_mut(&def.kind())?.downcast_mut::<T>()
    }

    /// Borrow a value that must be published.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceNotPublished`] otherwise.
    pub fn require<T: 'static>(&self, def: &ResourceDef<T>) -> Result<&T, EngineError> {
        self.get(def)
            .ok_or_else(|| EngineError::ResourceNotPublished(def.name().to_string()))
    }

    /// Mutably borrow a value that must be published.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceNotPublished`] otherwise.
    pub fn require_mut<T: 'static>(&mut self, def: &ResourceDef<T>) -> Result<&mut T, EngineError> {
        let name = def.name();
        self.values
            .get_mut(&def.kind())
            .and_then(|value| value.downcast_mut::<T>())
            .ok_or_else(|| EngineError::ResourceNotPublished(name.to_string()))
    }

    /// Returns `true` if `kind` has a value.
    #[must_use]
    pub fn is_published(&self, kind: ResourceKindId) -> bool {
        self.values.contains_key(&kind)
    }

    /// Returns `true` if every kind in `kinds` has a value.
    #[must_use]
    pub fn all_published(&self, kinds: &[ResourceKindId]) -> bool {
        kinds.iter().all(|kind| self.values.contains_key(kind))
    }

    /// Number of published resources.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.values.len()
    }

    /// Number of constructors still waiting on dependencies.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Resolves once a set of resources has been published.
///
/// Yields `Err(Canceled)` only if the [`Resources`] store was dropped first.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WhenResources {
    receiver: oneshot::Receiver<()>,
}

impl Future for WhenResources {
    type Output = Result<(), oneshot::Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::FutureExt;

    use super::*;

    struct Canvas {
        width: u32,
    }

    struct Renderer {
        width: u32,
    }

    struct Defs {
        registry: Registry,
        canvas: ResourceDef<Canvas>,
        renderer: ResourceDef<Renderer>,
        title: ResourceDef<String>,
    }

    fn defs() -> Defs {
        let mut registry = Registry::new();
        Defs {
            canvas: registry.define_resource("canvas").unwrap(),
            renderer: registry.define_resource("renderer").unwrap(),
            title: registry.define_resource("title").unwrap(),
            registry,
        }
    }

    #[test]
    fn test_add_and_get() {
        let Defs { canvas, .. } = defs();
        let mut resources = Resources::new();
        assert!(resources.get(&canvas).is_none());
        resources.add(&canvas, Canvas { width: 640 }).unwrap();
        assert_eq!(resources.get(&canvas).unwrap().width, 640);
        resources.get_mut(&canvas).unwrap().width = 800;
        assert_eq!(resources.require(&canvas).unwrap().width, 800);
    }

    #[test]
    fn test_singleton_enforced() {
        let Defs { canvas, .. } = defs();
        let mut resources = Resources::new();
        resources.add(&canvas, Canvas { width: 1 }).unwrap();
        let err = resources.add(&canvas, Canvas { width: 2 }).unwrap_err();
        assert!(matches!(err, EngineError::ResourceAlreadyPublished(name) if name == "canvas"));
        assert_eq!(resources.get(&canvas).unwrap().width, 1);
    }

    #[test]
    fn test_require_unpublished_fails() {
        let Defs { renderer, .. } = defs();
        let mut resources = Resources::new();
        assert!(matches!(
            resources.require(&renderer),
            Err(EngineError::ResourceNotPublished(_))
        ));
        assert!(resources.require_mut(&renderer).is_err());
    }

    #[test]
    fn test_constructor_waits_for_dependencies() {
        let Defs {
            registry,
            canvas,
            renderer,
            ..
        } = defs();
        let mut resources = Resources::new();
        let canvas_for_ctor = canvas.clone();
        resources
            .define_constructor(&registry, &renderer, &[canvas.kind()], move |r| Renderer {
                width: r.get(&canvas_for_ctor).map_or(0, |c| c.width),
            })
            .unwrap();

        assert_eq!(resources.resolve_pending().unwrap(), 0);
        assert!(!resources.is_published(renderer.kind()));

        resources.add(&canvas, Canvas { width: 320 }).unwrap();
        assert!(!resources.is_published(renderer.kind()));
        assert_eq!(resources.resolve_pending().unwrap(), 1);
        assert_eq!(resources.get(&renderer).unwrap().width, 320);
        assert_eq!(resources.pending_count(), 0);
    }

    #[test]
    fn test_constructor_chain_resolves_in_one_call() {
        let Defs {
            registry,
            canvas,
            renderer,
            title,
        } = defs();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut resources = Resources::new();

        let log = Rc::clone(&order);
        resources
            .define_constructor(&registry, &title, &[renderer.kind()], move |_| {
                log.borrow_mut().push("title");
                "main".to_string()
            })
            .unwrap();
        let log = Rc::clone(&order);
        resources
            .define_constructor(&registry, &renderer, &[canvas.kind()], move |_| {
                log.borrow_mut().push("renderer");
                Renderer { width: 1 }
            })
            .unwrap();
        let log = Rc::clone(&order);
        resources
            .define_constructor(&registry, &canvas, &[], move |_| {
                log.borrow_mut().push("canvas");
                Canvas { width: 1 }
            })
            .unwrap();

        assert_eq!(resources.resolve_pending().unwrap(), 3);
        assert_eq!(*order.borrow(), vec!["canvas", "renderer", "title"]);
    }

    #[test]
    fn test_constructor_conflicting_with_manual_publish() {
        let Defs {
            registry, canvas, ..
        } = defs();
        let mut resources = Resources::new();
        resources
            .define_constructor(&registry, &canvas, &[], |_| Canvas { width: 1 })
            .unwrap();
        resources.add(&canvas, Canvas { width: 2 }).unwrap();
        assert!(matches!(
            resources.resolve_pending(),
            Err(EngineError::ResourceAlreadyPublished(_))
        ));
    }

    #[test]
    fn test_duplicate_constructor_rejected() {
        let Defs {
            registry, canvas, ..
        } = defs();
        let mut resources = Resources::new();
        resources
            .define_constructor(&registry, &canvas, &[], |_| Canvas { width: 1 })
            .unwrap();
        assert!(
            resources
                .define_constructor(&registry, &canvas, &[], |_| Canvas { width: 2 })
                .is_err()
        );
    }

    #[test]
    fn test_constructor_rejected_once_registry_closed() {
        let Defs {
            mut registry,
            canvas,
            ..
        } = defs();
        let mut resources = Resources::new();
        registry.close();
        let err = resources
            .define_constructor(&registry, &canvas, &[], |_| Canvas { width: 7 })
            .unwrap_err();
        assert!(matches!(err, EngineError::LateRegistration { .. }));
        assert_eq!(resources.resolve_pending().unwrap(), 0);
        assert!(resources.get(&canvas).is_none());
    }

    #[test]
    fn test_constructor_for_published_resource_rejected() {
        let Defs {
            registry, canvas, ..
        } = defs();
        let mut resources = Resources::new();
        resources.add(&canvas, Canvas { width: 1 }).unwrap();
        let err = resources
            .define_constructor(&registry, &canvas, &[], |_| Canvas { width: 2 })
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceAlreadyPublished(name) if name == "canvas"));
        assert_eq!(resources.pending_count(), 0);
    }

    #[test]
    fn test_when_published_resolves_once_all_present() {
        let Defs {
            canvas, renderer, ..
        } = defs();
        let mut resources = Resources::new();
        let mut wait = resources.when_published(&[canvas.kind(), renderer.kind()]);
        assert!((&mut wait).now_or_never().is_none());

        resources.add(&canvas, Canvas { width: 1 }).unwrap();
        assert!((&mut wait).now_or_never().is_none());

        resources.add(&renderer, Renderer { width: 1 }).unwrap();
        assert_eq!(wait.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_when_published_already_satisfied() {
        let Defs { canvas, .. } = defs();
        let mut resources = Resources::new();
        resources.add(&canvas, Canvas { width: 1 }).unwrap();
        let wait = resources.when_published(&[canvas.kind()]);
        assert_eq!(futures::executor::block_on(wait), Ok(()));
    }

    #[test]
    fn test_when_published_canceled_when_store_dropped() {
        let Defs { canvas, .. } = defs();
        let mut resources = Resources::new();
        let wait = resources.when_published(&[canvas.kind()]);
        drop(resources);
        assert!(futures::executor::block_on(wait).is_err());
    }

    #[test]
    fn test_dropped_waiters_are_pruned() {
        let Defs {
            canvas, renderer, ..
        } = defs();
        let mut resources = Resources::new();
        drop(resources.when_published(&[renderer.kind()]));
        resources.add(&canvas, Canvas { width: 1 }).unwrap();
        assert_eq!(resources.waiters.len(), 0);
    }

    #[test]
    fn test_dropped_waiters_pruned_without_publish() {
        let Defs { renderer, .. } = defs();
        let mut resources = Resources::new();
        for _ in 0..100 {
            drop(resources.when_published(&[renderer.kind()]));
        }
        let _live = resources.when_published(&[renderer.kind()]);
        assert_eq!(resources.waiters.len(), 1);
    }
}
