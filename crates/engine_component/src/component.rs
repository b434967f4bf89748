//! Component kinds and their typed definitions.
//!
//! A [`ComponentKindId`] is a small dense index handed out by the
//! [`Registry`](crate::Registry) in registration order. Entity storage is a
//! table indexed by it, so attach/detach/lookup never hash or dispatch on a
//! name.
//!
//! A [`ComponentDef`] is the typed handle returned by registration. It carries
//! the constructor and optional update function, so the world can build or
//! refresh a value without consulting the registry.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A dense, registration-ordered identifier for a component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKindId(pub u32);

impl ComponentKindId {
    /// Position of this kind in per-entity component tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type ConstructFn<T, A> = Rc<dyn Fn(A) -> T>;
type UpdateFn<T, A> = Rc<dyn Fn(&mut T, A)>;

/// The typed definition of a component kind.
///
/// `T` is the stored value, `A` the argument bundle passed to the constructor
/// and update function. Cloning is cheap and every clone refers to the same
/// kind.
///
/// # Examples
///
/// ```rust
/// use engine_component::Registry;
///
/// let mut registry = Registry::new();
/// let position = registry
///     .define_component("position", |p: Option<[f32; 3]>| p.unwrap_or([0.0; 3]))
///     .unwrap();
/// assert_eq!(position.name(), "position");
/// assert_eq!(position.construct(None), [0.0, 0.0, 0.0]);
/// ```
pub struct ComponentDef<T, A = ()> {
    kind: ComponentKindId,
    name: Rc<str>,
    construct: ConstructFn<T, A>,
    update: Option<UpdateFn<T, A>>,
}

impl<T: 'static, A: 'static> ComponentDef<T, A> {
    pub(crate) fn new(
        kind: ComponentKindId,
        name: Rc<str>,
        construct: ConstructFn<T, A>,
        update: Option<UpdateFn<T, A>>,
    ) -> Self {
        Self {
            kind,
            name,
            construct,
            update,
        }
    }

    /// The registration-assigned kind id.
    #[must_use]
    pub fn kind(&self) -> ComponentKindId {
        self.kind
    }

    /// The unique registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh value from `args`.
    #[must_use]
    pub fn construct(&self, args: A) -> T {
        (self.construct)(args)
    }

    /// Returns `true` if an update function was registered.
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.update.is_some()
    }

    /// Re-apply `args` to an existing value.
    ///
    /// Without an update function the value is replaced by a freshly
    /// constructed one.
    pub fn apply(&self, existing: &mut T, args: A) {
        match &self.update {
            Some(update) => update(existing, args),
            None => *existing = (self.construct)(args),
        }
    }
}

impl<T, A> Clone for ComponentDef<T, A> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            name: Rc::clone(&self.name),
            construct: Rc::clone(&self.construct),
            update: self.update.clone(),
        }
    }
}

impl<T, A> fmt::Debug for ComponentDef<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("has_update", &self.update.is_some())
            .finish()
    }
}
