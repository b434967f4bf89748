//! Resource kinds: singleton values not owned by any entity.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A dense, registration-ordered identifier for a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKindId(pub u32);

impl fmt::Display for ResourceKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R#{}", self.0)
    }
}

/// The typed handle of a resource kind holding a `T`.
///
/// At most one `T` is published per definition at any time.
pub struct ResourceDef<T> {
    kind: ResourceKindId,
    name: Rc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ResourceDef<T> {
    pub(crate) fn new(kind: ResourceKindId, name: Rc<str>) -> Self {
        Self {
            kind,
            name,
            _marker: PhantomData,
        }
    }

    /// The registration-assigned kind id.
    #[must_use]
    pub fn kind(&self) -> ResourceKindId {
        self.kind
    }

    /// The unique registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for ResourceDef<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            name: Rc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ResourceDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDef")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}
