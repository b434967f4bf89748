//! System and init descriptors.

use engine_component::{ComponentKindId, ResourceKindId};

use crate::phase::Phase;

/// Static description of a system: where it runs and what it needs.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    /// Unique system name (e.g. `"integrate-velocity"`).
    pub name: String,
    /// The phase the system runs in.
    pub phase: Phase,
    /// Components every matched entity must carry. Empty means the system
    /// runs once per tick with no entities.
    pub components: Vec<ComponentKindId>,
    /// Resources that must be published before the system runs.
    pub resources: Vec<ResourceKindId>,
    /// Whether the callback may change the membership of its own query.
    pub allow_query_edit: bool,
}

impl SystemDescriptor {
    /// Create a descriptor with no requirements.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            phase,
            components: Vec::new(),
            resources: Vec::new(),
            allow_query_edit: false,
        }
    }

    /// Require these components on every matched entity.
    #[must_use]
    pub fn with_components(mut self, kinds: &[ComponentKindId]) -> Self {
        self.components.extend_from_slice(kinds);
        self
    }

    /// Require these resources before running.
    #[must_use]
    pub fn with_resources(mut self, kinds: &[ResourceKindId]) -> Self {
        self.resources.extend_from_slice(kinds);
        self
    }

    /// Allow the callback to attach/detach components that change which
    /// entities its own query matches.
    #[must_use]
    pub fn allow_query_edit(mut self) -> Self {
        self.allow_query_edit = true;
        self
    }
}

/// Static description of a one-shot init.
#[derive(Debug, Clone)]
pub struct InitDescriptor {
    /// Unique init name.
    pub name: String,
    /// Lazy inits wait until at least one entity carries all of these.
    pub components: Vec<ComponentKindId>,
    /// Resources the init must publish before returning.
    pub produces: Vec<ResourceKindId>,
    /// Resources that must be published before the init may run.
    pub deps: Vec<ResourceKindId>,
}

impl InitDescriptor {
    /// Create a descriptor with no requirements.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            produces: Vec::new(),
            deps: Vec::new(),
        }
    }

    /// Gate a lazy init on at least one entity matching these components.
    #[must_use]
    pub fn with_components(mut self, kinds: &[ComponentKindId]) -> Self {
        self.components.extend_from_slice(kinds);
        self
    }

    /// Declare the resources the init publishes.
    #[must_use]
    pub fn produces(mut self, kinds: &[ResourceKindId]) -> Self {
        self.produces.extend_from_slice(kinds);
        self
    }

    /// Declare the resources the init needs.
    #[must_use]
    pub fn depends_on(mut self, kinds: &[ResourceKindId]) -> Self {
        self.deps.extend_from_slice(kinds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_descriptor_builder() {
        let desc = SystemDescriptor::new("integrate", Phase::GAME_WORLD)
            .with_components(&[ComponentKindId(0), ComponentKindId(1)])
            .with_resources(&[ResourceKindId(2)]);
        assert_eq!(desc.name, "integrate");
        assert_eq!(desc.components.len(), 2);
        assert_eq!(desc.resources, vec![ResourceKindId(2)]);
        assert!(!desc.allow_query_edit);
        assert!(desc.allow_query_edit().allow_query_edit);
    }

    #[test]
    fn test_init_descriptor_builder() {
        let desc = InitDescriptor::new("renderer")
            .depends_on(&[ResourceKindId(0)])
            .produces(&[ResourceKindId(1)]);
        assert_eq!(desc.deps, vec![ResourceKindId(0)]);
        assert_eq!(desc.produces, vec![ResourceKindId(1)]);
        assert!(desc.components.is_empty());
    }
}
