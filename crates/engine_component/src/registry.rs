//! The schema registry: every component and resource kind, by name and id.
//!
//! Kind ids are dense and assigned in registration order. They are baked into
//! query keys and per-entity tables, so the registry is **closed** when the
//! scheduler starts; every registration after that fails with
//! [`EngineError::LateRegistration`].

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::codec::{ByteReader, ByteWriter, CodecError};
use crate::component::{ComponentDef, ComponentKindId};
use crate::error::EngineError;
use crate::resource::{ResourceDef, ResourceKindId};

type SerializeFn = Box<dyn Fn(&dyn Any, &mut ByteWriter) -> Result<(), EngineError>>;
type DeserializeFn = Box<dyn Fn(&mut ByteReader<'_>) -> Result<Box<dyn Any>, EngineError>>;

/// Type-erased serializer pair stored per component kind.
struct SerializerPair {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// What the registry knows about one component kind.
pub struct ComponentInfo {
    kind: ComponentKindId,
    name: Rc<str>,
    serializer: Option<SerializerPair>,
}

impl ComponentInfo {
    /// The kind id.
    #[must_use]
    pub fn kind(&self) -> ComponentKindId {
        self.kind
    }

    /// The registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if a serializer pair is attached.
    #[must_use]
    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }
}

impl std::fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("has_serializer", &self.serializer.is_some())
            .finish()
    }
}

/// Component and resource name tables.
#[derive(Debug, Default)]
pub struct Registry {
    components: Vec<ComponentInfo>,
    component_names: HashMap<String, ComponentKindId>,
    resources: Vec<Rc<str>>,
    resource_names: HashMap<String, ResourceKindId>,
    closed: bool,
}

impl Registry {
    /// Create an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`EngineError::LateRegistration`] once the registry is closed.
    ///
    /// # Errors
    ///
    /// Returns `LateRegistration` naming `what` and `name` if closed.
    pub fn ensure_open(&self, what: &'static str, name: &str) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::LateRegistration {
                kind: what,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Freeze the schema. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(
                components = self.components.len(),
                resources = self.resources.len(),
                "registry closed"
            );
        }
        self.closed = true;
    }

    /// Returns `true` once [`Registry::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register a component kind built by `construct` and replaced wholesale
    /// when re-applied.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if `name` is taken, `LateRegistration` if closed.
    pub fn define_component<T: 'static, A: 'static>(
        &mut self,
        name: &str,
        construct: impl Fn(A) -> T + 'static,
    ) -> Result<ComponentDef<T, A>, EngineError> {
        self.insert_component(name, Rc::new(construct), None)
    }

    /// Register a component kind whose existing values are refreshed in place
    /// by `update` when re-applied.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if `name` is taken, `LateRegistration` if closed.
    pub fn define_component_with_update<T: 'static, A: 'static>(
        &mut self,
        name: &str,
        construct: impl Fn(A) -> T + 'static,
        update: impl Fn(&mut T, A) + 'static,
    ) -> Result<ComponentDef<T, A>, EngineError> {
        self.insert_component(name, Rc::new(construct), Some(Rc::new(update)))
    }

    fn insert_component<T: 'static, A: 'static>(
        &mut self,
        name: &str,
        construct: Rc<dyn Fn(A) -> T>,
        update: Option<Rc<dyn Fn(&mut T, A)>>,
    ) -> Result<ComponentDef<T, A>, EngineError> {
        self.ensure_open("component", name)?;
        if self.component_names.contains_key(name) {
            return Err(EngineError::DuplicateName {
                kind: "component",
                name: name.to_string(),
            });
        }

        let kind = ComponentKindId(self.components.len() as u32);
        let shared: Rc<str> = Rc::from(name);
        self.components.push(ComponentInfo {
            kind,
            name: Rc::clone(&shared),
            serializer: None,
        });
        self.component_names.insert(name.to_string(), kind);
        debug!(component = name, %kind, "component defined");

        Ok(ComponentDef::new(kind, shared, construct, update))
    }

    /// Register a resource kind.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if `name` is taken, `LateRegistration` if closed.
    pub fn define_resource<T: 'static>(&mut self, name: &str) -> Result<ResourceDef<T>, EngineError> {
        self.ensure_open("resource", name)?;
        if self.resource_names.contains_key(name) {
            return Err(EngineError::DuplicateName {
                kind: "resource",
                name: name.to_string(),
            });
        }

        let kind = ResourceKindId(self.resources.len() as u32);
        let shared: Rc<str> = Rc::from(name);
        self.resources.push(Rc::clone(&shared));
        self.resource_names.insert(name.to_string(), kind);
        debug!(resource = name, %kind, "resource defined");

        Ok(ResourceDef::new(kind, shared))
    }

    /// Attach a serializer pair to a component kind.
    ///
    /// `serialize` writes a value into the cursor; `deserialize` reads one
    /// back. Each kind accepts at most one pair.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if the kind already has a pair, `LateRegistration` if
    /// closed.
    pub fn register_serializer_pair<T: 'static, A: 'static>(
        &mut self,
        def: &ComponentDef<T, A>,
        serialize: impl Fn(&T, &mut ByteWriter) -> Result<(), CodecError> + 'static,
        deserialize: impl Fn(&mut ByteReader<'_>) -> Result<T, CodecError> + 'static,
    ) -> Result<(), EngineError> {
        self.ensure_open("serializer", def.name())?;
        let kind = def.kind();
        let info = self
            .components
            .get_mut(kind.index())
            .ok_or(EngineError::UnknownComponent(kind.0))?;
        if info.serializer.is_some() {
            return Err(EngineError::DuplicateName {
                kind: "serializer",
                name: def.name().to_string(),
            });
        }

        info.serializer = Some(SerializerPair {
            serialize: Box::new(move |value: &dyn Any, writer: &mut ByteWriter| {
                let value = value
                    .downcast_ref::<T>()
                    .ok_or(EngineError::UnknownComponent(kind.0))?;
                serialize(value, writer)?;
                Ok(())
            }),
            deserialize: Box::new(move |reader: &mut ByteReader<'_>| {
                let value = deserialize(reader)?;
                Ok(Box::new(value) as Box<dyn Any>)
            }),
        });
        debug!(component = def.name(), "serializer pair registered");
        Ok(())
    }

    /// Attach a MessagePack serializer pair derived from `T`'s serde impls.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::register_serializer_pair`].
    pub fn register_serde<T, A>(&mut self, def: &ComponentDef<T, A>) -> Result<(), EngineError>
    where
        T: Serialize + DeserializeOwned + 'static,
        A: 'static,
    {
        self.register_serializer_pair(
            def,
            |value: &T, writer| writer.write_value(value),
            |reader| reader.read_value::<T>(),
        )
    }

    /// Serialize a type-erased component value of kind `kind`.
    ///
    /// # Errors
    ///
    /// `UnknownComponent`, `NoSerializer`, or the pair's own codec error.
    pub fn serialize_value(
        &self,
        kind: ComponentKindId,
        value: &dyn Any,
        writer: &mut ByteWriter,
    ) -> Result<(), EngineError> {
        let pair = self.serializer(kind)?;
        (pair.serialize)(value, writer)
    }

    /// Deserialize a type-erased component value of kind `kind`.
    ///
    /// # Errors
    ///
    /// `UnknownComponent`, `NoSerializer`, or the pair's own codec error.
    pub fn deserialize_value(
        &self,
        kind: ComponentKindId,
        reader: &mut ByteReader<'_>,
    ) -> Result<Box<dyn Any>, EngineError> {
        let pair = self.serializer(kind)?;
        (pair.deserialize)(reader)
    }

    fn serializer(&self, kind: ComponentKindId) -> Result<&SerializerPair, EngineError> {
        let info = self
            .component_info(kind)
            .ok_or(EngineError::UnknownComponent(kind.0))?;
        info.serializer
            .as_ref()
            .ok_or_else(|| EngineError::NoSerializer(info.name.to_string()))
    }

    /// Look up a component kind.
    #[must_use]
    pub fn component_info(&self, kind: ComponentKindId) -> Option<&ComponentInfo> {
        self.components.get(kind.index())
    }

    /// Look up a component kind by name.
    #[must_use]
    pub fn component_by_name(&self, name: &str) -> Option<ComponentKindId> {
        self.component_names.get(name).copied()
    }

    /// Name of a component kind, or `"?"` for ids this registry never issued.
    #[must_use]
    pub fn component_name(&self, kind: ComponentKindId) -> &str {
        self.component_info(kind).map_or("?", ComponentInfo::name)
    }

    /// Name of a resource kind.
    #[must_use]
    pub fn resource_name(&self, kind: ResourceKindId) -> Option<&str> {
        self.resources.get(kind.0 as usize).map(|name| &**name)
    }

    /// Look up a resource kind by name.
    #[must_use]
    pub fn resource_by_name(&self, name: &str) -> Option<ResourceKindId> {
        self.resource_names.get(name).copied()
    }

    /// Number of registered component kinds.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of registered resource kinds.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
