//! The entity store.
//!
//! The [`World`] owns entity identity, each entity's component table, the
//! schema [`Registry`], and the [`QueryCache`]. Every attach and detach goes
//! through one of two private choke points (`attach_boxed`, `detach`) which
//! notify the query cache before returning, so no caller can ever observe a
//! stale query.
//!
//! An entity's components live in a table indexed by
//! [`ComponentKindId`]: at most one value per kind, O(1) attach, detach and
//! lookup.

use std::any::Any;
use std::collections::BTreeMap;

use engine_component::{
    ByteReader, ByteWriter, ComponentDef, ComponentKindId, EngineError, Entity, EntityAllocator,
    QueryKey, Registry,
};
use tracing::trace;

use crate::query_cache::{QueryCache, QueryHandle};

/// Per-entity component table.
#[derive(Default)]
struct EntityRecord {
    slots: Vec<Option<Box<dyn Any>>>,
}

impl EntityRecord {
    fn has(&self, kind: ComponentKindId) -> bool {
        self.slots.get(kind.index()).is_some_and(Option::is_some)
    }

    fn get<T: 'static>(&self, kind: ComponentKindId) -> Option<&T> {
        self.slots.get(kind.index())?.as_deref()?.downcast_ref::<T>()
    }

    fn get_mut<T: 'static>(&mut self, kind: ComponentKindId) -> Option<&mut T> {
        self.slots.get_mut(kind.index())?.as_deref_mut()?.downcast_mut::<T>()
    }

    fn erased(&self, kind: ComponentKindId) -> Option<&dyn Any> {
        self.slots.get(kind.index())?.as_deref()
    }

    /// Store `value`, returning `true` if the kind was not attached before.
    fn put(&mut self, kind: ComponentKindId, value: Box<dyn Any>) -> bool {
        let index = kind.index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(value).is_none()
    }

    fn take(&mut self, kind: ComponentKindId) -> Option<Box<dyn Any>> {
        self.slots.get_mut(kind.index())?.take()
    }

    fn kinds(&self) -> impl Iterator<Item = ComponentKindId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ComponentKindId(index as u32))
    }
}

impl std::fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

/// Entities, their components, and the queries over them.
#[derive(Debug, Default)]
pub struct World {
    registry: Registry,
    allocator: EntityAllocator,
    entities: BTreeMap<Entity, EntityRecord>,
    queries: QueryCache,
}

impl World {
    /// Create an empty world with an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty world around an existing registry.
    #[must_use]
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the schema registry (for registration).
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    // -- Entity lifecycle --

    /// Create an entity with no components. The id has never been issued before.
    pub fn new_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.entities.insert(entity, EntityRecord::default());
        self.queries.on_create(entity);
        trace!(%entity, "entity created");
        entity
    }

    /// Detach every component from `entity` and forget it.
    ///
    /// Returns `false` if the entity did not exist. Afterwards the id resolves
    /// to absent everywhere; it is never reissued.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let Some(record) = self.entities.get(&entity) else {
            return false;
        };
        let kinds: Vec<ComponentKindId> = record.kinds().collect();
        for kind in kinds {
            self.detach(entity, kind);
        }
        self.entities.remove(&entity);
        self.queries.on_destroy(entity);
        trace!(%entity, "entity destroyed");
        true
    }

    /// Returns `true` if `entity` exists.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys().copied()
    }

    /// Kinds attached to `entity`, ascending. Empty for unknown entities.
    #[must_use]
    pub fn component_kinds(&self, entity: Entity) -> Vec<ComponentKindId> {
        self.entities
            .get(&entity)
            .map(|record| record.kinds().collect())
            .unwrap_or_default()
    }

    // -- Component operations --

    /// Attach `def` built from `args`, or re-apply `args` to the existing value.
    ///
    /// When the component is present, the definition's update function runs
    /// in place if it has one; otherwise the value is rebuilt from `args`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if `entity` does not exist.
    pub fn attach_or_update<T: 'static, A: 'static>(
        &mut self,
        entity: Entity,
        def: &ComponentDef<T, A>,
        args: A,
    ) -> Result<(), EngineError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        if let Some(existing) = record.get_mut::<T>(def.kind()) {
            def.apply(existing, args);
            return Ok(());
        }
        self.attach_boxed(entity, def.kind(), Box::new(def.construct(args)))
    }

    /// Attach a freshly constructed value, discarding any existing one.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if `entity` does not exist.
    pub fn replace<T: 'static, A: 'static>(
        &mut self,
        entity: Entity,
        def: &ComponentDef<T, A>,
        args: A,
    ) -> Result<(), EngineError> {
        self.require_entity(entity)?;
        self.attach_boxed(entity, def.kind(), Box::new(def.construct(args)))
    }

    /// Attach a freshly constructed value only if the kind is absent.
    ///
    /// Returns `true` if a value was attached.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if `entity` does not exist.
    pub fn ensure<T: 'static, A: 'static>(
        &mut self,
        entity: Entity,
        def: &ComponentDef<T, A>,
        args: A,
    ) -> Result<bool, EngineError> {
        self.require_entity(entity)?;
        if self.has(entity, def.kind()) {
            return Ok(false);
        }
        self.attach_boxed(entity, def.kind(), Box::new(def.construct(args)))?;
        Ok(true)
    }

    /// Attach an already-built value, discarding any existing one.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownEntity`] if `entity` does not exist.
    pub fn insert<T: 'static, A: 'static>(
        &mut self,
        entity: Entity,
        def: &ComponentDef<T, A>,
        value: T,
    ) -> Result<(), EngineError> {
        self.attach_boxed(entity, def.kind(), Box::new(value))
    }

    /// Borrow a component, or `None` if the entity or component is absent.
    #[must_use]
    pub fn get<T: 'static, A: 'static>(
        &self,
        entity: Entity,
        def: &ComponentDef<T, A>,
    ) -> Option<&T> {
        self.entities.get(&entity)?.get::<T>(def.kind())
    }

    /// Mutably borrow a component, or `None` if absent.
    ///
    /// In-place mutation does not change membership, so queries are untouched.
    pub fn get_mut<T: 'static, A: 'static>(
        &mut self,
        entity: Entity,
        def: &ComponentDef<T, A>,
    ) -> Option<&mut T> {
        self.entities.get_mut(&entity)?.get_mut::<T>(def.kind())
    }

    /// Borrow a component that must be present.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if the entity does not exist, `ComponentNotPresent` if
    /// it lacks the component.
    pub fn get_required<T: 'static, A: 'static>(
        &self,
        entity: Entity,
        def: &ComponentDef<T, A>,
    ) -> Result<&T, EngineError> {
        let record = self
            .entities
            .get(&entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        record
            .get::<T>(def.kind())
            .ok_or_else(|| EngineError::ComponentNotPresent {
                entity,
                component: def.name().to_string(),
            })
    }

    /// Returns `true` if `entity` exists and holds `kind`.
    #[must_use]
    pub fn has(&self, entity: Entity, kind: ComponentKindId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|record| record.has(kind))
    }

    /// Detach `kind` from `entity`. Absent components (or entities) are a no-op.
    ///
    /// Returns `true` if something was detached.
    pub fn remove(&mut self, entity: Entity, kind: ComponentKindId) -> bool {
        self.detach(entity, kind)
    }

    /// Detach every component whose kind is not in `keep`.
    ///
    /// Returns the number of components detached.
    pub fn keep_only(&mut self, entity: Entity, keep: &[ComponentKindId]) -> usize {
        let doomed: Vec<ComponentKindId> = match self.entities.get(&entity) {
            Some(record) => record.kinds().filter(|kind| !keep.contains(kind)).collect(),
            None => return 0,
        };
        doomed
            .into_iter()
            .filter(|&kind| self.detach(entity, kind))
            .count()
    }

    /// Resolve a (possibly stale) entity reference that must carry `required`.
    ///
    /// Returns `Ok(None)` when the id no longer exists, which is how weak
    /// references stored inside components resolve to absent.
    ///
    /// # Errors
    ///
    /// `ComponentNotPresent` naming the first missing kind when the entity
    /// exists but lacks one.
    pub fn find(
        &self,
        entity: Entity,
        required: &[ComponentKindId],
    ) -> Result<Option<Entity>, EngineError> {
        let Some(record) = self.entities.get(&entity) else {
            return Ok(None);
        };
        if let Some(&missing) = required.iter().find(|&&kind| !record.has(kind)) {
            return Err(EngineError::ComponentNotPresent {
                entity,
                component: self.registry.component_name(missing).to_string(),
            });
        }
        Ok(Some(entity))
    }

    fn require_entity(&self, entity: Entity) -> Result<(), EngineError> {
        if self.entities.contains_key(&entity) {
            Ok(())
        } else {
            Err(EngineError::UnknownEntity(entity))
        }
    }

    fn attach_boxed(
        &mut self,
        entity: Entity,
        kind: ComponentKindId,
        value: Box<dyn Any>,
    ) -> Result<(), EngineError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        if record.put(kind, value) {
            let record = &*record;
            self.queries
                .on_attach(entity, kind, |other| record.has(other));
        }
        Ok(())
    }

    fn detach(&mut self, entity: Entity, kind: ComponentKindId) -> bool {
        let Some(record) = self.entities.get_mut(&entity) else {
            return false;
        };
        if record.take(kind).is_none() {
            return false;
        }
        self.queries.on_detach(entity, kind);
        true
    }

    // -- Queries --

    /// The memoized query over `required`, created and seeded on first use.
    ///
    /// Repeated calls with the same set (in any order) return the same handle.
    pub fn query(&mut self, required: &[ComponentKindId]) -> QueryHandle {
        let key = QueryKey::new(required.iter().copied());
        if let Some(handle) = self.queries.lookup(&key) {
            return handle;
        }

        let handle = self.queries.insert(key.clone());
        for (&entity, record) in &self.entities {
            if key.is_satisfied_by(|kind| record.has(kind)) {
                self.queries.admit(handle, entity);
            }
        }
        trace!(
            query = handle.index(),
            kinds = key.len(),
            seeded = self.queries.len(handle),
            "query memoized"
        );
        handle
    }

    /// Current members of a memoized query.
    pub fn query_entities(&self, handle: QueryHandle) -> impl Iterator<Item = Entity> + '_ {
        self.queries.entities(handle)
    }

    /// Convenience for one-off lookups: memoize `required` and copy its members.
    pub fn query_list(&mut self, required: &[ComponentKindId]) -> Vec<Entity> {
        let handle = self.query(required);
        self.queries.entities(handle).collect()
    }

    /// The query cache (read-only).
    #[must_use]
    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    // -- Serialization hooks --

    /// Write `entity`'s component of kind `kind` through its serializer pair.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `ComponentNotPresent`, `NoSerializer`, or a codec error.
    pub fn serialize_component(
        &self,
        entity: Entity,
        kind: ComponentKindId,
        writer: &mut ByteWriter,
    ) -> Result<(), EngineError> {
        let record = self
            .entities
            .get(&entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        let value = record
            .erased(kind)
            .ok_or_else(|| EngineError::ComponentNotPresent {
                entity,
                component: self.registry.component_name(kind).to_string(),
            })?;
        self.registry.serialize_value(kind, value, writer)
    }

    /// Read a component of kind `kind` and attach it to `entity`, replacing
    /// any existing value.
    ///
    /// # Errors
    ///
    /// `UnknownEntity`, `UnknownComponent`, `NoSerializer`, or a codec error.
    pub fn deserialize_component(
        &mut self,
        entity: Entity,
        kind: ComponentKindId,
        reader: &mut ByteReader<'_>,
    ) -> Result<(), EngineError> {
        self.require_entity(entity)?;
        let value = self.registry.deserialize_value(kind, reader)?;
        self.attach_boxed(entity, kind, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Position = [f32; 3];

    struct Fixture {
        world: World,
        position: ComponentDef<Position, Option<Position>>,
        velocity: ComponentDef<Position, Position>,
        health: ComponentDef<u32, u32>,
    }

    fn fixture() -> Fixture {
        let mut world = World::new();
        let registry = world.registry_mut();
        let position = registry
            .define_component("position", |p: Option<Position>| p.unwrap_or([0.0; 3]))
            .unwrap();
        let velocity = registry
            .define_component_with_update(
                "velocity",
                |v: Position| v,
                |existing: &mut Position, v: Position| *existing = v,
            )
            .unwrap();
        let health = registry
            .define_component_with_update(
                "health",
                |hp: u32| hp,
                |existing: &mut u32, hp: u32| *existing = (*existing).max(hp),
            )
            .unwrap();
        Fixture {
            world,
            position,
            velocity,
            health,
        }
    }

    #[test]
    fn test_attach_makes_entity_visible_to_query() {
        let Fixture {
            mut world, position, ..
        } = fixture();
        let e = world.new_entity();
        let q = world.query(&[position.kind()]);
        assert_eq!(world.query_entities(q).count(), 0);

        world.attach_or_update(e, &position, None).unwrap();
        assert_eq!(world.query_entities(q).collect::<Vec<_>>(), vec![e]);
        assert_eq!(world.get(e, &position), Some(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_query_handles_are_memoized() {
        let Fixture {
            mut world,
            position,
            velocity,
            ..
        } = fixture();
        let a = world.query(&[position.kind(), velocity.kind()]);
        let b = world.query(&[velocity.kind(), position.kind(), velocity.kind()]);
        assert_eq!(a, b);
        assert_eq!(world.queries().query_count(), 1);
    }

    #[test]
    fn test_late_query_is_seeded_with_existing_matches() {
        let Fixture {
            mut world,
            position,
            velocity,
            ..
        } = fixture();
        let e1 = world.new_entity();
        let e2 = world.new_entity();
        world.attach_or_update(e1, &position, None).unwrap();
        world.attach_or_update(e2, &position, None).unwrap();
        world.attach_or_update(e2, &velocity, [1.0, 0.0, 0.0]).unwrap();

        assert_eq!(world.query_list(&[position.kind()]), vec![e1, e2]);
        assert_eq!(
            world.query_list(&[position.kind(), velocity.kind()]),
            vec![e2]
        );
    }

    #[test]
    fn test_update_runs_in_place_and_is_idempotent() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        let e = world.new_entity();
        let q = world.query(&[health.kind()]);
        world.attach_or_update(e, &health, 10).unwrap();
        let generation = world.queries().generation(q);

        world.attach_or_update(e, &health, 30).unwrap();
        world.attach_or_update(e, &health, 30).unwrap();
        assert_eq!(world.get(e, &health), Some(&30));
        world.attach_or_update(e, &health, 5).unwrap();
        assert_eq!(world.get(e, &health), Some(&30));
        assert_eq!(world.queries().generation(q), generation);
    }

    #[test]
    fn test_without_update_value_is_rebuilt() {
        let Fixture {
            mut world, position, ..
        } = fixture();
        let e = world.new_entity();
        world
            .attach_or_update(e, &position, Some([1.0, 2.0, 3.0]))
            .unwrap();
        world.attach_or_update(e, &position, None).unwrap();
        assert_eq!(world.get(e, &position), Some(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_replace_ignores_update_fn() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        let e = world.new_entity();
        world.attach_or_update(e, &health, 50).unwrap();
        world.replace(e, &health, 5).unwrap();
        assert_eq!(world.get(e, &health), Some(&5));
    }

    #[test]
    fn test_ensure_only_attaches_once() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        let e = world.new_entity();
        assert!(world.ensure(e, &health, 1).unwrap());
        assert!(!world.ensure(e, &health, 99).unwrap());
        assert_eq!(world.get(e, &health), Some(&1));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let Fixture {
            mut world, position, ..
        } = fixture();
        let e = world.new_entity();
        assert!(!world.remove(e, position.kind()));
        assert!(!world.remove(Entity::from_raw(999), position.kind()));

        world.attach_or_update(e, &position, None).unwrap();
        let q = world.query(&[position.kind()]);
        assert!(world.remove(e, position.kind()));
        assert!(!world.has(e, position.kind()));
        assert_eq!(world.query_entities(q).count(), 0);
    }

    #[test]
    fn test_keep_only_strips_other_components() {
        let Fixture {
            mut world,
            position,
            velocity,
            health,
        } = fixture();
        let e = world.new_entity();
        world.attach_or_update(e, &position, None).unwrap();
        world.attach_or_update(e, &velocity, [0.0; 3]).unwrap();
        world.attach_or_update(e, &health, 3).unwrap();
        let moving = world.query(&[position.kind(), velocity.kind()]);

        let detached = world.keep_only(e, &[health.kind()]);
        assert_eq!(detached, 2);
        assert_eq!(world.component_kinds(e), vec![health.kind()]);
        assert_eq!(world.query_entities(moving).count(), 0);
    }

    #[test]
    fn test_set_on_unknown_entity_fails() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        let err = world
            .attach_or_update(Entity::from_raw(77), &health, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownEntity(e) if e.id() == 77));
    }

    #[test]
    fn test_find_resolves_weak_references() {
        let Fixture {
            mut world,
            position,
            health,
            ..
        } = fixture();
        let parent = world.new_entity();
        world.attach_or_update(parent, &position, None).unwrap();

        assert_eq!(world.find(parent, &[position.kind()]).unwrap(), Some(parent));
        let err = world
            .find(parent, &[position.kind(), health.kind()])
            .unwrap_err();
        assert!(matches!(err, EngineError::ComponentNotPresent { component, .. } if component == "health"));

        assert!(world.destroy(parent));
        assert_eq!(world.find(parent, &[position.kind()]).unwrap(), None);
    }

    #[test]
    fn test_get_required_reports_missing_component() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        let e = world.new_entity();
        let err = world.get_required(e, &health).unwrap_err();
        assert!(matches!(err, EngineError::ComponentNotPresent { .. }));
        world.attach_or_update(e, &health, 4).unwrap();
        assert_eq!(*world.get_required(e, &health).unwrap(), 4);
    }

    #[test]
    fn test_destroy_leaves_every_query() {
        let Fixture {
            mut world,
            position,
            velocity,
            ..
        } = fixture();
        let all = world.query(&[]);
        let e = world.new_entity();
        let keep = world.new_entity();
        world.attach_or_update(e, &position, None).unwrap();
        world.attach_or_update(e, &velocity, [0.0; 3]).unwrap();
        let moving = world.query(&[position.kind(), velocity.kind()]);
        assert_eq!(world.query_entities(all).count(), 2);

        assert!(world.destroy(e));
        assert!(!world.destroy(e));
        assert!(!world.contains(e));
        assert_eq!(world.query_entities(moving).count(), 0);
        assert_eq!(world.query_entities(all).collect::<Vec<_>>(), vec![keep]);

        let fresh = world.new_entity();
        assert!(fresh.id() > e.id());
    }

    #[test]
    fn test_serialization_hooks_roundtrip() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        world.registry_mut().register_serde(&health).unwrap();
        let source = world.new_entity();
        let target = world.new_entity();
        world.attach_or_update(source, &health, 42).unwrap();
        let q = world.query(&[health.kind()]);

        let mut writer = ByteWriter::new();
        world
            .serialize_component(source, health.kind(), &mut writer)
            .unwrap();
        let bytes = writer.into_bytes();
        world
            .deserialize_component(target, health.kind(), &mut ByteReader::new(&bytes))
            .unwrap();

        assert_eq!(world.get(target, &health), Some(&42));
        assert!(world.queries().contains(q, target));
    }

    #[test]
    fn test_serialize_missing_component_fails() {
        let Fixture {
            mut world, health, ..
        } = fixture();
        world.registry_mut().register_serde(&health).unwrap();
        let e = world.new_entity();
        let mut writer = ByteWriter::new();
        let err = world
            .serialize_component(e, health.kind(), &mut writer)
            .unwrap_err();
        assert!(matches!(err, EngineError::ComponentNotPresent { .. }));
    }
}
