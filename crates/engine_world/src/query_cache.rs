//! The incremental query engine.
//!
//! Each distinct [`QueryKey`] observed by the world gets one [`CachedQuery`]:
//! an ordered member list plus a reverse index. The world reports every attach
//! and detach, and only the queries whose key contains the changed kind are
//! re-evaluated, so maintenance cost scales with the number of affected
//! queries rather than the number of entities.
//!
//! Members iterate in the order their membership was established. Given the
//! same mutation history, iteration order is identical from run to run.

use std::collections::{BTreeMap, HashMap};

use engine_component::{ComponentKindId, Entity, QueryKey};

/// A stable handle to a memoized query. Equal keys yield equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryHandle(u32);

impl QueryHandle {
    /// Raw index of the handle.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One memoized query result.
#[derive(Debug)]
struct CachedQuery {
    key: QueryKey,
    /// Admission sequence number → member, so iteration is FIFO.
    members: BTreeMap<u64, Entity>,
    /// Member → its admission sequence number.
    positions: HashMap<Entity, u64>,
    /// Bumped on every admission or eviction.
    generation: u64,
}

impl CachedQuery {
    fn new(key: QueryKey) -> Self {
        Self {
            key,
            members: BTreeMap::new(),
            positions: HashMap::new(),
            generation: 0,
        }
    }

    fn admit(&mut self, entity: Entity, next_seq: &mut u64) {
        if self.positions.contains_key(&entity) {
            return;
        }
        let seq = *next_seq;
        *next_seq += 1;
        self.members.insert(seq, entity);
        self.positions.insert(entity, seq);
        self.generation += 1;
    }

    fn evict(&mut self, entity: Entity) {
        if let Some(seq) = self.positions.remove(&entity) {
            self.members.remove(&seq);
            self.generation += 1;
        }
    }
}

/// All memoized queries of one world.
#[derive(Debug, Default)]
pub struct QueryCache {
    queries: Vec<CachedQuery>,
    by_key: HashMap<QueryKey, QueryHandle>,
    /// Component kind → queries whose key contains it.
    by_kind: HashMap<ComponentKindId, Vec<QueryHandle>>,
    /// The query over the empty required set, if anyone asked for it.
    everything: Option<QueryHandle>,
    next_seq: u64,
}

impl QueryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle already memoized for `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: &QueryKey) -> Option<QueryHandle> {
        self.by_key.get(key).copied()
    }

    /// Memoize a new, empty query for `key`. The caller seeds it with the
    /// entities that already match.
    pub(crate) fn insert(&mut self, key: QueryKey) -> QueryHandle {
        let handle = QueryHandle(self.queries.len() as u32);
        for &kind in key.kinds() {
            self.by_kind.entry(kind).or_default().push(handle);
        }
        if key.is_empty() {
            self.everything = Some(handle);
        }
        self.by_key.insert(key.clone(), handle);
        self.queries.push(CachedQuery::new(key));
        handle
    }

    /// Add `entity` to a query's member list (no-op if already a member).
    pub(crate) fn admit(&mut self, handle: QueryHandle, entity: Entity) {
        if let Some(query) = self.queries.get_mut(handle.index()) {
            query.admit(entity, &mut self.next_seq);
        }
    }

    /// A new entity exists; it matches the empty required set.
    pub(crate) fn on_create(&mut self, entity: Entity) {
        if let Some(handle) = self.everything {
            self.admit(handle, entity);
        }
    }

    /// An entity is gone for good. Its components have already been detached.
    pub(crate) fn on_destroy(&mut self, entity: Entity) {
        if let Some(handle) = self.everything
            && let Some(query) = self.queries.get_mut(handle.index())
        {
            query.evict(entity);
        }
    }

    /// `kind` was attached to `entity`. `has` answers whether the entity now
    /// holds a given kind.
    pub(crate) fn on_attach(
        &mut self,
        entity: Entity,
        kind: ComponentKindId,
        has: impl Fn(ComponentKindId) -> bool,
    ) {
        let Self {
            queries,
            by_kind,
            next_seq,
            ..
        } = self;
        let Some(affected) = by_kind.get(&kind) else {
            return;
        };
        for handle in affected {
            let query = &mut queries[handle.index()];
            if !query.positions.contains_key(&entity) && query.key.is_satisfied_by(&has) {
                query.admit(entity, next_seq);
            }
        }
    }

    /// `kind` was detached from `entity`.
    pub(crate) fn on_detach(&mut self, entity: Entity, kind: ComponentKindId) {
        let Self {
            queries, by_kind, ..
        } = self;
        let Some(affected) = by_kind.get(&kind) else {
            return;
        };
        for handle in affected {
            queries[handle.index()].evict(entity);
        }
    }

    /// Current members of a query, oldest membership first.
    ///
    /// An unknown handle yields nothing.
    pub fn entities(&self, handle: QueryHandle) -> impl Iterator<Item = Entity> + '_ {
        self.queries
            .get(handle.index())
            .into_iter()
            .flat_map(|query| query.members.values().copied())
    }

    /// Number of members of a query.
    #[must_use]
    pub fn len(&self, handle: QueryHandle) -> usize {
        self.queries
            .get(handle.index())
            .map_or(0, |query| query.members.len())
    }

    /// Returns `true` if `entity` is currently a member.
    #[must_use]
    pub fn contains(&self, handle: QueryHandle, entity: Entity) -> bool {
        self.queries
            .get(handle.index())
            .is_some_and(|query| query.positions.contains_key(&entity))
    }

    /// Membership change counter; differs whenever the member list changed.
    #[must_use]
    pub fn generation(&self, handle: QueryHandle) -> u64 {
        self.queries
            .get(handle.index())
            .map_or(0, |query| query.generation)
    }

    /// The canonical key of a query.
    #[must_use]
    pub fn key(&self, handle: QueryHandle) -> Option<&QueryKey> {
        self.queries.get(handle.index()).map(|query| &query.key)
    }

    /// Number of memoized queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }
}
