//! Canonical required-component sets.
//!
//! A [`QueryKey`] is the sorted, de-duplicated set of component kinds a query
//! requires. Two queries that name the same kinds in any order produce equal
//! keys, which is what lets the world memoize query results.

use serde::{Deserialize, Serialize};

use crate::component::ComponentKindId;

/// An order-independent set of required component kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct QueryKey(Vec<ComponentKindId>);

impl QueryKey {
    /// Build the canonical key for `kinds`.
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = ComponentKindId>) -> Self {
        let mut kinds: Vec<ComponentKindId> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        Self(kinds)
    }

    /// The required kinds in ascending order.
    #[must_use]
    pub fn kinds(&self) -> &[ComponentKindId] {
        &self.0
    }

    /// Returns `true` for the empty required set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of required kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if `kind` is part of the required set.
    #[must_use]
    pub fn contains(&self, kind: ComponentKindId) -> bool {
        self.0.binary_search(&kind).is_ok()
    }

    /// Returns `true` if every required kind satisfies `has`.
    pub fn is_satisfied_by(&self, has: impl Fn(ComponentKindId) -> bool) -> bool {
        self.0.iter().all(|&kind| has(kind))
    }
}

impl FromIterator<ComponentKindId> for QueryKey {
    fn from_iter<I: IntoIterator<Item = ComponentKindId>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_independent() {
        let a = QueryKey::new([ComponentKindId(2), ComponentKindId(0), ComponentKindId(1)]);
        let b = QueryKey::new([ComponentKindId(1), ComponentKindId(2), ComponentKindId(0)]);
        assert_eq!(a, b);
        assert_eq!(a.kinds(), &[ComponentKindId(0), ComponentKindId(1), ComponentKindId(2)]);
    }

    #[test]
    fn test_key_deduplicates() {
        let key: QueryKey = [ComponentKindId(4), ComponentKindId(4)].into_iter().collect();
        assert_eq!(key.len(), 1);
        assert!(key.contains(ComponentKindId(4)));
        assert!(!key.contains(ComponentKindId(5)));
    }

    #[test]
    fn test_empty_key_is_satisfied_by_anything() {
        let key = QueryKey::default();
        assert!(key.is_empty());
        assert!(key.is_satisfied_by(|_| false));
    }

    #[test]
    fn test_satisfaction_requires_all_kinds() {
        let key = QueryKey::new([ComponentKindId(1), ComponentKindId(3)]);
        assert!(key.is_satisfied_by(|k| k.0 == 1 || k.0 == 3));
        assert!(!key.is_satisfied_by(|k| k.0 == 1));
    }
}
