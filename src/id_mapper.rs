//! External string identity <-> internal integer id translation.
//!
//! The mapping is monotonic (ids are handed out in increasing order and
//! never reused) and bidirectional, so the Coordinator can go either way:
//! Engine and Book only ever see the integer, the Ledger keys by the
//! external string directly.

use crate::orders::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdMapper {
    map: HashMap<String, UserId>,
    #[serde(skip)]
    reverse: HashMap<UserId, String>,
    next_id: UserId,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the reverse lookup from `map`. Needed after deserializing
    /// a snapshot, since `reverse` itself is not persisted.
    pub fn rebuild_reverse_index(&mut self) {
        self.reverse = self.map.iter().map(|(k, &v)| (v, k.clone())).collect();
    }

    /// Returns the internal id for `external`, minting a new one on first use.
    pub fn intern(&mut self, external: &str) -> UserId {
        if let Some(&id) = self.map.get(external) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.map.insert(external.to_string(), id);
        self.reverse.insert(id, external.to_string());
        id
    }

    /// Looks up the internal id without minting a new one.
    pub fn get(&self, external: &str) -> Option<UserId> {
        self.map.get(external).copied()
    }

    /// Looks up the external string for an internal id, if it has been interned.
    pub fn external_of(&self, internal: UserId) -> Option<&str> {
        self.reverse.get(&internal).map(String::as_str)
    }

    pub fn map(&self) -> &HashMap<String, UserId> {
        &self.map
    }

    pub fn next_id(&self) -> UserId {
        self.next_id
    }

    /// Reconstructs from a persisted `{map, next_id}` pair, rebuilding the
    /// reverse index. Used by [`crate::persistence::load_state`].
    pub fn from_parts(map: HashMap<String, UserId>, next_id: UserId) -> Self {
        let mut m = Self { map, reverse: HashMap::new(), next_id };
        m.rebuild_reverse_index();
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_external_id_always_maps_to_the_same_internal_id() {
        let mut m = IdMapper::new();
        let a = m.intern("alice");
        let a2 = m.intern("alice");
        assert_eq!(a, a2);
    }

    #[test]
    fn distinct_external_ids_get_distinct_internal_ids() {
        let mut m = IdMapper::new();
        let a = m.intern("alice");
        let b = m.intern("bob");
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let mut m = IdMapper::new();
        assert_eq!(m.intern("alice"), 0);
        assert_eq!(m.intern("bob"), 1);
        assert_eq!(m.intern("alice"), 0);
        assert_eq!(m.intern("carol"), 2);
    }

    #[test]
    fn get_does_not_mint() {
        let mut m = IdMapper::new();
        assert!(m.get("alice").is_none());
        m.intern("alice");
        assert_eq!(m.get("alice"), Some(0));
    }

    #[test]
    fn external_of_is_the_exact_inverse_of_intern() {
        let mut m = IdMapper::new();
        let bob = m.intern("bob");
        assert_eq!(m.external_of(bob), Some("bob"));
        assert!(m.external_of(999).is_none());
    }

    #[test]
    fn from_parts_rebuilds_a_working_reverse_index() {
        let mut map = HashMap::new();
        map.insert("alice".to_string(), 0u64);
        map.insert("bob".to_string(), 1u64);
        let m = IdMapper::from_parts(map, 2);
        assert_eq!(m.external_of(0), Some("alice"));
        assert_eq!(m.external_of(1), Some("bob"));
    }
}
