//! Content-keyed wrapper caches
//!
//! Purely an allocation shortcut: a miss only costs a boundary crossing.

use std::collections::HashMap;
use std::rc::Weak;

use super::reference::{HostRef, RefInner};

const INITIAL_PRUNE_AT: usize = 64;

/// Weak map from literal content (or function source) to its wrapper.
pub(crate) struct IdentityCache {
    entries: HashMap<String, Weak<RefInner>>,
    prune_at: usize,
}

impl Default for IdentityCache {
    fn default() -> Self {
        IdentityCache {
            entries: HashMap::new(),
            prune_at: INITIAL_PRUNE_AT,
        }
    }
}

impl IdentityCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<HostRef> {
        self.entries.get(key).and_then(Weak::upgrade).map(HostRef)
    }

    pub(crate) fn insert(&mut self, key: &str, reference: &HostRef) {
        if self.entries.len() >= self.prune_at {
            self.entries.retain(|_, weak| weak.strong_count() > 0);
            self.prune_at = (self.entries.len() * 2).max(INITIAL_PRUNE_AT);
        }
        self.entries.insert(key.to_owned(), reference.downgrade());
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::reference::RefData;
    use crate::tag::TypeTag;
    use crate::wire::RefId;

    fn wrapper(raw: u64) -> HostRef {
        HostRef::new(
            RefId::new(raw).unwrap(),
            TypeTag::String,
            RefData::Plain,
            Weak::new(),
        )
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = IdentityCache::new();
        let hello = wrapper(1);
        cache.insert("hello", &hello);
        assert!(cache.get("hello").is_some_and(|r| r.ptr_eq(&hello)));
        assert!(cache.get("world").is_none());
        drop(hello);
        assert!(cache.get("hello").is_none());
    }

    #[test]
    fn test_dead_entries_are_pruned() {
        let mut cache = IdentityCache::new();
        for raw in 1..=INITIAL_PRUNE_AT as u64 {
            cache.insert(&raw.to_string(), &wrapper(raw));
        }
        let keep = wrapper(1000);
        cache.insert("keep", &keep);
        assert_eq!(cache.len(), 1);
    }
}
