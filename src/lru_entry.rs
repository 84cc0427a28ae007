//! An internal Lru cell, which points at a resource without owning it and records when it was last updated.
use std::sync::{Arc, Weak};

use crate::clock::Timestamp;

pub(crate) struct LruEntry<T, K> {
    key: K,
    size: u64,
    last_access: Timestamp,
    resource: Weak<T>,
    /// Set while the entry sits in the size index of a size-ordered cache.
    size_marked: bool,
}

impl<T, K> LruEntry<T, K> {
    pub(crate) fn new(resource: &Arc<T>, key: K, size: u64, now: Timestamp) -> LruEntry<T, K> {
        LruEntry {
            key,
            size,
            last_access: now,
            resource: Arc::downgrade(resource),
            size_marked: false,
        }
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn last_access(&self) -> Timestamp {
        self.last_access
    }

    pub(crate) fn is_size_marked(&self) -> bool {
        self.size_marked
    }

    pub(crate) fn set_size_marked(&mut self, marked: bool) {
        self.size_marked = marked;
    }

    /// Refresh the entry in place, returning the size it had before.
    ///
    /// The resource is replaced too: the caller may hand us a different `Arc` for the same key.
    pub(crate) fn refresh(&mut self, resource: &Arc<T>, size: u64, now: Timestamp) -> u64 {
        self.resource = Arc::downgrade(resource);
        self.last_access = now;
        std::mem::replace(&mut self.size, size)
    }

    /// Try to get the resource back.  `None` means its owner already dropped it.
    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.resource.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_and_expiry() {
        let first = Arc::new(1u32);
        let mut entry = LruEntry::new(&first, "a", 10, 3);
        assert_eq!(entry.last_access(), 3);
        assert_eq!(*entry.upgrade().unwrap(), 1);

        let second = Arc::new(2u32);
        assert_eq!(entry.refresh(&second, 20, 7), 10);
        assert_eq!(entry.size(), 20);
        assert_eq!(entry.last_access(), 7);
        assert_eq!(*entry.upgrade().unwrap(), 2);

        // The entry never kept anything alive.
        drop(second);
        assert!(entry.upgrade().is_none());
        assert_eq!(Arc::strong_count(&first), 1);
    }
}
