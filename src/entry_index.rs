//! The [EntryIndex] pairs a [RecencyList] of entries with a hash index from key to slot, and keeps the running total
//! size of everything in it.
//!
//! Everything here runs under the owning cache's lock.  Eviction never calls into a resource: it collects the live
//! ones into an [Evictions] which the cache notifies after the lock is released.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;
use tracing::debug;

use crate::clock::Timestamp;
use crate::error::CacheError;
use crate::lru_entry::LruEntry;
use crate::recency_list::RecencyList;
use crate::traits::Cleanable;

/// Resources picked for cleanup, in eviction order.
pub(crate) struct Evictions<T> {
    live: Vec<Arc<T>>,
    /// Entries whose resource was already gone when evicted.
    expired: usize,
}

impl<T> Evictions<T> {
    pub(crate) fn new() -> Evictions<T> {
        Evictions {
            live: Vec::new(),
            expired: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    pub(crate) fn expired(&self) -> usize {
        self.expired
    }

    /// Log a cleanup which evicted anything.
    pub(crate) fn log(&self, total_size: u64) {
        if self.live.is_empty() && self.expired == 0 {
            return;
        }
        debug!(
            cleaned = self.live.len(),
            expired = self.expired,
            total_size,
            "cleanup evicted entries"
        );
    }
}

impl<T: Cleanable> Evictions<T> {
    /// Call `cleanup` on every live resource, in the order they were evicted.  Must be called without the cache lock.
    pub(crate) fn notify(self) -> usize {
        let count = self.live.len();
        for resource in self.live {
            resource.cleanup();
        }
        count
    }
}

pub(crate) struct EntryIndex<T, K> {
    list: RecencyList<LruEntry<T, K>>,
    /// Points at the slot of the key.
    keys: HashMap<K, usize, RandomState>,
    total_size: u64,
}

impl<T, K: Hash + Eq + Clone> EntryIndex<T, K> {
    pub(crate) fn new() -> EntryIndex<T, K> {
        EntryIndex {
            list: RecencyList::new(),
            keys: Default::default(),
            total_size: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.total_size
    }

    pub(crate) fn slot_of(&self, key: &K) -> Option<usize> {
        self.keys.get(key).copied()
    }

    pub(crate) fn entry(&self, slot: usize) -> &LruEntry<T, K> {
        self.list.get(slot)
    }

    pub(crate) fn entry_mut(&mut self, slot: usize) -> &mut LruEntry<T, K> {
        self.list.get_mut(slot)
    }

    /// The least recently updated slot.
    pub(crate) fn oldest(&self) -> Option<usize> {
        self.list.front()
    }

    pub(crate) fn newer(&self, slot: usize) -> Option<usize> {
        self.list.next(slot)
    }

    /// The total size after storing `size` under `key`, or an error if it doesn't fit in a `u64`.
    pub(crate) fn total_after(&self, key: &K, size: u64) -> Result<u64, CacheError> {
        let replaced = self.slot_of(key).map_or(0, |slot| self.list.get(slot).size());
        (self.total_size - replaced)
            .checked_add(size)
            .ok_or(CacheError::TotalOverflow {
                size,
                total_size: self.total_size,
            })
    }

    /// Insert a new entry, or refresh the existing one for this key and make it the most recent.  Returns its slot.
    ///
    /// Nothing changes if the new total would overflow.
    pub(crate) fn upsert(
        &mut self,
        resource: &Arc<T>,
        key: K,
        size: u64,
        now: Timestamp,
    ) -> Result<usize, CacheError> {
        let total_size = self.total_after(&key, size)?;
        let slot = match self.slot_of(&key) {
            Some(slot) => {
                self.list.get_mut(slot).refresh(resource, size, now);
                self.list.move_to_back(slot);
                slot
            }
            None => {
                let slot = self
                    .list
                    .push_back(LruEntry::new(resource, key.clone(), size, now));
                self.keys.insert(key, slot);
                slot
            }
        };
        self.total_size = total_size;
        Ok(slot)
    }

    /// Take a slot out of both indices, handing back its entry.
    pub(crate) fn remove_slot(&mut self, slot: usize) -> LruEntry<T, K> {
        let entry = self.list.remove(slot);
        self.keys.remove(entry.key());
        self.total_size -= entry.size();
        entry
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<LruEntry<T, K>> {
        let slot = self.slot_of(key)?;
        Some(self.remove_slot(slot))
    }

    /// Remove a slot and, if its resource is still alive, queue it for cleanup.
    pub(crate) fn evict_slot(&mut self, slot: usize, evictions: &mut Evictions<T>) {
        let entry = self.remove_slot(slot);
        match entry.upgrade() {
            Some(resource) => evictions.live.push(resource),
            None => evictions.expired += 1,
        }
    }

    /// Evict from the least recent end until the total size is at or under `soft_limit`.
    ///
    /// The entry for `protect`, if any, is stepped over and stays cached with its size still counted.
    pub(crate) fn drain_recency(
        &mut self,
        soft_limit: u64,
        protect: Option<&K>,
        evictions: &mut Evictions<T>,
    ) {
        let mut cursor = self.list.front();
        while self.total_size > soft_limit {
            let slot = match cursor {
                Some(s) => s,
                None => break,
            };
            cursor = self.list.next(slot);

            if protect == Some(self.list.get(slot).key()) {
                continue;
            }
            self.evict_slot(slot, evictions);
        }
    }

    /// Snapshot of keys and sizes, least recent first.
    pub(crate) fn entries(&self) -> Vec<(K, u64)> {
        self.iter().map(|e| (e.key().clone(), e.size())).collect()
    }

    /// Iterator over entries, least recent first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &LruEntry<T, K>> {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(index: &EntryIndex<u32, u32>) -> Vec<u32> {
        index.entries().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_upsert_tracks_total_size() {
        let res = Arc::new(0u32);
        let mut index = EntryIndex::new();
        index.upsert(&res, 1, 10, 0).unwrap();
        index.upsert(&res, 2, 20, 0).unwrap();
        assert_eq!(index.total_size(), 30);

        // Re-inserting changes the size in place and moves the key to the back.
        index.upsert(&res, 1, 5, 1).unwrap();
        assert_eq!(index.total_size(), 25);
        assert_eq!(index.len(), 2);
        assert_eq!(keys(&index), vec![2, 1]);

        assert_eq!(index.remove(&2).map(|e| e.size()), Some(20));
        assert!(index.remove(&2).is_none());
        assert_eq!(index.total_size(), 5);
    }

    #[test]
    fn test_drain_recency_steps_over_protected() {
        let res = Arc::new(0u32);
        let mut index = EntryIndex::new();
        for k in 0..4 {
            index.upsert(&res, k, 10, 0).unwrap();
        }

        let mut evictions = Evictions::new();
        index.drain_recency(20, Some(&0), &mut evictions);
        assert_eq!(keys(&index), vec![0, 3]);
        assert_eq!(index.total_size(), 20);
        assert_eq!(evictions.live(), 2);
        assert_eq!(evictions.expired(), 0);

        // Draining stops as soon as the total is at or under the limit, even mid-way past the protected key.
        let mut index = EntryIndex::new();
        for k in 0..4 {
            index.upsert(&res, k, 10, 0).unwrap();
        }
        let mut evictions = Evictions::new();
        index.drain_recency(15, Some(&0), &mut evictions);
        assert_eq!(keys(&index), vec![0]);
        assert_eq!(index.total_size(), 10);
        assert_eq!(evictions.live(), 3);
    }

    #[test]
    fn test_upsert_refuses_total_overflow() {
        let res = Arc::new(0u32);
        let mut index = EntryIndex::new();
        index.upsert(&res, 1, u64::MAX - 5, 0).unwrap();

        let err = index.upsert(&res, 2, 10, 1).unwrap_err();
        assert!(matches!(
            err,
            CacheError::TotalOverflow {
                size: 10,
                total_size
            } if total_size == u64::MAX - 5
        ));
        assert_eq!(keys(&index), vec![1]);
        assert_eq!(index.total_size(), u64::MAX - 5);

        // Shrinking the big entry makes room, and refreshing only counts the difference.
        index.upsert(&res, 2, 5, 1).unwrap();
        assert_eq!(index.total_size(), u64::MAX);
        index.upsert(&res, 1, u64::MAX - 10, 2).unwrap();
        index.upsert(&res, 2, 10, 3).unwrap();
        assert_eq!(index.total_size(), u64::MAX);
        assert_eq!(keys(&index), vec![1, 2]);
    }

    #[test]
    fn test_drain_recency_counts_expired() {
        let kept = Arc::new(0u32);
        let mut index = EntryIndex::new();
        {
            let dropped = Arc::new(1u32);
            index.upsert(&dropped, 1, 10, 0).unwrap();
        }
        index.upsert(&kept, 2, 10, 0).unwrap();

        let mut evictions = Evictions::new();
        index.drain_recency(0, None, &mut evictions);
        assert_eq!(index.len(), 0);
        assert_eq!(index.total_size(), 0);
        assert_eq!(evictions.live(), 1);
        assert_eq!(evictions.expired(), 1);
    }
}
