//! A [SizeOrderCache] is an [crate::LruCache] which prefers to evict big, stale entries.
//!
//! Entries which haven't been updated for at least the age threshold are promoted into a size index by
//! [SizeOrderCache::scan_threshold], which a background scanner can run on a timer.  A cleanup then works in two
//! phases:
//!
//! 1. Everything in the size index is evicted, largest first (ties broken by key), whatever the current total size.
//! 2. If the total is still over the soft limit, eviction carries on in least-recently-updated order, exactly like
//!    the plain cache.
//!
//! Updating an entry takes it back out of the size index; it has to age past the threshold again to be promoted.
//!
//! The key being updated is protected from the hard-limit cleanup its update triggers, in both phases.  A protected
//! entry found in the size index is demoted rather than evicted.
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::background::BackgroundTasks;
use crate::clock::{Clock, SystemClock};
use crate::config::{positive, CacheConfig, OversizePolicy};
use crate::entry_index::{EntryIndex, Evictions};
use crate::error::CacheError;
use crate::traits::Cleanable;

/// Position in the size index: biggest first, then by key.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct SizeRank<K> {
    size: Reverse<u64>,
    key: K,
}

impl<K> SizeRank<K> {
    fn new(size: u64, key: K) -> SizeRank<K> {
        SizeRank {
            size: Reverse(size),
            key,
        }
    }
}

struct State<T, K> {
    index: EntryIndex<T, K>,
    /// Promoted entries, pointing at their slot in `index`.  An entry is in here exactly when it is size-marked.
    by_size: BTreeMap<SizeRank<K>, usize>,
}

impl<T, K: Hash + Eq + Ord + Clone> State<T, K> {
    /// Take a slot out of the size index if it's in there.
    fn demote(&mut self, slot: usize) {
        let entry = self.index.entry_mut(slot);
        if !entry.is_size_marked() {
            return;
        }
        entry.set_size_marked(false);
        let rank = SizeRank::new(entry.size(), entry.key().clone());
        self.by_size.remove(&rank);
    }

    fn promote(&mut self, slot: usize) {
        let entry = self.index.entry_mut(slot);
        entry.set_size_marked(true);
        let rank = SizeRank::new(entry.size(), entry.key().clone());
        self.by_size.insert(rank, slot);
    }

    fn remove(&mut self, key: &K) -> Option<u64> {
        let slot = self.index.slot_of(key)?;
        self.demote(slot);
        Some(self.index.remove_slot(slot).size())
    }

    fn drain(&mut self, soft_limit: u64, protect: Option<&K>, evictions: &mut Evictions<T>) {
        for (rank, slot) in std::mem::take(&mut self.by_size) {
            if protect == Some(&rank.key) {
                self.index.entry_mut(slot).set_size_marked(false);
                continue;
            }
            self.index.evict_slot(slot, evictions);
        }

        self.index.drain_recency(soft_limit, protect, evictions);
    }

    /// Check that the size index and the markers agree.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let marked = self.index.iter().filter(|e| e.is_size_marked()).count();
        assert_eq!(marked, self.by_size.len());
        for (rank, slot) in self.by_size.iter() {
            let entry = self.index.entry(*slot);
            assert!(entry.is_size_marked());
            assert!(entry.key() == &rank.key);
            assert_eq!(entry.size(), rank.size.0);
        }
        let sum = self.index.iter().map(|e| e.size()).sum::<u64>();
        assert_eq!(sum, self.index.total_size());
    }
}

struct Shared<T, K> {
    state: Mutex<State<T, K>>,
    config: CacheConfig,
    oversize_policy: OversizePolicy,
    /// Whole seconds; `None` disables promotion.
    age_threshold: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl<T: Cleanable, K: Hash + Eq + Ord + Clone> Shared<T, K> {
    fn update(&self, resource: &Arc<T>, key: K, size: u64) -> Result<(), CacheError> {
        let hard_limit = self.config.hard_limit;
        if size > hard_limit && self.oversize_policy == OversizePolicy::Reject {
            return Err(CacheError::Oversized { size, hard_limit });
        }

        let mut evictions = Evictions::new();
        {
            let mut state = self.state.lock();
            // Check first, so a refused update leaves the size index alone.
            state.index.total_after(&key, size)?;
            if let Some(slot) = state.index.slot_of(&key) {
                state.demote(slot);
            }
            state
                .index
                .upsert(resource, key.clone(), size, self.clock.now())?;
            trace!(size, total_size = state.index.total_size(), "updated entry");

            if state.index.total_size() > hard_limit {
                state.drain(self.config.soft_limit, Some(&key), &mut evictions);
                evictions.log(state.index.total_size());
            }
        }
        evictions.notify();
        Ok(())
    }

    fn remove(&self, key: &K) {
        let mut state = self.state.lock();
        if let Some(size) = state.remove(key) {
            trace!(size, total_size = state.index.total_size(), "removed entry");
        }
    }

    fn cleanup(&self, protect: Option<&K>) -> usize {
        let mut evictions = Evictions::new();
        {
            let mut state = self.state.lock();
            state.drain(self.config.soft_limit, protect, &mut evictions);
            evictions.log(state.index.total_size());
        }
        evictions.notify()
    }

    fn scan_threshold(&self) -> usize {
        let threshold = match self.age_threshold {
            Some(t) => t,
            None => return 0,
        };
        let now = self.clock.now();

        let mut state = self.state.lock();
        let mut promoted = 0;
        let mut cursor = state.index.oldest();
        while let Some(slot) = cursor {
            cursor = state.index.newer(slot);

            let entry = state.index.entry(slot);
            if entry.is_size_marked() {
                continue;
            }
            // The list is in update order, so nothing past the first young entry can be old enough.
            if now.saturating_sub(entry.last_access()) < threshold {
                break;
            }
            state.promote(slot);
            promoted += 1;
        }

        if promoted > 0 {
            debug!(
                promoted,
                candidates = state.by_size.len(),
                "threshold scan promoted entries"
            );
        }
        promoted
    }
}

pub struct SizeOrderCache<T, K> {
    // Declared first so the background tasks are stopped and joined before anything else is dropped.
    tasks: BackgroundTasks,
    shared: Arc<Shared<T, K>>,
}

impl<T, K> SizeOrderCache<T, K>
where
    T: Cleanable + Send + Sync + 'static,
    K: Hash + Eq + Ord + Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> SizeOrderCache<T, K> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Build a cache which reads time from `clock`.
    ///
    /// Starts the background sweeper and threshold scanner for whichever of `sweep_interval` and
    /// `threshold_interval` are positive.  The default oversize policy is [OversizePolicy::Reject].
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> SizeOrderCache<T, K> {
        let sweep_interval = positive(config.sweep_interval);
        let threshold_interval = positive(config.threshold_interval);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                index: EntryIndex::new(),
                by_size: BTreeMap::new(),
            }),
            oversize_policy: config.oversize_policy.unwrap_or(OversizePolicy::Reject),
            age_threshold: config.effective_age_threshold().map(|d| d.as_secs()),
            config,
            clock,
        });

        let mut tasks = BackgroundTasks::new();
        if let Some(interval) = sweep_interval {
            let sweeper = shared.clone();
            tasks.spawn("sweeper", interval, move || {
                sweeper.cleanup(None);
            });
        }
        if let Some(interval) = threshold_interval {
            let scanner = shared.clone();
            tasks.spawn("threshold-scanner", interval, move || {
                scanner.scan_threshold();
            });
        }

        SizeOrderCache { tasks, shared }
    }

    /// Insert a resource, or refresh the entry for `key` and make it the most recent, taking it out of the size index.
    ///
    /// With the default [OversizePolicy::Reject], a `size` over the hard limit is refused and nothing changes.
    pub fn update(&self, resource: &Arc<T>, key: K, size: u64) -> Result<(), CacheError> {
        self.shared.update(resource, key, size)
    }

    /// Forget `key`, without cleaning up its resource.  Unknown keys are ignored.
    pub fn remove(&self, key: &K) {
        self.shared.remove(key)
    }

    /// Evict every promoted entry largest first, then least recently updated entries until the total size is at or
    /// under the soft limit.  `protect` is never evicted.
    ///
    /// Returns how many resources were asked to clean up.
    pub fn cleanup(&self, protect: Option<&K>) -> usize {
        self.shared.cleanup(protect)
    }

    /// Promote entries at least as old as the age threshold into the size index, returning how many were promoted.
    pub fn scan_threshold(&self) -> usize {
        self.shared.scan_threshold()
    }

    /// Stop the background tasks, waiting for them to exit.  Also happens on drop.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> u64 {
        self.shared.state.lock().index.total_size()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shared.state.lock().index.slot_of(key).is_some()
    }

    pub fn soft_limit(&self) -> u64 {
        self.shared.config.soft_limit
    }

    pub fn hard_limit(&self) -> u64 {
        self.shared.config.hard_limit
    }

    /// Keys and sizes, least recently updated first.
    pub fn entries(&self) -> Vec<(K, u64)> {
        self.shared.state.lock().index.entries()
    }

    /// Keys and sizes of promoted entries, in the order the next cleanup will evict them.
    pub fn size_candidates(&self) -> Vec<(K, u64)> {
        self.shared
            .state
            .lock()
            .by_size
            .keys()
            .map(|r| (r.key.clone(), r.size.0))
            .collect()
    }

    pub fn is_size_marked(&self, key: &K) -> bool {
        let state = self.shared.state.lock();
        match state.index.slot_of(key) {
            Some(slot) => state.index.entry(slot).is_size_marked(),
            None => false,
        }
    }
}
