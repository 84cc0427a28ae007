//! The [LruCache] tracks resources owned elsewhere, evicting the least recently updated ones once their declared sizes
//! add up to more than the configured limits.
//!
//! There are two limits:
//!
//! - The hard limit is checked on every [LruCache::update].  Going over it runs a cleanup immediately, on the caller's
//!   thread.
//! - The soft limit is what every cleanup evicts down to.  Besides the hard-limit cleanups, an optional background
//!   sweeper runs one on a timer.
//!
//! Evicting an entry drops it from the cache and, if its resource is still alive, calls [Cleanable::cleanup] on it.
//! Those calls happen after the cache's lock is released, in eviction order.  A resource whose owner has already
//! dropped it is simply forgotten.
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::background::BackgroundTasks;
use crate::clock::{Clock, SystemClock};
use crate::config::{positive, CacheConfig, OversizePolicy};
use crate::entry_index::{EntryIndex, Evictions};
use crate::error::CacheError;
use crate::traits::Cleanable;

struct Shared<T, K> {
    state: Mutex<EntryIndex<T, K>>,
    config: CacheConfig,
    oversize_policy: OversizePolicy,
    clock: Arc<dyn Clock>,
}

impl<T: Cleanable, K: Hash + Eq + Clone> Shared<T, K> {
    fn update(&self, resource: &Arc<T>, key: K, size: u64) -> Result<(), CacheError> {
        let hard_limit = self.config.hard_limit;
        if size > hard_limit && self.oversize_policy == OversizePolicy::Reject {
            return Err(CacheError::Oversized { size, hard_limit });
        }

        let mut evictions = Evictions::new();
        {
            let mut state = self.state.lock();
            state.upsert(resource, key.clone(), size, self.clock.now())?;
            trace!(size, total_size = state.total_size(), "updated entry");

            if state.total_size() > hard_limit {
                state.drain_recency(self.config.soft_limit, Some(&key), &mut evictions);
                evictions.log(state.total_size());
            }
        }
        evictions.notify();
        Ok(())
    }

    fn remove(&self, key: &K) {
        let mut state = self.state.lock();
        if let Some(entry) = state.remove(key) {
            trace!(size = entry.size(), total_size = state.total_size(), "removed entry");
        }
    }

    fn cleanup(&self, protect: Option<&K>) -> usize {
        let mut evictions = Evictions::new();
        {
            let mut state = self.state.lock();
            state.drain_recency(self.config.soft_limit, protect, &mut evictions);
            evictions.log(state.total_size());
        }
        evictions.notify()
    }
}

pub struct LruCache<T, K> {
    // Declared first so the background tasks are stopped and joined before anything else is dropped.
    tasks: BackgroundTasks,
    shared: Arc<Shared<T, K>>,
}

impl<T, K> LruCache<T, K>
where
    T: Cleanable + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> LruCache<T, K> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Build a cache which reads time from `clock`.
    ///
    /// Starts the background sweeper if the config has a positive `sweep_interval`.  The default oversize policy is
    /// [OversizePolicy::Admit].
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> LruCache<T, K> {
        let sweep_interval = positive(config.sweep_interval);
        let shared = Arc::new(Shared {
            state: Mutex::new(EntryIndex::new()),
            oversize_policy: config.oversize_policy.unwrap_or(OversizePolicy::Admit),
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

        LruCache { tasks, shared }
    }

    /// Insert a resource, or refresh the entry for `key` with a new size and make it the most recent.
    ///
    /// The cache only keeps a weak reference to `resource`.  If the new total size is over the hard limit, a cleanup
    /// runs before this returns, never evicting `key` itself.
    ///
    /// Fails if `size` alone is over the hard limit and the cache was configured with [OversizePolicy::Reject], or if
    /// the total size would no longer fit in a `u64`.  A failed update leaves the cache untouched.
    pub fn update(&self, resource: &Arc<T>, key: K, size: u64) -> Result<(), CacheError> {
        self.shared.update(resource, key, size)
    }

    /// Forget `key`, without cleaning up its resource.  Unknown keys are ignored.
    pub fn remove(&self, key: &K) {
        self.shared.remove(key)
    }

    /// Evict least recently updated entries until the total size is at or under the soft limit, skipping `protect`.
    ///
    /// Returns how many resources were asked to clean up.
    pub fn cleanup(&self, protect: Option<&K>) -> usize {
        self.shared.cleanup(protect)
    }

    /// Stop the background sweeper, waiting for it to exit.  Also happens on drop.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> u64 {
        self.shared.state.lock().total_size()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shared.state.lock().slot_of(key).is_some()
    }

    pub fn soft_limit(&self) -> u64 {
        self.shared.config.soft_limit
    }

    pub fn hard_limit(&self) -> u64 {
        self.shared.config.hard_limit
    }

    /// Keys and sizes, least recently updated first.
    pub fn entries(&self) -> Vec<(K, u64)> {
        self.shared.state.lock().entries()
    }
}
