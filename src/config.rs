//! Configuration shared by [crate::LruCache] and [crate::SizeOrderCache].
use std::time::Duration;

/// What to do with an update whose size alone is over the hard limit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OversizePolicy {
    /// Keep the entry.  The hard-limit cleanup that follows protects it, so it stays cached and the cache remains over
    /// its hard limit until something else evicts it.
    Admit,
    /// Refuse the update with [crate::CacheError::Oversized], leaving the cache untouched.
    Reject,
}

#[derive(Clone, Debug, derive_builder::Builder)]
pub struct CacheConfig {
    /// Cleanup evicts until the total size is at or under this.
    pub soft_limit: u64,
    /// An update which takes the total size over this triggers an immediate cleanup.
    ///
    /// Must not be below `soft_limit`; this isn't checked.
    pub hard_limit: u64,
    /// How often the background sweeper runs a cleanup.  `None` or zero disables the sweeper.
    #[builder(default, setter(strip_option))]
    pub sweep_interval: Option<Duration>,
    /// How often the threshold scanner of a [crate::SizeOrderCache] runs.  `None` or zero disables it.
    #[builder(default, setter(strip_option))]
    pub threshold_interval: Option<Duration>,
    /// Age at which entries of a [crate::SizeOrderCache] become candidates for size-ordered eviction.  Falls back to
    /// `threshold_interval` when unset.
    #[builder(default, setter(strip_option))]
    pub age_threshold: Option<Duration>,
    /// `None` uses the default of whichever cache this config is given to.
    #[builder(default, setter(strip_option))]
    pub oversize_policy: Option<OversizePolicy>,
}

impl CacheConfig {
    /// A config with just the two limits and no background tasks.
    pub fn with_limits(soft_limit: u64, hard_limit: u64) -> CacheConfig {
        CacheConfig {
            soft_limit,
            hard_limit,
            sweep_interval: None,
            threshold_interval: None,
            age_threshold: None,
            oversize_policy: None,
        }
    }

    pub(crate) fn effective_age_threshold(&self) -> Option<Duration> {
        self.age_threshold.or(self.threshold_interval)
    }
}

/// Background tasks only run for positive intervals.
pub(crate) fn positive(interval: Option<Duration>) -> Option<Duration> {
    interval.filter(|i| !i.is_zero())
}
