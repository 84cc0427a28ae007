//! Size-bounded LRU caches for resources which are owned somewhere else.
//!
//! Sometimes the thing holding memory isn't yours to drop: a texture owned by a scene graph, a decoded buffer owned by
//! a document.  What you can do is ask it to let go of its buffers when it hasn't been used for a while, and let it
//! rebuild them if it's needed again.  These caches decide when to ask.
//!
//! Every resource is handed to a cache as an `Arc` along with a key and a size, and the cache keeps only a
//! [std::sync::Weak] to it.  Once the sizes add up to too much, the cache evicts entries and calls
//! [Cleanable::cleanup] on the ones still alive.  A resource whose owner has already dropped it just disappears from
//! the cache.  Either way the cache is never what keeps a resource alive.
//!
//! There are two caches:
//!
//! - [LruCache] evicts least recently updated entries first.
//! - [SizeOrderCache] additionally promotes entries which haven't been updated for a configurable age, and evicts
//!   those largest first before falling back to recency.
//!
//! Both have a soft limit, which every cleanup evicts down to, and a hard limit, which triggers a cleanup as soon as
//! an update crosses it.  Cleanups can also run on a background thread, see [CacheConfig].
mod background;
mod clock;
mod config;
mod entry_index;
mod error;
mod lru_cache;
mod lru_entry;
mod recency_list;
mod size_order_cache;
mod traits;

pub use clock::*;
pub use config::{CacheConfig, CacheConfigBuilder, CacheConfigBuilderError, OversizePolicy};
pub use error::*;
pub use lru_cache::LruCache;
pub use size_order_cache::SizeOrderCache;
pub use traits::*;
