//! The [Cleanable] trait is the only thing the caches need from the resources they track.
//!
//! The caches never own a resource.  They hold a [std::sync::Weak] to it and, once the resource is chosen for
//! eviction and is still alive, ask it to release whatever it is holding onto.

/// A resource which can drop its internal buffers without being destroyed.
///
/// `cleanup` may be called more than once over the life of a resource (for example if it is evicted, re-inserted, and
/// evicted again), so implementations must be idempotent.  It is always called without any cache lock held, so it is
/// fine for it to be slow or to call back into the cache.
pub trait Cleanable {
    fn cleanup(&self);
}
