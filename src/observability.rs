//! Observability hooks and the error-observation channel.
//!
//! The coordinator never surfaces cache-layer faults to its callers. Instead
//! every recovered fault is logged at `warn!` and handed to
//! [`CacheMetrics::record_error`], which is where operators plug in alerting.
//!
//! ```ignore
//! use swr_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     fn record_error(&self, _key: &str, _error: &str) {
//!         // counter!("cache_errors").inc();
//!     }
//! }
//!
//! let coordinator = CacheCoordinator::new(backend)
//!     .with_metrics(Arc::new(PrometheusMetrics));
//! ```
//!
//! Hooks not overridden fall back to debug logging via the `log` crate.
//! [`NoOpMetrics`] (the coordinator's default) discards everything; the
//! coordinator still logs faults itself.

use std::time::Duration;

/// Trait for cache metrics collection.
///
/// Hooks are invoked from request paths and from background refresh tasks,
/// so implementations must be cheap and thread-safe.
pub trait CacheMetrics: Send + Sync {
    /// A fresh entry was served.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// A stale entry was served and a background refresh was considered.
    fn record_stale(&self, key: &str, duration: Duration) {
        debug!("Cache STALE: {} took {:?}", key, duration);
    }

    /// The value was fetched under the lock and written back.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// The lock was held elsewhere and the caller waited.
    fn record_contention(&self, key: &str) {
        debug!("Cache lock contention: {}", key);
    }

    /// The value was fetched directly and not cached.
    fn record_fallback(&self, key: &str, duration: Duration) {
        debug!("Cache FALLBACK: {} took {:?}", key, duration);
    }

    /// A background refresh finished; `success` is false if the fetcher failed.
    fn record_refresh(&self, key: &str, success: bool) {
        debug!("Cache REFRESH: {} (success: {})", key, success);
    }

    /// Keys were removed by pattern invalidation.
    fn record_invalidation(&self, pattern: &str, deleted: usize) {
        debug!("Cache INVALIDATE: {} removed {} keys", pattern, deleted);
    }

    /// A cache-layer fault was recovered from.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_stale(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_contention(&self, _key: &str) {}
    fn record_fallback(&self, _key: &str, _duration: Duration) {}
    fn record_refresh(&self, _key: &str, _success: bool) {}
    fn record_invalidation(&self, _pattern: &str, _deleted: usize) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics implementation that only logs, using the trait's default hooks.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
