//! Read-through cache coordinator - main entry point for cache operations.
//!
//! [`CacheCoordinator::get_cached_data`] serves a value for a key from the
//! cache when it can, and from the caller's fetcher (the database read) when it
//! must. Entries are classified by age:
//!
//! ```text
//!   age < ttl                    -> Fresh   serve cached value
//!   ttl <= age < ttl + stale     -> Stale   serve cached value, refresh in background
//!   age >= ttl + stale, or none  -> Miss    fetch under the stampede lock
//! ```
//!
//! On a miss only the holder of `lock:<key>` runs the fetcher and repopulates
//! the entry. Other callers wait one backoff interval, re-read once, and fall
//! back to an uncached direct fetch if the entry is still absent.
//!
//! Cache-backend faults never reach the caller: they are reported to the
//! error-observation channel and the fetcher's result is returned directly.

use crate::backend::CacheBackend;
use crate::clock::{Clock, SystemClock};
use crate::entry::{CachedEntry, Freshness};
use crate::error::{Error, Result};
use crate::key::CacheKeyBuilder;
use crate::lock::DistributedLock;
use crate::observability::{CacheMetrics, NoOpMetrics};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default hard expiry of a stampede lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Default wait before re-reading when another holder has the lock.
pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_millis(100);

/// Default number of keys per delete call during invalidation.
pub const DEFAULT_INVALIDATION_BATCH_SIZE: usize = 100;

/// Default `COUNT` hint per scan step.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Tuning for a [`CacheCoordinator`].
///
/// # Example
///
/// ```
/// use swr_cache::CoordinatorConfig;
/// use std::time::Duration;
///
/// let config = CoordinatorConfig::default()
///     .with_lock_ttl(Duration::from_secs(5))
///     .with_backend_timeout(Duration::from_millis(250));
/// assert_eq!(config.lock_backoff, Duration::from_millis(100));
/// ```
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Absolute ceiling on how long a lock holder can block other callers.
    ///
    /// Independent of any entry's TTL. If a fetch outlives it, a second
    /// caller may acquire the lock and fetch concurrently.
    pub lock_ttl: Duration,

    /// How long a caller that lost the lock race waits before re-reading.
    pub lock_backoff: Duration,

    /// Maximum keys per delete call when invalidating by pattern.
    pub invalidation_batch_size: usize,

    /// `COUNT` hint for each scan step when invalidating by pattern.
    pub scan_count: usize,

    /// Optional ceiling on every individual backend call.
    ///
    /// An elapsed call is reported as `Error::Timeout` and handled like any
    /// other backend fault. `None` relies on the backend's own timeouts.
    pub backend_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_backoff: DEFAULT_LOCK_BACKOFF,
            invalidation_batch_size: DEFAULT_INVALIDATION_BATCH_SIZE,
            scan_count: DEFAULT_SCAN_COUNT,
            backend_timeout: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_lock_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = backoff;
        self
    }

    pub fn with_invalidation_batch_size(mut self, size: usize) -> Self {
        self.invalidation_batch_size = size;
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = Some(timeout);
        self
    }
}

/// Which path produced the value returned by [`CacheCoordinator::get_with_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Cached entry younger than the TTL.
    Fresh,
    /// Cached entry inside the stale window; a background refresh was scheduled.
    Stale,
    /// Fetched while holding the lock and written back to the cache.
    Miss,
    /// Lock was held elsewhere; the entry appeared after the backoff.
    Contended,
    /// Lock was held elsewhere and the entry was still absent; fetched uncached.
    Fallback,
    /// The cache backend failed; fetched uncached.
    Degraded,
    /// The request was not cacheable (invalid key or TTL); fetched uncached.
    Bypass,
}

impl CacheStatus {
    /// Whether the value came out of the cache rather than the fetcher.
    pub fn is_cached(&self) -> bool {
        matches!(
            self,
            CacheStatus::Fresh | CacheStatus::Stale | CacheStatus::Contended
        )
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Fresh => write!(f, "FRESH"),
            CacheStatus::Stale => write!(f, "STALE"),
            CacheStatus::Miss => write!(f, "MISS"),
            CacheStatus::Contended => write!(f, "CONTENDED"),
            CacheStatus::Fallback => write!(f, "FALLBACK"),
            CacheStatus::Degraded => write!(f, "DEGRADED"),
            CacheStatus::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// Stale-while-revalidate read-through cache with stampede protection.
///
/// Cloning is cheap and clones share the backend handle, metrics, clock and
/// the set of in-flight background refreshes.
///
/// # Example
///
/// ```ignore
/// use swr_cache::{CacheCoordinator, backend::InMemoryBackend};
/// use std::time::Duration;
///
/// let cache = CacheCoordinator::new(InMemoryBackend::new());
///
/// let product = cache
///     .get_cached_data(
///         "product:42",
///         Duration::from_secs(300),
///         Duration::from_secs(60),
///         move || async move { repo.find_product(42).await },
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct CacheCoordinator<B: CacheBackend> {
    backend: B,
    config: CoordinatorConfig,
    metrics: Arc<dyn CacheMetrics>,
    clock: Arc<dyn Clock>,
    refreshing: Arc<DashMap<String, ()>>,
}

impl<B: CacheBackend> CacheCoordinator<B> {
    /// Create a coordinator over `backend` with default configuration.
    pub fn new(backend: B) -> Self {
        CacheCoordinator {
            backend,
            config: CoordinatorConfig::default(),
            metrics: Arc::new(NoOpMetrics),
            clock: Arc::new(SystemClock),
            refreshing: Arc::new(DashMap::new()),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the clock used to timestamp and age entries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return the value for `key`, from cache when possible.
    ///
    /// - `ttl`: how long an entry is fully fresh (must be non-zero)
    /// - `stale_time`: extra window in which a stale entry is served while it
    ///   is refreshed in the background
    /// - `fetcher`: reads the value from the source of truth; it may run more
    ///   than once for the same key and concurrently across processes
    ///
    /// # Errors
    ///
    /// Only the fetcher's own error. Cache-backend faults are reported to the
    /// metrics/log channel and answered with a direct fetch.
    pub async fn get_cached_data<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_time: Duration,
        fetcher: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.get_with_status(key, ttl, stale_time, fetcher)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`get_cached_data`](Self::get_cached_data), also reporting which
    /// path served the value.
    ///
    /// # Errors
    ///
    /// Only the fetcher's own error.
    pub async fn get_with_status<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_time: Duration,
        fetcher: F,
    ) -> std::result::Result<(T, CacheStatus), E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let started = Instant::now();

        if let Err(e) = validate_request(key, ttl) {
            self.report(key, &e);
            return self
                .fetch_uncached(key, fetcher, CacheStatus::Bypass, started)
                .await;
        }

        let entry = match self.read_entry::<T>(key).await {
            Ok(entry) => entry,
            Err(e) => {
                self.report(key, &e);
                return self
                    .fetch_uncached(key, fetcher, CacheStatus::Degraded, started)
                    .await;
            }
        };

        if let Some(entry) = entry {
            let now = self.clock.now_millis();
            match entry.freshness(now, ttl, stale_time) {
                Freshness::Fresh => {
                    debug!("» {} is fresh (age {:?})", key, entry.age(now));
                    self.metrics.record_hit(key, started.elapsed());
                    return Ok((entry.value, CacheStatus::Fresh));
                }
                Freshness::Stale => {
                    debug!("» {} is stale (age {:?}), revalidating", key, entry.age(now));
                    self.spawn_refresh(key, ttl, stale_time, fetcher);
                    self.metrics.record_stale(key, started.elapsed());
                    return Ok((entry.value, CacheStatus::Stale));
                }
                Freshness::Expired => {
                    debug!("» {} expired (age {:?})", key, entry.age(now));
                }
            }
        }

        self.load_under_lock(key, ttl, stale_time, fetcher, started)
            .await
    }

    /// Miss path: fetch under `lock:<key>`, or wait for whoever holds it.
    async fn load_under_lock<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_time: Duration,
        fetcher: F,
        started: Instant,
    ) -> std::result::Result<(T, CacheStatus), E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let acquired = self
            .call(DistributedLock::try_acquire(
                &self.backend,
                key,
                self.config.lock_ttl,
            ))
            .await;

        let lock = match acquired {
            Ok(lock) => lock,
            Err(e) => {
                self.report(key, &e);
                return self
                    .fetch_uncached(key, fetcher, CacheStatus::Degraded, started)
                    .await;
            }
        };

        match lock {
            Some(lock) => {
                let result = fetcher().await;

                if let Ok(value) = &result {
                    if let Err(e) = self.write_entry(key, value, ttl, stale_time).await {
                        self.report(key, &e);
                    }
                }

                // A false return means the lock expired and may have a new owner
                if let Err(e) = self.call(lock.release()).await {
                    self.report(key, &e);
                }

                let value = result?;
                self.metrics.record_miss(key, started.elapsed());
                Ok((value, CacheStatus::Miss))
            }
            None => {
                self.metrics.record_contention(key);
                tokio::time::sleep(self.config.lock_backoff).await;

                match self.read_entry::<T>(key).await {
                    Ok(Some(entry)) => {
                        debug!("» {} populated by another holder", key);
                        self.metrics.record_hit(key, started.elapsed());
                        Ok((entry.value, CacheStatus::Contended))
                    }
                    Ok(None) => {
                        debug!("» {} still absent after backoff, fetching uncached", key);
                        self.fetch_uncached(key, fetcher, CacheStatus::Fallback, started)
                            .await
                    }
                    Err(e) => {
                        self.report(key, &e);
                        self.fetch_uncached(key, fetcher, CacheStatus::Degraded, started)
                            .await
                    }
                }
            }
        }
    }

    /// Run `fetcher` in a detached task and write its result back.
    ///
    /// At most one refresh per key is in flight in this process.
    fn spawn_refresh<T, E, F, Fut>(&self, key: &str, ttl: Duration, stale_time: Duration, fetcher: F)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.report(key, &Error::Other(format!("cannot schedule refresh: {}", e)));
                return;
            }
        };

        if self.refreshing.insert(key.to_string(), ()).is_some() {
            debug!("Refresh for {} already in flight", key);
            return;
        }

        // Owned by the task so the marker clears even if it is never polled
        let in_flight = RefreshGuard {
            refreshing: Arc::clone(&self.refreshing),
            key: key.to_string(),
        };
        let this = self.clone();
        let key = key.to_string();
        runtime.spawn(async move {
            let _in_flight = in_flight;

            match fetcher().await {
                Ok(value) => match this.write_entry(&key, &value, ttl, stale_time).await {
                    Ok(()) => {
                        debug!("✓ Background refresh stored {}", key);
                        this.metrics.record_refresh(&key, true);
                    }
                    Err(e) => {
                        this.report(&key, &e);
                        this.metrics.record_refresh(&key, false);
                    }
                },
                Err(e) => {
                    warn!("Background refresh for {} failed: {}", key, e);
                    this.metrics
                        .record_error(&key, &format!("background refresh failed: {}", e));
                    this.metrics.record_refresh(&key, false);
                }
            }
        });
    }

    /// Delete every key matching the glob `pattern`.
    ///
    /// Keys are enumerated with a cursor-based scan and deleted in batches of
    /// `invalidation_batch_size`. Best-effort: backend errors are reported and
    /// swallowed. Patterns should target data keys only; a pattern that
    /// matches `lock:*` keys deletes those too.
    pub async fn invalidate_cache(&self, pattern: &str) {
        self.invalidate_cache_counted(pattern).await;
    }

    /// Like [`invalidate_cache`](Self::invalidate_cache), returning how many
    /// keys were deleted (0 if the backend failed).
    pub async fn invalidate_cache_counted(&self, pattern: &str) -> usize {
        match self.delete_matching(pattern).await {
            Ok(deleted) => {
                debug!("✓ Invalidated {} keys matching {}", deleted, pattern);
                self.metrics.record_invalidation(pattern, deleted);
                deleted
            }
            Err(e) => {
                self.report(pattern, &e);
                0
            }
        }
    }

    /// Invalidate every key built under `prefix` (`"<prefix>:*"`), returning
    /// how many were deleted.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_cache_counted(&CacheKeyBuilder::prefix_pattern(prefix))
            .await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next_cursor, batch) = self
                .call(self.backend.scan(cursor, pattern, self.config.scan_count))
                .await?;
            keys.extend(batch);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        for chunk in keys.chunks(self.config.invalidation_batch_size.max(1)) {
            let batch: Vec<&str> = chunk.iter().map(String::as_str).collect();
            self.call(self.backend.mdelete(&batch)).await?;
        }

        Ok(keys.len())
    }

    /// Delete a single data key. Best-effort, like pattern invalidation.
    pub async fn invalidate_key(&self, key: &str) {
        match self.call(self.backend.delete(key)).await {
            Ok(()) => {
                debug!("✓ Invalidated {}", key);
                self.metrics.record_invalidation(key, 1);
            }
            Err(e) => self.report(key, &e),
        }
    }

    /// Whether the backend answers. Failures are reported and yield `false`.
    pub async fn health_check(&self) -> bool {
        match self.call(self.backend.health_check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                self.report("health_check", &e);
                false
            }
        }
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    async fn fetch_uncached<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        status: CacheStatus,
        started: Instant,
    ) -> std::result::Result<(T, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let value = fetcher().await?;
        self.metrics.record_fallback(key, started.elapsed());
        Ok((value, status))
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedEntry<T>>> {
        match self.call(self.backend.get(key)).await? {
            Some(bytes) => CachedEntry::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn write_entry<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        stale_time: Duration,
    ) -> Result<()> {
        let bytes = CachedEntry::new(value, self.clock.now_millis()).encode()?;
        let expiry = ttl.saturating_add(stale_time);
        self.call(self.backend.set(key, bytes, Some(expiry))).await
    }

    /// Apply `backend_timeout` to one backend call.
    async fn call<R>(&self, op: impl Future<Output = Result<R>>) -> Result<R> {
        match self.config.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, op).await?,
            None => op.await,
        }
    }

    fn report(&self, key: &str, error: &Error) {
        if error.is_payload_error() {
            warn!("Unreadable cache entry at {}: {}", key, error);
        } else {
            warn!("Cache fault for {}: {}", key, error);
        }
        self.metrics.record_error(key, &error.to_string());
    }
}

fn validate_request(key: &str, ttl: Duration) -> Result<()> {
    CacheKeyBuilder::validate(key)?;
    if ttl.is_zero() {
        return Err(Error::ValidationError(format!(
            "ttl for {} must be positive",
            key
        )));
    }
    Ok(())
}

/// Clears the in-flight marker when a refresh task ends, even by panic.
struct RefreshGuard {
    refreshing: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing.remove(&self.key);
    }
}
