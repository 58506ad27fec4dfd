//! Integration tests for swr-cache
//!
//! These tests drive the coordinator end to end on the in-memory backend,
//! with a manual clock for entry ages and paused tokio time for lock and
//! backoff timing.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swr_cache::backend::{CacheBackend, InMemoryBackend};
use swr_cache::observability::CacheMetrics;
use swr_cache::{
    CacheCoordinator, CacheKeyBuilder, CacheStatus, CachedEntry, CoordinatorConfig, DistributedLock, Error,
    ManualClock,
};

const TTL: Duration = Duration::from_secs(60);
const STALE: Duration = Duration::from_secs(10);
const START: u64 = 1_700_000_000_000;

type FetchResult = std::result::Result<String, String>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn coordinator(clock: &ManualClock) -> CacheCoordinator<InMemoryBackend> {
    init_logging();
    CacheCoordinator::new(InMemoryBackend::new()).with_clock(Arc::new(clock.clone()))
}

/// Fetcher that counts its invocations and answers after `delay`.
fn fetcher(
    calls: &Arc<AtomicUsize>,
    value: &str,
    delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, FetchResult> + Send + 'static {
    let calls = Arc::clone(calls);
    let value = value.to_string();
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(value)
        }
        .boxed()
    }
}

fn instant(calls: &Arc<AtomicUsize>, value: &str) -> impl FnOnce() -> BoxFuture<'static, FetchResult> + Send + 'static {
    fetcher(calls, value, Duration::ZERO)
}

async fn wait_for_calls(calls: &Arc<AtomicUsize>, expected: usize) {
    for _ in 0..200 {
        if calls.load(Ordering::SeqCst) >= expected {
            break;
        }
        tokio::task::yield_now().await;
    }
}

/// Records every reported fault.
#[derive(Default)]
struct ErrorRecorder {
    errors: Mutex<Vec<(String, String)>>,
}

impl ErrorRecorder {
    fn count(&self) -> usize {
        self.errors.lock().expect("poisoned").len()
    }
}

impl CacheMetrics for ErrorRecorder {
    fn record_error(&self, key: &str, error: &str) {
        self.errors
            .lock()
            .expect("poisoned")
            .push((key.to_string(), error.to_string()));
    }
}

/// Backend whose every call fails, like a Redis server that went away.
#[derive(Clone)]
struct UnreachableBackend;

impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> swr_cache::Result<Option<Vec<u8>>> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> swr_cache::Result<()> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> swr_cache::Result<()> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn set_nx(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> swr_cache::Result<bool> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &[u8]) -> swr_cache::Result<bool> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn scan(
        &self,
        _cursor: u64,
        _pattern: &str,
        _count: usize,
    ) -> swr_cache::Result<(u64, Vec<String>)> {
        Err(Error::BackendError("connection refused".to_string()))
    }

    async fn health_check(&self) -> swr_cache::Result<bool> {
        Err(Error::BackendError("connection refused".to_string()))
    }
}

/// Backend that never answers reads.
#[derive(Clone)]
struct HangingBackend {
    inner: InMemoryBackend,
}

impl CacheBackend for HangingBackend {
    async fn get(&self, _key: &str) -> swr_cache::Result<Option<Vec<u8>>> {
        std::future::pending::<()>().await;
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> swr_cache::Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> swr_cache::Result<()> {
        self.inner.delete(key).await
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> swr_cache::Result<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> swr_cache::Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> swr_cache::Result<(u64, Vec<String>)> {
        self.inner.scan(cursor, pattern, count).await
    }
}

/// Backend that accepts locks but rejects data writes.
#[derive(Clone)]
struct ReadOnlyBackend {
    inner: InMemoryBackend,
}

impl CacheBackend for ReadOnlyBackend {
    async fn get(&self, key: &str) -> swr_cache::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> swr_cache::Result<()> {
        Err(Error::BackendError("READONLY replica".to_string()))
    }

    async fn delete(&self, key: &str) -> swr_cache::Result<()> {
        self.inner.delete(key).await
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> swr_cache::Result<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> swr_cache::Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> swr_cache::Result<(u64, Vec<String>)> {
        self.inner.scan(cursor, pattern, count).await
    }
}

/// In-memory backend that records the size of every batch delete.
#[derive(Clone)]
struct RecordingBackend {
    inner: InMemoryBackend,
    batches: Arc<Mutex<Vec<usize>>>,
}

impl RecordingBackend {
    fn new() -> Self {
        RecordingBackend {
            inner: InMemoryBackend::new(),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn batches(&self) -> Vec<usize> {
        self.batches.lock().expect("poisoned").clone()
    }
}

impl CacheBackend for RecordingBackend {
    async fn get(&self, key: &str) -> swr_cache::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> swr_cache::Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> swr_cache::Result<()> {
        self.inner.delete(key).await
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> swr_cache::Result<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> swr_cache::Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> swr_cache::Result<(u64, Vec<String>)> {
        self.inner.scan(cursor, pattern, count).await
    }

    async fn mdelete(&self, keys: &[&str]) -> swr_cache::Result<()> {
        self.batches.lock().expect("poisoned").push(keys.len());
        self.inner.mdelete(keys).await
    }
}

// =============================================================================
// Freshness
// =============================================================================

#[tokio::test]
async fn test_fresh_entry_skips_fetcher() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_cached_data("p:1", TTL, STALE, instant(&calls, "A"))
        .await
        .unwrap();

    for offset in [0u64, 1, 30_000, 59_999] {
        clock.set(START + offset);
        let (value, status) = cache
            .get_with_status("p:1", TTL, STALE, instant(&calls, "B"))
            .await
            .unwrap();
        assert_eq!(value, "A");
        assert_eq!(status, CacheStatus::Fresh);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_structured_values_round_trip_through_cache() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);

    let product = Product {
        id: 42,
        name: "Desk lamp".to_string(),
        price_cents: 3_499,
    };
    let expected = product.clone();

    let first = cache
        .get_cached_data("products:42", TTL, STALE, move || async move {
            Ok::<_, String>(product)
        })
        .await
        .unwrap();
    let second: Product = cache
        .get_cached_data("products:42", TTL, STALE, || async {
            Err::<Product, _>("source must not be read".to_string())
        })
        .await
        .unwrap();

    assert_eq!(first, expected);
    assert_eq!(second, expected);

    let raw = cache.backend().get("products:42").await.unwrap().unwrap();
    let entry: CachedEntry<Product> = CachedEntry::decode(&raw).unwrap();
    assert_eq!(entry.timestamp, START);
}

// =============================================================================
// Stale-while-revalidate
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_entry_served_and_refreshed_once() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_cached_data("p:1", TTL, STALE, instant(&calls, "A"))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(62));

    // Two stale reads while the refresh is still running
    let slow = Duration::from_millis(50);
    let (first, status_1) = cache
        .get_with_status("p:1", TTL, STALE, fetcher(&calls, "B", slow))
        .await
        .unwrap();
    let (second, status_2) = cache
        .get_with_status("p:1", TTL, STALE, fetcher(&calls, "C", slow))
        .await
        .unwrap();

    assert_eq!((first.as_str(), status_1), ("A", CacheStatus::Stale));
    assert_eq!((second.as_str(), status_2), ("A", CacheStatus::Stale));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "D"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("B", CacheStatus::Fresh));
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_entry() {
    let clock = ManualClock::new(START);
    let recorder = Arc::new(ErrorRecorder::default());
    let cache = coordinator(&clock).with_metrics(recorder.clone() as Arc<dyn CacheMetrics>);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_cached_data("p:1", TTL, STALE, instant(&calls, "A"))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(65));

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, || async {
            Err::<String, _>("replica lag".to_string())
        })
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("A", CacheStatus::Stale));

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(recorder.count(), 1);

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "B"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("A", CacheStatus::Stale));
}

#[tokio::test]
async fn test_zero_stale_window_goes_straight_to_miss() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_cached_data("p:1", TTL, Duration::ZERO, instant(&calls, "A"))
        .await
        .unwrap();
    clock.advance(TTL);

    let (value, status) = cache
        .get_with_status("p:1", TTL, Duration::ZERO, instant(&calls, "B"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("B", CacheStatus::Miss));
}

// =============================================================================
// Stampede protection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cold_key_stampede_fetches_once() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..20).map(|_| {
        cache.get_with_status(
            "products:list",
            TTL,
            STALE,
            fetcher(&calls, "listing", Duration::from_millis(50)),
        )
    });
    let results = join_all(requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let statuses: Vec<CacheStatus> = results
        .into_iter()
        .map(|result| {
            let (value, status) = result.unwrap();
            assert_eq!(value, "listing");
            status
        })
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == CacheStatus::Miss).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == CacheStatus::Contended).count(),
        19
    );

    assert!(!cache.backend().exists("lock:products:list").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_slow_holder_forces_uncached_fallback() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    // Holder's fetch outlasts the 100ms backoff
    let requests = (0..5).map(|_| {
        cache.get_with_status(
            "p:slow",
            TTL,
            STALE,
            fetcher(&calls, "v", Duration::from_millis(500)),
        )
    });
    let statuses: Vec<CacheStatus> = join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap().1)
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(statuses.iter().filter(|s| **s == CacheStatus::Miss).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == CacheStatus::Fallback).count(),
        4
    );
}

#[tokio::test(start_paused = true)]
async fn test_lock_ceiling_bounds_blocking() {
    let clock = ManualClock::new(START);
    let config = CoordinatorConfig::default().with_lock_ttl(Duration::from_millis(200));
    let cache = coordinator(&clock).with_config(config);
    let calls = Arc::new(AtomicUsize::new(0));

    let holder = cache.get_with_status(
        "p:1",
        TTL,
        STALE,
        fetcher(&calls, "first", Duration::from_secs(1)),
    );
    let late = {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cache
                .get_with_status("p:1", TTL, STALE, fetcher(&calls, "second", Duration::ZERO))
                .await
        }
    };

    let (holder, late) = tokio::join!(holder, late);

    // The late caller found the lock expired and fetched on its own
    assert_eq!(late.unwrap(), ("second".to_string(), CacheStatus::Miss));
    assert_eq!(holder.unwrap(), ("first".to_string(), CacheStatus::Miss));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Lock safety
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_expired_lock_owner_cannot_release_successor() {
    let backend = InMemoryBackend::new();
    let ceiling = Duration::from_secs(10);

    let holder_a = DistributedLock::try_acquire(&backend, "p:1", ceiling)
        .await
        .unwrap()
        .expect("A acquires");
    tokio::time::advance(ceiling + Duration::from_millis(5)).await;

    let holder_b = DistributedLock::try_acquire(&backend, "p:1", ceiling)
        .await
        .unwrap()
        .expect("B acquires");

    assert!(!holder_a.release().await.unwrap());
    assert!(backend.exists("lock:p:1").await.unwrap());

    // Still held by B
    assert!(DistributedLock::try_acquire(&backend, "p:1", ceiling)
        .await
        .unwrap()
        .is_none());
    assert!(holder_b.release().await.unwrap());
}

// =============================================================================
// Degradation
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_serves_fetcher_result() {
    init_logging();
    let recorder = Arc::new(ErrorRecorder::default());
    let cache = CacheCoordinator::new(UnreachableBackend)
        .with_metrics(recorder.clone() as Arc<dyn CacheMetrics>);
    let calls = Arc::new(AtomicUsize::new(0));

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "from db"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("from db", CacheStatus::Degraded));

    let err: FetchResult = cache
        .get_cached_data("p:1", TTL, STALE, || async { Err("db down".to_string()) })
        .await;
    assert_eq!(err.unwrap_err(), "db down");

    assert_eq!(cache.invalidate_cache_counted("p:*").await, 0);
    cache.invalidate_key("p:1").await;
    assert!(!cache.health_check().await);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_backend_times_out() {
    init_logging();
    let recorder = Arc::new(ErrorRecorder::default());
    let cache = CacheCoordinator::new(HangingBackend {
        inner: InMemoryBackend::new(),
    })
    .with_config(CoordinatorConfig::default().with_backend_timeout(Duration::from_millis(50)))
    .with_metrics(recorder.clone() as Arc<dyn CacheMetrics>);
    let calls = Arc::new(AtomicUsize::new(0));

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "A"))
        .await
        .unwrap();

    assert_eq!((value.as_str(), status), ("A", CacheStatus::Degraded));
    let errors = recorder.errors.lock().expect("poisoned");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].1.starts_with("Timeout"), "unexpected: {}", errors[0].1);
}

#[tokio::test]
async fn test_write_failure_returns_value_without_refetch() {
    init_logging();
    let inner = InMemoryBackend::new();
    let recorder = Arc::new(ErrorRecorder::default());
    let cache = CacheCoordinator::new(ReadOnlyBackend {
        inner: inner.clone(),
    })
    .with_metrics(recorder.clone() as Arc<dyn CacheMetrics>);
    let calls = Arc::new(AtomicUsize::new(0));

    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "A"))
        .await
        .unwrap();

    assert_eq!((value.as_str(), status), ("A", CacheStatus::Miss));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count(), 1);
    assert!(!inner.exists("lock:p:1").await.unwrap());
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn test_pattern_invalidation_is_complete() {
    let clock = ManualClock::new(START);
    let config = CoordinatorConfig::default().with_scan_count(7);
    let cache = coordinator(&clock).with_config(config);
    let calls = Arc::new(AtomicUsize::new(0));

    for i in 0..250 {
        cache
            .get_cached_data(&format!("products:{}", i), TTL, STALE, instant(&calls, "p"))
            .await
            .unwrap();
    }
    for i in 0..5 {
        cache
            .get_cached_data(&format!("users:{}", i), TTL, STALE, instant(&calls, "u"))
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 255);

    assert_eq!(cache.invalidate_cache_counted("products:*").await, 250);

    for i in [0, 99, 100, 249] {
        let (_, status) = cache
            .get_with_status(&format!("products:{}", i), TTL, STALE, instant(&calls, "p2"))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
    }
    for i in 0..5 {
        let (value, status) = cache
            .get_with_status(&format!("users:{}", i), TTL, STALE, instant(&calls, "u2"))
            .await
            .unwrap();
        assert_eq!((value.as_str(), status), ("u", CacheStatus::Fresh));
    }
}

#[tokio::test]
async fn test_invalidation_deletes_in_bounded_batches() {
    init_logging();
    let backend = RecordingBackend::new();
    let cache = CacheCoordinator::new(backend.clone());

    for i in 0..250 {
        backend
            .set(&format!("products:{:03}", i), vec![1], None)
            .await
            .unwrap();
    }
    backend.set("users:1", vec![1], None).await.unwrap();

    assert_eq!(cache.invalidate_cache_counted("products:*").await, 250);
    assert_eq!(backend.batches(), vec![100, 100, 50]);
    assert!(backend.exists("users:1").await.unwrap());
    assert!(!backend.exists("products:249").await.unwrap());
}

#[tokio::test]
async fn test_zero_batch_size_deletes_one_key_at_a_time() {
    init_logging();
    let backend = RecordingBackend::new();
    let config = CoordinatorConfig::default().with_invalidation_batch_size(0);
    let cache = CacheCoordinator::new(backend.clone()).with_config(config);

    for i in 0..5 {
        backend
            .set(&format!("products:{}", i), vec![1], None)
            .await
            .unwrap();
    }

    assert_eq!(cache.invalidate_cache_counted("products:*").await, 5);
    assert_eq!(backend.batches(), vec![1; 5]);
}

#[tokio::test]
async fn test_prefix_invalidation_with_built_keys() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let listing = CacheKeyBuilder::build_composite(&["products", "list", "page=1"]);
    let product = CacheKeyBuilder::build("products", &42);
    let user = CacheKeyBuilder::build("users", &7);
    for key in [&listing, &product, &user] {
        cache
            .get_cached_data(key, TTL, STALE, instant(&calls, "v"))
            .await
            .unwrap();
    }

    assert_eq!(cache.invalidate_prefix("products").await, 2);
    assert!(!cache.backend().exists(&listing).await.unwrap());
    assert!(!cache.backend().exists("products:42").await.unwrap());
    assert!(cache.backend().exists(&user).await.unwrap());
}

#[tokio::test]
async fn test_invalidation_without_matches() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);

    assert_eq!(cache.invalidate_cache_counted("nothing:*").await, 0);
    cache.invalidate_cache("nothing:*").await;
}

#[tokio::test]
async fn test_invalidated_stale_entry_is_refetched() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_cached_data("products:list:page=1", TTL, STALE, instant(&calls, "old"))
        .await
        .unwrap();
    cache.invalidate_cache("products:list:*").await;

    let (value, status) = cache
        .get_with_status("products:list:page=1", TTL, STALE, instant(&calls, "new"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("new", CacheStatus::Miss));
}

// =============================================================================
// End-to-end timeline
// =============================================================================

#[tokio::test]
async fn test_product_timeline() {
    let clock = ManualClock::new(START);
    let cache = coordinator(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    // t=0: miss, fetch under lock
    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "v1"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("v1", CacheStatus::Miss));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t=30: fresh
    clock.set(START + 30_000);
    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "unused"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("v1", CacheStatus::Fresh));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t=65: stale, background refresh
    clock.set(START + 65_000);
    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "v2"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("v1", CacheStatus::Stale));
    wait_for_calls(&calls, 2).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    // t=66: refreshed entry
    clock.set(START + 66_000);
    let raw = cache.backend().get("p:1").await.unwrap().unwrap();
    let entry: CachedEntry<String> = CachedEntry::decode(&raw).unwrap();
    assert_eq!(entry.value, "v2");
    assert_eq!(entry.timestamp, START + 65_000);

    // t=200: expired again, miss through the lock
    clock.set(START + 200_000);
    let (value, status) = cache
        .get_with_status("p:1", TTL, STALE, instant(&calls, "v3"))
        .await
        .unwrap();
    assert_eq!((value.as_str(), status), ("v3", CacheStatus::Miss));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
