//! High-level cache service for web applications.
//!
//! Provides a convenient wrapper around CacheCoordinator with Arc for easy sharing.

use crate::backend::CacheBackend;
use crate::coordinator::{CacheCoordinator, CacheStatus, CoordinatorConfig};
use crate::observability::CacheMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// High-level cache service for web applications.
///
/// Wraps `CacheCoordinator` in `Arc` so handler state can hold one clone per
/// request without copying configuration or metrics handles.
///
/// # Example
///
/// ```ignore
/// use swr_cache::{CacheService, backend::InMemoryBackend};
///
/// pub struct ProductService {
///     cache: CacheService<InMemoryBackend>,
///     repo: Arc<ProductRepository>,
/// }
///
/// impl ProductService {
///     pub async fn get(&self, id: u64) -> Result<Product, DbError> {
///         let repo = self.repo.clone();
///         self.cache
///             .get_cached_data(&format!("product:{}", id), TTL, STALE, move || async move {
///                 repo.find(id).await
///             })
///             .await
///     }
/// }
/// ```
#[derive(Clone)]
pub struct CacheService<B: CacheBackend> {
    coordinator: Arc<CacheCoordinator<B>>,
}

impl<B: CacheBackend> CacheService<B> {
    /// Create a new cache service with the given backend.
    pub fn new(backend: B) -> Self {
        CacheService::from_coordinator(CacheCoordinator::new(backend))
    }

    /// Create a new cache service with custom configuration.
    pub fn with_config(backend: B, config: CoordinatorConfig) -> Self {
        CacheService::from_coordinator(CacheCoordinator::new(backend).with_config(config))
    }

    /// Create a new cache service with custom metrics.
    pub fn with_metrics(backend: B, metrics: Arc<dyn CacheMetrics>) -> Self {
        CacheService::from_coordinator(CacheCoordinator::new(backend).with_metrics(metrics))
    }

    /// Wrap an already configured coordinator.
    pub fn from_coordinator(coordinator: CacheCoordinator<B>) -> Self {
        CacheService {
            coordinator: Arc::new(coordinator),
        }
    }

    /// See [`CacheCoordinator::get_cached_data`].
    ///
    /// # Errors
    ///
    /// Only the fetcher's own error.
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
        self.coordinator
            .get_cached_data(key, ttl, stale_time, fetcher)
            .await
    }

    /// See [`CacheCoordinator::get_with_status`].
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
        self.coordinator
            .get_with_status(key, ttl, stale_time, fetcher)
            .await
    }

    /// See [`CacheCoordinator::invalidate_cache`].
    pub async fn invalidate_cache(&self, pattern: &str) {
        self.coordinator.invalidate_cache(pattern).await
    }

    /// See [`CacheCoordinator::invalidate_cache_counted`].
    pub async fn invalidate_cache_counted(&self, pattern: &str) -> usize {
        self.coordinator.invalidate_cache_counted(pattern).await
    }

    /// See [`CacheCoordinator::invalidate_prefix`].
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.coordinator.invalidate_prefix(prefix).await
    }

    pub async fn invalidate_key(&self, key: &str) {
        self.coordinator.invalidate_key(key).await
    }

    pub async fn health_check(&self) -> bool {
        self.coordinator.health_check().await
    }

    /// Get a reference to the underlying coordinator.
    pub fn coordinator(&self) -> &CacheCoordinator<B> {
        &self.coordinator
    }
}
