//! Cache backend implementations.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Trait for cache backend implementations.
///
/// The backend is the shared key-value store every process talks to. Besides
/// plain get/set/delete it must provide the three primitives the coordinator
/// builds on:
///
/// - [`set_nx`](CacheBackend::set_nx): atomic "set if absent, with expiry" (lock acquire)
/// - [`compare_and_delete`](CacheBackend::compare_and_delete): atomic
///   "delete only if the value still matches" (lock release)
/// - [`scan`](CacheBackend::scan): cursor-based, non-blocking key enumeration
///
/// All methods use `&self`; implementations rely on interior mutability or an
/// external store. Returned futures are `Send` so the coordinator can move
/// backend calls into detached refresh tasks.
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found in cache
    /// - `Ok(None)` - Cache miss (key not found or expired)
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store value in cache with optional TTL.
    ///
    /// `None` means no expiry.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove value from cache.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Store `value` under `key` only if the key does not exist.
    ///
    /// The key expires after `ttl`. Returns `true` if the value was written.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn set_nx(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// The comparison and the delete happen atomically. Returns `true` if the
    /// key was deleted, `false` if it was absent or held another value.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// One step of a cursor-based key scan.
    ///
    /// Start with cursor `0`; the scan is complete when the returned cursor is
    /// `0` again. `count` is a hint for how much work one step may do, as with
    /// Redis `SCAN ... COUNT`. A key may be returned more than once.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> impl Future<Output = Result<(u64, Vec<String>)>> + Send;

    /// Check if key exists in cache (optional optimization).
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Bulk delete operation (optional optimization).
    ///
    /// Default implementation calls `delete()` for each key.
    /// Override for batch efficiency (e.g., Redis DEL).
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn mdelete(&self, keys: &[&str]) -> impl Future<Output = Result<()>> + Send {
        async move {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        }
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }

    /// Optional: Clear all cache (use with caution).
    ///
    /// # Errors
    /// Returns `Err` if operation is not implemented or fails
    fn clear_all(&self) -> impl Future<Output = Result<()>> + Send {
        async {
            Err(crate::error::Error::NotImplemented(
                "clear_all not implemented for this backend".to_string(),
            ))
        }
    }
}
