//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding. Expiry is checked
//! on access against tokio's clock, so tests can drive lock and entry
//! expiration with paused time.
//!
//! The store lives inside one process, so it only coordinates callers that
//! share the same `InMemoryBackend` handle. Use the Redis backend when several
//! processes must agree on locks.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::pattern::glob_match;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        // A TTL past the clock's range never expires
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        CacheEntry { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same store.
///
/// # Example
///
/// ```no_run
/// use swr_cache::backend::{InMemoryBackend, CacheBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("products:1", b"value".to_vec(), Some(Duration::from_secs(70))).await?;
///     assert!(backend.get("products:1").await?.is_some());
///
///     // Lock primitives
///     assert!(backend.set_nx("lock:products:1", b"token".to_vec(), Duration::from_secs(10)).await?);
///     assert!(backend.compare_and_delete("lock:products:1", b"token").await?);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
    /// Last key returned for each open scan cursor.
    scan_bookmarks: Arc<DashMap<u64, String>>,
    next_cursor: Arc<AtomicU64>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
            scan_bookmarks: Arc::new(DashMap::new()),
            next_cursor: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Get the current number of entries in cache (expired ones included until purged).
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.store.len());
        if purged > 0 {
            debug!("✓ InMemory PURGE {} expired entries", purged);
        }
        purged
    }

    /// Get memory statistics.
    pub async fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Only drop the entry if it is still expired; a concurrent set may have replaced it.
        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(value, ttl);
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let written = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CacheEntry::new(value, Some(ttl)));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value, Some(ttl)));
                true
            }
        };

        debug!("✓ InMemory SETNX {} (TTL: {:?}) -> {}", key, ttl, written);
        Ok(written)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let deleted = self
            .store
            .remove_if(key, |_, entry| !entry.is_expired() && entry.data == expected)
            .is_some();

        debug!("✓ InMemory CAD {} -> {}", key, deleted);
        Ok(deleted)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        // Cursors resume after the last key they returned, so deletes between
        // steps cannot shift keys out of the scan.
        let after = if cursor == 0 {
            None
        } else {
            match self.scan_bookmarks.remove(&cursor) {
                Some((_, last)) => Some(last),
                None => {
                    return Err(Error::BackendError(format!(
                        "unknown scan cursor {}",
                        cursor
                    )))
                }
            }
        };

        let mut keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .filter(|entry| after.as_deref().map_or(true, |last| entry.key().as_str() > last))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();

        let step = count.max(1);
        let next_cursor = if keys.len() > step {
            let id = self.next_cursor.fetch_add(1, Ordering::Relaxed);
            self.scan_bookmarks.insert(id, keys[step - 1].clone());
            id
        } else {
            0
        };

        keys.truncate(step);
        let matched: Vec<String> = keys
            .into_iter()
            .filter(|key| glob_match(pattern, key))
            .collect();

        debug!(
            "✓ InMemory SCAN {} MATCH {} -> {} keys, next {}",
            cursor,
            pattern,
            matched.len(),
            next_cursor
        );
        Ok((next_cursor, matched))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.store.get(key) {
            return Ok(!entry.is_expired());
        }

        Ok(false)
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.store.remove(*key);
        }

        debug!("✓ InMemory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - all cache cleared!");
        Ok(())
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}
