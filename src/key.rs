//! Cache key management utilities.

use crate::error::{Error, Result};

/// Namespace reserved for stampede locks.
pub const LOCK_PREFIX: &str = "lock:";

/// Builder for cache keys.
///
/// Keys are colon-separated so that related entries can be invalidated with a
/// single glob, e.g. every `products:*` key after a catalog write.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build a key from a resource prefix and an ID: `"prefix:id"`.
    pub fn build(prefix: &str, id: &dyn std::fmt::Display) -> String {
        format!("{}:{}", prefix, id)
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }

    /// Derive the lock key guarding `key`: `"lock:<key>"`.
    pub fn lock_key(key: &str) -> String {
        format!("{}{}", LOCK_PREFIX, key)
    }

    /// Whether `key` lives in the lock namespace.
    pub fn is_lock_key(key: &str) -> bool {
        key.starts_with(LOCK_PREFIX)
    }

    /// Glob matching every key under `prefix`: `"prefix:*"`.
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("{}:*", prefix)
    }

    /// Reject keys the coordinator must not cache under.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for an empty key or a key in the lock namespace.
    pub fn validate(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::ValidationError("cache key is empty".to_string()));
        }
        if Self::is_lock_key(key) {
            return Err(Error::ValidationError(format!(
                "cache key {} collides with the {} namespace",
                key, LOCK_PREFIX
            )));
        }
        Ok(())
    }
}
