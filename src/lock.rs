//! Distributed stampede lock built on the backend's atomic primitives.
//!
//! Acquire is a conditional set of `lock:<key>` to a random token with a hard
//! expiry; release is a compare-and-delete on that token. A holder whose lock
//! already expired (and was possibly taken by someone else) therefore cannot
//! release the new holder's lock.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Random token identifying one lock holder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh token (UUID v4).
    pub fn generate() -> Self {
        LockToken(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held lock on one cache key.
///
/// Not released on drop: release needs a backend round-trip, so callers must
/// call [`release`](DistributedLock::release). A lock that is never released
/// expires after its TTL.
///
/// ```no_run
/// use swr_cache::backend::InMemoryBackend;
/// use swr_cache::lock::DistributedLock;
/// use std::time::Duration;
///
/// # async fn example() -> swr_cache::Result<()> {
/// let backend = InMemoryBackend::new();
/// if let Some(lock) = DistributedLock::try_acquire(&backend, "products:1", Duration::from_secs(10)).await? {
///     // ... fetch and populate ...
///     lock.release().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DistributedLock<B: CacheBackend> {
    backend: B,
    lock_key: String,
    token: LockToken,
}

impl<B: CacheBackend> DistributedLock<B> {
    /// Try to take the lock guarding cache key `key`.
    ///
    /// Returns `Ok(None)` if another holder has it.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails.
    pub async fn try_acquire(backend: &B, key: &str, ttl: Duration) -> Result<Option<Self>> {
        let lock_key = CacheKeyBuilder::lock_key(key);
        let token = LockToken::generate();

        if backend
            .set_nx(&lock_key, token.as_bytes().to_vec(), ttl)
            .await?
        {
            debug!("Acquired {} ({})", lock_key, token);
            Ok(Some(DistributedLock {
                backend: backend.clone(),
                lock_key,
                token,
            }))
        } else {
            debug!("{} is held by another holder", lock_key);
            Ok(None)
        }
    }

    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Release the lock if this holder still owns it.
    ///
    /// Returns `false` when the lock had already expired or belongs to a newer
    /// holder; that case is not an error.
    ///
    /// # Errors
    /// Returns `Err` if the backend fails.
    pub async fn release(self) -> Result<bool> {
        let released = self
            .backend
            .compare_and_delete(&self.lock_key, self.token.as_bytes())
            .await?;

        if released {
            debug!("Released {} ({})", self.lock_key, self.token);
        } else {
            debug!(
                "{} no longer held by {}, release skipped",
                self.lock_key, self.token
            );
        }
        Ok(released)
    }
}
