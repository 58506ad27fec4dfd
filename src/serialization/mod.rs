//! Postcard-based serialization with versioned envelopes.
//!
//! Every value written to the cache backend is wrapped in an envelope so that
//! entries written by an incompatible build, or by something other than this
//! crate, are detected on read instead of being decoded into garbage.
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│ VERSION (varint)│POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "SWRC"              u32                postcard::to_allocvec(T)
//! ```
//!
//! The payload stored by the coordinator is a
//! [`CachedEntry`](crate::entry::CachedEntry), i.e. the value plus the
//! timestamp at which it was fetched.
//!
//! # Example
//!
//! ```rust
//! use swr_cache::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Product {
//!     sku: String,
//!     price_cents: u64,
//! }
//!
//! # fn main() -> swr_cache::Result<()> {
//! let product = Product { sku: "TSHIRT-M".to_string(), price_cents: 1999 };
//! let bytes = serialize_for_cache(&product)?;
//! let decoded: Product = deserialize_from_cache(&bytes)?;
//! assert_eq!(product, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for swr-cache entries: b"SWRC"
pub const CACHE_MAGIC: [u8; 4] = *b"SWRC";

/// Current schema version.
///
/// Bump when the shape of [`CachedEntry`](crate::entry::CachedEntry) changes.
/// Entries written with another version are treated as unreadable and the
/// coordinator fetches from source instead.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for stored cache values.
///
/// ```rust
/// use swr_cache::serialization::CacheEnvelope;
///
/// let envelope = CacheEnvelope::new("data");
/// assert_eq!(envelope.magic, *b"SWRC");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"SWRC"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The wrapped value
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value from cache storage with validation.
///
/// Checks, in order: that the bytes decode as an envelope, that the magic
/// header is `b"SWRC"`, and that the schema version matches.
///
/// # Errors
///
/// - `Error::DeserializationError`: Corrupted or foreign Postcard payload
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
