//! Error types for the cache coordinator.
//!
//! These errors describe faults of the cache layer itself. The coordinator
//! recovers from every one of them by fetching from the source of truth, so
//! callers of [`CacheCoordinator::get_cached_data`](crate::CacheCoordinator::get_cached_data)
//! only ever see their fetcher's own error type.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache-layer operations.
///
/// Returned by backends, the lock primitive and the serialization layer.
/// The coordinator reports these to the error-observation channel
/// ([`CacheMetrics::record_error`](crate::observability::CacheMetrics::record_error))
/// instead of propagating them.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when converting a cache entry to bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to an entry.
    ///
    /// This indicates corrupted or malformed data in cache.
    /// Common causes:
    /// - A different value type was stored under the same key
    /// - Invalid Postcard encoding
    /// - Incomplete data read from backend
    ///
    /// **Recovery:** The coordinator falls back to the fetcher.
    DeserializationError(String),

    /// A request was rejected before touching the cache.
    ///
    /// Raised for an empty key, a key inside the lock namespace, or a zero TTL.
    ValidationError(String),

    /// Backend storage error (Redis, connection pool, etc).
    ///
    /// Common causes:
    /// - Redis connection lost
    /// - Pool exhausted
    /// - Backend protocol error
    ///
    /// **Recovery:** The coordinator falls back to the fetcher.
    BackendError(String),

    /// A backend call exceeded the configured timeout.
    Timeout(String),

    /// Configuration error during backend construction.
    ///
    /// Common causes:
    /// - Invalid connection string
    /// - Unparsable environment variable
    ConfigError(String),

    /// Operation not supported by this backend.
    NotImplemented(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    ///
    /// Returned when:
    /// - Magic header is not `b"SWRC"`
    /// - Non swr-cache data is stored under the key
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// Expected during deployments that change the envelope format; the
    /// entry is treated as unreadable and the value is fetched from source.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::InvalidCacheEntry(msg) => {
                write!(f, "Invalid cache entry: {}", msg)
            }
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether this error came from the stored payload rather than the transport.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            Error::Timeout(format!("Redis error: {}", e))
        } else {
            Error::BackendError(format!("Redis error: {}", e))
        }
    }
}
