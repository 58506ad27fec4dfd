//! Stored cache entries and their age-based classification.

use crate::error::Result;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value as stored in the cache backend.
///
/// `timestamp` is the epoch-millisecond time at which `value` was fetched from
/// the source of truth. Reads never touch it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CachedEntry<T> {
    pub value: T,
    pub timestamp: u64,
}

impl<T> CachedEntry<T> {
    pub fn new(value: T, timestamp: u64) -> Self {
        CachedEntry { value, timestamp }
    }

    /// Age of the entry at `now_millis`.
    ///
    /// Entries stamped in the future (clock skew between processes) have age zero.
    pub fn age(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.timestamp))
    }

    /// Classify this entry at `now_millis`.
    pub fn freshness(&self, now_millis: u64, ttl: Duration, stale_time: Duration) -> Freshness {
        Freshness::classify(self.age(now_millis), ttl, stale_time)
    }
}

impl<T: Serialize> CachedEntry<T> {
    /// Encode into envelope bytes for the backend.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_for_cache(self)
    }
}

impl<T: DeserializeOwned> CachedEntry<T> {
    /// Decode from envelope bytes read from the backend.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize_from_cache(bytes)
    }
}

/// Age-based tri-state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// `age < ttl`: serve without touching the source.
    Fresh,
    /// `ttl <= age < ttl + stale_time`: serve and refresh in the background.
    Stale,
    /// `age >= ttl + stale_time`: treat as a miss.
    Expired,
}

impl Freshness {
    pub fn classify(age: Duration, ttl: Duration, stale_time: Duration) -> Self {
        if age < ttl {
            Freshness::Fresh
        } else if age < ttl.saturating_add(stale_time) {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Expired => write!(f, "expired"),
        }
    }
}
