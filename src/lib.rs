//! # swr-cache
//!
//! A read-through cache coordinator with stale-while-revalidate serving,
//! distributed stampede locking and pattern-based invalidation.
//!
//! ## Features
//!
//! - **Stale-While-Revalidate:** Entries inside the stale window are served
//!   immediately while a background task refreshes them
//! - **Stampede Protection:** On a miss only the holder of `lock:<key>` hits the
//!   database; everyone else waits briefly and re-reads
//! - **Pattern Invalidation:** Glob patterns (`products:*`) are resolved with a
//!   cursor-based scan and deleted in batches
//! - **Backend Agnostic:** In-memory backend for tests and single processes,
//!   Redis for shared caches, or your own [`CacheBackend`]
//! - **Fail Open:** Cache faults are logged and reported through
//!   [`CacheMetrics`](observability::CacheMetrics), never surfaced to callers
//!
//! ## Quick Start
//!
//! ```ignore
//! use swr_cache::{CacheKeyBuilder, CacheService, backend::InMemoryBackend};
//! use std::time::Duration;
//!
//! let cache = CacheService::new(InMemoryBackend::new());
//! let key = CacheKeyBuilder::build_composite(&["products", "list", "page=1"]);
//!
//! // Fresh for 5 minutes, then served stale for one more while refreshing
//! let listing = cache
//!     .get_cached_data(
//!         &key,
//!         Duration::from_secs(300),
//!         Duration::from_secs(60),
//!         move || async move { repo.list_products(1).await },
//!     )
//!     .await?;
//!
//! // After a write; same as invalidate_cache("products:*")
//! cache.invalidate_prefix("products").await;
//! ```
//!
//! ### Redis
//!
//! ```ignore
//! use swr_cache::{CacheCoordinator, backend::{RedisBackend, RedisConfig}};
//!
//! let backend = RedisBackend::new(RedisConfig::from_env()?).await?;
//! let cache = CacheCoordinator::new(backend);
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod clock;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod key;
pub mod lock;
pub mod observability;
pub mod pattern;
pub mod serialization;
pub mod service;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{CacheCoordinator, CacheStatus, CoordinatorConfig};
pub use entry::{CachedEntry, Freshness};
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use lock::DistributedLock;
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
