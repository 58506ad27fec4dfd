//! Redis cache backend implementation.
//!
//! Lock primitives map onto native Redis commands:
//! - acquire: `SET key token NX PX <ttl>`
//! - release: a Lua script that deletes the key only if it still holds the token
//! - enumeration: `SCAN cursor MATCH pattern COUNT n`

use super::CacheBackend;
use crate::error::{Error, Result};
use deadpool_redis::{redis::AsyncCommands, Config as PoolConfig, Connection, Pool, Runtime};
use std::env;
use std::time::Duration;

/// Pool statistics information.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Largest `PX` value accepted; Redis rejects expiries that overflow an i64
/// of milliseconds once added to the current time.
const MAX_PX_MILLIS: u64 = (i64::MAX as u64) / 2;

/// Atomic compare-and-delete. Returns 1 if the key was deleted, 0 otherwise.
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    /// Upper bound on waiting for a pooled connection and on opening a new one.
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Build Redis connection string.
    pub fn connection_string(&self) -> String {
        if let Some(password) = &self.password {
            if let Some(username) = &self.username {
                format!(
                    "redis://{}:{}@{}:{}/{}",
                    username, password, self.host, self.port, self.database
                )
            } else {
                format!(
                    "redis://default:{}@{}:{}/{}",
                    password, self.host, self.port, self.database
                )
            }
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }

    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Reads `REDIS_HOST`, `REDIS_PORT`, `REDIS_USERNAME`, `REDIS_PASSWORD`,
    /// `REDIS_DB`, `REDIS_POOL_SIZE` and `REDIS_CONNECTION_TIMEOUT_MS`.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let defaults = RedisConfig::default();

        Ok(RedisConfig {
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: parse_env("REDIS_PORT")?.unwrap_or(defaults.port),
            username: env::var("REDIS_USERNAME").ok(),
            password: env::var("REDIS_PASSWORD").ok(),
            database: parse_env("REDIS_DB")?.unwrap_or(defaults.database),
            pool_size: parse_env("REDIS_POOL_SIZE")?.unwrap_or(defaults.pool_size),
            connection_timeout: parse_env::<u64>("REDIS_CONNECTION_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.connection_timeout),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::ConfigError(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Redis backend with connection pooling and async operations.
///
/// This is the process-wide cache client: build it once at startup and hand
/// clones to the coordinator. Clones share the pool.
///
/// # Example
///
/// ```no_run
/// # use swr_cache::backend::{RedisBackend, RedisConfig, CacheBackend};
/// # use swr_cache::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default()).await?;
///
/// backend.set("products:1", b"value".to_vec(), None).await?;
/// let value = backend.get("products:1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Create new Redis backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = build_pool(
            &config.connection_string(),
            config.pool_size,
            Some(config.connection_timeout),
        )?;

        info!(
            "✓ Redis backend initialized: {}:{} (pool size: {})",
            config.host, config.port, config.pool_size
        );

        Ok(RedisBackend { pool })
    }

    /// Create from connection string directly.
    ///
    /// Pool size is determined by:
    /// 1. `REDIS_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn from_connection_string(conn_str: &str) -> Result<Self> {
        let pool_size = env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let pool = build_pool(conn_str, pool_size, None)?;

        info!(
            "✓ Redis backend initialized from connection string (pool size: {})",
            pool_size
        );

        Ok(RedisBackend { pool })
    }

    /// Get current pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            connections: status.size as u32,
            idle_connections: status.available as u32,
        }
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }
}

/// Expiry for `PX`: at least 1ms, and small enough that Redis can add it to
/// the current time without overflowing.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_PX_MILLIS)
}

fn build_pool(conn_str: &str, pool_size: u32, timeout: Option<Duration>) -> Result<Pool> {
    let mut cfg = PoolConfig::from_url(conn_str);
    let mut pool_cfg = deadpool_redis::PoolConfig::new(pool_size as usize);
    pool_cfg.timeouts.wait = timeout;
    pool_cfg.timeouts.create = timeout;
    cfg.pool = Some(pool_cfg);

    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| Error::ConfigError(format!("Failed to create Redis pool: {}", e)))
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        match ttl {
            Some(duration) => {
                // PX keeps sub-second stale windows intact
                let millis = px_millis(duration);
                deadpool_redis::redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .query_async::<()>(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::BackendError(format!("Redis SET PX failed for key {}: {}", key, e))
                    })?;
                debug!("✓ Redis SET {} (TTL: {}ms)", key, millis);
            }
            None => {
                conn.set::<_, _, ()>(key, value).await.map_err(|e| {
                    Error::BackendError(format!("Redis SET failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {}", key);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e)))?;

        debug!("✓ Redis DELETE {}", key);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let millis = px_millis(ttl);

        // Nil reply means the key already existed
        let reply: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis SET NX failed for key {}: {}", key, e))
            })?;

        let written = reply.is_some();
        debug!("✓ Redis SETNX {} (TTL: {}ms) -> {}", key, millis, written);
        Ok(written)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.connection().await?;

        let deleted: i64 = deadpool_redis::redis::cmd("EVAL")
            .arg(COMPARE_AND_DELETE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(expected)
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis compare-and-delete failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis CAD {} -> {}", key, deleted == 1);
        Ok(deleted == 1)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.connection().await?;

        let (next_cursor, keys): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis SCAN failed: {}", e)))?;

        debug!(
            "✓ Redis SCAN {} MATCH {} -> {} keys, next {}",
            cursor,
            pattern,
            keys.len(),
            next_cursor
        );
        Ok((next_cursor, keys))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        let exists: bool = conn.exists(key).await.map_err(|e| {
            Error::BackendError(format!("Redis EXISTS failed for key {}: {}", key, e))
        })?;

        Ok(exists)
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;

        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL (bulk) failed: {}", e)))?;

        debug!("✓ Redis MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong == "PONG" || pong.contains("PONG"))
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        deadpool_redis::redis::cmd("FLUSHDB")
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis FLUSHDB failed: {}", e)))?;

        warn!("⚠ Redis FLUSHDB executed - all cache cleared!");
        Ok(())
    }
}
