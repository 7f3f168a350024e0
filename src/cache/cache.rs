//! Cache and counter stores
//!
//! Two interfaces, each with an in-process and a Redis implementation:
//! - `Cache<T>`: JSON values with optional TTL
//! - `CounterStore`: fixed-window counters for rate limiting
//!
//! The in-process stores only see one instance's traffic. Deployments with
//! several instances should inject the Redis stores instead.

use super::error::CacheResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[cfg(feature = "cache")]
use super::RedisPool;
#[cfg(feature = "cache")]
use redis::AsyncCommands;
#[cfg(feature = "cache")]
use tracing::warn;

/// Generic cache trait supporting any serializable type
#[async_trait]
pub trait Cache<T: Serialize + DeserializeOwned + Send + Sync + 'static>: Send + Sync {
    /// Get a value from cache by key
    async fn get(&self, key: &str) -> CacheResult<Option<T>>;

    /// Set a value in cache with optional TTL
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

/// Current state of a fixed counting window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Hits recorded in the window, including this one
    pub count: u64,
    /// Time until the window resets
    pub reset_in: Duration,
}

/// Counters that reset after a fixed window
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one hit on `key`, opening a new window of `window` if none is open
    async fn hit(&self, key: &str, window: Duration) -> CacheResult<WindowHit>;

    /// Drop windows that have already closed
    async fn purge_expired(&self) -> CacheResult<u64> {
        Ok(0)
    }
}

struct Entry {
    json: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

struct Window {
    count: u64,
    resets_at: Instant,
}

/// Map-backed store for a single instance
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let live = entries.get(key).map(|entry| entry.is_live(now));
        match live {
            Some(true) => {
                debug!("Cache hit for key: {}", key);
                match entries.get(key) {
                    Some(entry) => Ok(Some(serde_json::from_str::<T>(&entry.json)?)),
                    None => Ok(None),
                }
            }
            Some(false) => {
                entries.remove(key);
                debug!("Cache entry expired for key: {}", key);
                Ok(None)
            }
            None => {
                debug!("Cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { json, expires_at });
        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}

#[async_trait]
impl CounterStore for InMemoryCache {
    async fn hit(&self, key: &str, window: Duration) -> CacheResult<WindowHit> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + window,
        });

        if entry.resets_at <= now {
            entry.count = 0;
            entry.resets_at = now + window;
        }
        entry.count += 1;

        Ok(WindowHit {
            count: entry.count,
            reset_in: entry.resets_at.saturating_duration_since(now),
        })
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| window.resets_at > now);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_live(now));

        Ok((before - windows.len()) as u64)
    }
}

/// Redis implementation of the cache and counter stores
#[cfg(feature = "cache")]
#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

#[cfg(feature = "cache")]
impl RedisCache {
    /// Create a new Redis cache instance
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool with error handling
    async fn get_connection(
        &self,
    ) -> CacheResult<bb8::PooledConnection<'_, bb8_redis::RedisConnectionManager>> {
        self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            e.into()
        })
    }
}

#[cfg(feature = "cache")]
#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(None), // Graceful degradation
        };

        let result: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET failed for key '{}': {}", key, e);
            e
        })?;

        match result {
            Some(json_str) => match serde_json::from_str(&json_str) {
                Ok(value) => {
                    debug!("Cache hit for key: {}", key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!("Failed to deserialize cache value for key '{}': {}", key, e);
                    Ok(None)
                }
            },
            None => {
                debug!("Cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(()), // Graceful degradation - don't fail
        };

        let json_str = serde_json::to_string(value)?;

        match ttl {
            Some(ttl_duration) => {
                let ttl_seconds = ttl_duration.as_secs().max(1);
                let _: () = conn.set_ex(key, json_str, ttl_seconds).await.map_err(|e| {
                    warn!("Redis SET_EX failed for key '{}': {}", key, e);
                    e
                })?;
            }
            None => {
                let _: () = conn.set(key, json_str).await.map_err(|e| {
                    warn!("Redis SET failed for key '{}': {}", key, e);
                    e
                })?;
            }
        }

        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false), // Graceful degradation
        };

        let result: i32 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result > 0)
    }
}

#[cfg(feature = "cache")]
#[async_trait]
impl CounterStore for RedisCache {
    async fn hit(&self, key: &str, window: Duration) -> CacheResult<WindowHit> {
        let mut conn = self.get_connection().await?;
        let window_secs = window.as_secs().max(1) as i64;

        let count: u64 = conn.incr(key, 1).await.map_err(|e| {
            warn!("Redis INCR failed for key '{}': {}", key, e);
            e
        })?;

        let mut ttl: i64 = if count == 1 {
            let _: bool = conn.expire(key, window_secs).await?;
            window_secs
        } else {
            conn.ttl(key).await?
        };

        // A crash between INCR and EXPIRE leaves a counter without expiry
        if ttl < 0 {
            let _: bool = conn.expire(key, window_secs).await?;
            ttl = window_secs;
        }

        Ok(WindowHit {
            count,
            reset_in: Duration::from_secs(ttl as u64),
        })
    }
}

/// TTL constants for different data types
pub mod ttl {
    use std::time::Duration;

    /// Gateway status answers: long enough to absorb tab polling
    pub const GATEWAY_STATUS: Duration = Duration::from_secs(10);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn test_basic_cache_operations() {
        let cache = InMemoryCache::new();
        let test_data = TestData {
            id: 1,
            name: "test".to_string(),
        };

        cache.set("test:key", &test_data, None).await.unwrap();
        let retrieved: Option<TestData> = cache.get("test:key").await.unwrap();
        assert_eq!(retrieved, Some(test_data));

        assert!(<InMemoryCache as Cache<TestData>>::delete(&cache, "test:key")
            .await
            .unwrap());
        let gone: Option<TestData> = cache.get("test:key").await.unwrap();
        assert_eq!(gone, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();
        cache
            .set("test:ttl", &"value".to_string(), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        let fresh: Option<String> = cache.get("test:ttl").await.unwrap();
        assert_eq!(fresh.as_deref(), Some("value"));

        tokio::time::advance(Duration::from_secs(3)).await;
        let expired: Option<String> = cache.get("test:ttl").await.unwrap();
        assert_eq!(expired, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_window_resets() {
        let cache = InMemoryCache::new();
        let window = Duration::from_secs(60);

        assert_eq!(cache.hit("k", window).await.unwrap().count, 1);
        let second = cache.hit("k", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_in, window);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.hit("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    #[cfg(feature = "cache")]
    async fn test_redis_counter() {
        let pool = super::super::init_cache_pool(super::super::CacheConfig::default())
            .await
            .unwrap();
        let cache = RedisCache::new(pool);
        let key = format!("test:counter:{}", uuid::Uuid::new_v4());

        let first = cache.hit(&key, Duration::from_secs(60)).await.unwrap();
        let second = cache.hit(&key, Duration::from_secs(60)).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert!(second.reset_in <= Duration::from_secs(60));
    }
}
