//! Cache store trait definition.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// Cache store trait for different cache backends.
///
/// Values are strings; counters are stored as decimal integers so that
/// `get` and `increment` observe the same data.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache.
    ///
    /// Returns `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Get a value, falling back to `default` when the key is absent.
    async fn get_or(&self, key: &str, default: String) -> CacheResult<String> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Set a value in the cache.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The value
    /// * `ttl` - Optional time-to-live; `None` keeps the key until deleted
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key from the cache. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Check if a key exists in the cache.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Clear all keys from the cache.
    ///
    /// **Warning:** This operation may be destructive and affect all keys.
    async fn clear(&self) -> CacheResult<()>;

    /// Get the remaining time-to-live of a key.
    ///
    /// Returns `Ok(None)` if the key has no expiration or doesn't exist.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Set or update the expiration time for an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    /// Atomically increment a numeric value.
    ///
    /// An absent (or expired) key is created with value `delta` and no TTL.
    /// Returns the new value after incrementing.
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Atomically decrement a numeric value.
    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.increment(key, -delta).await
    }

    /// Backend name for diagnostics
    fn backend_name(&self) -> &'static str;
}
