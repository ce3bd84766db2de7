//! In-memory cache store.
//!
//! Suitable for single-instance deployments and tests. Expiry is measured on
//! `tokio::time::Instant`, so tests can drive it with `tokio::time::pause` and
//! `tokio::time::advance`.
//!
//! Expired entries are hidden from reads immediately and dropped by a sweep
//! that runs on the first write after each sweep interval.

use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default time between sweeps of expired entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    next_sweep: Instant,
}

impl Entries {
    fn new(sweep_interval: Duration) -> Self {
        Self {
            map: HashMap::new(),
            next_sweep: Instant::now() + sweep_interval,
        }
    }

    fn purge(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before - self.map.len()
    }

    fn sweep_if_due(&mut self, now: Instant, interval: Duration) {
        if now < self.next_sweep {
            return;
        }
        let removed = self.purge(now);
        self.next_sweep = now + interval;
        if removed > 0 {
            trace!(removed, remaining = self.map.len(), "Swept expired cache entries");
        }
    }
}

/// In-memory cache store
///
/// Every operation runs under a single lock, which makes `increment` an
/// atomic read-modify-write.
#[derive(Clone)]
pub struct InMemoryCache {
    data: Arc<RwLock<Entries>>,
    sweep_interval: Duration,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl InMemoryCache {
    /// Create new in-memory cache
    pub fn new() -> Self {
        debug!("Creating new in-memory cache store");
        Self::default()
    }

    /// Create a cache that sweeps expired entries at most once per `interval`.
    ///
    /// `Duration::ZERO` sweeps on every write.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            data: Arc::new(RwLock::new(Entries::new(interval))),
            sweep_interval: interval,
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.data.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.map.is_empty()
    }

    /// Drop expired entries now, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut data = self.data.write().await;
        let now = Instant::now();
        let removed = data.purge(now);
        data.next_sweep = now + self.sweep_interval;
        debug!(removed, remaining = data.map.len(), "Purged expired cache entries");
        removed
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let data = self.data.read().await;
        let now = Instant::now();
        Ok(data
            .map
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.sweep_if_due(now, self.sweep_interval);

        let expires_at = ttl.map(|d| now + d);
        data.map
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.write().await.map.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.get(key).await.map(|v| v.is_some())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.data.write().await.map.clear();
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let data = self.data.read().await;
        let now = Instant::now();
        Ok(data
            .map
            .get(key)
            .and_then(|entry| entry.expires_at)
            .filter(|exp| *exp > now)
            .map(|exp| exp - now))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.sweep_if_due(now, self.sweep_interval);

        if let Some(entry) = data.map.get_mut(key)
            && !entry.is_expired(now)
        {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.sweep_if_due(now, self.sweep_interval);

        // Absent or expired keys start a fresh counter without a TTL
        let (current, expires_at) = match data.map.get(key).filter(|e| !e.is_expired(now)) {
            Some(entry) => {
                let parsed = entry.value.parse::<i64>().map_err(|_| {
                    CacheError::Deserialization(format!(
                        "value at '{}' is not an integer: {:?}",
                        key, entry.value
                    ))
                })?;
                (parsed, entry.expires_at)
            }
            None => (0, None),
        };

        let new_value = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::Overflow(key.to_string()))?;

        data.map.insert(
            key.to_string(),
            CacheEntry {
                value: new_value.to_string(),
                expires_at,
            },
        );

        trace!(key = %key, delta, value = new_value, "Incremented counter");
        Ok(new_value)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
