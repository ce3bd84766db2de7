//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use bulwark_cache::{CacheError, CacheResult, CacheStore, InMemoryCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store whose every operation fails as if the backend were unreachable.
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

fn unavailable<T>() -> CacheResult<T> {
    Err(CacheError::Connection("store unavailable".to_string()))
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        unavailable()
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> CacheResult<()> {
        unavailable()
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        unavailable()
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        unavailable()
    }

    async fn clear(&self) -> CacheResult<()> {
        unavailable()
    }

    async fn ttl(&self, _key: &str) -> CacheResult<Option<Duration>> {
        unavailable()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> CacheResult<()> {
        unavailable()
    }

    async fn increment(&self, _key: &str, _delta: i64) -> CacheResult<i64> {
        unavailable()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// In-memory store that counts reads.
#[derive(Debug, Default)]
pub(crate) struct CountingStore {
    inner: InMemoryCache,
    gets: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.inner.exists(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.inner.expire(key, ttl).await
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.inner.increment(key, delta).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}
