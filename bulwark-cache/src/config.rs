//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// Connection settings for networked cache backends.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Connection URL
    pub url: String,

    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// Default TTL for `set` calls that pass none
    pub default_ttl: Option<Duration>,

    /// Connection timeout
    pub connection_timeout: Duration,
}

impl CacheConfig {
    /// Create a new Redis cache configuration.
    ///
    /// ```
    /// use bulwark_cache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// assert_eq!(config.build_key("k"), "k");
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(CacheError::Config(format!(
                "expected a redis:// or rediss:// URL, got {:?}",
                url
            )));
        }

        Ok(Self {
            url,
            key_prefix: None,
            default_ttl: None,
            connection_timeout: Duration::from_secs(5),
        })
    }

    /// Set key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Build the full key with prefix.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}
