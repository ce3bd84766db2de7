//! Fixed Window Policy
//!
//! Time is divided into windows aligned to the Unix epoch. Each identifier has
//! one counter per window, stored in the cache under
//! `{identifier}:fw:{window_index}` where
//! `window_index = floor(unix_seconds / window_seconds)`.
//!
//! ## How It Works
//!
//! 1. Read the counter for the current window (absent means 0)
//! 2. If taking the requested tokens would exceed the limit, reject without
//!    touching the counter
//! 3. Otherwise increment atomically; the increment that creates the counter
//!    also gives it a TTL of one window
//!
//! ## Boundary Issue
//!
//! A client can spend the full limit at the end of window N and again at the
//! start of window N+1.
//!
//! ## Example
//!
//! ```rust
//! use bulwark_cache::InMemoryCache;
//! use bulwark_ratelimit::clock::SystemClock;
//! use bulwark_ratelimit::policy::{FixedWindowPolicy, RateLimitPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), bulwark_ratelimit::RateLimitError> {
//! let policy = FixedWindowPolicy::new(
//!     Arc::new(InMemoryCache::new()),
//!     5,
//!     Duration::from_secs(60),
//!     Arc::new(SystemClock),
//! )?;
//!
//! for _ in 0..5 {
//!     assert!(!policy.consume("user1", 1).await?.is_blocked());
//! }
//! assert!(policy.consume("user1", 1).await?.is_blocked());
//! # Ok(())
//! # }
//! ```

use super::RateLimitPolicy;
use crate::clock::Clock;
use crate::error::{RateLimitError, RateLimitResult};
use crate::rate_limit::RateLimit;
use async_trait::async_trait;
use bulwark_cache::{CacheError, CacheStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Fixed window rate limiting policy backed by a cache store
pub struct FixedWindowPolicy {
    store: Arc<dyn CacheStore>,
    limit: u64,
    window_secs: u64,
    clock: Arc<dyn Clock>,
}

impl FixedWindowPolicy {
    /// Create a new fixed window policy
    ///
    /// # Arguments
    ///
    /// * `store` - Cache holding the window counters
    /// * `limit` - Maximum tokens per window
    /// * `window` - Window length; truncated to whole seconds
    /// * `clock` - Wall-clock source
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Config`] if `limit` is 0 or `window` is
    /// shorter than one second.
    pub fn new(
        store: Arc<dyn CacheStore>,
        limit: u64,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> RateLimitResult<Self> {
        if limit == 0 {
            return Err(RateLimitError::config("limit must be greater than 0"));
        }
        let window_secs = window.as_secs();
        if window_secs == 0 {
            return Err(RateLimitError::config(format!(
                "window must be at least one second, got {:?}",
                window
            )));
        }
        if i64::try_from(limit).is_err() {
            return Err(RateLimitError::config(format!(
                "limit {} does not fit a store counter",
                limit
            )));
        }

        debug!(
            limit,
            window_secs,
            backend = store.backend_name(),
            "Creating fixed window policy"
        );

        Ok(Self {
            store,
            limit,
            window_secs,
            clock,
        })
    }

    fn current_index(&self) -> u64 {
        self.clock.unix_secs() / self.window_secs
    }

    /// Cache key holding `identifier`'s counter for window `index`
    pub fn window_key(identifier: &str, index: u64) -> String {
        format!("{}:fw:{}", identifier, index)
    }

    /// Cache key for the window containing the clock's current time
    pub fn current_window_key(&self, identifier: &str) -> String {
        Self::window_key(identifier, self.current_index())
    }

    /// Absolute start of the window after `index`
    pub fn next_window_start(&self, index: u64) -> SystemTime {
        let secs = index.saturating_add(1).saturating_mul(self.window_secs);
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    async fn read_consumed(&self, key: &str) -> RateLimitResult<u64> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(0);
        };

        let value = raw.trim().parse::<i64>().map_err(|_| {
            CacheError::Deserialization(format!(
                "counter at '{}' is not an integer: {:?}",
                key, raw
            ))
        })?;

        Ok(u64::try_from(value).unwrap_or(0))
    }
}

#[async_trait]
impl RateLimitPolicy for FixedWindowPolicy {
    async fn consume(&self, identifier: &str, tokens: u64) -> RateLimitResult<RateLimit> {
        let index = self.current_index();
        let key = Self::window_key(identifier, index);
        let retry_after = Some(self.next_window_start(index));

        let consumed = self.read_consumed(&key).await?;

        if consumed.saturating_add(tokens) > self.limit {
            debug!(key = %key, consumed, tokens, limit = self.limit, "Fixed window: request denied");
            return Ok(RateLimit::new(
                identifier,
                self.limit,
                consumed,
                true,
                retry_after,
            ));
        }

        if tokens == 0 {
            return Ok(RateLimit::new(
                identifier,
                self.limit,
                consumed,
                false,
                retry_after,
            ));
        }

        // tokens <= limit here, and limit fits an i64
        let delta = i64::try_from(tokens)
            .map_err(|_| RateLimitError::config(format!("token count {} too large", tokens)))?;

        let new_value = self.store.increment(&key, delta).await?;
        if new_value == delta {
            self.store
                .expire(&key, Duration::from_secs(self.window_secs))
                .await?;
        }

        let consumed = u64::try_from(new_value).unwrap_or(0);
        trace!(key = %key, consumed, limit = self.limit, "Fixed window: request allowed");

        Ok(RateLimit::new(
            identifier,
            self.limit,
            consumed,
            false,
            retry_after,
        ))
    }

    async fn peek(&self, identifier: &str) -> RateLimitResult<RateLimit> {
        let index = self.current_index();
        let key = Self::window_key(identifier, index);
        let consumed = self.read_consumed(&key).await?;

        Ok(RateLimit::new(
            identifier,
            self.limit,
            consumed,
            consumed >= self.limit,
            Some(self.next_window_start(index)),
        ))
    }

    async fn reset(&self, identifier: &str) -> RateLimitResult<()> {
        let key = self.current_window_key(identifier);
        debug!(key = %key, "Resetting fixed window counter");
        self.store.delete(&key).await?;
        Ok(())
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    fn window(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.window_secs))
    }

    fn name(&self) -> &'static str {
        "fixed_window"
    }
}

impl std::fmt::Debug for FixedWindowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowPolicy")
            .field("limit", &self.limit)
            .field("window_secs", &self.window_secs)
            .field("backend", &self.store.backend_name())
            .field("clock", &self.clock)
            .finish()
    }
}
