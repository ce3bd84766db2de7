//! Throttle configuration and rate limiter builder

use crate::RateLimiter;
use crate::clock::{Clock, SystemClock};
use crate::error::{RateLimitError, RateLimitResult};
use crate::extractor::KeyExtractor;
use crate::policy::{FixedWindowPolicy, PolicyKind, RateLimitPolicy, UnlimitedPolicy};
use bulwark_cache::{CacheStore, InMemoryCache};
use bulwark_config::{ConfigError, ConfigManager};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default body of a throttled response
pub const DEFAULT_MESSAGE: &str = "Too Many Requests";

/// What the middleware does when the store fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Return the error to the caller (HTTP 500 through the error path)
    #[default]
    Propagate,
    /// Let the request through without rate limit headers
    FailOpen,
    /// Answer 503 Service Unavailable
    FailClosed,
}

impl FromStr for FailureMode {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(RateLimitError::config(format!(
                "unknown failure mode '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the throttle middleware
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Disabled throttling uses the unlimited policy
    pub enabled: bool,
    /// Requests allowed per window
    pub limit: u64,
    /// Window length
    pub window: Duration,
    /// Body of 429 responses
    pub message: String,
    /// Include rate limit headers in responses
    pub include_headers: bool,
    /// Raw identities that are never throttled
    pub bypass: Vec<String>,
    /// Behaviour on store failures
    pub failure_mode: FailureMode,
    /// Key extraction strategy
    pub extractor: KeyExtractor,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 60,
            window: Duration::from_secs(60),
            message: DEFAULT_MESSAGE.to_string(),
            include_headers: true,
            bypass: Vec::new(),
            failure_mode: FailureMode::default(),
            extractor: KeyExtractor::default(),
        }
    }
}

impl ThrottleConfig {
    /// Read `ratelimit_*` keys, keeping defaults for anything missing.
    ///
    /// | key | type |
    /// |---|---|
    /// | `ratelimit_enabled` | bool |
    /// | `ratelimit_limit` | integer |
    /// | `ratelimit_window_secs` | integer |
    /// | `ratelimit_message` | string |
    /// | `ratelimit_headers` | bool |
    /// | `ratelimit_bypass` | comma-separated list |
    /// | `ratelimit_failure_mode` | `propagate`, `fail_open`, `fail_closed` |
    /// | `ratelimit_extractor` | see [`KeyExtractor::parse`] |
    pub fn from_config(config: &ConfigManager) -> RateLimitResult<Self> {
        let mut out = Self::default();

        if config.has("ratelimit_enabled") {
            out.enabled = config.get_bool("ratelimit_enabled").map_err(config_error)?;
        }
        if let Some(limit) = config.get_parsed_opt("ratelimit_limit").map_err(config_error)? {
            out.limit = limit;
        }
        if let Some(secs) = config
            .get_parsed_opt::<u64>("ratelimit_window_secs")
            .map_err(config_error)?
        {
            out.window = Duration::from_secs(secs);
        }
        if let Some(message) = config
            .get_parsed_opt::<String>("ratelimit_message")
            .map_err(config_error)?
        {
            out.message = message;
        }
        if config.has("ratelimit_headers") {
            out.include_headers = config.get_bool("ratelimit_headers").map_err(config_error)?;
        }
        if let Some(bypass) = config
            .get_parsed_opt::<String>("ratelimit_bypass")
            .map_err(config_error)?
        {
            out.bypass = bypass
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(mode) = config
            .get_parsed_opt::<String>("ratelimit_failure_mode")
            .map_err(config_error)?
        {
            out.failure_mode = mode.parse()?;
        }
        if let Some(extractor) = config
            .get_parsed_opt::<String>("ratelimit_extractor")
            .map_err(config_error)?
        {
            out.extractor = KeyExtractor::parse(&extractor)?;
        }

        out.validate()?;
        debug!(
            enabled = out.enabled,
            limit = out.limit,
            window_secs = out.window.as_secs(),
            failure_mode = ?out.failure_mode,
            "Loaded throttle configuration"
        );
        Ok(out)
    }

    /// Reject values the fixed window policy cannot use
    pub fn validate(&self) -> RateLimitResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.limit == 0 {
            return Err(RateLimitError::config("ratelimit_limit must be greater than 0"));
        }
        if self.window.as_secs() == 0 {
            return Err(RateLimitError::config(
                "ratelimit_window_secs must be at least 1",
            ));
        }
        Ok(())
    }

    /// Policy selected by this configuration
    pub fn policy_kind(&self) -> PolicyKind {
        if self.enabled {
            PolicyKind::FixedWindow {
                limit: self.limit,
                window: self.window,
            }
        } else {
            PolicyKind::Unlimited
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    pub fn with_bypass(mut self, identities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bypass.extend(identities.into_iter().map(Into::into));
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn with_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check if a raw identity should bypass throttling
    pub fn should_bypass(&self, identity: &str) -> bool {
        self.bypass.iter().any(|b| b == identity)
    }
}

fn config_error(err: ConfigError) -> RateLimitError {
    RateLimitError::Config(err.to_string())
}

/// Builder for creating a RateLimiter
pub struct RateLimiterBuilder {
    policy: Option<PolicyKind>,
    store: Option<Arc<dyn CacheStore>>,
    clock: Option<Arc<dyn Clock>>,
    #[cfg(feature = "redis")]
    redis_url: Option<String>,
    #[cfg(feature = "redis")]
    key_prefix: String,
}

impl RateLimiterBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            policy: None,
            store: None,
            clock: None,
            #[cfg(feature = "redis")]
            redis_url: None,
            #[cfg(feature = "redis")]
            key_prefix: "ratelimit".to_string(),
        }
    }

    /// Set the policy
    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use the fixed window policy
    pub fn fixed_window(self, limit: u64, window: Duration) -> Self {
        self.policy(PolicyKind::FixedWindow { limit, window })
    }

    /// Never limit
    pub fn unlimited(self) -> Self {
        self.policy(PolicyKind::Unlimited)
    }

    /// Use an existing cache store
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a fresh in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.store = Some(Arc::new(InMemoryCache::new()));
        self
    }

    /// Use Redis for counters shared between instances
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, url: impl Into<String>) -> Self {
        self.store = None;
        self.redis_url = Some(url.into());
        self
    }

    /// Set the Redis key prefix
    #[cfg(feature = "redis")]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the clock (defaults to the system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    async fn resolve_store(&mut self) -> RateLimitResult<Arc<dyn CacheStore>> {
        if let Some(store) = self.store.take() {
            return Ok(store);
        }

        #[cfg(feature = "redis")]
        if let Some(url) = self.redis_url.take() {
            let config = bulwark_cache::CacheConfig::redis(url)?.with_key_prefix(&self.key_prefix);
            let store = bulwark_cache::RedisCache::new(config).await?;
            return Ok(Arc::new(store));
        }

        Ok(Arc::new(InMemoryCache::new()))
    }

    /// Build the rate limiter
    pub async fn build(mut self) -> RateLimitResult<RateLimiter> {
        let kind = self
            .policy
            .ok_or_else(|| RateLimitError::config("Policy must be specified"))?;

        let clock = self
            .clock
            .take()
            .unwrap_or_else(|| Arc::new(SystemClock));

        debug!(policy = ?kind, "Building rate limiter");

        let policy: Arc<dyn RateLimitPolicy> = match kind {
            PolicyKind::FixedWindow { limit, window } => {
                let store = self.resolve_store().await?;
                Arc::new(FixedWindowPolicy::new(store, limit, window, clock.clone())?)
            }
            PolicyKind::Unlimited => Arc::new(UnlimitedPolicy::new()),
        };

        Ok(RateLimiter::with_clock(policy, clock))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_default_config() {
        let config = ThrottleConfig::default();
        assert!(config.enabled);
        assert_eq!(config.limit, 60);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.message, "Too Many Requests");
        assert!(config.include_headers);
        assert_eq!(config.failure_mode, FailureMode::Propagate);
        assert_eq!(config.policy_kind(), PolicyKind::fixed_window_default());
    }

    #[test]
    fn test_bypass() {
        let config = ThrottleConfig::default().with_bypass(["10.0.0.1", "admin"]);

        assert!(config.should_bypass("admin"));
        assert!(config.should_bypass("10.0.0.1"));
        assert!(!config.should_bypass("user"));
    }

    #[test]
    fn test_failure_mode_parse() {
        assert_eq!("propagate".parse::<FailureMode>().unwrap(), FailureMode::Propagate);
        assert_eq!("FAIL_OPEN".parse::<FailureMode>().unwrap(), FailureMode::FailOpen);
        assert_eq!("fail_closed".parse::<FailureMode>().unwrap(), FailureMode::FailClosed);
        assert!("sometimes".parse::<FailureMode>().is_err());
    }

    #[test]
    fn test_failure_mode_serde() {
        let mode: FailureMode = serde_json::from_str("\"fail_open\"").unwrap();
        assert_eq!(mode, FailureMode::FailOpen);
        assert_eq!(
            serde_json::to_string(&FailureMode::FailClosed).unwrap(),
            "\"fail_closed\""
        );
    }

    #[test]
    fn test_from_config() {
        let manager = ConfigManager::new();
        manager.set("ratelimit_limit", "10").unwrap();
        manager.set("ratelimit_window_secs", 30).unwrap();
        manager.set("ratelimit_message", "Slow down").unwrap();
        manager.set("ratelimit_headers", "false").unwrap();
        manager.set("ratelimit_bypass", "10.0.0.1, 10.0.0.2,").unwrap();
        manager.set("ratelimit_failure_mode", "fail_closed").unwrap();
        manager.set("ratelimit_extractor", "header:X-API-Key").unwrap();

        let config = ThrottleConfig::from_config(&manager).unwrap();
        assert_eq!(config.limit, 10);
        assert_eq!(config.window, Duration::from_secs(30));
        assert_eq!(config.message, "Slow down");
        assert!(!config.include_headers);
        assert_eq!(config.bypass, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.failure_mode, FailureMode::FailClosed);
        assert!(matches!(config.extractor, KeyExtractor::Header { .. }));
    }

    #[test]
    fn test_from_empty_config_uses_defaults() {
        let config = ThrottleConfig::from_config(&ConfigManager::new()).unwrap();
        assert_eq!(config.limit, 60);
        assert_eq!(config.window, Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_rejects_bad_values() {
        let manager = ConfigManager::new();
        manager.set("ratelimit_limit", "lots").unwrap();
        assert!(matches!(
            ThrottleConfig::from_config(&manager),
            Err(RateLimitError::Config(_))
        ));

        let manager = ConfigManager::new();
        manager.set("ratelimit_limit", 0).unwrap();
        assert!(ThrottleConfig::from_config(&manager).is_err());

        let manager = ConfigManager::new();
        manager.set("ratelimit_failure_mode", "maybe").unwrap();
        assert!(ThrottleConfig::from_config(&manager).is_err());
    }

    #[test]
    fn test_disabled_config() {
        let manager = ConfigManager::new();
        manager.set("ratelimit_enabled", false).unwrap();
        manager.set("ratelimit_limit", 0).unwrap();

        let config = ThrottleConfig::from_config(&manager).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.policy_kind(), PolicyKind::Unlimited);
    }

    #[tokio::test]
    async fn test_builder_fixed_window() {
        let limiter = RateLimiterBuilder::new()
            .fixed_window(50, Duration::from_secs(60))
            .clock(Arc::new(ManualClock::at_unix_secs(600)))
            .build()
            .await
            .unwrap();

        assert_eq!(limiter.limit(), 50);
        assert_eq!(limiter.window(), Some(Duration::from_secs(60)));
        assert_eq!(limiter.policy().name(), "fixed_window");
    }

    #[tokio::test]
    async fn test_builder_shares_store() {
        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
        let build = || {
            RateLimiterBuilder::new()
                .fixed_window(2, Duration::from_secs(60))
                .store(store.clone())
                .build()
        };

        let a = build().await.unwrap();
        let b = build().await.unwrap();

        a.consume("key", Duration::from_secs(60)).await.unwrap();
        assert_eq!(b.get_count("key").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_builder_unlimited() {
        let limiter = RateLimiterBuilder::new().unlimited().build().await.unwrap();
        assert_eq!(limiter.limit(), u64::MAX);
        assert_eq!(limiter.policy().name(), "unlimited");
    }

    #[tokio::test]
    async fn test_builder_missing_policy() {
        let result = RateLimiterBuilder::new().build().await;
        assert!(matches!(result, Err(RateLimitError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_invalid_policy() {
        let result = RateLimiterBuilder::new()
            .fixed_window(0, Duration::from_secs(60))
            .build()
            .await;
        assert!(result.is_err());
    }
}
