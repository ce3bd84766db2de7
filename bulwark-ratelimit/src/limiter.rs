//! Policy-agnostic rate limiter facade.

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimiterBuilder;
use crate::error::{RateLimitError, RateLimitResult};
use crate::policy::RateLimitPolicy;
use crate::rate_limit::RateLimit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// The main rate limiter
///
/// Holds no counters of its own; every call is answered by the policy.
/// The `max_attempts` and `decay` arguments some methods take are advisory:
/// the policy's own limit and window always win.
#[derive(Clone)]
pub struct RateLimiter {
    policy: Arc<dyn RateLimitPolicy>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Wrap a policy, reading time from the system clock
    pub fn new(policy: Arc<dyn RateLimitPolicy>) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Wrap a policy with an explicit clock; it must be the clock the policy uses
    pub fn with_clock(policy: Arc<dyn RateLimitPolicy>, clock: Arc<dyn Clock>) -> Self {
        debug!(
            policy = policy.name(),
            limit = policy.limit(),
            window = ?policy.window(),
            "Creating new rate limiter"
        );
        Self { policy, clock }
    }

    fn note_advisory(&self, max_attempts: Option<u64>, decay: Option<Duration>) {
        if let Some(requested) = max_attempts
            && requested != self.policy.limit()
        {
            debug!(
                requested,
                configured = self.policy.limit(),
                "max_attempts differs from the policy limit, using the policy value"
            );
        }
        if let (Some(requested), Some(configured)) = (decay, self.policy.window())
            && requested.as_secs() != configured.as_secs()
        {
            debug!(
                requested = ?requested,
                configured = ?configured,
                "decay differs from the policy window, using the policy value"
            );
        }
    }

    /// Whether `key` has used up its budget for the current window
    pub async fn is_blocked(
        &self,
        key: &str,
        max_attempts: u64,
        decay: Duration,
    ) -> RateLimitResult<bool> {
        self.note_advisory(Some(max_attempts), Some(decay));
        let limit = self.policy.peek(key).await?;
        trace!(key = %key, blocked = limit.is_blocked(), "Checked rate limit");
        Ok(limit.is_blocked())
    }

    /// Consume one attempt and return the number consumed in this window
    pub async fn consume(&self, key: &str, decay: Duration) -> RateLimitResult<u64> {
        self.note_advisory(None, Some(decay));
        Ok(self.policy.consume(key, 1).await?.consumed())
    }

    /// Attempts consumed in the current window
    pub async fn get_count(&self, key: &str) -> RateLimitResult<u64> {
        Ok(self.policy.peek(key).await?.consumed())
    }

    /// Seconds until the current window ends, rounded up; 0 if the policy
    /// has no reset point
    pub async fn get_retry_after(&self, key: &str) -> RateLimitResult<u64> {
        let limit = self.policy.peek(key).await?;
        Ok(limit.retry_after_secs_from(self.clock.now()))
    }

    /// Attempts left in the current window
    pub async fn remaining(&self, key: &str, max_attempts: u64) -> RateLimitResult<u64> {
        self.note_advisory(Some(max_attempts), None);
        Ok(self.policy.peek(key).await?.remaining())
    }

    /// Remaining attempts as reported in headers; forced to 0 while a
    /// retry delay is pending
    pub async fn calculate_remaining(
        &self,
        key: &str,
        max_attempts: u64,
        retry_after: Option<u64>,
    ) -> RateLimitResult<u64> {
        match retry_after {
            Some(secs) if secs > 0 => Ok(0),
            _ => self.remaining(key, max_attempts).await,
        }
    }

    /// Clear the current window for `key`
    pub async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit");
        self.policy.reset(key).await
    }

    /// Consume one attempt, failing with [`RateLimitError::LimitExceeded`]
    /// when the budget is spent
    pub async fn hit(&self, key: &str) -> RateLimitResult<RateLimit> {
        let limit = self.policy.consume(key, 1).await?;
        if limit.is_blocked() {
            return Err(RateLimitError::LimitExceeded {
                limit: limit.limit(),
                remaining: 0,
                retry_after: limit.retry_after_secs_from(self.clock.now()),
            });
        }
        Ok(limit)
    }

    /// Maximum attempts per window
    pub fn limit(&self) -> u64 {
        self.policy.limit()
    }

    /// Window length, `None` for policies without windows
    pub fn window(&self) -> Option<Duration> {
        self.policy.window()
    }

    /// Get the underlying policy
    pub fn policy(&self) -> &Arc<dyn RateLimitPolicy> {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::{FixedWindowPolicy, UnlimitedPolicy};
    use crate::testing::FailingStore;
    use bulwark_cache::{CacheError, InMemoryCache};

    const WINDOW_START: u64 = 1_699_999_980;
    const DECAY: Duration = Duration::from_secs(60);

    fn limiter(limit: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix_secs(WINDOW_START));
        let policy = FixedWindowPolicy::new(
            Arc::new(InMemoryCache::new()),
            limit,
            DECAY,
            clock.clone(),
        )
        .unwrap();
        (RateLimiter::with_clock(Arc::new(policy), clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_consume_and_count() {
        let (limiter, _) = limiter(3);

        assert_eq!(limiter.consume("key", DECAY).await.unwrap(), 1);
        assert_eq!(limiter.consume("key", DECAY).await.unwrap(), 2);
        assert_eq!(limiter.get_count("key").await.unwrap(), 2);
        assert_eq!(limiter.remaining("key", 3).await.unwrap(), 1);
        assert!(!limiter.is_blocked("key", 3, DECAY).await.unwrap());

        assert_eq!(limiter.consume("key", DECAY).await.unwrap(), 3);
        assert!(limiter.is_blocked("key", 3, DECAY).await.unwrap());

        // Blocked consumes report the unchanged count
        assert_eq!(limiter.consume("key", DECAY).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_advisory_arguments_do_not_override_policy() {
        let (limiter, _) = limiter(2);

        limiter.consume("key", Duration::from_secs(1)).await.unwrap();
        limiter.consume("key", Duration::from_secs(1)).await.unwrap();

        assert!(limiter.is_blocked("key", 100, Duration::from_secs(1)).await.unwrap());
        assert_eq!(limiter.remaining("key", 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_after() {
        let (limiter, clock) = limiter(1);

        clock.advance(Duration::from_secs(15));
        limiter.consume("key", DECAY).await.unwrap();
        assert_eq!(limiter.get_retry_after("key").await.unwrap(), 45);

        clock.advance(Duration::from_millis(44_500));
        assert_eq!(limiter.get_retry_after("key").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_calculate_remaining() {
        let (limiter, _) = limiter(5);
        limiter.consume("key", DECAY).await.unwrap();

        assert_eq!(limiter.calculate_remaining("key", 5, None).await.unwrap(), 4);
        assert_eq!(limiter.calculate_remaining("key", 5, Some(0)).await.unwrap(), 4);
        assert_eq!(limiter.calculate_remaining("key", 5, Some(30)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset() {
        let (limiter, _) = limiter(1);

        limiter.consume("key", DECAY).await.unwrap();
        assert!(limiter.is_blocked("key", 1, DECAY).await.unwrap());

        limiter.reset("key").await.unwrap();
        assert_eq!(limiter.get_count("key").await.unwrap(), 0);
        assert!(!limiter.is_blocked("key", 1, DECAY).await.unwrap());
    }

    #[tokio::test]
    async fn test_hit() {
        let (limiter, clock) = limiter(1);
        clock.advance(Duration::from_secs(20));

        let limit = limiter.hit("key").await.unwrap();
        assert_eq!(limit.remaining(), 0);

        let err = limiter.hit("key").await.unwrap_err();
        assert!(err.is_limit_exceeded());
        assert_eq!(err.retry_after(), Some(40));
        assert_eq!(err.headers().unwrap().limit, 1);
    }

    #[tokio::test]
    async fn test_unlimited_policy() {
        let limiter = RateLimiter::new(Arc::new(UnlimitedPolicy::new()));

        for _ in 0..100 {
            limiter.consume("key", DECAY).await.unwrap();
        }
        assert!(!limiter.is_blocked("key", 1, DECAY).await.unwrap());
        assert_eq!(limiter.remaining("key", 1).await.unwrap(), u64::MAX);
        assert_eq!(limiter.get_retry_after("key").await.unwrap(), 0);
        assert_eq!(limiter.window(), None);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let clock = Arc::new(ManualClock::at_unix_secs(WINDOW_START));
        let policy =
            FixedWindowPolicy::new(Arc::new(FailingStore), 5, DECAY, clock.clone()).unwrap();
        let limiter = RateLimiter::with_clock(Arc::new(policy), clock);

        assert!(matches!(
            limiter.is_blocked("key", 5, DECAY).await,
            Err(RateLimitError::Store(CacheError::Connection(_)))
        ));
        assert!(limiter.consume("key", DECAY).await.is_err());
        assert!(limiter.get_count("key").await.is_err());
        assert!(limiter.get_retry_after("key").await.is_err());
        assert!(limiter.reset("key").await.is_err());
        assert!(!limiter.hit("key").await.unwrap_err().is_limit_exceeded());
    }
}
