use super::RateLimitPolicy;
use crate::error::RateLimitResult;
use crate::rate_limit::RateLimit;
use async_trait::async_trait;
use std::time::Duration;

/// Policy that lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedPolicy;

impl UnlimitedPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RateLimitPolicy for UnlimitedPolicy {
    async fn consume(&self, identifier: &str, _tokens: u64) -> RateLimitResult<RateLimit> {
        Ok(RateLimit::unlimited(identifier))
    }

    async fn peek(&self, identifier: &str) -> RateLimitResult<RateLimit> {
        Ok(RateLimit::unlimited(identifier))
    }

    async fn reset(&self, _identifier: &str) -> RateLimitResult<()> {
        Ok(())
    }

    fn limit(&self) -> u64 {
        u64::MAX
    }

    fn window(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> &'static str {
        "unlimited"
    }
}
