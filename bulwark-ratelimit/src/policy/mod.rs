//! Rate limiting policies
//!
//! A policy owns the mapping from an identifier to stored counters and turns
//! counter values into [`RateLimit`] decisions:
//!
//! - **Fixed Window**: one counter per identifier per aligned wall-clock window
//! - **Unlimited**: never blocks, stores nothing

mod fixed_window;
mod unlimited;

pub use fixed_window::FixedWindowPolicy;
pub use unlimited::UnlimitedPolicy;

use crate::error::RateLimitResult;
use crate::rate_limit::RateLimit;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behaviour shared by all rate limiting policies.
#[async_trait]
pub trait RateLimitPolicy: Send + Sync + std::fmt::Debug {
    /// Try to take `tokens` from the identifier's budget.
    ///
    /// A rejected attempt leaves the stored state untouched.
    async fn consume(&self, identifier: &str, tokens: u64) -> RateLimitResult<RateLimit>;

    /// Current state without consuming anything.
    async fn peek(&self, identifier: &str) -> RateLimitResult<RateLimit>;

    /// Forget what the identifier consumed in the current window.
    async fn reset(&self, identifier: &str) -> RateLimitResult<()>;

    /// Maximum tokens per window
    fn limit(&self) -> u64;

    /// Window length, `None` when the policy has no windows
    fn window(&self) -> Option<Duration>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Policy selection, as read from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Fixed window algorithm
    ///
    /// Divides time into aligned windows and counts requests per window.
    /// Simple but can allow bursts at window boundaries.
    FixedWindow {
        /// Maximum requests allowed per window
        limit: u64,
        /// Window duration
        window: Duration,
    },

    /// No limiting at all
    Unlimited,
}

impl PolicyKind {
    /// 60 requests per 60 seconds
    pub fn fixed_window_default() -> Self {
        Self::FixedWindow {
            limit: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::fixed_window_default()
    }
}
