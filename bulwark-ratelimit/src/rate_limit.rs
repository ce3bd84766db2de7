//! Immutable snapshot of a rate-limit decision.

use std::time::{Duration, SystemTime};

/// Outcome of a consume or peek against a policy.
///
/// Only policies construct these; `remaining` is always
/// `limit - consumed`, saturating at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    identifier: String,
    limit: u64,
    consumed: u64,
    remaining: u64,
    is_blocked: bool,
    retry_after: Option<SystemTime>,
}

impl RateLimit {
    pub(crate) fn new(
        identifier: impl Into<String>,
        limit: u64,
        consumed: u64,
        is_blocked: bool,
        retry_after: Option<SystemTime>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            limit,
            consumed,
            remaining: limit.saturating_sub(consumed),
            is_blocked,
            retry_after,
        }
    }

    /// Snapshot for a policy that never blocks.
    pub(crate) fn unlimited(identifier: impl Into<String>) -> Self {
        Self::new(identifier, u64::MAX, 0, false, None)
    }

    /// Key the decision was made for
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Tokens consumed in the current window
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    /// Start of the next window, when the counter resets
    pub fn retry_after(&self) -> Option<SystemTime> {
        self.retry_after
    }

    /// Time from `now` until `retry_after`; zero once it has passed or when
    /// there is no reset point.
    pub fn retry_after_from(&self, now: SystemTime) -> Duration {
        self.retry_after
            .and_then(|at| at.duration_since(now).ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Like [`retry_after_from`](Self::retry_after_from) in whole seconds,
    /// rounding any fraction up.
    pub fn retry_after_secs_from(&self, now: SystemTime) -> u64 {
        let wait = self.retry_after_from(now);
        if wait.subsec_nanos() > 0 {
            wait.as_secs().saturating_add(1)
        } else {
            wait.as_secs()
        }
    }
}
