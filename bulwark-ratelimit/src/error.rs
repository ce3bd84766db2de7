//! Error types for rate limiting

use bulwark_cache::CacheError;
use bulwark_core::HttpResponse;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Invalid limiter configuration, reported at construction time
    #[error("Rate limit configuration error: {0}")]
    Config(String),

    /// The backing cache store failed
    #[error("Rate limit store error: {0}")]
    Store(#[from] CacheError),

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Retry after {retry_after}s")]
    LimitExceeded {
        /// Total limit
        limit: u64,
        /// Remaining requests (always 0 when limit exceeded)
        remaining: u64,
        /// Seconds to wait before retrying
        retry_after: u64,
    },

    /// Key extraction failed
    #[error("Failed to extract rate limit key: {0}")]
    KeyExtraction(String),
}

impl RateLimitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new key extraction error
    pub fn key_extraction<S: Into<String>>(msg: S) -> Self {
        Self::KeyExtraction(msg.into())
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(limit: u64, retry_after: u64) -> Self {
        Self::LimitExceeded {
            limit,
            remaining: 0,
            retry_after,
        }
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Check if this error came from the cache store
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Get the retry-after seconds if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::LimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Get rate limit headers for HTTP response
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::LimitExceeded {
                limit,
                remaining,
                retry_after,
            } => Some(RateLimitHeaders {
                limit: *limit,
                remaining: *remaining,
                retry_after: Some(*retry_after),
            }),
            _ => None,
        }
    }
}

impl From<RateLimitError> for bulwark_core::Error {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded { .. } => Self::TooManyRequests(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Standard rate limit headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// X-RateLimit-Limit: Maximum requests allowed
    pub limit: u64,
    /// X-RateLimit-Remaining: Requests remaining in current window
    pub remaining: u64,
    /// Retry-After: Seconds until the client should retry (only when limited)
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Create headers for an allowed request
    pub fn allowed(limit: u64, remaining: u64) -> Self {
        Self {
            limit,
            remaining,
            retry_after: None,
        }
    }

    /// Create headers for a denied request
    pub fn denied(limit: u64, remaining: u64, retry_after: u64) -> Self {
        Self {
            limit,
            remaining,
            retry_after: Some(retry_after),
        }
    }

    /// Get header name/value pairs
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ];

        if let Some(retry) = self.retry_after {
            headers.push(("Retry-After", retry.to_string()));
        }

        headers
    }

    /// Insert the headers into a response
    pub fn apply(&self, mut response: HttpResponse) -> HttpResponse {
        for (name, value) in self.to_header_pairs() {
            response.headers.insert(name.to_string(), value);
        }
        response
    }
}
