//! # Bulwark Rate Limiting
//!
//! Fixed-window request throttling on top of any [`bulwark_cache::CacheStore`].
//!
//! ## Features
//!
//! - **Fixed window policy**: one counter per identifier per aligned
//!   wall-clock window, `{identifier}:fw:{window_index}` in the store
//! - **Storage Backends**: in-memory, or Redis (feature `redis`) for
//!   counters shared between instances
//! - **Throttle middleware**: `429 Too Many Requests` with `Retry-After`,
//!   `X-RateLimit-Limit` and `X-RateLimit-Remaining` headers
//! - **Flexible Key Extraction**: by peer address, forwarding header, user id,
//!   arbitrary header or custom function; identities are SHA-256 hashed
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark_ratelimit::RateLimiter;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), bulwark_ratelimit::RateLimitError> {
//! let limiter = RateLimiter::builder()
//!     .fixed_window(60, Duration::from_secs(60))
//!     .memory_store()
//!     .build()
//!     .await?;
//!
//! let decay = Duration::from_secs(60);
//! if limiter.is_blocked("user_123", 60, decay).await? {
//!     let wait = limiter.get_retry_after("user_123").await?;
//!     println!("Rate limited, retry after {}s", wait);
//! } else {
//!     let used = limiter.consume("user_123", decay).await?;
//!     println!("{} of 60 used", used);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Middleware
//!
//! ```rust
//! use bulwark_cache::InMemoryCache;
//! use bulwark_core::MiddlewareChain;
//! use bulwark_ratelimit::{ThrottleConfig, ThrottleMiddleware};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), bulwark_ratelimit::RateLimitError> {
//! let throttle =
//!     ThrottleMiddleware::from_config(ThrottleConfig::default(), Arc::new(InMemoryCache::new()))
//!         .await?;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(throttle);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod extractor;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod rate_limit;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FailureMode, RateLimiterBuilder, ThrottleConfig};
pub use error::{RateLimitError, RateLimitHeaders, RateLimitResult};
pub use extractor::{KeyExtractor, KeyExtractorFn, hash_identity};
pub use limiter::RateLimiter;
pub use middleware::{ThrottleDecision, ThrottleMiddleware};
pub use policy::{FixedWindowPolicy, PolicyKind, RateLimitPolicy, UnlimitedPolicy};
pub use rate_limit::RateLimit;
