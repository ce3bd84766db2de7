// Bulwark - fixed-window request throttling for async Rust services
//
// The umbrella crate re-exports the request pipeline types from bulwark-core
// and, behind features, the cache, configuration and rate limiting crates.

// Re-export core functionality
pub use bulwark_core::*;

// Re-export optional crates
#[cfg(feature = "cache")]
pub use bulwark_cache;

#[cfg(feature = "config")]
pub use bulwark_config;

#[cfg(feature = "ratelimit")]
pub use bulwark_ratelimit;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Error, HandlerFn, HttpRequest, HttpResponse, Middleware, MiddlewareChain, Next, Result,
    };

    pub use crate::logging::{LogConfig, LogFormat, LogLevel, LogOutput};

    #[cfg(feature = "cache")]
    pub use bulwark_cache::{CacheStore, InMemoryCache};

    #[cfg(feature = "config")]
    pub use bulwark_config::ConfigManager;

    #[cfg(feature = "ratelimit")]
    pub use bulwark_ratelimit::{
        FailureMode, KeyExtractor, RateLimit, RateLimitError, RateLimiter, ThrottleConfig,
        ThrottleMiddleware,
    };

    pub use async_trait::async_trait;
}
