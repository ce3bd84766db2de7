//! Cache stores for Bulwark.
//!
//! A small key-value contract with per-key TTL and atomic counters, used by
//! the rate limiter to keep per-window request counts.
//!
//! # Features
//!
//! - `redis` - Enable the Redis-backed store
//!
//! # Examples
//!
//! ```
//! use bulwark_cache::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), CacheError> {
//! let cache = InMemoryCache::new();
//!
//! let hits = cache.increment("hits", 1).await?;
//! assert_eq!(hits, 1);
//! cache.expire("hits", Duration::from_secs(60)).await?;
//!
//! assert_eq!(cache.get_or("missing", "0".to_string()).await?, "0");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod traits;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use memory::{DEFAULT_SWEEP_INTERVAL, InMemoryCache};
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use traits::CacheStore;
