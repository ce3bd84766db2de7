//! Throttle middleware
//!
//! Plugs a [`RateLimiter`] into a [`bulwark_core::MiddlewareChain`]. Requests
//! over the limit are answered with `429 Too Many Requests`; the rest are
//! forwarded and get `X-RateLimit-*` headers on the way out.

use crate::RateLimiter;
use crate::clock::{Clock, SystemClock};
use crate::config::{FailureMode, RateLimiterBuilder, ThrottleConfig};
use crate::error::{RateLimitHeaders, RateLimitResult};
use crate::extractor::{KeyExtractor, hash_identity};
use async_trait::async_trait;
use bulwark_cache::CacheStore;
use bulwark_core::{HttpRequest, HttpResponse, Middleware, Next};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Rate limiting middleware
pub struct ThrottleMiddleware {
    limiter: Arc<RateLimiter>,
    extractor: KeyExtractor,
    include_headers: bool,
    message: String,
    bypass: Vec<String>,
    failure_mode: FailureMode,
}

impl ThrottleMiddleware {
    /// Wrap a limiter with default settings; limit and window come from the
    /// limiter's policy
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let defaults = ThrottleConfig::default();
        Self {
            limiter,
            extractor: defaults.extractor,
            include_headers: defaults.include_headers,
            message: defaults.message,
            bypass: defaults.bypass,
            failure_mode: defaults.failure_mode,
        }
    }

    /// Build the limiter and middleware described by `config`
    pub async fn from_config(
        config: ThrottleConfig,
        store: Arc<dyn CacheStore>,
    ) -> RateLimitResult<Self> {
        Self::from_config_with_clock(config, store, Arc::new(SystemClock)).await
    }

    /// Like [`from_config`](Self::from_config) with an explicit clock
    pub async fn from_config_with_clock(
        config: ThrottleConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> RateLimitResult<Self> {
        config.validate()?;
        let limiter = RateLimiterBuilder::new()
            .policy(config.policy_kind())
            .store(store)
            .clock(clock)
            .build()
            .await?;

        Ok(Self {
            limiter: Arc::new(limiter),
            extractor: config.extractor,
            include_headers: config.include_headers,
            message: config.message,
            bypass: config.bypass,
            failure_mode: config.failure_mode,
        })
    }

    /// Create middleware with a custom key extractor
    pub fn with_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set whether to include rate limit headers
    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    /// Set the body of throttled responses
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add identities that are never throttled
    pub fn with_bypass(mut self, identities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bypass.extend(identities.into_iter().map(Into::into));
        self
    }

    /// Set what happens when the store fails
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    fn decay(&self) -> Duration {
        self.limiter.window().unwrap_or(Duration::ZERO)
    }

    /// Decide what to do with a request.
    ///
    /// A passing request has already been counted when this returns.
    pub async fn check(&self, req: &HttpRequest) -> RateLimitResult<ThrottleDecision> {
        let Some(identity) = self.extractor.extract(req) else {
            warn!(
                extractor = self.extractor.description(),
                path = %req.path,
                "Could not extract rate limit key, allowing request"
            );
            return Ok(ThrottleDecision::Unidentified);
        };

        if self.bypass.iter().any(|b| *b == identity) {
            debug!(path = %req.path, "Identity is in bypass list, allowing request");
            return Ok(ThrottleDecision::Bypassed);
        }

        let key = hash_identity(&identity);
        let limit = self.limiter.limit();
        let decay = self.decay();
        trace!(key = %key, path = %req.path, "Checking rate limit");

        if self.limiter.is_blocked(&key, limit, decay).await? {
            let retry_after = self.limiter.get_retry_after(&key).await?;
            let remaining = self
                .limiter
                .calculate_remaining(&key, limit, Some(retry_after))
                .await?;

            info!(key = %key, path = %req.path, retry_after, "Rate limit exceeded");
            return Ok(ThrottleDecision::Limited {
                headers: RateLimitHeaders::denied(limit, remaining, retry_after),
            });
        }

        let consumed = self.limiter.consume(&key, decay).await?;
        let remaining = limit.saturating_sub(consumed);
        debug!(key = %key, consumed, remaining, "Request allowed");

        Ok(ThrottleDecision::Allowed {
            headers: RateLimitHeaders::allowed(limit, remaining),
        })
    }

    fn limited_response(&self, headers: &RateLimitHeaders) -> HttpResponse {
        let mut response = HttpResponse::too_many_requests().with_text(self.message.clone());

        if let Some(retry) = headers.retry_after {
            response
                .headers
                .insert("Retry-After".to_string(), retry.to_string());
        }
        if self.include_headers {
            response = headers.apply(response);
        }
        response
    }

    /// Get the underlying rate limiter
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }
}

/// Outcome of [`ThrottleMiddleware::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Counted and under the limit
    Allowed {
        /// Headers for the downstream response
        headers: RateLimitHeaders,
    },
    /// Over the limit
    Limited {
        /// Headers for the 429 response
        headers: RateLimitHeaders,
    },
    /// Identity is on the bypass list
    Bypassed,
    /// No identity could be extracted
    Unidentified,
}

impl ThrottleDecision {
    /// Check if the request may proceed
    pub fn is_allowed(&self) -> bool {
        !self.is_limited()
    }

    /// Check if the request is limited
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Get the headers if any
    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        match self {
            Self::Allowed { headers } | Self::Limited { headers } => Some(headers),
            _ => None,
        }
    }
}

#[async_trait]
impl Middleware for ThrottleMiddleware {
    async fn handle(
        &self,
        req: HttpRequest,
        next: Next,
    ) -> Result<HttpResponse, bulwark_core::Error> {
        let decision = match self.check(&req).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, mode = ?self.failure_mode, "Rate limit check failed");
                return match self.failure_mode {
                    FailureMode::Propagate => Err(e.into()),
                    FailureMode::FailOpen => next(req).await,
                    FailureMode::FailClosed => {
                        Ok(HttpResponse::service_unavailable().with_text("Service Unavailable"))
                    }
                };
            }
        };

        match decision {
            ThrottleDecision::Limited { headers } => Ok(self.limited_response(&headers)),
            ThrottleDecision::Allowed { headers } => {
                let response = next(req).await?;
                if self.include_headers {
                    Ok(headers.apply(response))
                } else {
                    Ok(response)
                }
            }
            ThrottleDecision::Bypassed | ThrottleDecision::Unidentified => next(req).await,
        }
    }
}

impl std::fmt::Debug for ThrottleMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleMiddleware")
            .field("limiter", &self.limiter)
            .field("extractor", &self.extractor)
            .field("include_headers", &self.include_headers)
            .field("bypass", &self.bypass.len())
            .field("failure_mode", &self.failure_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{CountingStore, FailingStore};
    use bulwark_cache::InMemoryCache;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, Ordering};

    const WINDOW_START: u64 = 1_699_999_980;

    fn ok_next() -> Next {
        Box::new(|_req| Box::pin(async { Ok(HttpResponse::text("ok")) }))
    }

    fn request_from(last_octet: u8) -> HttpRequest {
        HttpRequest::new("GET".to_string(), "/api/test".to_string())
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(127, 0, 0, last_octet)))
    }

    async fn middleware(config: ThrottleConfig) -> (ThrottleMiddleware, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix_secs(WINDOW_START));
        let mw = ThrottleMiddleware::from_config_with_clock(
            config,
            Arc::new(InMemoryCache::new()),
            clock.clone(),
        )
        .await
        .unwrap();
        (mw, clock)
    }

    #[tokio::test]
    async fn test_first_request_gets_headers() {
        let (mw, _) = middleware(ThrottleConfig::default()).await;

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "ok");
        assert_eq!(response.header("X-RateLimit-Limit"), Some("60"));
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("59"));
        assert_eq!(response.header("Retry-After"), None);
    }

    #[tokio::test]
    async fn test_allowed_request_reads_counter_twice() {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::at_unix_secs(WINDOW_START));
        let mw = ThrottleMiddleware::from_config_with_clock(
            ThrottleConfig::default().with_limit(3),
            store.clone(),
            clock,
        )
        .await
        .unwrap();

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("2"));
        // One read to check, one inside the consume
        assert_eq!(store.gets(), 2);

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("1"));
        assert_eq!(store.gets(), 4);
    }

    #[tokio::test]
    async fn test_limits_requests() {
        let (mw, clock) = middleware(ThrottleConfig::default().with_limit(3)).await;
        clock.advance(Duration::from_secs(10));

        for expected in ["2", "1", "0"] {
            let response = mw.handle(request_from(1), ok_next()).await.unwrap();
            assert_eq!(response.header("X-RateLimit-Remaining"), Some(expected));
        }

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.body_text(), "Too Many Requests");
        assert_eq!(response.header("X-RateLimit-Limit"), Some("3"));
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("0"));
        assert_eq!(response.header("Retry-After"), Some("50"));

        // Other clients are unaffected
        let response = mw.handle(request_from(2), ok_next()).await.unwrap();
        assert_eq!(response.status, 200);

        // Next window
        clock.advance(Duration::from_secs(50));
        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("2"));
    }

    #[tokio::test]
    async fn test_limited_requests_skip_downstream() {
        let (mw, _) = middleware(ThrottleConfig::default().with_limit(1)).await;
        mw.handle(request_from(1), ok_next()).await.unwrap();

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let next: Next = Box::new(move |_req| {
            flag.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(HttpResponse::ok()) })
        });

        let response = mw.handle(request_from(1), next).await.unwrap();
        assert_eq!(response.status, 429);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_key_is_hashed_identity() {
        let store = Arc::new(InMemoryCache::new());
        let clock = Arc::new(ManualClock::at_unix_secs(WINDOW_START));
        let mw = ThrottleMiddleware::from_config_with_clock(
            ThrottleConfig::default(),
            store.clone(),
            clock,
        )
        .await
        .unwrap();

        mw.handle(request_from(9), ok_next()).await.unwrap();

        let hashed = format!("{}:fw:{}", hash_identity("127.0.0.9"), WINDOW_START / 60);
        assert_eq!(store.get(&hashed).await.unwrap(), Some("1".to_string()));
        assert!(!store.exists(&format!("127.0.0.9:fw:{}", WINDOW_START / 60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_message_and_no_headers() {
        let config = ThrottleConfig::default()
            .with_limit(1)
            .with_message("Slow down")
            .with_headers(false);
        let (mw, _) = middleware(config).await;

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.header("X-RateLimit-Limit"), None);

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.body_text(), "Slow down");
        assert_eq!(response.header("X-RateLimit-Limit"), None);
        assert!(response.header("Retry-After").is_some());
    }

    #[tokio::test]
    async fn test_bypass() {
        let config = ThrottleConfig::default()
            .with_limit(1)
            .with_bypass(["127.0.0.1"]);
        let (mw, _) = middleware(config).await;

        for _ in 0..5 {
            let response = mw.handle(request_from(1), ok_next()).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.header("X-RateLimit-Limit"), None);
        }
        assert_eq!(
            mw.check(&request_from(1)).await.unwrap(),
            ThrottleDecision::Bypassed
        );
    }

    #[tokio::test]
    async fn test_unidentified_requests_pass() {
        let (mw, _) = middleware(ThrottleConfig::default().with_limit(1)).await;
        let req = HttpRequest::new("GET".to_string(), "/".to_string());

        assert_eq!(mw.check(&req).await.unwrap(), ThrottleDecision::Unidentified);
        for _ in 0..3 {
            let req = HttpRequest::new("GET".to_string(), "/".to_string());
            assert_eq!(mw.handle(req, ok_next()).await.unwrap().status, 200);
        }
    }

    #[tokio::test]
    async fn test_header_extractor() {
        let config = ThrottleConfig::default()
            .with_limit(1)
            .with_extractor(KeyExtractor::header("X-API-Key"));
        let (mw, _) = middleware(config).await;

        let req = |key: &str| request_from(1).with_header("X-API-Key", key);

        assert!(mw.check(&req("a")).await.unwrap().is_allowed());
        assert!(mw.check(&req("a")).await.unwrap().is_limited());
        assert!(mw.check(&req("b")).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_disabled_never_limits() {
        let (mw, _) = middleware(ThrottleConfig::default().disabled()).await;

        for _ in 0..100 {
            let response = mw.handle(request_from(1), ok_next()).await.unwrap();
            assert_eq!(response.status, 200);
        }
    }

    async fn failing(mode: FailureMode) -> ThrottleMiddleware {
        ThrottleMiddleware::from_config(
            ThrottleConfig::default().with_failure_mode(mode),
            Arc::new(FailingStore),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mw = failing(FailureMode::Propagate).await;

        let err = mw.handle(request_from(1), ok_next()).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(HttpResponse::from(err).status, 500);
    }

    #[tokio::test]
    async fn test_store_failure_fail_open() {
        let mw = failing(FailureMode::FailOpen).await;

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("X-RateLimit-Limit"), None);
    }

    #[tokio::test]
    async fn test_store_failure_fail_closed() {
        let mw = failing(FailureMode::FailClosed).await;

        let response = mw.handle(request_from(1), ok_next()).await.unwrap();
        assert_eq!(response.status, 503);
    }

    #[test]
    fn test_decision_methods() {
        let allowed = ThrottleDecision::Allowed {
            headers: RateLimitHeaders::allowed(60, 59),
        };
        assert!(allowed.is_allowed());
        assert!(!allowed.is_limited());
        assert_eq!(allowed.headers().unwrap().remaining, 59);

        let limited = ThrottleDecision::Limited {
            headers: RateLimitHeaders::denied(60, 0, 12),
        };
        assert!(limited.is_limited());
        assert_eq!(limited.headers().unwrap().retry_after, Some(12));

        assert!(ThrottleDecision::Bypassed.is_allowed());
        assert!(ThrottleDecision::Unidentified.headers().is_none());
    }
}
