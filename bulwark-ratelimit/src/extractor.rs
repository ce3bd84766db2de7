//! Key extraction for rate limiting
//!
//! A [`KeyExtractor`] picks the raw identity of a request (client address,
//! a header value, ...). The throttle middleware hashes that identity with
//! [`hash_identity`] before it reaches the store, so raw addresses and
//! tokens never end up in cache keys.

use crate::error::{RateLimitError, RateLimitResult};
use bulwark_core::HttpRequest;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;

/// Type alias for key extractor function
pub type KeyExtractorFn = Arc<dyn Fn(&HttpRequest) -> Option<String> + Send + Sync>;

/// Header carrying the authenticated user id, set by an auth layer upstream
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Key extraction strategies
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// Peer address of the connection
    #[default]
    RemoteAddr,
    /// First address in a forwarding header set by a trusted proxy, falling
    /// back to the peer address
    ForwardedFor {
        /// Header name, usually `X-Forwarded-For`
        header: String,
    },
    /// Value of an arbitrary header
    Header {
        /// Header name to extract
        name: String,
    },
    /// Authenticated user id from [`USER_ID_HEADER`]
    UserId,
    /// Peer address combined with the path for per-endpoint limiting
    RemoteAddrAndPath,
    /// Try each extractor in order, first match wins
    FirstOf(Vec<KeyExtractor>),
    /// Custom extractor function
    Custom(KeyExtractorFn),
}

impl KeyExtractor {
    /// Create a peer-address key extractor
    pub fn remote_addr() -> Self {
        Self::RemoteAddr
    }

    /// Trust `X-Forwarded-For`
    pub fn forwarded_for() -> Self {
        Self::ForwardedFor {
            header: "X-Forwarded-For".to_string(),
        }
    }

    /// Create a header-based extractor
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// Create a user ID-based key extractor
    pub fn user_id() -> Self {
        Self::UserId
    }

    /// Create a peer address and path extractor
    pub fn remote_addr_and_path() -> Self {
        Self::RemoteAddrAndPath
    }

    /// Create an extractor from a closure
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&HttpRequest) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Parse the textual form used in configuration:
    /// `remote_addr`, `forwarded_for`, `user_id`, `remote_addr_and_path`
    /// or `header:<name>`.
    pub fn parse(s: &str) -> RateLimitResult<Self> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("header:") {
            let name = name.trim();
            if name.is_empty() {
                return Err(RateLimitError::config("header extractor needs a header name"));
            }
            return Ok(Self::header(name));
        }

        match s.to_lowercase().as_str() {
            "remote_addr" | "ip" => Ok(Self::RemoteAddr),
            "forwarded_for" => Ok(Self::forwarded_for()),
            "user_id" => Ok(Self::UserId),
            "remote_addr_and_path" | "ip_and_path" => Ok(Self::RemoteAddrAndPath),
            other => Err(RateLimitError::config(format!(
                "unknown key extractor '{}'",
                other
            ))),
        }
    }

    /// Extract the raw identity from a request
    pub fn extract(&self, req: &HttpRequest) -> Option<String> {
        match self {
            Self::RemoteAddr => req.remote_addr.map(|ip| ip.to_string()),
            Self::ForwardedFor { header } => req
                .header(header)
                .and_then(first_forwarded_addr)
                .or(req.remote_addr)
                .map(|ip| ip.to_string()),
            Self::Header { name } => non_empty(req.header(name)),
            Self::UserId => non_empty(req.header(USER_ID_HEADER)),
            Self::RemoteAddrAndPath => req.remote_addr.map(|ip| format!("{}:{}", ip, req.path)),
            Self::FirstOf(extractors) => extractors.iter().find_map(|e| e.extract(req)),
            Self::Custom(f) => f(req),
        }
    }

    /// Extract the identity or fail with [`RateLimitError::KeyExtraction`]
    pub fn try_extract(&self, req: &HttpRequest) -> RateLimitResult<String> {
        self.extract(req).ok_or_else(|| {
            RateLimitError::key_extraction(format!(
                "no {} on {} {}",
                self.description(),
                req.method,
                req.path
            ))
        })
    }

    /// Get a description of this extractor
    pub fn description(&self) -> &str {
        match self {
            Self::RemoteAddr => "remote address",
            Self::ForwardedFor { .. } => "forwarded address",
            Self::Header { .. } => "custom header",
            Self::UserId => "user id",
            Self::RemoteAddrAndPath => "remote address + path",
            Self::FirstOf(_) => "first matching extractor",
            Self::Custom(_) => "custom extractor",
        }
    }
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForwardedFor { header } => write!(f, "ForwardedFor({})", header),
            Self::Header { name } => write!(f, "Header({})", name),
            Self::FirstOf(extractors) => f.debug_tuple("FirstOf").field(extractors).finish(),
            other => f.write_str(other.description()),
        }
    }
}

fn first_forwarded_addr(value: &str) -> Option<IpAddr> {
    value.split(',').next()?.trim().parse().ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// SHA-256 of the identity as lowercase hex
pub fn hash_identity(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}
