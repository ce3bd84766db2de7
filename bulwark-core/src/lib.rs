//! # Bulwark Core
//!
//! The request pipeline pieces the rest of Bulwark plugs into:
//!
//! - [`HttpRequest`] / [`HttpResponse`]: plain request and response values
//! - [`Middleware`] and [`MiddlewareChain`]: `handle(request, next) -> response`
//! - [`Error`]: framework errors with an HTTP status mapping
//! - [`logging`]: `tracing` subscriber configuration
//!
//! ```rust
//! use bulwark_core::{HandlerFn, HttpRequest, HttpResponse, MiddlewareChain};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), bulwark_core::Error> {
//! let chain = MiddlewareChain::new();
//! let handler: HandlerFn = Arc::new(|_req| Box::pin(async { Ok(HttpResponse::ok()) }));
//!
//! let response = chain
//!     .apply(HttpRequest::new("GET".to_string(), "/".to_string()), handler)
//!     .await?;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;

pub use error::{Error, Result};
pub use http::{HttpRequest, HttpResponse};
pub use middleware::{HandlerFn, Middleware, MiddlewareChain, Next};
