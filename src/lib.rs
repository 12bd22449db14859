//! Tollgate - Per-client, per-endpoint admission control
//!
//! This crate decides, for each incoming HTTP request, whether to admit it or
//! reject it with a rate-limit error. Every `(client identity, endpoint
//! pattern)` pair gets its own token bucket, sized by the most specific
//! pattern matching the request path or by a fallback limit.
//!
//! ```
//! use tollgate::ratelimit::{EndpointLimit, LimitsConfig, RateLimiter};
//!
//! let limits = LimitsConfig::new()
//!     .with_endpoint("/api/**", EndpointLimit::new(100, 50.0))
//!     .with_endpoint("/api/slow", EndpointLimit::new(1, 0.5));
//! let limiter = RateLimiter::from_config(&limits).unwrap();
//!
//! assert!(limiter.allow("203.0.113.9", "/api/slow"));
//! assert!(!limiter.allow("203.0.113.9", "/api/slow"));
//! assert!(limiter.allow("203.0.113.9", "/api/fast"));
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod maintenance;
pub mod ratelimit;
