//! Client-side rate limiting for HTTP APIs that report quota state through
//! response headers.
//!
//! The core is [`RateLimiter`]: callers ask it for admission before each
//! outgoing action and feed the response's quota metadata back in via
//! [`RateLimiter::update`]. [`http::GuardedClient`] packages that loop
//! around a reqwest client.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod types;

pub use error::MissingOrMalformedField;
pub use limiter::{Admission, RateLimiter};
pub use types::{QuotaField, QuotaMeta, QuotaSnapshot};
