//! Common utilities shared across exchange clients
//!
//! - Request rate limiting
//! - Retry with exponential backoff

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
