//! Rate limiting module
//!
//! Process-local sliding-window rate limiting with a proxy-aware
//! tracking key:
//!
//! 1. authenticated user id (`user:<id>`)
//! 2. first hop of `X-Forwarded-For` (`ip:<addr>`)
//! 3. `X-Real-IP`
//! 4. transport peer address
//! 5. `ip:unknown`
//!
//! The limiter fails open: an internal evaluation problem logs and
//! allows rather than breaking the request path.

pub mod limiter;
pub mod middleware;
pub mod types;

pub use limiter::RateLimiter;
pub use middleware::{apply_rate_limit_headers, rate_limit_middleware};
pub use types::{tracking_key, RateLimitConfig, RateLimitDecision};
