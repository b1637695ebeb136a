//! Circuit breaker module
//!
//! Per-upstream breakers with a closed/open/half-open state machine and
//! rolling error-rate statistics. The HTTP fallback path wraps every
//! core-service call in the `core-service` breaker; health endpoints
//! expose breaker state and support operational force-open/force-close.

pub mod breaker;
pub mod registry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use registry::BreakerRegistry;
pub use types::{BreakerStatus, CircuitBreakerConfig, CircuitState, RollingStats};
