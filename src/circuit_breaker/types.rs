use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without touching the upstream
    Open,
    /// One trial request is allowed to probe the upstream
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Per-call deadline in milliseconds; slower calls count as timeouts
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Error percentage over the rolling window that opens the circuit
    #[serde(default = "default_error_threshold_percentage")]
    pub error_threshold_percentage: u8,

    /// How long the circuit stays open before a half-open trial
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Rolling window length in milliseconds
    #[serde(default = "default_rolling_count_timeout_ms")]
    pub rolling_count_timeout_ms: u64,

    /// Number of buckets the rolling window is divided into
    #[serde(default = "default_rolling_count_buckets")]
    pub rolling_count_buckets: u32,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_error_threshold_percentage() -> u8 {
    50
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_rolling_count_timeout_ms() -> u64 {
    10_000
}

fn default_rolling_count_buckets() -> u32 {
    10
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            error_threshold_percentage: default_error_threshold_percentage(),
            reset_timeout_ms: default_reset_timeout_ms(),
            rolling_count_timeout_ms: default_rolling_count_timeout_ms(),
            rolling_count_buckets: default_rolling_count_buckets(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Length of one rolling bucket
    pub fn bucket_duration(&self) -> Duration {
        Duration::from_millis(self.rolling_count_timeout_ms / self.rolling_count_buckets.max(1) as u64)
    }
}

/// Aggregated rolling statistics over the bucket window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollingStats {
    /// Calls admitted through the breaker
    pub fires: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Calls rejected while open or during a half-open trial
    pub rejects: u64,
}

impl RollingStats {
    /// Error percentage of admitted calls; 0 when nothing has fired
    pub fn error_percentage(&self) -> u8 {
        if self.fires == 0 {
            return 0;
        }
        (((self.failures + self.timeouts) * 100) / self.fires) as u8
    }
}

/// Point-in-time snapshot returned by status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub stats: RollingStats,
    pub config: CircuitBreakerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.error_threshold_percentage, 50);
        assert_eq!(config.reset_timeout_ms, 30_000);
        assert_eq!(config.rolling_count_timeout_ms, 10_000);
        assert_eq!(config.rolling_count_buckets, 10);
        assert_eq!(config.bucket_duration(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_error_percentage() {
        let stats = RollingStats {
            fires: 10,
            successes: 4,
            failures: 4,
            timeouts: 2,
            rejects: 0,
        };
        assert_eq!(stats.error_percentage(), 60);

        assert_eq!(RollingStats::default().error_percentage(), 0);
    }
}
