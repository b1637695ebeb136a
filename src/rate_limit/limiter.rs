use super::types::{RateLimitConfig, RateLimitDecision};
use dashmap::DashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Per-key window state. `count` is monotonically non-decreasing within a
/// window and resets to 1 at rollover. Counting continues past the limit
/// so the abuse volume stays observable; responses clamp `remaining` at 0.
#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
    /// Unix seconds at which this window expires
    reset_at: u64,
}

/// Sliding-window rate limiter keyed by tracking key.
///
/// State is process-local by design; multiple gateway instances each
/// enforce their own budget. Per-key mutations happen inside a single
/// DashMap entry access, which holds the shard lock for the duration of
/// the read-modify-write.
pub struct RateLimiter {
    windows: DashMap<String, WindowState>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Evaluate one request against the window for `key`.
    ///
    /// Never fails: if wall-clock time is unavailable the request is
    /// allowed (fail-open) and the anomaly logged.
    pub fn evaluate(&self, key: &str) -> RateLimitDecision {
        let limit = self.config.limit;
        let window = Duration::from_secs(self.config.window_secs);

        let now = Instant::now();
        let unix_now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(e) => {
                warn!(key = %key, error = %e, "Clock unavailable, allowing request");
                return self.fail_open();
            }
        };

        let mut entry = self.windows.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            window_start: now,
            reset_at: unix_now + self.config.window_secs,
        });

        // Window rollover: reset to a fresh window with this request counted
        if now.duration_since(entry.window_start) >= window {
            entry.count = 1;
            entry.window_start = now;
            entry.reset_at = unix_now + self.config.window_secs;
            return RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(1),
                reset_at: entry.reset_at,
                retry_after: None,
            };
        }

        entry.count = entry.count.saturating_add(1);
        let reset_at = entry.reset_at;
        let count = entry.count;
        drop(entry);

        if count > limit {
            let retry_after = reset_at.saturating_sub(unix_now).max(1);
            debug!(key = %key, count, limit, "Rate limit exceeded");
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after: Some(retry_after),
            }
        } else {
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(count),
                reset_at,
                retry_after: None,
            }
        }
    }

    /// Drop windows that have expired; called periodically from a
    /// background task so idle keys do not accumulate forever.
    pub fn prune_expired(&self) {
        let window = Duration::from_secs(self.config.window_secs);
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.duration_since(state.window_start) < window);
        // Concurrent inserts during retain can push len() above the
        // snapshot taken before it.
        let pruned = before.saturating_sub(self.windows.len());
        if pruned > 0 {
            debug!(pruned, active = self.windows.len(), "Pruned expired rate windows");
        }
    }

    /// Number of live tracking keys (for monitoring/tests)
    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }

    fn fail_open(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.config.limit,
            remaining: self.config.limit,
            reset_at: 0,
            retry_after: None,
        }
    }
}
