use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether the global limiter is active
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_limit() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

/// Outcome of a single window evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Configured limit for the window
    pub limit: u32,
    /// Requests left in the current window, clamped at 0
    pub remaining: u32,
    /// Unix seconds at which the window resets
    pub reset_at: u64,
    /// Seconds until reset; only set on rejection
    pub retry_after: Option<u64>,
}

/// Derive the tracking key for a request.
///
/// Precedence is load-bearing: an authenticated user is bucketed by id so
/// users behind a shared corporate proxy are limited independently; only
/// anonymous traffic falls back to the proxy-declared or transport IP.
pub fn tracking_key(
    user_id: Option<&str>,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
) -> String {
    if let Some(id) = user_id {
        return format!("user:{}", id);
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return format!("ip:{}", first);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return format!("ip:{}", real_ip);
        }
    }

    if let Some(addr) = peer {
        return format!("ip:{}", addr);
    }

    "ip:unknown".to_string()
}
