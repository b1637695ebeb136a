//! CORS module
//!
//! Origin allow-list with wildcard subdomain patterns. Entries like
//! `https://*.example.com` match one subdomain level; everything else is
//! an exact match. Credentials are allowed, so `*` as a whole origin is
//! rejected at build time.

use crate::error::{GatewayError, Result};
use axum::http::{HeaderValue, Method};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; entries may contain a `*` subdomain wildcard
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,
    /// Allowed request headers
    #[serde(default = "default_headers")]
    pub allowed_headers: Vec<String>,
    /// Headers exposed to browser scripts
    #[serde(default = "default_exposed_headers")]
    pub exposed_headers: Vec<String>,
    /// Allow credentials
    #[serde(default = "default_true")]
    pub allow_credentials: bool,
    /// Max age for preflight cache in seconds
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

fn default_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "POST".to_string(),
        "PUT".to_string(),
        "PATCH".to_string(),
        "DELETE".to_string(),
        "OPTIONS".to_string(),
    ]
}

fn default_headers() -> Vec<String> {
    vec![
        "Content-Type".to_string(),
        "Authorization".to_string(),
        "X-Request-ID".to_string(),
    ]
}

fn default_exposed_headers() -> Vec<String> {
    vec![
        "X-Request-ID".to_string(),
        "X-RateLimit-Limit".to_string(),
        "X-RateLimit-Remaining".to_string(),
        "X-RateLimit-Reset".to_string(),
        "Retry-After".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_max_age() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: default_methods(),
            allowed_headers: default_headers(),
            exposed_headers: default_exposed_headers(),
            allow_credentials: default_true(),
            max_age_secs: default_max_age(),
        }
    }
}

/// One compiled origin rule
#[derive(Debug)]
enum OriginRule {
    Exact(String),
    Pattern(Regex),
}

impl OriginRule {
    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Exact(expected) => origin == expected,
            OriginRule::Pattern(pattern) => pattern.is_match(origin),
        }
    }
}

fn compile_rules(origins: &[String]) -> Result<Vec<OriginRule>> {
    origins
        .iter()
        .map(|origin| {
            if origin == "*" {
                return Err(GatewayError::Config(
                    "CORS origin '*' is not allowed with credentials; list explicit origins"
                        .to_string(),
                ));
            }
            if origin.contains('*') {
                // `*` matches exactly one subdomain label
                let escaped = regex::escape(origin).replace("\\*", "[^./]+");
                let pattern = Regex::new(&format!("^{}$", escaped)).map_err(|e| {
                    GatewayError::Config(format!("Invalid CORS origin pattern '{}': {}", origin, e))
                })?;
                Ok(OriginRule::Pattern(pattern))
            } else {
                Ok(OriginRule::Exact(origin.clone()))
            }
        })
        .collect()
}

impl CorsConfig {
    /// Configuration from the gateway's origin allow-list
    pub fn for_origins(origins: Vec<String>) -> Self {
        Self {
            allowed_origins: origins,
            ..Default::default()
        }
    }

    /// Build a CorsLayer from this configuration
    pub fn build_layer(&self) -> Result<CorsLayer> {
        let rules = Arc::new(compile_rules(&self.allowed_origins)?);
        debug!(origins = ?self.allowed_origins, "CORS: Configured allowed origins");

        let mut cors = CorsLayer::new().allow_origin(AllowOrigin::predicate({
            let rules = rules.clone();
            move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|origin| rules.iter().any(|rule| rule.matches(origin)))
                    .unwrap_or(false)
            }
        }));

        let methods: std::result::Result<Vec<Method>, _> = self
            .allowed_methods
            .iter()
            .map(|m| Method::from_bytes(m.as_bytes()))
            .collect();
        match methods {
            Ok(method_values) => cors = cors.allow_methods(method_values),
            Err(e) => {
                return Err(GatewayError::Config(format!("Invalid CORS method: {}", e)));
            }
        }

        let headers: std::result::Result<Vec<_>, _> =
            self.allowed_headers.iter().map(|h| h.parse()).collect();
        match headers {
            Ok(header_values) => cors = cors.allow_headers(header_values),
            Err(e) => {
                return Err(GatewayError::Config(format!(
                    "Invalid CORS header name: {}",
                    e
                )));
            }
        }

        if !self.exposed_headers.is_empty() {
            let headers: std::result::Result<Vec<_>, _> =
                self.exposed_headers.iter().map(|h| h.parse()).collect();
            match headers {
                Ok(header_values) => cors = cors.expose_headers(header_values),
                Err(e) => {
                    return Err(GatewayError::Config(format!(
                        "Invalid exposed header name: {}",
                        e
                    )));
                }
            }
        }

        if self.allow_credentials {
            cors = cors.allow_credentials(true);
        }

        cors = cors.max_age(Duration::from_secs(self.max_age_secs));
        Ok(cors)
    }
}
