use crate::error::{GatewayError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Gateway configuration, supplied through environment variables and
/// validated once at startup. The process fails fast on invalid or
/// missing required values (notably `JWT_SECRET`).
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Server port (`PORT`)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the core service (`CORE_SERVICE_URL`)
    #[serde(default = "default_core_service_url")]
    pub core_service_url: String,

    /// JWT signing secret (`JWT_SECRET`, required, >= 32 chars)
    pub jwt_secret: SecretString,

    /// JWT expiry hint forwarded to token issuance (`JWT_EXPIRES_IN`)
    #[serde(default = "default_jwt_expires_in")]
    pub jwt_expires_in: String,

    /// Comma-separated CORS origin allow-list (`CORS_ORIGIN`)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Rate limiting toggle (`THROTTLE_ENABLED`)
    #[serde(default = "default_true")]
    pub throttle_enabled: bool,

    /// Requests allowed per window (`THROTTLE_LIMIT`)
    #[serde(default = "default_throttle_limit")]
    pub throttle_limit: u32,

    /// Window length in seconds (`THROTTLE_TTL`)
    #[serde(default = "default_throttle_ttl")]
    pub throttle_ttl: u64,

    /// Broker connection URL (`RABBITMQ_URL`)
    #[serde(default = "default_rabbitmq_url")]
    pub rabbitmq_url: String,

    /// Command queue RPC messages are sent to (`RABBITMQ_QUEUE`)
    #[serde(default = "default_rabbitmq_queue")]
    pub rabbitmq_queue: String,

    /// Channel prefetch count (`RABBITMQ_PREFETCH`)
    #[serde(default = "default_rabbitmq_prefetch")]
    pub rabbitmq_prefetch: u16,

    /// RPC call deadline in milliseconds (`RPC_TIMEOUT_MS`)
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// HTTP fallback call deadline in milliseconds (`HTTP_TIMEOUT_MS`)
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Circuit breaker per-call timeout (`BREAKER_TIMEOUT_MS`)
    #[serde(default = "default_breaker_timeout_ms")]
    pub breaker_timeout_ms: u64,

    /// Error percentage that opens the breaker (`BREAKER_ERROR_THRESHOLD`)
    #[serde(default = "default_breaker_error_threshold")]
    pub breaker_error_threshold: u8,

    /// Open-state cooldown before a half-open trial (`BREAKER_RESET_TIMEOUT_MS`)
    #[serde(default = "default_breaker_reset_timeout_ms")]
    pub breaker_reset_timeout_ms: u64,

    /// Log level (`LOG_LEVEL`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    3000
}

fn default_core_service_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_jwt_expires_in() -> String {
    "15m".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

fn default_true() -> bool {
    true
}

fn default_throttle_limit() -> u32 {
    100
}

fn default_throttle_ttl() -> u64 {
    60
}

fn default_rabbitmq_url() -> String {
    "amqp://localhost:5672".to_string()
}

fn default_rabbitmq_queue() -> String {
    "core.user.commands".to_string()
}

fn default_rabbitmq_prefetch() -> u16 {
    10
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_breaker_timeout_ms() -> u64 {
    5_000
}

fn default_breaker_error_threshold() -> u8 {
    50
}

fn default_breaker_reset_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl GatewayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to read environment: {}", e)))?;

        let cfg: GatewayConfig = source
            .try_deserialize()
            .map_err(|e| GatewayError::Config(format!("Invalid configuration: {}", e)))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration; called at startup before anything is built
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.expose_secret().len() < 32 {
            return Err(GatewayError::Config(
                "JWT_SECRET must be at least 32 characters long".to_string(),
            ));
        }

        let core_url = Url::parse(&self.core_service_url).map_err(|e| {
            GatewayError::Config(format!("CORE_SERVICE_URL is not a valid URL: {}", e))
        })?;
        if core_url.scheme() != "http" && core_url.scheme() != "https" {
            return Err(GatewayError::Config(
                "CORE_SERVICE_URL must be an http:// or https:// URL".to_string(),
            ));
        }

        if !self.rabbitmq_url.starts_with("amqp://") && !self.rabbitmq_url.starts_with("amqps://") {
            return Err(GatewayError::Config(
                "RABBITMQ_URL must be an amqp:// or amqps:// URL".to_string(),
            ));
        }

        if self.throttle_limit == 0 {
            return Err(GatewayError::Config(
                "THROTTLE_LIMIT must be at least 1".to_string(),
            ));
        }
        if self.throttle_ttl == 0 {
            return Err(GatewayError::Config(
                "THROTTLE_TTL must be at least 1 second".to_string(),
            ));
        }

        if self.breaker_error_threshold == 0 || self.breaker_error_threshold > 100 {
            return Err(GatewayError::Config(
                "BREAKER_ERROR_THRESHOLD must be between 1 and 100".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(GatewayError::Config(format!(
                "LOG_LEVEL must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Parsed CORS origin allow-list
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origin
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}
