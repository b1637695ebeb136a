use crate::context::RequestContext;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Network-level failure classes observed when calling the core service.
///
/// The codes mirror the classic socket error names so that clients and
/// dashboards can key off a stable string regardless of transport library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// Connection refused - service down or not accepting connections
    ConnectionRefused,
    /// DNS failure or unreachable host
    HostUnreachable,
    /// Connection reset mid-flight
    ConnectionReset,
    /// The upstream did not answer within the call deadline
    Timeout,
    /// Anything else network-shaped
    Other,
}

impl UpstreamKind {
    pub fn code(&self) -> &'static str {
        match self {
            UpstreamKind::ConnectionRefused => "ECONNREFUSED",
            UpstreamKind::HostUnreachable => "EHOSTUNREACH",
            UpstreamKind::ConnectionReset => "ECONNRESET",
            UpstreamKind::Timeout => "ETIMEDOUT",
            UpstreamKind::Other => "EUPSTREAM",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            UpstreamKind::ConnectionRefused => {
                "The target service is not running or not accepting connections"
            }
            UpstreamKind::HostUnreachable => "The target service URL is invalid or unreachable",
            UpstreamKind::ConnectionReset => "The connection to the target service was reset",
            UpstreamKind::Timeout => "The target service is not responding in time",
            UpstreamKind::Other => "The target service could not be reached",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamKind::ConnectionRefused => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamKind::HostUnreachable | UpstreamKind::ConnectionReset | UpstreamKind::Other => {
                StatusCode::BAD_GATEWAY
            }
            UpstreamKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Gateway error taxonomy
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        /// Seconds until the current window resets
        retry_after: u64,
    },

    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Upstream error: {message}")]
    Upstream {
        kind: UpstreamKind,
        message: String,
    },

    /// The core service answered the HTTP fallback with a non-success status.
    /// Status and message are forwarded verbatim to the client.
    #[error("{message}")]
    UpstreamStatus { status: u16, message: String },

    /// An RPC reply carried the error marker - the core service processed
    /// the command and rejected it. Terminal, no HTTP fallback.
    #[error("RPC rejected: {0}")]
    RpcRejected(String),

    /// An RPC reply arrived but could not be decoded. The core service
    /// still processed the command, so this is terminal too.
    #[error("Malformed RPC reply: {0}")]
    RpcMalformedReply(String),

    #[error("RPC timeout for pattern: {0}")]
    RpcTimeout(String),

    #[error("Message broker is not connected")]
    NotConnected,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lapin::Error> for GatewayError {
    fn from(err: lapin::Error) -> Self {
        GatewayError::Internal(format!("AMQP error: {}", err))
    }
}

impl GatewayError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) | GatewayError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { kind, .. } => kind.status_code(),
            GatewayError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::RpcRejected(_) | GatewayError::RpcMalformedReply(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::RpcTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short error name used in the response body (e.g. "Unauthorized")
    pub fn error_name(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "Configuration",
            GatewayError::Validation(_) => "Validation",
            GatewayError::Unauthorized(_) | GatewayError::InvalidToken(_) => "Unauthorized",
            GatewayError::Forbidden(_) => "Forbidden",
            GatewayError::NotFound(_) => "NotFound",
            GatewayError::Conflict(_) => "Conflict",
            GatewayError::RateLimited { .. } => "RateLimited",
            GatewayError::CircuitOpen(_) => "CircuitOpen",
            GatewayError::Upstream { .. } => "UpstreamUnavailable",
            GatewayError::UpstreamStatus { .. } => "UpstreamError",
            GatewayError::RpcRejected(_) => "UpstreamRejected",
            GatewayError::RpcMalformedReply(_) => "UpstreamInvalidReply",
            GatewayError::RpcTimeout(_) => "UpstreamTimeout",
            GatewayError::NotConnected => "BrokerUnavailable",
            GatewayError::Internal(_) | GatewayError::Io(_) => "InternalError",
        }
    }

    /// True when the error is a transport-level messaging failure that
    /// should trigger the HTTP fallback path. Any decoded or garbled
    /// reply (`RpcRejected`, `RpcMalformedReply`) is terminal: the core
    /// service already processed the command, so retrying over HTTP
    /// would duplicate its side effects. `Internal` stays in the set
    /// because the bridge only produces it before the command is
    /// published.
    pub fn is_rpc_transport_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::NotConnected | GatewayError::RpcTimeout(_) | GatewayError::Internal(_)
        )
    }

    /// Attach request context, producing a response-ready error
    pub fn with_context(self, ctx: &RequestContext) -> ApiError {
        ApiError {
            error: self,
            request_id: ctx.request_id.clone(),
            path: ctx.path.clone(),
            method: ctx.method.clone(),
        }
    }

    fn messages(&self) -> Vec<String> {
        match self {
            GatewayError::Validation(errors) => {
                errors.iter().map(|e| e.message.clone()).collect()
            }
            GatewayError::Upstream { kind, .. } => vec![match kind {
                UpstreamKind::ConnectionRefused => {
                    "Service unavailable - Connection refused".to_string()
                }
                UpstreamKind::HostUnreachable => "Bad gateway - Host unreachable".to_string(),
                UpstreamKind::ConnectionReset => "Bad gateway - Connection reset".to_string(),
                UpstreamKind::Timeout => "Gateway timeout - Request took too long".to_string(),
                UpstreamKind::Other => "Bad gateway - Upstream request failed".to_string(),
            }],
            other => vec![other.to_string()],
        }
    }

    /// Standardized error body: `{statusCode, message[], error, path,
    /// method, timestamp, requestId, errors?, details?}`
    pub fn to_body(&self, request_id: &str, path: &str, method: &str) -> serde_json::Value {
        let mut body = json!({
            "statusCode": self.status_code().as_u16(),
            "message": self.messages(),
            "error": self.error_name(),
            "path": path,
            "method": method,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "requestId": request_id,
        });

        if let GatewayError::Validation(errors) = self {
            body["errors"] = serde_json::to_value(errors).unwrap_or_default();
        }

        if let GatewayError::Upstream { kind, .. } = self {
            body["details"] = json!({ "code": kind.code(), "hint": kind.hint() });
        }

        body
    }
}

/// A `GatewayError` bound to its request context; this is what handlers
/// return so that every error response carries the correlation id.
#[derive(Debug)]
pub struct ApiError {
    pub error: GatewayError,
    pub request_id: String,
    pub path: String,
    pub method: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = self
            .error
            .to_body(&self.request_id, &self.path, &self.method);

        if status.is_server_error() {
            tracing::error!(
                method = %self.method,
                path = %self.path,
                status = status.as_u16(),
                request_id = %self.request_id,
                error = %self.error,
                "Request failed"
            );
        } else {
            tracing::warn!(
                method = %self.method,
                path = %self.path,
                status = status.as_u16(),
                request_id = %self.request_id,
                error = %self.error,
                "Request rejected"
            );
        }

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = self.request_id.parse() {
            response.headers_mut().insert("X-Request-ID", value);
        }
        response
    }
}

/// Classify a reqwest failure from the core-service call into the
/// upstream taxonomy (refused -> 503, dns/unreachable/reset -> 502,
/// timeout -> 504).
pub fn map_upstream_error(err: &reqwest::Error) -> GatewayError {
    let kind = if err.is_timeout() {
        UpstreamKind::Timeout
    } else if err.is_connect() {
        match find_io_error(err).map(|io| io.kind()) {
            Some(std::io::ErrorKind::ConnectionRefused) => UpstreamKind::ConnectionRefused,
            Some(std::io::ErrorKind::ConnectionReset) => UpstreamKind::ConnectionReset,
            _ => UpstreamKind::HostUnreachable,
        }
    } else if find_io_error(err)
        .map(|io| io.kind() == std::io::ErrorKind::ConnectionReset)
        .unwrap_or(false)
    {
        UpstreamKind::ConnectionReset
    } else {
        UpstreamKind::Other
    };

    GatewayError::Upstream {
        kind,
        message: err.to_string(),
    }
}

/// Walk the source chain looking for the underlying io::Error
fn find_io_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a std::io::Error> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        source = cause.source();
    }
    None
}
