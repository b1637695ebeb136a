use super::AppState;
use crate::context::RequestContext;
use crate::error::{ApiError, GatewayError};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};
use tracing::warn;

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn core_service_health(state: &AppState) -> Result<(), String> {
    let url = format!(
        "{}/health",
        state.config.core_service_url.trim_end_matches('/')
    );
    match state.health_client.get(&url).send().await {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("Core service returned {}", response.status())),
        Err(e) => Err(e.to_string()),
    }
}

/// Aggregate health: gateway plus a live probe of the core service.
/// Degrades to 503 when the core service is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let started = std::time::Instant::now();
    let core = core_service_health(&state).await;
    let response_time_ms = started.elapsed().as_millis() as u64;

    let core_status = match &core {
        Ok(()) => json!({
            "status": "healthy",
            "url": state.config.core_service_url,
            "responseTime": response_time_ms,
        }),
        Err(error) => json!({
            "status": "unhealthy",
            "url": state.config.core_service_url,
            "error": error,
        }),
    };

    let body = json!({
        "status": if core.is_ok() { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "services": {
            "apiGateway": {
                "status": "healthy",
                "version": VERSION,
                "port": state.config.port,
            },
            "coreService": core_status,
        },
    });

    if core.is_err() {
        warn!("Health check failed: core service is unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    } else {
        (StatusCode::OK, Json(body))
    }
}

/// Liveness probe: the process is up
pub async fn live(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

/// Readiness probe: ready once the core service answers
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match core_service_health(&state).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "error": error,
            })),
        ),
    }
}

/// All circuit breakers, keyed by name
pub async fn circuit_all(State(state): State<AppState>) -> Json<Value> {
    let mut body = Map::new();
    for status in state.breakers.all_status().await {
        body.insert(
            status.name.clone(),
            serde_json::to_value(&status).unwrap_or_default(),
        );
    }
    Json(Value::Object(body))
}

pub async fn circuit_by_name(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.breakers.status(&name).await {
        Some(status) => Ok(Json(serde_json::to_value(&status).unwrap_or_default())),
        None => Err(
            GatewayError::NotFound(format!("Circuit breaker '{}' not found", name))
                .with_context(&ctx),
        ),
    }
}

pub async fn circuit_open(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.breakers.force_open(&name).await {
        return Err(
            GatewayError::NotFound(format!("Circuit breaker '{}' not found", name))
                .with_context(&ctx),
        );
    }
    Ok(Json(json!({
        "message": format!("Circuit breaker [{}] manually opened", name),
        "status": "success",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

pub async fn circuit_close(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.breakers.force_close(&name).await {
        return Err(
            GatewayError::NotFound(format!("Circuit breaker '{}' not found", name))
                .with_context(&ctx),
        );
    }
    Ok(Json(json!({
        "message": format!("Circuit breaker [{}] manually closed", name),
        "status": "success",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Broker connection health
pub async fn rabbitmq(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let status = state.bridge.status().await;
    let connected = status.connected;
    let body = json!({
        "status": if connected { "ok" } else { "error" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "rabbitmq": status,
    });

    if connected {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
