pub mod api;
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod cors;
pub mod dispatch;
pub mod error;
pub mod messaging;
pub mod rate_limit;

use crate::api::AppState;
use crate::auth::{auth_middleware, JwtValidator};
use crate::circuit_breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::config::GatewayConfig;
use crate::cors::CorsConfig;
use crate::dispatch::HybridDispatcher;
use crate::error::{GatewayError, Result};
use crate::messaging::{MessagingBridge, MessagingConfig};
use crate::rate_limit::{rate_limit_middleware, RateLimiter, RateLimitConfig};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the axum application: routes plus the middleware stack.
///
/// Request-id runs before auth so rejections already carry a correlation
/// id; auth runs before rate limiting so authenticated traffic is
/// bucketed per user instead of per proxy IP.
pub fn build_app(
    state: AppState,
    validator: Arc<JwtValidator>,
    limiter: Arc<RateLimiter>,
    cors: CorsLayer,
) -> Router {
    api::router(state)
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(validator, auth_middleware))
        .layer(middleware::from_fn(context::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Initialize and run the gateway server
pub async fn init_gateway(config: GatewayConfig) -> Result<()> {
    config.validate()?;
    let config = Arc::new(config);

    info!("Starting API gateway");

    let validator = Arc::new(JwtValidator::new(&config.jwt_secret));

    let bridge = Arc::new(MessagingBridge::new(MessagingConfig::from(
        config.as_ref(),
    )));
    let supervisor = tokio::spawn(bridge.clone().run());

    let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig {
        timeout_ms: config.breaker_timeout_ms,
        error_threshold_percentage: config.breaker_error_threshold,
        reset_timeout_ms: config.breaker_reset_timeout_ms,
        ..Default::default()
    }));

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        enabled: config.throttle_enabled,
        limit: config.throttle_limit,
        window_secs: config.throttle_ttl,
    }));
    spawn_window_pruner(limiter.clone(), config.throttle_ttl);

    let dispatcher = Arc::new(HybridDispatcher::new(
        bridge.clone(),
        breakers.clone(),
        config.core_service_url.clone(),
        Duration::from_millis(config.http_timeout_ms),
    )?);

    let cors = CorsConfig::for_origins(config.cors_origins()).build_layer()?;

    let state = AppState::new(config.clone(), dispatcher, bridge.clone(), breakers)?;
    let app = build_app(state, validator, limiter, cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(GatewayError::Io)?;
    info!(addr = %addr, "Gateway ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| GatewayError::Internal(format!("Server error: {}", e)))?;

    info!("Shutting down");
    bridge.disconnect().await;
    supervisor.abort();
    Ok(())
}

fn spawn_window_pruner(limiter: Arc<RateLimiter>, window_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(window_secs.max(30)));
        loop {
            interval.tick().await;
            limiter.prune_expired();
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Initialize tracing/logging
pub fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("lifeplaneer_gateway={},tower_http=info", log_level).into()
            }),
        )
        .with_target(false)
        .compact()
        .init();
}
