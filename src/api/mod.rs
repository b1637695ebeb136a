//! HTTP API module
//!
//! Route table and shared application state. Middleware (request id,
//! auth, rate limiting, CORS, tracing) is layered on in `lib.rs`.

pub mod handlers;
pub mod health;

use crate::circuit_breaker::BreakerRegistry;
use crate::config::GatewayConfig;
use crate::dispatch::HybridDispatcher;
use crate::error::{GatewayError, Result};
use crate::messaging::MessagingBridge;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Arc<HybridDispatcher>,
    pub bridge: Arc<MessagingBridge>,
    pub breakers: Arc<BreakerRegistry>,
    /// Short-deadline client for upstream health probes
    pub health_client: reqwest::Client,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        dispatcher: Arc<HybridDispatcher>,
        bridge: Arc<MessagingBridge>,
        breakers: Arc<BreakerRegistry>,
    ) -> Result<Self> {
        let health_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build health client: {}", e)))?;

        Ok(Self {
            config,
            dispatcher,
            bridge,
            breakers,
            health_client,
            started_at: Instant::now(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/refresh", post(handlers::refresh))
        .route("/v1/auth/logout", post(handlers::logout))
        .route(
            "/v1/users/me",
            get(handlers::get_me)
                .put(handlers::update_me)
                .delete(handlers::delete_me),
        )
        .route("/health", get(health::health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/health/circuit", get(health::circuit_all))
        .route("/health/circuit/:name", get(health::circuit_by_name))
        .route("/health/circuit/:name/open", post(health::circuit_open))
        .route("/health/circuit/:name/close", post(health::circuit_close))
        .route("/health/rabbitmq", get(health::rabbitmq))
        .with_state(state)
}
