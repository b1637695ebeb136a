use super::limiter::RateLimiter;
use super::types::{tracking_key, RateLimitDecision};
use crate::context::RequestContext;
use crate::error::GatewayError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Global rate limiting middleware.
///
/// Runs after the request-id and auth middleware so the tracking key can
/// prefer the authenticated identity. Every response (allowed or not)
/// carries the `X-RateLimit-*` headers; rejections add `Retry-After`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.enabled() {
        return next.run(request).await;
    }

    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(RequestContext::synthetic);

    let key = tracking_key(
        ctx.user_id.as_deref(),
        request.headers(),
        connect_info.map(|ConnectInfo(addr)| addr.ip()),
    );

    let decision = limiter.evaluate(&key);

    if decision.allowed {
        debug!(key = %key, remaining = decision.remaining, "Rate limit check passed");
        let mut response = next.run(request).await;
        apply_rate_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let retry_after = decision.retry_after.unwrap_or(limiter.config().window_secs);
    let mut response = GatewayError::RateLimited {
        limit: decision.limit,
        retry_after,
    }
    .with_context(&ctx)
    .into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Set `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`
/// and, on rejection, `Retry-After`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    insert_numeric(headers, "X-RateLimit-Limit", decision.limit as u64);
    insert_numeric(headers, "X-RateLimit-Remaining", decision.remaining as u64);
    insert_numeric(headers, "X-RateLimit-Reset", decision.reset_at);

    if let Some(retry_after) = decision.retry_after {
        insert_numeric(headers, "Retry-After", retry_after);
    }
}

fn insert_numeric(headers: &mut HeaderMap, name: &'static str, value: u64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}
