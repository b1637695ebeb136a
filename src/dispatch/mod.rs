//! Hybrid dispatch module
//!
//! Every gateway operation goes RPC-first over the messaging bridge and
//! falls back to a circuit-protected HTTP call against the core service
//! when the broker path is unavailable. Application-level RPC rejections
//! are terminal and never retried over HTTP. Domain events and jobs are
//! published fire-and-forget after the outcome is known.

use crate::circuit_breaker::BreakerRegistry;
use crate::context::{RequestContext, REQUEST_ID_HEADER};
use crate::error::{map_upstream_error, GatewayError, Result};
use crate::messaging::patterns::{event, job, rpc};
use crate::messaging::MessagingBridge;
use http::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Breaker guarding the HTTP fallback path
pub const CORE_SERVICE_BREAKER: &str = "core-service";

/// One dispatchable operation: its RPC pattern, its HTTP fallback route
/// and the side effects published on success or failure.
#[derive(Debug, Clone)]
pub struct Operation {
    pub pattern: &'static str,
    pub method: Method,
    pub path: &'static str,
    pub success_event: Option<&'static str>,
    pub failure_event: Option<&'static str>,
    pub job: Option<&'static str>,
}

pub mod ops {
    use super::*;

    pub const LOGIN: Operation = Operation {
        pattern: rpc::AUTH_LOGIN,
        method: Method::POST,
        path: "/auth/login",
        success_event: Some(event::AUTH_LOGIN_SUCCESS),
        failure_event: Some(event::AUTH_LOGIN_FAILED),
        job: None,
    };

    pub const REGISTER: Operation = Operation {
        pattern: rpc::AUTH_REGISTER,
        method: Method::POST,
        path: "/auth/register",
        success_event: Some(event::USER_REGISTERED),
        failure_event: None,
        job: Some(job::EMAIL_WELCOME),
    };

    pub const REFRESH: Operation = Operation {
        pattern: rpc::AUTH_REFRESH,
        method: Method::POST,
        path: "/auth/refresh",
        success_event: None,
        failure_event: None,
        job: None,
    };

    pub const LOGOUT: Operation = Operation {
        pattern: rpc::AUTH_LOGOUT,
        method: Method::POST,
        path: "/auth/logout",
        success_event: Some(event::AUTH_LOGOUT_SUCCESS),
        failure_event: None,
        job: None,
    };

    pub const GET_ME: Operation = Operation {
        pattern: rpc::USER_GET,
        method: Method::GET,
        path: "/users/me",
        success_event: None,
        failure_event: None,
        job: None,
    };

    pub const UPDATE_ME: Operation = Operation {
        pattern: rpc::USER_UPDATE,
        method: Method::PUT,
        path: "/users/me",
        success_event: Some(event::USER_UPDATED),
        failure_event: None,
        job: None,
    };

    pub const DELETE_ME: Operation = Operation {
        pattern: rpc::USER_DELETE,
        method: Method::DELETE,
        path: "/users/me",
        success_event: Some(event::USER_DELETED),
        failure_event: None,
        job: None,
    };
}

pub struct HybridDispatcher {
    bridge: Arc<MessagingBridge>,
    breakers: Arc<BreakerRegistry>,
    client: reqwest::Client,
    core_url: String,
}

impl HybridDispatcher {
    pub fn new(
        bridge: Arc<MessagingBridge>,
        breakers: Arc<BreakerRegistry>,
        core_url: String,
        http_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        // Pre-create the breaker so health endpoints see it before the
        // first fallback call.
        breakers.get_or_create(CORE_SERVICE_BREAKER);

        Ok(Self {
            bridge,
            breakers,
            client,
            core_url: core_url.trim_end_matches('/').to_string(),
        })
    }

    /// Run one operation: RPC first, HTTP fallback on transport failure.
    pub async fn dispatch(
        &self,
        op: &Operation,
        payload: Value,
        ctx: &RequestContext,
    ) -> Result<Value> {
        if self.bridge.is_connected() {
            debug!(pattern = op.pattern, request_id = %ctx.request_id, "Dispatching via RPC");
            match self.bridge.send_rpc(op.pattern, payload.clone(), ctx).await {
                Ok(reply) => {
                    self.publish_success(op, &payload, &reply, ctx);
                    return Ok(reply);
                }
                Err(err) if err.is_rpc_transport_failure() => {
                    warn!(
                        pattern = op.pattern,
                        error = %err,
                        "RPC path failed, falling back to HTTP"
                    );
                }
                Err(err) => {
                    // The core service processed and rejected the command;
                    // retrying over HTTP would just repeat the rejection.
                    self.publish_failure(op, &payload, &err, ctx);
                    return Err(err);
                }
            }
        } else {
            debug!(
                pattern = op.pattern,
                request_id = %ctx.request_id,
                "Broker disconnected, dispatching via HTTP"
            );
        }

        match self.http_fallback(op, &payload, ctx).await {
            Ok(reply) => {
                self.publish_success(op, &payload, &reply, ctx);
                Ok(reply)
            }
            Err(err) => {
                self.publish_failure(op, &payload, &err, ctx);
                Err(err)
            }
        }
    }

    async fn http_fallback(
        &self,
        op: &Operation,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<Value> {
        let breaker = self.breakers.get_or_create(CORE_SERVICE_BREAKER);
        let url = format!("{}{}", self.core_url, op.path);

        breaker
            .call(|| async {
                let mut request = self
                    .client
                    .request(op.method.clone(), &url)
                    .header(REQUEST_ID_HEADER, &ctx.request_id);
                if let Some(user_id) = &ctx.user_id {
                    request = request.header("X-User-ID", user_id);
                }
                if op.method != Method::GET {
                    request = request.json(payload);
                }

                let response = request.send().await.map_err(|e| map_upstream_error(&e))?;
                let status = response.status();

                if status.is_success() {
                    response.json::<Value>().await.map_err(|e| {
                        GatewayError::Internal(format!("Invalid JSON from core service: {}", e))
                    })
                } else {
                    let body: Value = response.json().await.unwrap_or_default();
                    Err(GatewayError::UpstreamStatus {
                        status: status.as_u16(),
                        message: upstream_message(&body, status.as_u16()),
                    })
                }
            })
            .await
    }

    fn publish_success(&self, op: &Operation, payload: &Value, reply: &Value, ctx: &RequestContext) {
        if op.success_event.is_none() && op.job.is_none() {
            return;
        }

        let data = side_effect_data(payload, Some(reply), ctx, None);
        let success_event = op.success_event;
        let job_pattern = op.job;
        let bridge = self.bridge.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            if let Some(pattern) = success_event {
                bridge.publish_event(pattern, data.clone(), Some(&ctx)).await;
            }
            if let Some(pattern) = job_pattern {
                bridge.publish_job(pattern, data, 0, None, Some(&ctx)).await;
            }
        });
    }

    fn publish_failure(
        &self,
        op: &Operation,
        payload: &Value,
        err: &GatewayError,
        ctx: &RequestContext,
    ) {
        let Some(pattern) = op.failure_event else {
            return;
        };

        let data = side_effect_data(payload, None, ctx, Some(err.error_name()));
        let bridge = self.bridge.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            bridge.publish_event(pattern, data, Some(&ctx)).await;
        });
    }
}

/// Analytics payload attached to events and jobs: the request email if
/// present, the user id from the reply (or the authenticated context)
/// and a millisecond timestamp.
fn side_effect_data(
    payload: &Value,
    reply: Option<&Value>,
    ctx: &RequestContext,
    reason: Option<&str>,
) -> Value {
    let user_id = reply
        .and_then(|r| {
            r.pointer("/user/id")
                .or_else(|| r.get("userId"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .or_else(|| ctx.user_id.clone());

    let mut data = json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
    });
    if let Some(email) = payload.get("email").and_then(|v| v.as_str()) {
        data["email"] = json!(email);
    }
    if let Some(user_id) = user_id {
        data["userId"] = json!(user_id);
    }
    if let Some(reason) = reason {
        data["reason"] = json!(reason);
    }
    data
}

fn upstream_message(body: &Value, status: u16) -> String {
    match body.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Array(messages)) => messages
            .iter()
            .filter_map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => format!("Core service returned status {}", status),
    }
}
