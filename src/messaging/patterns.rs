use crate::context::RequestContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Source tag stamped into every envelope this service publishes
pub const MESSAGE_SOURCE: &str = "api-gateway";

/// RPC command patterns routed to the core service
pub mod rpc {
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_REGISTER: &str = "auth.register";
    pub const AUTH_REFRESH: &str = "auth.refresh";
    pub const AUTH_LOGOUT: &str = "auth.logout";
    pub const USER_GET: &str = "user.get";
    pub const USER_UPDATE: &str = "user.update";
    pub const USER_DELETE: &str = "user.delete";
}

/// Fire-and-forget domain events
pub mod event {
    pub const AUTH_LOGIN_SUCCESS: &str = "event.auth.login.success";
    pub const AUTH_LOGIN_FAILED: &str = "event.auth.login.failed";
    pub const AUTH_LOGOUT_SUCCESS: &str = "event.auth.logout.success";
    pub const USER_REGISTERED: &str = "event.user.registered";
    pub const USER_UPDATED: &str = "event.user.updated";
    pub const USER_DELETED: &str = "event.user.deleted";
}

/// Background job patterns
pub mod job {
    pub const EMAIL_WELCOME: &str = "job.email.welcome";
}

/// Envelope metadata; serialized camelCase on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub correlation_id: String,

    /// Unix milliseconds at publish time
    pub timestamp: i64,

    /// Always `api-gateway` for messages published by this service
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    /// Delay hint in milliseconds, honored by the consuming worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Wire format shared by RPC commands, events and jobs:
/// `{pattern, data, metadata}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEnvelope {
    pub pattern: String,
    pub data: Value,
    pub metadata: MessageMetadata,
}

impl MessageEnvelope {
    fn build(
        pattern: &str,
        data: Value,
        correlation_id: String,
        ctx: Option<&RequestContext>,
        retry_count: Option<u32>,
        delay_ms: Option<u64>,
    ) -> Self {
        Self {
            pattern: pattern.to_string(),
            data,
            metadata: MessageMetadata {
                correlation_id,
                timestamp: chrono::Utc::now().timestamp_millis(),
                source: MESSAGE_SOURCE.to_string(),
                user_id: ctx.and_then(|c| c.user_id.clone()),
                request_id: ctx.map(|c| c.request_id.clone()),
                retry_count,
                delay_ms,
            },
        }
    }

    /// Envelope for an RPC command; the caller supplies the correlation id
    /// it will use to match the reply.
    pub fn rpc(
        pattern: &str,
        data: Value,
        correlation_id: &str,
        ctx: Option<&RequestContext>,
    ) -> Self {
        Self::build(pattern, data, correlation_id.to_string(), ctx, None, None)
    }

    /// Envelope for a fire-and-forget event
    pub fn event(pattern: &str, data: Value, ctx: Option<&RequestContext>) -> Self {
        Self::build(pattern, data, Uuid::new_v4().to_string(), ctx, None, None)
    }

    /// Envelope for a background job; jobs carry retry/delay hints for
    /// the consuming worker.
    pub fn job(
        pattern: &str,
        data: Value,
        retry_count: u32,
        delay_ms: Option<u64>,
        ctx: Option<&RequestContext>,
    ) -> Self {
        Self::build(
            pattern,
            data,
            Uuid::new_v4().to_string(),
            ctx,
            Some(retry_count),
            delay_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_envelope_wire_shape() {
        let ctx = RequestContext {
            request_id: "req-1".to_string(),
            user_id: Some("user-9".to_string()),
            path: "/v1/auth/login".to_string(),
            method: "POST".to_string(),
        };
        let envelope = MessageEnvelope::rpc(
            rpc::AUTH_LOGIN,
            json!({"email": "a@b.c"}),
            "corr-1",
            Some(&ctx),
        );

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["pattern"], "auth.login");
        assert_eq!(wire["data"]["email"], "a@b.c");
        assert_eq!(wire["metadata"]["correlationId"], "corr-1");
        assert_eq!(wire["metadata"]["source"], "api-gateway");
        assert_eq!(wire["metadata"]["userId"], "user-9");
        assert_eq!(wire["metadata"]["requestId"], "req-1");
        assert!(wire["metadata"]["timestamp"].is_i64());
        assert!(wire["metadata"].get("retryCount").is_none());
    }

    #[test]
    fn test_event_envelope_has_fresh_correlation_id() {
        let a = MessageEnvelope::event(event::USER_REGISTERED, json!({}), None);
        let b = MessageEnvelope::event(event::USER_REGISTERED, json!({}), None);
        assert_ne!(a.metadata.correlation_id, b.metadata.correlation_id);
        assert!(a.metadata.user_id.is_none());
    }

    #[test]
    fn test_job_envelope_carries_retry_and_delay_hints() {
        let envelope =
            MessageEnvelope::job(job::EMAIL_WELCOME, json!({"to": "a@b.c"}), 0, None, None);
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["metadata"]["retryCount"], 0);
        assert!(wire["metadata"].get("delayMs").is_none());

        let delayed =
            MessageEnvelope::job(job::EMAIL_WELCOME, json!({}), 2, Some(30_000), None);
        let wire = serde_json::to_value(&delayed).unwrap();
        assert_eq!(wire["metadata"]["retryCount"], 2);
        assert_eq!(wire["metadata"]["delayMs"], 30_000);
    }
}
