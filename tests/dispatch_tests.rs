use lifeplaneer_gateway::circuit_breaker::{BreakerRegistry, CircuitBreakerConfig, CircuitState};
use lifeplaneer_gateway::context::RequestContext;
use lifeplaneer_gateway::dispatch::{ops, HybridDispatcher, CORE_SERVICE_BREAKER};
use lifeplaneer_gateway::error::{GatewayError, UpstreamKind};
use lifeplaneer_gateway::messaging::{MessagingBridge, MessagingConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn disconnected_bridge() -> Arc<MessagingBridge> {
    Arc::new(MessagingBridge::new(MessagingConfig {
        url: "amqp://localhost:5672".to_string(),
        command_queue: "core.user.commands".to_string(),
        prefetch: 10,
        rpc_timeout: Duration::from_millis(100),
    }))
}

fn breaker_registry() -> Arc<BreakerRegistry> {
    Arc::new(BreakerRegistry::new(CircuitBreakerConfig {
        timeout_ms: 1_000,
        error_threshold_percentage: 50,
        reset_timeout_ms: 30_000,
        rolling_count_timeout_ms: 10_000,
        rolling_count_buckets: 10,
    }))
}

fn dispatcher(core_url: &str) -> (Arc<HybridDispatcher>, Arc<BreakerRegistry>) {
    let breakers = breaker_registry();
    let dispatcher = HybridDispatcher::new(
        disconnected_bridge(),
        breakers.clone(),
        core_url.to_string(),
        Duration::from_millis(500),
    )
    .unwrap();
    (Arc::new(dispatcher), breakers)
}

fn ctx() -> RequestContext {
    RequestContext {
        request_id: "req-test-1".to_string(),
        user_id: None,
        path: "/v1/auth/login".to_string(),
        method: "POST".to_string(),
    }
}

fn authed_ctx(user_id: &str) -> RequestContext {
    RequestContext {
        request_id: "req-test-2".to_string(),
        user_id: Some(user_id.to_string()),
        path: "/v1/users/me".to_string(),
        method: "GET".to_string(),
    }
}

#[tokio::test]
async fn test_http_fallback_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(header("X-Request-ID", "req-test-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "token-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher(&server.uri());
    let reply = dispatcher
        .dispatch(&ops::LOGIN, json!({"email": "a@b.c", "password": "pw"}), &ctx())
        .await
        .unwrap();

    assert_eq!(reply["accessToken"], "token-1");
}

#[tokio::test]
async fn test_upstream_status_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher(&server.uri());
    let err = dispatcher
        .dispatch(&ops::LOGIN, json!({"email": "a@b.c", "password": "pw"}), &ctx())
        .await
        .unwrap_err();

    match err {
        GatewayError::UpstreamStatus { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("expected UpstreamStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_maps_to_service_unavailable() {
    // Nothing listens on port 1
    let (dispatcher, _) = dispatcher("http://127.0.0.1:1");
    let err = dispatcher
        .dispatch(&ops::LOGIN, json!({"email": "a@b.c", "password": "pw"}), &ctx())
        .await
        .unwrap_err();

    match err {
        GatewayError::Upstream { kind, .. } => {
            assert_eq!(kind, UpstreamKind::ConnectionRefused);
            assert_eq!(err_status(&kind), 503);
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
}

fn err_status(kind: &UpstreamKind) -> u16 {
    kind.status_code().as_u16()
}

#[tokio::test]
async fn test_repeated_failures_open_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .expect(2)
        .mount(&server)
        .await;

    let (dispatcher, breakers) = dispatcher(&server.uri());
    let payload = json!({"email": "a@b.c", "password": "pw"});

    for _ in 0..2 {
        let err = dispatcher
            .dispatch(&ops::LOGIN, payload.clone(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamStatus { .. }));
    }

    let status = breakers.status(CORE_SERVICE_BREAKER).await.unwrap();
    assert_eq!(status.state, CircuitState::Open);

    // Third call is rejected by the breaker, not sent upstream
    let err = dispatcher
        .dispatch(&ops::LOGIN, payload, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen(_)));
}

#[tokio::test]
async fn test_get_me_forwards_identity_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("X-User-ID", "u-42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "u-42", "name": "Ada" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher(&server.uri());
    let reply = dispatcher
        .dispatch(&ops::GET_ME, json!({"userId": "u-42"}), &authed_ctx("u-42"))
        .await
        .unwrap();

    assert_eq!(reply["name"], "Ada");
}

#[tokio::test]
async fn test_breaker_is_precreated() {
    let (_dispatcher, breakers) = dispatcher("http://127.0.0.1:1");
    assert!(breakers.status(CORE_SERVICE_BREAKER).await.is_some());
}
