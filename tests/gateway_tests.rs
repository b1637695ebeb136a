use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lifeplaneer_gateway::api::AppState;
use lifeplaneer_gateway::auth::{Claims, JwtValidator};
use lifeplaneer_gateway::build_app;
use lifeplaneer_gateway::circuit_breaker::{BreakerRegistry, CircuitBreakerConfig};
use lifeplaneer_gateway::config::GatewayConfig;
use lifeplaneer_gateway::cors::CorsConfig;
use lifeplaneer_gateway::dispatch::HybridDispatcher;
use lifeplaneer_gateway::messaging::{MessagingBridge, MessagingConfig};
use lifeplaneer_gateway::rate_limit::{RateLimitConfig, RateLimiter};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn test_config(core_url: &str, throttle_limit: u32) -> GatewayConfig {
    GatewayConfig {
        port: 0,
        core_service_url: core_url.to_string(),
        jwt_secret: SecretString::new(SECRET.to_string()),
        jwt_expires_in: "15m".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
        throttle_enabled: true,
        throttle_limit,
        throttle_ttl: 60,
        rabbitmq_url: "amqp://localhost:5672".to_string(),
        rabbitmq_queue: "core.user.commands".to_string(),
        rabbitmq_prefetch: 10,
        rpc_timeout_ms: 100,
        http_timeout_ms: 500,
        breaker_timeout_ms: 1_000,
        breaker_error_threshold: 50,
        breaker_reset_timeout_ms: 30_000,
        log_level: "info".to_string(),
    }
}

fn app(core_url: &str, throttle_limit: u32) -> Router {
    let config = Arc::new(test_config(core_url, throttle_limit));

    let validator = Arc::new(JwtValidator::new(&config.jwt_secret));
    let bridge = Arc::new(MessagingBridge::new(MessagingConfig::from(
        config.as_ref(),
    )));
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
    let dispatcher = Arc::new(
        HybridDispatcher::new(
            bridge.clone(),
            breakers.clone(),
            config.core_service_url.clone(),
            Duration::from_millis(config.http_timeout_ms),
        )
        .unwrap(),
    );
    let cors = CorsConfig::for_origins(config.cors_origins())
        .build_layer()
        .unwrap();

    let state = AppState::new(config, dispatcher, bridge, breakers).unwrap();
    build_app(state, validator, limiter, cors)
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        email: Some("user@example.com".to_string()),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        iat: None,
        extra: HashMap::new(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn json_request(uri: &str, method: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header("content-type", "application/json")
        .header("X-Forwarded-For", "10.0.0.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_liveness_probe() {
    let response = app("http://127.0.0.1:1", 100)
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_rabbitmq_health_reports_disconnected() {
    let response = app("http://127.0.0.1:1", 100)
        .oneshot(
            Request::builder()
                .uri("/health/rabbitmq")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["rabbitmq"]["connected"], false);
}

#[tokio::test]
async fn test_login_validation_error_shape() {
    let response = app("http://127.0.0.1:1", 100)
        .oneshot(json_request(
            "/v1/auth/login",
            "POST",
            json!({"email": "", "password": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["error"], "Validation");
    assert_eq!(body["path"], "/v1/auth/login");
    assert_eq!(body["method"], "POST");
    assert!(body["requestId"].is_string());
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_login_via_http_fallback_echoes_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "token-1" })),
        )
        .mount(&server)
        .await;

    let mut request = json_request(
        "/v1/auth/login",
        "POST",
        json!({"email": "a@b.c", "password": "pw"}),
    );
    request
        .headers_mut()
        .insert("X-Request-ID", "client-chosen-id".parse().unwrap());

    let response = app(&server.uri(), 100).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Request-ID").unwrap(),
        "client-chosen-id"
    );

    let body = body_json(response).await;
    assert_eq!(body["accessToken"], "token-1");
}

#[tokio::test]
async fn test_core_down_maps_to_503_with_details() {
    let response = app("http://127.0.0.1:1", 100)
        .oneshot(json_request(
            "/v1/auth/login",
            "POST",
            json!({"email": "a@b.c", "password": "pw"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error"], "UpstreamUnavailable");
    assert_eq!(body["details"]["code"], "ECONNREFUSED");
    assert!(body["details"]["hint"].is_string());
}

#[tokio::test]
async fn test_users_me_requires_authentication() {
    let response = app("http://127.0.0.1:1", 100)
        .oneshot(
            Request::builder()
                .uri("/v1/users/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_users_me_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "u-1", "name": "Ada" })),
        )
        .mount(&server)
        .await;

    let response = app(&server.uri(), 100)
        .oneshot(
            Request::builder()
                .uri("/v1/users/me")
                .header("authorization", format!("Bearer {}", token("u-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Ada");
}

#[tokio::test]
async fn test_rate_limit_rejects_fourth_request() {
    let app = app("http://127.0.0.1:1", 3);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .header("X-Forwarded-For", "10.9.9.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .header("X-Forwarded-For", "10.9.9.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));

    let body = body_json(response).await;
    assert_eq!(body["error"], "RateLimited");
}

#[tokio::test]
async fn test_circuit_endpoints() {
    let app = app("http://127.0.0.1:1", 100);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/circuit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["core-service"]["state"], "CLOSED");

    // Force open, then verify the status reflects it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/circuit/core-service/open")
                .method("POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/circuit/core-service")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["state"], "OPEN");

    // Unknown breaker is a 404 with the standard error shape
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/circuit/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NotFound");
}
