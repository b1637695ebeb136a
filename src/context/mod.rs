//! Request correlation
//!
//! Assigns (or echoes) an `X-Request-ID` per inbound request and carries
//! it, together with the authenticated identity once known, through the
//! middleware chain as an explicit extension value. Nothing downstream
//! mutates the raw request; auth and rate limiting read and extend this
//! context instead.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Request-scoped context threaded through handler -> limiter -> dispatcher
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Correlation id: echoed from the client or generated here
    pub request_id: String,
    /// Authenticated user id, filled in by the auth middleware
    pub user_id: Option<String>,
    pub path: String,
    pub method: String,
}

impl RequestContext {
    pub fn new(request_id: String, path: String, method: String) -> Self {
        Self {
            request_id,
            user_id: None,
            path,
            method,
        }
    }

    /// Context for places without a live request (tests, background tasks)
    pub fn synthetic() -> Self {
        Self::new(Uuid::new_v4().to_string(), String::new(), String::new())
    }
}

/// Middleware that attaches the request id and context extension, and
/// stamps `X-Request-ID` onto the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext::new(
        request_id.clone(),
        request.uri().path().to_string(),
        request.method().to_string(),
    );
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .entry(REQUEST_ID_HEADER)
            .or_insert(value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn echo_id(Extension(ctx): Extension<RequestContext>) -> String {
        ctx.request_id
    }

    fn app() -> Router {
        Router::new()
            .route("/test", get(echo_id))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_generates_request_id_when_absent() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("X-Request-ID missing");
        // Generated ids are UUIDs
        assert!(Uuid::parse_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_echoes_inbound_request_id() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/test")
                    .header(REQUEST_ID_HEADER, "client-supplied-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "client-supplied-id"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"client-supplied-id");
    }
}
