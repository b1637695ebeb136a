use super::jwt::{bearer_token, JwtValidator};
use crate::context::RequestContext;
use crate::error::{ApiError, GatewayError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Identity attached to the request by the auth middleware
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(RequestContext::synthetic);
        Err(
            GatewayError::Unauthorized("Missing or invalid access token".to_string())
                .with_context(&ctx),
        )
    }
}

/// Bearer-token middleware.
///
/// A request without an Authorization header passes through anonymously;
/// handlers that need an identity enforce it via the `AuthenticatedUser`
/// extractor. A present but invalid token is rejected outright so a
/// client never operates on a silently-ignored credential. On success
/// the request context is re-inserted with the user id filled in, which
/// also switches rate limiting to the per-user tracking key.
pub async fn auth_middleware(
    State(validator): State<Arc<JwtValidator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(RequestContext::synthetic);

    let token = match bearer_token(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => return next.run(request).await,
        Err(err) => return err.with_context(&ctx).into_response(),
    };

    match validator.validate_token(&token) {
        Ok(claims) => {
            debug!(user_id = %claims.sub, request_id = %ctx.request_id, "Authenticated");
            let mut ctx = ctx;
            ctx.user_id = Some(claims.sub.clone());
            request.extensions_mut().insert(ctx);
            request.extensions_mut().insert(AuthenticatedUser {
                user_id: claims.sub,
                email: claims.email,
            });
            next.run(request).await
        }
        Err(err) => err.with_context(&ctx).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::Claims;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Json, Router};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use secrecy::SecretString;
    use serde_json::json;
    use std::collections::HashMap;
    use tower::ServiceExt;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn app() -> Router {
        let validator = Arc::new(JwtValidator::new(&SecretString::new(SECRET.to_string())));

        Router::new()
            .route(
                "/me",
                get(|user: AuthenticatedUser| async move {
                    Json(json!({ "userId": user.user_id }))
                }),
            )
            .route("/open", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(validator, auth_middleware))
            .layer(middleware::from_fn(crate::context::request_id_middleware))
    }

    fn valid_token(sub: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            email: None,
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

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header("authorization", format!("Bearer {}", valid_token("u-7")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["userId"], "u-7");
    }

    #[tokio::test]
    async fn test_invalid_token_rejected_even_on_open_route() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/open")
                    .header("authorization", "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_anonymous_open_route_passes() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/open")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
