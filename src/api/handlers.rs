use super::AppState;
use crate::auth::AuthenticatedUser;
use crate::context::RequestContext;
use crate::dispatch::ops;
use crate::error::{ApiError, FieldError, GatewayError, Result};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

type HandlerResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn validate_email(email: &str, errors: &mut Vec<FieldError>) {
    if email.trim().is_empty() {
        errors.push(FieldError::new("email", "email must not be empty"));
    } else if !email.contains('@') {
        errors.push(FieldError::new("email", "email must be a valid email address"));
    }
}

fn validate_login(body: &LoginRequest) -> Result<()> {
    let mut errors = Vec::new();
    validate_email(&body.email, &mut errors);
    if body.password.is_empty() {
        errors.push(FieldError::new("password", "password must not be empty"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Validation(errors))
    }
}

fn validate_register(body: &RegisterRequest) -> Result<()> {
    let mut errors = Vec::new();
    validate_email(&body.email, &mut errors);
    if body.password.len() < 8 {
        errors.push(FieldError::new(
            "password",
            "password must be at least 8 characters long",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Validation(errors))
    }
}

fn validate_update(body: &UpdateUserRequest) -> Result<()> {
    let mut errors = Vec::new();
    if let Some(email) = &body.email {
        validate_email(email, &mut errors);
    }
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "name must not be empty"));
        }
    }
    if body.email.is_none() && body.name.is_none() {
        errors.push(FieldError::new("body", "at least one field must be provided"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Validation(errors))
    }
}

pub async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<LoginRequest>,
) -> HandlerResult<Json<Value>> {
    validate_login(&body).map_err(|e| e.with_context(&ctx))?;

    let payload = json!({ "email": body.email, "password": body.password });
    let reply = state
        .dispatcher
        .dispatch(&ops::LOGIN, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}

pub async fn register(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RegisterRequest>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    validate_register(&body).map_err(|e| e.with_context(&ctx))?;

    let payload = json!({
        "email": body.email,
        "password": body.password,
        "name": body.name,
    });
    let reply = state
        .dispatcher
        .dispatch(&ops::REGISTER, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RefreshRequest>,
) -> HandlerResult<Json<Value>> {
    if body.refresh_token.is_empty() {
        return Err(GatewayError::Validation(vec![FieldError::new(
            "refreshToken",
            "refreshToken must not be empty",
        )])
        .with_context(&ctx));
    }

    let payload = json!({ "refreshToken": body.refresh_token });
    let reply = state
        .dispatcher
        .dispatch(&ops::REFRESH, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    user: AuthenticatedUser,
    body: Option<Json<LogoutRequest>>,
) -> HandlerResult<Json<Value>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let payload = json!({
        "userId": user.user_id,
        "refreshToken": body.refresh_token,
    });
    let reply = state
        .dispatcher
        .dispatch(&ops::LOGOUT, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    user: AuthenticatedUser,
) -> HandlerResult<Json<Value>> {
    let payload = json!({ "userId": user.user_id });
    let reply = state
        .dispatcher
        .dispatch(&ops::GET_ME, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateUserRequest>,
) -> HandlerResult<Json<Value>> {
    validate_update(&body).map_err(|e| e.with_context(&ctx))?;

    let mut payload = json!({ "userId": user.user_id });
    if let Some(name) = body.name {
        payload["name"] = json!(name);
    }
    if let Some(email) = body.email {
        payload["email"] = json!(email);
    }
    let reply = state
        .dispatcher
        .dispatch(&ops::UPDATE_ME, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    user: AuthenticatedUser,
) -> HandlerResult<Json<Value>> {
    let payload = json!({ "userId": user.user_id });
    let reply = state
        .dispatcher
        .dispatch(&ops::DELETE_ME, payload, &ctx)
        .await
        .map_err(|e| e.with_context(&ctx))?;
    Ok(Json(reply))
}
