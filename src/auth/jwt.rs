use crate::error::{GatewayError, Result};
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JWT claims issued by the core service
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email, when the core service includes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// HS256 JWT validator sharing the core service's signing secret.
///
/// The gateway never issues tokens; it only verifies signature and
/// expiry on tokens minted by the core service.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Decode and validate a bearer token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| GatewayError::InvalidToken(format!("Token validation failed: {}", e)))?;
        Ok(token_data.claims)
    }
}

/// Extract the bearer token from the Authorization header.
///
/// Returns `Ok(None)` when no Authorization header is present (the
/// request proceeds anonymously); a present but malformed header is an
/// error.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(auth_header) = headers.get("authorization") else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| GatewayError::InvalidToken("Invalid authorization header".to_string()))?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        Ok(Some(token.to_string()))
    } else if let Some(token) = auth_str.strip_prefix("bearer ") {
        Ok(Some(token.to_string()))
    } else {
        Err(GatewayError::InvalidToken(
            "Authorization header must start with 'Bearer '".to_string(),
        ))
    }
}
