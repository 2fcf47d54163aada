//! Authentication utilities: JWT token validation and the request extractor
//!
//! Tokens are issued by the platform's auth service; this server only
//! verifies them and extracts the caller's identity.

use anyhow::{anyhow, Result};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{ApiError, AppState};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// The verified identity of the calling user
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Please authenticate".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Please authenticate".to_string()))?;

        let claims = validate_token(token, &state.config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized("Please authenticate".to_string()))?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Please authenticate".to_string()))?;

        Ok(AuthUser { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn make_token(sub: &str, exp_offset_secs: i64, secret: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_token_accepts_valid() {
        let user_id = Uuid::new_v4();
        let token = make_token(&user_id.to_string(), 3600, SECRET);

        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn test_validate_token_rejects_wrong_secret() {
        let token = make_token(&Uuid::new_v4().to_string(), 3600, SECRET);
        assert!(validate_token(&token, "another-secret-another-secret!!!").is_err());
    }

    #[test]
    fn test_validate_token_rejects_expired() {
        let token = make_token(&Uuid::new_v4().to_string(), -3600, SECRET);
        assert!(validate_token(&token, SECRET).is_err());
    }
}
