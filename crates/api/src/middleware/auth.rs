//! Auth extractor: decodes the caller's JWT, issued by an external identity
//! provider this core does not own (§1 — authentication is out of scope;
//! the core only consumes already-authenticated requests).

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use study_scheduler_domain::DomainError;
use uuid::Uuid;

use crate::AppState;

/// Minimal claim set this core relies on: subject, issued-at, expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
}

/// Extracts and verifies the bearer token from the Authorization header.
pub fn authenticate(headers: &HeaderMap, jwt_secret: &str) -> Result<Uuid, StatusCode> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    token_data
        .claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

/// Axum extractor carrying the authenticated caller's user id.
pub struct AuthUser(pub Uuid);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = DomainError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = authenticate(&parts.headers, &state.config.jwt_secret)
            .map_err(|_| DomainError::AuthFailure("invalid or missing token".to_string()))?;
        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token_for(sub: Uuid, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: 9_999_999_999,
            iat: 0,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn authenticate_accepts_a_valid_token() {
        let secret = "test-secret";
        let user_id = Uuid::new_v4();
        let token = token_for(user_id, secret);

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        assert_eq!(authenticate(&headers, secret).unwrap(), user_id);
    }

    #[test]
    fn authenticate_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(authenticate(&headers, "secret").unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn authenticate_rejects_wrong_secret() {
        let token = token_for(Uuid::new_v4(), "right-secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(
            authenticate(&headers, "wrong-secret").unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }
}
