//! Bearer-token authentication. Tokens are issued by the member service;
//! this crate only verifies them with the shared secret.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::reservations::Caller;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated member behind a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub member_id: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            tracing::debug!("Member {} is not an admin", self.member_id);
            Err(AppError::Forbidden)
        }
    }

    pub fn caller(&self) -> Caller {
        Caller {
            member_id: self.member_id.clone(),
            is_admin: self.is_admin(),
        }
    }
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(state: &Arc<AppState>, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extractor for authenticated member
pub struct AuthUser(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let claims = decode_jwt(state, token)?;
        if claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }

        tracing::debug!("Authenticated member: {}", claims.sub);
        Ok(AuthUser(Principal {
            member_id: claims.sub,
            role: claims.role,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::{routing::get, Json, Router};
    use http::StatusCode;

    async fn whoami(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
        Json(serde_json::json!({ "member_id": user.member_id, "admin": user.is_admin() }))
    }

    async fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .with_state(test_support::state().await)
    }

    #[tokio::test]
    async fn accepts_valid_bearer_token() {
        let app = app().await;
        let token = test_support::token_for("m-1", Role::Admin);

        let (status, body) = test_support::send(
            &app,
            test_support::request("GET", "/whoami", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member_id"], "m-1");
        assert_eq!(body["admin"], true);
    }

    #[tokio::test]
    async fn rejects_missing_and_forged_tokens() {
        let app = app().await;

        let (status, body) =
            test_support::send(&app, test_support::request("GET", "/whoami", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let forged = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &Claims {
                sub: "m-1".to_string(),
                role: Role::Admin,
                iat: 0,
                exp: 4_102_444_800,
            },
            &jsonwebtoken::EncodingKey::from_secret(b"someone-else"),
        )
        .unwrap();
        let (status, body) = test_support::send(
            &app,
            test_support::request("GET", "/whoami", Some(&forged), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[test]
    fn role_defaults_to_user() {
        let claims: Claims =
            serde_json::from_str(r#"{"sub":"m-1","exp":10,"iat":1}"#).unwrap();
        assert_eq!(claims.role, Role::User);
        let principal = Principal {
            member_id: claims.sub,
            role: claims.role,
        };
        assert!(matches!(principal.require_admin(), Err(AppError::Forbidden)));
        assert!(!principal.caller().is_admin);
    }
}
