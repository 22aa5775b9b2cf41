//! Bearer-token authentication and the authorization policy.
//!
//! Tokens are HS256 JWTs whose `sub` is the user id. Handlers receive the
//! caller through the [`AuthUser`] extractor (or [`AdminUser`] on admin
//! routes); ownership decisions all funnel through [`authorize`] so the
//! caller/owner/role rules live in exactly one place.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::domain::models::User;
use crate::errors::{ApiError, ApiResult};
use crate::rest::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn create_token(user_id: &str, config: &Config) -> ApiResult<String> {
    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::minutes(config.jwt_expires_in_minutes)).timestamp() as usize;
    let claims = TokenClaims {
        sub: user_id.to_string(),
        iat,
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

pub fn decode_token(token: &str, secret: &str) -> ApiResult<TokenClaims> {
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::Unauthorized("Token expired".to_string())
        }
        _ => ApiError::Unauthorized("Could not validate credentials".to_string()),
    })
}

/// Bcrypt runs on the blocking pool; a hash takes long enough to stall the
/// async executor otherwise.
pub async fn hash_password(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| ApiError::Internal(e.into()))
}

pub async fn verify_password(password: String, hashed: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| ApiError::Internal(e.into()))
}

/// The one authorization rule: admins may touch anything; everyone else must
/// own the resource. `resource_owner = None` means the operation is
/// admin-only. `denied_detail` becomes the 403 body.
pub fn authorize(caller: &User, resource_owner: Option<&str>, denied_detail: &str) -> ApiResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    if let Some(owner_id) = resource_owner {
        if owner_id == caller.id {
            return Ok(());
        }
    }
    Err(ApiError::Forbidden(denied_detail.to_string()))
}

/// The authenticated caller. Resolving the extractor decodes the bearer
/// token and loads the user row; a token for a deleted user is rejected.
/// Inactive users still authenticate, matching the login-time activation
/// check being the only gate.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;

        let user = state
            .user_service
            .get_user(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        Ok(AuthUser(user))
    }
}

/// An authenticated caller holding the admin role.
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Forbidden: You are not an admin".to_string()));
        }
        Ok(AdminUser(user))
    }
}
