//! Error taxonomy shared by every layer, translated to HTTP at the boundary.
//!
//! Domain rule violations (insufficient funds, inactive accounts, OTP
//! mismatches) map to 4xx responses with a human-readable `detail` string.
//! Anything unanticipated is logged and surfaced as a generic 500 so internals
//! never leak to clients.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or rule-violating input (400).
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed to touch the resource (403).
    #[error("{0}")]
    Forbidden(String),

    /// Entity does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// Operation not permitted in the entity's current state (400).
    #[error("{0}")]
    InvalidState(String),

    /// Amount is non-positive, too precise, or out of range (400).
    #[error("{0}")]
    InvalidAmount(String),

    /// Debit would take the balance below zero (400).
    #[error("{0}")]
    InsufficientFunds(String),

    /// Accounts disagree on currency (400).
    #[error("{0}")]
    CurrencyMismatch(String),

    /// Duplicate unique key (409).
    #[error("{0}")]
    Conflict(String),

    /// Deliberate failure whose detail is safe to return (500).
    #[error("{0}")]
    Unexpected(String),

    /// Storage failure; detail goes to the log, not the client (500).
    #[error(transparent)]
    Database(sqlx::Error),

    /// Anything else unanticipated; detail goes to the log only (500).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return ApiError::Conflict("Duplicate value for a unique field".to_string());
            }
        }
        ApiError::Database(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidState(_)
            | ApiError::InvalidAmount(_)
            | ApiError::InsufficientFunds(_)
            | ApiError::CurrencyMismatch(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unexpected(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message clients see in the response body.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Database(_) | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Database(err) => error!("database error: {err}"),
            ApiError::Internal(err) => error!("internal error: {err:#}"),
            ApiError::Unexpected(detail) => error!("unexpected failure: {detail}"),
            _ => {}
        }

        let status = self.status();
        let body = Json(json!({ "detail": self.detail() }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_bad_request() {
        assert_eq!(
            ApiError::InsufficientFunds("Insufficient balance".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::CurrencyMismatch("mismatch".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidState("Account is not active".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(
            ApiError::Conflict("duplicate".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::Internal(anyhow::anyhow!("connection pool exhausted"));
        assert_eq!(err.detail(), "Internal server error");

        let deliberate = ApiError::Unexpected("Failed to send verification email".into());
        assert_eq!(deliberate.detail(), "Failed to send verification email");
    }

    #[test]
    fn unauthorized_carries_www_authenticate_header() {
        let resp = ApiError::Unauthorized("Could not validate credentials".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).map(|v| v.to_str().unwrap()),
            Some("Bearer")
        );
    }
}
