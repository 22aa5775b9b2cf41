//! # REST API for Users
//!
//! Registration, OTP activation, login, password reset and the current-user
//! endpoint.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::domain::models::{
    ConfirmRegistrationRequest, LoginForm, PasswordResetConfirmRequest, PasswordResetRequest,
    RegisterRequest, UserPublic,
};
use crate::errors::ApiResult;
use crate::rest::AppState;

/// Create a router for user related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/confirm-registration", post(confirm_registration))
        .route("/send-otp", post(send_otp))
        .route("/me", get(get_me))
        .route("/password-reset", post(request_password_reset))
        .route("/password-reset/confirm", post(confirm_password_reset))
}

/// Register a new customer; the account stays inactive until the emailed
/// OTP is confirmed.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("POST /api/v1/users/register - email: {}", request.email);

    let detail = state.user_service.register(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "detail": detail }))))
}

/// Exchange form credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    info!("POST /api/v1/users/login - username: {}", form.username);

    let response = state.user_service.login(form).await?;
    Ok(Json(response))
}

pub async fn confirm_registration(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRegistrationRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/users/confirm-registration - email: {}",
        request.email
    );

    let detail = state.user_service.confirm_registration(request).await?;
    Ok(Json(json!({ "detail": detail })))
}

// Query parameters for resending an OTP
#[derive(Debug, Deserialize)]
pub struct SendOtpParams {
    pub email: String,
}

pub async fn send_otp(
    State(state): State<AppState>,
    Query(params): Query<SendOtpParams>,
) -> ApiResult<impl IntoResponse> {
    info!("POST /api/v1/users/send-otp - email: {}", params.email);

    let detail = state.user_service.send_otp(&params.email).await?;
    Ok(Json(json!({ "detail": detail })))
}

/// The caller's own profile, without role or credential fields.
pub async fn get_me(AuthUser(user): AuthUser) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/users/me - user: {}", user.id);

    Ok(Json(UserPublic::from(user)))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("POST /api/v1/users/password-reset - email: {}", request.email);

    let detail = state.user_service.request_password_reset(request).await?;
    Ok(Json(json!({ "detail": detail })))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/users/password-reset/confirm - email: {}",
        request.email
    );

    let detail = state.user_service.confirm_password_reset(request).await?;
    Ok(Json(json!({ "detail": detail })))
}
