//! # REST Layer
//!
//! The HTTP surface of the service, mounted under `/api/v1`.
//!
//! Handlers stay thin: extract the caller and the payload, call one service
//! method, shape the JSON response. All policy lives in the domain layer and
//! every failure travels back as an [`crate::errors::ApiError`], which this
//! layer renders as `{ "detail": ... }` with the matching status code.
//!
//! ## Module Organization
//!
//! - **user_apis**: registration, OTP activation, login, password reset, `/me`
//! - **account_apis**: account lifecycle, balances and statements
//! - **transaction_apis**: deposits, withdrawals, transfers, reversals
//! - **admin_apis**: cross-customer listings, freezing, the daily report

pub mod account_apis;
pub mod admin_apis;
pub mod transaction_apis;
pub mod user_apis;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::config::Config;
use crate::domain::account_service::AccountService;
use crate::domain::admin_service::AdminService;
use crate::domain::transaction_service::TransactionService;
use crate::domain::user_service::UserService;

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub user_service: UserService,
    pub account_service: AccountService,
    pub transaction_service: TransactionService,
    pub admin_service: AdminService,
}

/// Create the Axum router with all routes configured
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/users", user_apis::router())
        .nest("/accounts", account_apis::router())
        .nest("/transactions", transaction_apis::router())
        .nest("/admin", admin_apis::router());

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health));

    // CORS is only mounted when an origin is configured.
    if let Some(origin) = state.config.cors_allowed_origin.as_deref() {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                let cors = CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers(Any);
                router = router.layer(cors);
            }
            Err(_) => warn!("CORS_ALLOWED_ORIGIN is not a valid header value; skipping CORS"),
        }
    }

    router.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
