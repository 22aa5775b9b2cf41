//! # REST API for Administration
//!
//! Cross-customer listings, account freezing and the daily report. Every
//! route extracts [`AdminUser`], so non-admin tokens are rejected before a
//! handler runs.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AdminUser;
use crate::domain::models::{AccountStatus, AccountType, Role, TransactionStatus, TransactionType};
use crate::errors::ApiResult;
use crate::rest::AppState;
use crate::storage::PageParams;

/// Create a router for admin related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/accounts", get(list_accounts))
        .route("/transactions", get(list_transactions))
        .route("/accounts/:account_id/freeze", post(freeze_account))
        .route("/reports/daily-summary", get(daily_summary))
}

// Query parameters for the user listing
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<UserListParams>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/admin/users - admin: {}", admin.id);

    let page = PageParams::from_query(params.page, params.per_page);
    let users = state
        .admin_service
        .list_users(params.role, params.is_active, page)
        .await?;
    Ok(Json(users))
}

// Query parameters for the account listing
#[derive(Debug, Deserialize)]
pub struct AccountListParams {
    #[serde(default)]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

pub async fn list_accounts(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<AccountListParams>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/admin/accounts - admin: {}", admin.id);

    let page = PageParams::from_query(params.page, params.per_page);
    let accounts = state
        .admin_service
        .list_accounts(params.status, params.account_type, page)
        .await?;
    Ok(Json(accounts))
}

// Query parameters for the ledger-wide transaction listing; dates are
// RFC 3339 timestamps
#[derive(Debug, Deserialize)]
pub struct TransactionListParams {
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<TransactionListParams>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/admin/transactions - admin: {}", admin.id);

    let page = PageParams::from_query(params.page, params.per_page);
    let transactions = state
        .admin_service
        .list_transactions(
            params.transaction_type,
            params.status,
            params.start_date,
            params.end_date,
            page,
        )
        .await?;
    Ok(Json(transactions))
}

pub async fn freeze_account(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(account_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/admin/accounts/{account_id}/freeze - admin: {}",
        admin.id
    );

    let (detail, account) = state.admin_service.freeze_account(&account_id).await?;
    Ok(Json(json!({
        "detail": detail,
        "account_id": account.id,
        "status": account.status,
    })))
}

// Query parameters for the daily report, `date` in `YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    pub date: Option<String>,
}

pub async fn daily_summary(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<SummaryParams>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "GET /api/v1/admin/reports/daily-summary - admin: {} date: {:?}",
        admin.id, params.date
    );

    let report = state
        .admin_service
        .daily_summary(params.date.as_deref())
        .await?;
    Ok(Json(report))
}
