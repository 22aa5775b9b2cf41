//! # REST API for Accounts
//!
//! Endpoints for the account lifecycle, balances and statements. Every route
//! requires a bearer token; ownership checks happen in the service.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::domain::models::{CreateAccountRequest, UpdateAccountRequest};
use crate::errors::ApiResult;
use crate::rest::AppState;
use crate::storage::PageParams;

/// Create a router for account related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route(
            "/:account_id",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route("/:account_id/close", post(close_account))
        .route("/:account_id/balance", get(get_balance))
        .route("/:account_id/statement", get(get_statement))
}

/// List accounts: the caller's own, or everyone's for an admin.
pub async fn list_accounts(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(page): Query<PageParams>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/accounts - user: {}", caller.id);

    let accounts = state.account_service.list_accounts(&caller, page).await?;
    Ok(Json(accounts))
}

pub async fn create_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(request): Json<CreateAccountRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/accounts - user: {} for owner: {}",
        caller.id, request.user_id
    );

    let (detail, account) = state.account_service.create_account(&caller, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": detail, "account": account })),
    ))
}

pub async fn get_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/accounts/{account_id} - user: {}", caller.id);

    let account = state.account_service.get_account(&caller, &account_id).await?;
    Ok(Json(account))
}

pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
    Json(request): Json<UpdateAccountRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("PUT /api/v1/accounts/{account_id} - user: {}", caller.id);

    let (detail, account) = state
        .account_service
        .update_account(&caller, &account_id, request)
        .await?;
    Ok(Json(json!({ "detail": detail, "account": account })))
}

/// Hard delete. The account row and its history are gone afterwards.
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!("DELETE /api/v1/accounts/{account_id} - user: {}", caller.id);

    state.account_service.delete_account(&caller, &account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Soft delete: the account is marked closed and refuses further postings.
pub async fn close_account(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!("POST /api/v1/accounts/{account_id}/close - user: {}", caller.id);

    let (detail, account) = state.account_service.close_account(&caller, &account_id).await?;
    Ok(Json(json!({ "detail": detail, "account_id": account.id })))
}

pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!("GET /api/v1/accounts/{account_id}/balance - user: {}", caller.id);

    let balance = state.account_service.balance(&caller, &account_id).await?;
    Ok(Json(balance))
}

// Query parameters for the statement endpoint, both dates `YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct StatementParams {
    pub start_date: String,
    pub end_date: String,
}

pub async fn get_statement(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(account_id): Path<String>,
    Query(params): Query<StatementParams>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "GET /api/v1/accounts/{account_id}/statement - user: {} range: {}..{}",
        caller.id, params.start_date, params.end_date
    );

    let statement = state
        .account_service
        .statement(&caller, &account_id, &params.start_date, &params.end_date)
        .await?;
    Ok(Json(statement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Account, AccountType, Role, User};
    use crate::rest::testing;
    use rust_decimal_macros::dec;

    async fn open_account(state: &AppState, owner: &User) -> Account {
        let (_, account) = state
            .account_service
            .create_account(
                owner,
                CreateAccountRequest {
                    user_id: owner.id.clone(),
                    account_type: AccountType::Savings,
                    currency: "USD".to_string(),
                    balance: None,
                    overdraft_limit: None,
                    interest_rate: Some(dec!(2.5)),
                },
            )
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn create_account_returns_detail_and_account() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;

        let response = create_account(
            State(state),
            AuthUser(owner.clone()),
            Json(CreateAccountRequest {
                user_id: owner.id.clone(),
                account_type: AccountType::Checking,
                currency: "USD".to_string(),
                balance: None,
                overdraft_limit: None,
                interest_rate: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = testing::body_json(response).await;
        assert!(body["detail"].as_str().unwrap().ends_with("created successfully"));
        assert_eq!(body["account"]["balance"], "0.00");
        assert_eq!(body["account"]["status"], "active");
        assert_eq!(body["account"]["user_id"], owner.id);
    }

    #[tokio::test]
    async fn creating_for_someone_else_is_forbidden() {
        let (state, db) = testing::state().await;
        let caller = testing::seed_user(&db, "caller@example.com", Role::Customer).await;
        let other = testing::seed_user(&db, "other@example.com", Role::Customer).await;

        let response = create_account(
            State(state),
            AuthUser(caller),
            Json(CreateAccountRequest {
                user_id: other.id,
                account_type: AccountType::Checking,
                currency: "USD".to_string(),
                balance: None,
                overdraft_limit: None,
                interest_rate: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delete_responds_with_no_content() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = delete_account(
            State(state.clone()),
            AuthUser(owner.clone()),
            Path(account.id.clone()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // The row is gone.
        let response = get_account(State(state), AuthUser(owner), Path(account.id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn close_reports_the_account_id() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = close_account(State(state), AuthUser(owner), Path(account.id.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = testing::body_json(response).await;
        assert_eq!(body["account_id"], account.id);
        assert!(body["detail"].as_str().unwrap().contains("closed successfully"));
    }

    #[tokio::test]
    async fn balance_snapshot_has_the_expected_shape() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = get_balance(State(state), AuthUser(owner), Path(account.id.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = testing::body_json(response).await;
        assert_eq!(body["account_id"], account.id);
        assert_eq!(body["balance"], "0.00");
        assert_eq!(body["currency"], "USD");
        assert!(body["last_updated"].is_string());
    }

    #[tokio::test]
    async fn statement_rejects_malformed_dates() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = get_statement(
            State(state),
            AuthUser(owner),
            Path(account.id),
            Query(StatementParams {
                start_date: "January 1st".to_string(),
                end_date: "2024-02-01".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = testing::body_json(response).await;
        assert_eq!(body["detail"], "Invalid date format. Use YYYY-MM-DD");
    }

    #[tokio::test]
    async fn strangers_cannot_read_accounts() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let stranger = testing::seed_user(&db, "stranger@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = get_account(State(state), AuthUser(stranger), Path(account.id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
