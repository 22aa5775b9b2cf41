//! # REST API for Transactions
//!
//! Money movement endpoints plus transaction lookup. Reversal is wired here
//! too; the admin-only rule for it lives in the service so the error detail
//! names the operation rather than the route.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::domain::models::{DepositRequest, ReverseRequest, TransferRequest, WithdrawRequest};
use crate::errors::ApiResult;
use crate::rest::AppState;
use crate::storage::PageParams;

/// Create a router for transaction related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/transfer", post(transfer))
        .route("/", get(list_transactions))
        .route("/:transaction_id", get(get_transaction))
        .route("/:transaction_id/reverse", post(reverse_transaction))
}

pub async fn deposit(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(request): Json<DepositRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/transactions/deposit - user: {} account: {}",
        caller.id, request.account_id
    );

    let (detail, transaction) = state.transaction_service.deposit(&caller, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": detail, "transaction": transaction })),
    ))
}

pub async fn withdraw(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/transactions/withdraw - user: {} account: {}",
        caller.id, request.account_id
    );

    let (detail, transaction) = state.transaction_service.withdraw(&caller, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": detail, "transaction": transaction })),
    ))
}

pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(request): Json<TransferRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/transactions/transfer - user: {} {} -> {}",
        caller.id, request.from_account_id, request.to_account_id
    );

    let (detail, transaction) = state.transaction_service.transfer(&caller, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "detail": detail, "transaction": transaction })),
    ))
}

// Query parameters for transaction listing
#[derive(Debug, Deserialize)]
pub struct TransactionListParams {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
}

/// List transactions scoped to an account, to the caller's accounts, or to
/// the whole ledger for admins.
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(params): Query<TransactionListParams>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "GET /api/v1/transactions - user: {} account: {:?}",
        caller.id, params.account_id
    );

    let page = PageParams::from_query(params.page, params.per_page);
    let transactions = state
        .transaction_service
        .list_transactions(&caller, params.account_id.as_deref(), page)
        .await?;
    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(transaction_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "GET /api/v1/transactions/{transaction_id} - user: {}",
        caller.id
    );

    let transaction = state
        .transaction_service
        .get_transaction(&caller, &transaction_id)
        .await?;
    Ok(Json(transaction))
}

pub async fn reverse_transaction(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(transaction_id): Path<String>,
    Json(request): Json<ReverseRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "POST /api/v1/transactions/{transaction_id}/reverse - user: {}",
        caller.id
    );

    let (detail, original, reversal) = state
        .transaction_service
        .reverse_transaction(&caller, &transaction_id, request)
        .await?;
    Ok(Json(json!({
        "detail": detail,
        "original_transaction": original,
        "reversal_transaction": reversal,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Account, AccountType, CreateAccountRequest, Role, User};
    use crate::rest::testing;
    use rust_decimal_macros::dec;

    async fn open_account(state: &AppState, owner: &User) -> Account {
        let (_, account) = state
            .account_service
            .create_account(
                owner,
                CreateAccountRequest {
                    user_id: owner.id.clone(),
                    account_type: AccountType::Checking,
                    currency: "USD".to_string(),
                    balance: None,
                    overdraft_limit: None,
                    interest_rate: None,
                },
            )
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn deposit_returns_created_with_the_transaction() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = deposit(
            State(state),
            AuthUser(owner),
            Json(DepositRequest {
                account_id: account.id,
                amount: dec!(250.00),
                description: Some("payday".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = testing::body_json(response).await;
        assert_eq!(body["detail"], "Deposit of 250.00 USD completed successfully");
        assert_eq!(body["transaction"]["amount"], "250.00");
        assert_eq!(body["transaction"]["balance_after"], "250.00");
        assert_eq!(body["transaction"]["status"], "completed");
    }

    #[tokio::test]
    async fn withdrawal_beyond_the_balance_is_rejected() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let response = withdraw(
            State(state),
            AuthUser(owner),
            Json(WithdrawRequest {
                account_id: account.id,
                amount: dec!(1.00),
                description: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = testing::body_json(response).await;
        assert_eq!(body["detail"], "Insufficient balance");
    }

    #[tokio::test]
    async fn reversal_from_a_customer_is_forbidden() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        let (_, transaction) = state
            .transaction_service
            .deposit(
                &owner,
                DepositRequest {
                    account_id: account.id,
                    amount: dec!(50.00),
                    description: None,
                },
            )
            .await
            .unwrap();

        let response = reverse_transaction(
            State(state),
            AuthUser(owner),
            Path(transaction.id),
            Json(ReverseRequest {
                reason: "typo".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = testing::body_json(response).await;
        assert_eq!(body["detail"], "Only admins can reverse transactions");
    }

    #[tokio::test]
    async fn reversal_reports_both_sides() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let admin = testing::seed_user(&db, "admin@example.com", Role::Admin).await;
        let account = open_account(&state, &owner).await;

        let (_, transaction) = state
            .transaction_service
            .deposit(
                &owner,
                DepositRequest {
                    account_id: account.id,
                    amount: dec!(50.00),
                    description: None,
                },
            )
            .await
            .unwrap();

        let response = reverse_transaction(
            State(state),
            AuthUser(admin),
            Path(transaction.id),
            Json(ReverseRequest {
                reason: "operator error".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = testing::body_json(response).await;
        assert_eq!(body["original_transaction"]["status"], "reversed");
        assert_eq!(body["reversal_transaction"]["status"], "completed");
        assert!(body["detail"].as_str().unwrap().ends_with("reversed successfully"));
    }

    #[tokio::test]
    async fn listing_defaults_to_the_callers_history() {
        let (state, db) = testing::state().await;
        let owner = testing::seed_user(&db, "owner@example.com", Role::Customer).await;
        let account = open_account(&state, &owner).await;

        state
            .transaction_service
            .deposit(
                &owner,
                DepositRequest {
                    account_id: account.id,
                    amount: dec!(10.00),
                    description: None,
                },
            )
            .await
            .unwrap();

        let response = list_transactions(
            State(state),
            AuthUser(owner),
            Query(TransactionListParams {
                account_id: None,
                page: None,
                per_page: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = testing::body_json(response).await;
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["page"], 1);
        assert_eq!(body["per_page"], 10);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }
}
