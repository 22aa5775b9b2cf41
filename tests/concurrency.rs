//! Concurrency tests for the posting engine.
//!
//! Many tasks hammer the same file-backed database. Balances must come out
//! exact, overdrawing must be impossible, and a reversal must happen at
//! most once no matter how racing requests interleave.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use banking_api::domain::models::{
    AccountType, CreateAccountRequest, DepositRequest, ReverseRequest, Role, User,
    WithdrawRequest,
};
use banking_api::domain::notifier::{NotificationEvent, NotificationSink, Notifier};
use banking_api::domain::{AccountService, TransactionService};
use banking_api::storage::accounts::AccountRepository;
use banking_api::storage::transactions::{TransactionFilter, TransactionRepository};
use banking_api::storage::users::{NewUser, UserRepository};
use banking_api::storage::{Db, PageParams};

struct DiscardSink;

#[async_trait]
impl NotificationSink for DiscardSink {
    async fn deliver(&self, _event: NotificationEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Harness {
    db: Db,
    service: TransactionService,
    customer: User,
    admin: User,
    account_id: String,
    // Deleting the directory closes out the database file.
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("bank.db").display());
    let db = Db::connect(&url).await.expect("Failed to open database");

    let users = UserRepository::new(db.clone());
    let customer = users
        .create(NewUser {
            email: "race@example.com".to_string(),
            first_name: "Race".to_string(),
            last_name: "Runner".to_string(),
            phone_number: "+15550100".to_string(),
            date_of_birth: None,
            address: None,
            role: Role::Customer,
            is_active: true,
            hashed_password: "hash".to_string(),
        })
        .await
        .expect("Failed to seed customer");
    let admin = users
        .create(NewUser {
            email: "root@example.com".to_string(),
            first_name: "Root".to_string(),
            last_name: "Admin".to_string(),
            phone_number: "+15550101".to_string(),
            date_of_birth: None,
            address: None,
            role: Role::Admin,
            is_active: true,
            hashed_password: "hash".to_string(),
        })
        .await
        .expect("Failed to seed admin");

    let (_, account) = AccountService::new(db.clone())
        .create_account(
            &customer,
            CreateAccountRequest {
                user_id: customer.id.clone(),
                account_type: AccountType::Checking,
                currency: "USD".to_string(),
                balance: None,
                overdraft_limit: None,
                interest_rate: None,
            },
        )
        .await
        .expect("Failed to open account");

    let service = TransactionService::new(db.clone(), Notifier::spawn(Arc::new(DiscardSink)));

    Harness {
        db,
        service,
        customer,
        admin,
        account_id: account.id,
        _dir: dir,
    }
}

async fn balance_of(db: &Db, account_id: &str) -> rust_decimal::Decimal {
    AccountRepository::new(db.clone())
        .get_or_fail(account_id)
        .await
        .expect("Failed to read account")
        .balance
}

#[tokio::test]
async fn concurrent_deposits_never_lose_an_update() {
    let h = harness().await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = h.service.clone();
        let customer = h.customer.clone();
        let account_id = h.account_id.clone();
        handles.push(tokio::spawn(async move {
            service
                .deposit(
                    &customer,
                    DepositRequest {
                        account_id,
                        amount: dec!(5.00),
                        description: None,
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("deposit should succeed");
    }

    assert_eq!(balance_of(&h.db, &h.account_id).await, dec!(100.00));

    // Every ledger row landed, each with its own reference.
    let page = TransactionRepository::new(h.db.clone())
        .list(
            &TransactionFilter {
                account_id: Some(h.account_id.clone()),
                ..Default::default()
            },
            &PageParams { page: 1, per_page: 50 },
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 20);
    let references: HashSet<String> = page
        .items
        .iter()
        .map(|t| t.reference_number.clone())
        .collect();
    assert_eq!(references.len(), 20);
}

#[tokio::test]
async fn overdraw_race_settles_at_exactly_zero() {
    let h = harness().await;
    h.service
        .deposit(
            &h.customer,
            DepositRequest {
                account_id: h.account_id.clone(),
                amount: dec!(50.00),
                description: None,
            },
        )
        .await
        .expect("seed deposit");

    // Ten withdrawals of 10.00 race over 50.00; exactly five can win.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = h.service.clone();
        let customer = h.customer.clone();
        let account_id = h.account_id.clone();
        handles.push(tokio::spawn(async move {
            service
                .withdraw(
                    &customer,
                    WithdrawRequest {
                        account_id,
                        amount: dec!(10.00),
                        description: None,
                    },
                )
                .await
        }));
    }

    let mut won = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => {
                assert_eq!(err.detail(), "Insufficient balance");
                refused += 1;
            }
        }
    }

    assert_eq!(won, 5);
    assert_eq!(refused, 5);
    assert_eq!(balance_of(&h.db, &h.account_id).await, dec!(0.00));
}

#[tokio::test]
async fn interleaved_deposits_and_withdrawals_reconcile() {
    let h = harness().await;
    h.service
        .deposit(
            &h.customer,
            DepositRequest {
                account_id: h.account_id.clone(),
                amount: dec!(100.00),
                description: None,
            },
        )
        .await
        .expect("seed deposit");

    // The seed covers the worst-case ordering, so every movement succeeds.
    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        let customer = h.customer.clone();
        let account_id = h.account_id.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service
                    .deposit(
                        &customer,
                        DepositRequest {
                            account_id,
                            amount: dec!(10.00),
                            description: None,
                        },
                    )
                    .await
                    .map(|_| ())
            } else {
                service
                    .withdraw(
                        &customer,
                        WithdrawRequest {
                            account_id,
                            amount: dec!(10.00),
                            description: None,
                        },
                    )
                    .await
                    .map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("movement should succeed");
    }

    assert_eq!(balance_of(&h.db, &h.account_id).await, dec!(100.00));
}

#[tokio::test]
async fn racing_reversals_pick_one_winner() {
    let h = harness().await;
    let (_, deposit) = h
        .service
        .deposit(
            &h.customer,
            DepositRequest {
                account_id: h.account_id.clone(),
                amount: dec!(40.00),
                description: None,
            },
        )
        .await
        .expect("seed deposit");

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = h.service.clone();
        let admin = h.admin.clone();
        let transaction_id = deposit.id.clone();
        handles.push(tokio::spawn(async move {
            service
                .reverse_transaction(
                    &admin,
                    &transaction_id,
                    ReverseRequest {
                        reason: "Race cleanup".to_string(),
                    },
                )
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => {
                assert_eq!(err.detail(), "Only completed transactions can be reversed");
            }
        }
    }

    assert_eq!(won, 1);
    assert_eq!(balance_of(&h.db, &h.account_id).await, dec!(0.00));

    // One original plus exactly one reversal row.
    let total = TransactionRepository::new(h.db.clone())
        .count(&TransactionFilter {
            account_id: Some(h.account_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
}
