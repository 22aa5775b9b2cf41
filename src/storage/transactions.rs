//! Ledger rows and the atomic posting path.
//!
//! [`TransactionRepository::post`] is the only code that moves money. It runs
//! a whole [`PostingPlan`] inside one database transaction: the optional
//! reversed-status flip, every balance leg as a conditional UPDATE, and the
//! ledger insert. If any step refuses, nothing is committed, so a balance can
//! never drift from the transactions that explain it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::domain::ledger::{self, NewTransaction, PostingPlan};
use crate::domain::models::{Transaction, TransactionStatus, TransactionType};
use crate::errors::{ApiError, ApiResult};
use crate::storage::{Db, Page, PageParams};

/// Equality and range filters; `None` fields match everything. Account
/// filters match either direction of the ledger row.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<String>,
    pub account_ids: Option<Vec<String>>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Repository for ledger operations
#[derive(Clone)]
pub struct TransactionRepository {
    db: Db,
}

impl TransactionRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Execute a posting plan atomically and return the inserted ledger row.
    ///
    /// Guarded legs re-check funds inside the database, so concurrent debits
    /// against the same account cannot overdraw it no matter how the
    /// requests interleave.
    pub async fn post(&self, plan: &PostingPlan) -> ApiResult<Transaction> {
        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        // Reversals claim the original row first. A zero row count means a
        // concurrent reversal got there before us, or the transaction was
        // never completed.
        if let Some(original_id) = &plan.reverse_original {
            let flipped = sqlx::query(
                r#"
                UPDATE transactions
                SET status = ?, updated_at = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(TransactionStatus::Reversed)
            .bind(now)
            .bind(original_id)
            .bind(TransactionStatus::Completed)
            .execute(&mut *tx)
            .await?;

            if flipped.rows_affected() == 0 {
                return Err(ApiError::InvalidState(
                    "Only completed transactions can be reversed".to_string(),
                ));
            }
        }

        let mut balance_after: Option<Decimal> = None;
        for leg in &plan.legs {
            let row = if leg.guard.is_some() {
                sqlx::query(
                    r#"
                    UPDATE accounts
                    SET balance = balance + ?, updated_at = ?
                    WHERE id = ? AND balance + ? >= 0
                    RETURNING balance
                    "#,
                )
                .bind(leg.delta_minor)
                .bind(now)
                .bind(&leg.account_id)
                .bind(leg.delta_minor)
                .fetch_optional(&mut *tx)
                .await?
            } else {
                sqlx::query(
                    r#"
                    UPDATE accounts
                    SET balance = balance + ?, updated_at = ?
                    WHERE id = ?
                    RETURNING balance
                    "#,
                )
                .bind(leg.delta_minor)
                .bind(now)
                .bind(&leg.account_id)
                .fetch_optional(&mut *tx)
                .await?
            };

            let new_minor: i64 = match row {
                Some(row) => row.get("balance"),
                None => {
                    let exists = sqlx::query("SELECT 1 FROM accounts WHERE id = ?")
                        .bind(&leg.account_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .is_some();
                    if exists {
                        let detail = leg
                            .guard
                            .clone()
                            .unwrap_or_else(|| "Insufficient balance".to_string());
                        return Err(ApiError::InsufficientFunds(detail));
                    }
                    return Err(ApiError::NotFound(format!(
                        "Account with ID {} not found",
                        leg.account_id
                    )));
                }
            };

            if leg.record_balance_after {
                balance_after = Some(ledger::from_minor_units(new_minor));
            }
        }

        let record = insert_record(&mut tx, &plan.record, balance_after, now).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Plain insert, outside any posting plan. Balances are not touched.
    pub async fn create(&self, new: NewTransaction) -> ApiResult<Transaction> {
        let mut tx = self.db.pool().begin().await?;
        let record = insert_record(&mut tx, &new, new.balance_after, Utc::now()).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Bulk insert in one transaction; any failure rolls the whole batch back.
    pub async fn create_many(&self, batch: Vec<NewTransaction>) -> ApiResult<Vec<Transaction>> {
        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        let mut records = Vec::with_capacity(batch.len());
        for new in batch {
            let record = insert_record(&mut tx, &new, new.balance_after, now).await?;
            records.push(record);
        }

        tx.commit().await?;
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<Transaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, transaction_type, amount,
                   currency, description, reference_number, status, balance_after,
                   metadata, processed_at, created_at, updated_at
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(map_transaction))
    }

    pub async fn get_or_fail(&self, id: &str) -> ApiResult<Transaction> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Transaction with ID {id} not found")))
    }

    pub async fn find_one(&self, filter: &TransactionFilter) -> ApiResult<Option<Transaction>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, from_account_id, to_account_id, transaction_type, amount, \
             currency, description, reference_number, status, balance_after, \
             metadata, processed_at, created_at, updated_at FROM transactions",
        );
        apply_filter(&mut query, filter);
        query.push(" LIMIT 1");

        let row = query.build().fetch_optional(self.db.pool()).await?;
        Ok(row.map(map_transaction))
    }

    /// Newest first, with the unpaged total for the envelope.
    pub async fn list(
        &self,
        filter: &TransactionFilter,
        page: &PageParams,
    ) -> ApiResult<Page<Transaction>> {
        let page = page.clamped();

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, from_account_id, to_account_id, transaction_type, amount, \
             currency, description, reference_number, status, balance_after, \
             metadata, processed_at, created_at, updated_at FROM transactions",
        );
        apply_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(page.per_page);
        query.push(" OFFSET ").push_bind(page.offset());

        let rows = query.build().fetch_all(self.db.pool()).await?;
        let items = rows.into_iter().map(map_transaction).collect();
        let total_count = self.count(filter).await?;

        Ok(Page { items, total_count })
    }

    /// Every ledger row touching the account in either direction, newest
    /// first, capped. Statements use this.
    pub async fn list_for_account(&self, account_id: &str, limit: i64) -> ApiResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, from_account_id, to_account_id, transaction_type, amount,
                   currency, description, reference_number, status, balance_after,
                   metadata, processed_at, created_at, updated_at
            FROM transactions
            WHERE from_account_id = ? OR to_account_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(map_transaction).collect())
    }

    pub async fn count(&self, filter: &TransactionFilter) -> ApiResult<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM transactions");
        apply_filter(&mut query, filter);

        let row = query.build().fetch_one(self.db.pool()).await?;
        Ok(row.get("count"))
    }

    pub async fn exists(&self, filter: &TransactionFilter) -> ApiResult<bool> {
        Ok(self.find_one(filter).await?.is_some())
    }

    /// Sum of completed amounts in a created-at window, for the daily
    /// summary. Integer minor units keep the SUM exact.
    pub async fn sum_completed_amount(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM transactions
            WHERE status = ? AND created_at >= ? AND created_at <= ?
            "#,
        )
        .bind(TransactionStatus::Completed)
        .bind(from)
        .bind(to)
        .fetch_one(self.db.pool())
        .await?;

        Ok(ledger::from_minor_units(row.get("total")))
    }
}

async fn insert_record(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &NewTransaction,
    balance_after: Option<Decimal>,
    now: DateTime<Utc>,
) -> ApiResult<Transaction> {
    let id = Uuid::new_v4().to_string();
    let metadata_json = match &record.metadata {
        Some(value) => Some(
            serde_json::to_string(value).map_err(|e| ApiError::Internal(e.into()))?,
        ),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, from_account_id, to_account_id, transaction_type, amount,
            currency, description, reference_number, status, balance_after,
            metadata, processed_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&record.from_account_id)
    .bind(&record.to_account_id)
    .bind(record.transaction_type)
    .bind(ledger::to_minor_units(record.amount))
    .bind(&record.currency)
    .bind(&record.description)
    .bind(&record.reference_number)
    .bind(record.status)
    .bind(balance_after.map(ledger::to_minor_units))
    .bind(&metadata_json)
    .bind(record.processed_at)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(Transaction {
        id,
        from_account_id: record.from_account_id.clone(),
        to_account_id: record.to_account_id.clone(),
        transaction_type: record.transaction_type,
        amount: record.amount,
        currency: record.currency.clone(),
        description: record.description.clone(),
        reference_number: record.reference_number.clone(),
        status: record.status,
        balance_after,
        metadata: record.metadata.clone(),
        processed_at: record.processed_at,
        created_at: now,
        updated_at: now,
    })
}

fn apply_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &TransactionFilter) {
    let mut prefix = " WHERE ";

    if let Some(account_id) = &filter.account_id {
        query
            .push(prefix)
            .push("(from_account_id = ")
            .push_bind(account_id.clone())
            .push(" OR to_account_id = ")
            .push_bind(account_id.clone())
            .push(")");
        prefix = " AND ";
    }
    if let Some(account_ids) = &filter.account_ids {
        if account_ids.is_empty() {
            query.push(prefix).push("1 = 0");
        } else {
            query.push(prefix).push("(from_account_id IN (");
            let mut ids = query.separated(", ");
            for id in account_ids {
                ids.push_bind(id.clone());
            }
            query.push(") OR to_account_id IN (");
            let mut ids = query.separated(", ");
            for id in account_ids {
                ids.push_bind(id.clone());
            }
            query.push("))");
        }
        prefix = " AND ";
    }
    if let Some(transaction_type) = filter.transaction_type {
        query
            .push(prefix)
            .push("transaction_type = ")
            .push_bind(transaction_type);
        prefix = " AND ";
    }
    if let Some(status) = filter.status {
        query.push(prefix).push("status = ").push_bind(status);
        prefix = " AND ";
    }
    if let Some(from) = filter.created_from {
        query.push(prefix).push("created_at >= ").push_bind(from);
        prefix = " AND ";
    }
    if let Some(to) = filter.created_to {
        query.push(prefix).push("created_at <= ").push_bind(to);
    }
}

fn map_transaction(row: sqlx::sqlite::SqliteRow) -> Transaction {
    let metadata: Option<String> = row.get("metadata");
    let balance_after: Option<i64> = row.get("balance_after");
    Transaction {
        id: row.get("id"),
        from_account_id: row.get("from_account_id"),
        to_account_id: row.get("to_account_id"),
        transaction_type: row.get("transaction_type"),
        amount: ledger::from_minor_units(row.get("amount")),
        currency: row.get("currency"),
        description: row.get("description"),
        reference_number: row.get("reference_number"),
        status: row.get("status"),
        balance_after: balance_after.map(ledger::from_minor_units),
        metadata: metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
