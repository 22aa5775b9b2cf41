//! Account rows. Balances live here as INTEGER minor units; every read and
//! write converts at this boundary so the rest of the crate only sees
//! [`Decimal`] values.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::ledger;
use crate::domain::models::{Account, AccountStatus, AccountType};
use crate::errors::{ApiError, ApiResult};
use crate::storage::{Db, Page, PageParams};

/// Insert payload. Accounts always open with a zero balance.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub currency: String,
    pub overdraft_limit: Decimal,
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub user_id: Option<String>,
    pub status: Option<AccountStatus>,
    pub account_type: Option<AccountType>,
    pub account_number: Option<String>,
}

/// Partial patch; unset fields are preserved. Balance is deliberately
/// absent: it only moves through posted transactions.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub account_type: Option<AccountType>,
    pub currency: Option<String>,
    pub overdraft_limit: Option<Decimal>,
    pub interest_rate: Option<Decimal>,
    pub status: Option<AccountStatus>,
}

impl AccountChanges {
    fn is_empty(&self) -> bool {
        self.account_type.is_none()
            && self.currency.is_none()
            && self.overdraft_limit.is_none()
            && self.interest_rate.is_none()
            && self.status.is_none()
    }
}

/// Repository for account operations
#[derive(Clone)]
pub struct AccountRepository {
    db: Db,
}

impl AccountRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewAccount) -> ApiResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let overdraft_minor = ledger::to_minor_units(new.overdraft_limit);

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, account_number, account_type, balance, currency,
                status, overdraft_limit, interest_rate, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.account_number)
        .bind(new.account_type)
        .bind(&new.currency)
        .bind(AccountStatus::Active)
        .bind(overdraft_minor)
        .bind(new.interest_rate.map(|r| r.to_string()))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(Account {
            id,
            user_id: new.user_id,
            account_number: new.account_number,
            account_type: new.account_type,
            balance: ledger::from_minor_units(0),
            currency: new.currency,
            status: AccountStatus::Active,
            overdraft_limit: ledger::from_minor_units(overdraft_minor),
            interest_rate: new.interest_rate,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, account_number, account_type, balance, currency,
                   status, overdraft_limit, interest_rate, created_at, updated_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(map_account))
    }

    pub async fn get_or_fail(&self, id: &str) -> ApiResult<Account> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Account with ID {id} not found")))
    }

    pub async fn find_one(&self, filter: &AccountFilter) -> ApiResult<Option<Account>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, account_number, account_type, balance, currency, \
             status, overdraft_limit, interest_rate, created_at, updated_at FROM accounts",
        );
        apply_filter(&mut query, filter);
        query.push(" LIMIT 1");

        let row = query.build().fetch_optional(self.db.pool()).await?;
        Ok(row.map(map_account))
    }

    pub async fn list(&self, filter: &AccountFilter, page: &PageParams) -> ApiResult<Page<Account>> {
        let page = page.clamped();

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, account_number, account_type, balance, currency, \
             status, overdraft_limit, interest_rate, created_at, updated_at FROM accounts",
        );
        apply_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(page.per_page);
        query.push(" OFFSET ").push_bind(page.offset());

        let rows = query.build().fetch_all(self.db.pool()).await?;
        let items = rows.into_iter().map(map_account).collect();
        let total_count = self.count(filter).await?;

        Ok(Page { items, total_count })
    }

    /// All account ids owned by a user, capped. Used to scope a customer's
    /// transaction listing.
    pub async fn ids_for_user(&self, user_id: &str, limit: i64) -> ApiResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM accounts WHERE user_id = ? LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    pub async fn update(&self, id: &str, changes: &AccountChanges) -> ApiResult<Account> {
        if changes.is_empty() {
            return self.get_or_fail(id).await;
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE accounts SET ");
        let mut parts = query.separated(", ");
        if let Some(account_type) = changes.account_type {
            parts.push("account_type = ").push_bind_unseparated(account_type);
        }
        if let Some(currency) = &changes.currency {
            parts.push("currency = ").push_bind_unseparated(currency.clone());
        }
        if let Some(overdraft_limit) = changes.overdraft_limit {
            parts
                .push("overdraft_limit = ")
                .push_bind_unseparated(ledger::to_minor_units(overdraft_limit));
        }
        if let Some(interest_rate) = changes.interest_rate {
            parts
                .push("interest_rate = ")
                .push_bind_unseparated(interest_rate.to_string());
        }
        if let Some(status) = changes.status {
            parts.push("status = ").push_bind_unseparated(status);
        }
        parts.push("updated_at = ").push_bind_unseparated(Utc::now());
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(self.db.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Account with ID {id} not found")));
        }

        self.get_or_fail(id).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<Account> {
        let account = self.get_or_fail(id).await?;

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(account)
    }

    pub async fn count(&self, filter: &AccountFilter) -> ApiResult<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM accounts");
        apply_filter(&mut query, filter);

        let row = query.build().fetch_one(self.db.pool()).await?;
        Ok(row.get("count"))
    }

    pub async fn exists(&self, filter: &AccountFilter) -> ApiResult<bool> {
        Ok(self.find_one(filter).await?.is_some())
    }
}

fn apply_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &AccountFilter) {
    let mut prefix = " WHERE ";
    if let Some(user_id) = &filter.user_id {
        query.push(prefix).push("user_id = ").push_bind(user_id.clone());
        prefix = " AND ";
    }
    if let Some(status) = filter.status {
        query.push(prefix).push("status = ").push_bind(status);
        prefix = " AND ";
    }
    if let Some(account_type) = filter.account_type {
        query.push(prefix).push("account_type = ").push_bind(account_type);
        prefix = " AND ";
    }
    if let Some(account_number) = &filter.account_number {
        query
            .push(prefix)
            .push("account_number = ")
            .push_bind(account_number.clone());
    }
}

fn map_account(row: sqlx::sqlite::SqliteRow) -> Account {
    let interest_rate: Option<String> = row.get("interest_rate");
    Account {
        id: row.get("id"),
        user_id: row.get("user_id"),
        account_number: row.get("account_number"),
        account_type: row.get("account_type"),
        balance: ledger::from_minor_units(row.get("balance")),
        currency: row.get("currency"),
        status: row.get("status"),
        overdraft_limit: ledger::from_minor_units(row.get("overdraft_limit")),
        interest_rate: interest_rate.and_then(|raw| Decimal::from_str(&raw).ok()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
