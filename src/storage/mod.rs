//! # Storage Module
//!
//! SQLite persistence for the banking service.
//!
//! All repositories share a single [`Db`] handle wrapping a connection pool.
//! The schema is created idempotently at startup, so a fresh database file is
//! ready to serve requests without a separate migration step.
//!
//! ## Module Organization
//!
//! - **users**: User rows, typed filters, and patch updates
//! - **accounts**: Account rows and balance reads
//! - **transactions**: Ledger rows, list queries, and atomic posting
//! - **otps**: One-time passcode rows
//!
//! ## Conventions
//!
//! - Ids are UUID strings generated at insert time
//! - Monetary columns are INTEGER minor units (cents); conversion to
//!   [`rust_decimal::Decimal`] happens in the row mappers
//! - Timestamps are RFC 3339 TEXT, decoded as `DateTime<Utc>`
//! - Foreign keys are enforced; deleting a user cascades to their accounts,
//!   while ledger rows outlive deleted accounts with nulled references

pub mod accounts;
pub mod otps;
pub mod transactions;
pub mod users;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Shared database handle. Cheap to clone; all clones use the same pool.
#[derive(Clone)]
pub struct Db {
    pool: Arc<SqlitePool>,
}

impl Db {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Fresh in-memory database with a unique name, for tests. Shared cache
    /// keeps the data visible across the pool's connections.
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::connect(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                date_of_birth TEXT,
                address TEXT,
                role TEXT NOT NULL DEFAULT 'customer',
                is_active INTEGER NOT NULL DEFAULT 0,
                hashed_password TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                account_number TEXT NOT NULL UNIQUE,
                account_type TEXT NOT NULL,
                balance INTEGER NOT NULL DEFAULT 0,
                currency TEXT NOT NULL DEFAULT 'USD',
                status TEXT NOT NULL DEFAULT 'active',
                overdraft_limit INTEGER NOT NULL DEFAULT 0,
                interest_rate TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                from_account_id TEXT REFERENCES accounts(id) ON DELETE SET NULL,
                to_account_id TEXT REFERENCES accounts(id) ON DELETE SET NULL,
                transaction_type TEXT NOT NULL,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                description TEXT,
                reference_number TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                balance_after INTEGER,
                metadata TEXT,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS otps (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                otp_code TEXT NOT NULL,
                expires_on TEXT NOT NULL,
                is_expired INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_accounts_user_id ON accounts(user_id);",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_from_account ON transactions(from_account_id);",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_to_account ON transactions(to_account_id);",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at DESC);",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Page request as it arrives from the query string.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    10
}

impl Default for PageParams {
    fn default() -> Self {
        PageParams { page: 1, per_page: 10 }
    }
}

impl PageParams {
    /// Builds params from optional query fields, falling back to the defaults.
    pub fn from_query(page: Option<i64>, per_page: Option<i64>) -> PageParams {
        PageParams {
            page: page.unwrap_or(1),
            per_page: per_page.unwrap_or(10),
        }
    }

    /// Applies the clamping rules: `page < 1` becomes 1, `per_page` outside
    /// `1..=50` falls back to 10.
    pub fn clamped(self) -> PageParams {
        let page = if self.page < 1 { 1 } else { self.page };
        let per_page = if self.per_page < 1 || self.per_page > 50 {
            10
        } else {
            self.per_page
        };
        PageParams { page, per_page }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// One page of rows plus the unpaged total, as repositories return it.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
}
