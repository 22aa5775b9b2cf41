//! Entities, enums, and the request/response types exchanged over REST.
//!
//! Entity structs mirror the storage rows one-to-one. Monetary fields are
//! [`Decimal`] here even though storage keeps integer minor units; the
//! conversion happens at the repository boundary so business logic never
//! touches raw cents.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Fee => "fee",
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Postal address stored as JSON alongside the user row.
///
/// Accepts `zipCode` as an alias so camelCase clients round-trip cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    #[serde(alias = "zipCode")]
    pub zip_code: String,
    pub country: String,
}

/// A registered user. Deliberately not `Serialize`: the password hash must
/// never reach a response body. Convert to [`UserPublic`] first.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub address: Option<Address>,
    pub role: Role,
    pub is_active: bool,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The client-facing projection of a user: no role, no password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub address: Option<Address>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        UserPublic {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone_number: user.phone_number,
            date_of_birth: user.date_of_birth,
            address: user.address,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub overdraft_limit: Decimal,
    pub interest_rate: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: String,
    pub from_account_id: Option<String>,
    pub to_account_id: Option<String>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference_number: String,
    pub status: TransactionStatus,
    pub balance_after: Option<Decimal>,
    #[serde(rename = "transaction_metadata")]
    pub metadata: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A one-time passcode bound to an email address. At most one live row per
/// email; expiry is lazy and recorded via `is_expired`.
#[derive(Debug, Clone, PartialEq)]
pub struct Otp {
    pub id: String,
    pub email: String,
    pub otp_code: String,
    pub expires_on: DateTime<Utc>,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pagination envelope
// ---------------------------------------------------------------------------

/// List envelope every collection endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub total_count: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub data: Vec<T>,
}

impl<T> Paginated<T> {
    /// Wraps a page of items. `total_pages` rounds up; an empty collection
    /// reports zero pages.
    pub fn new(data: Vec<T>, total_count: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total_count + per_page - 1) / per_page;
        Paginated {
            total_count,
            page,
            per_page,
            total_pages,
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            total_count: self.total_count,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// User flow payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub date_of_birth: Option<DateTime<Utc>>,
    #[serde(default)]
    pub address: Option<Address>,
    pub password: String,
    pub confirm_password: String,
}

/// Login is form-encoded with OAuth2-style field names.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRegistrationRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub email: String,
    pub reset_code: String,
    pub new_password: String,
    pub confirm_password: String,
}

// ---------------------------------------------------------------------------
// Account payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: String,
    pub account_type: AccountType,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Ignored; accounts always open with a zero balance.
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub overdraft_limit: Option<Decimal>,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub overdraft_limit: Option<Decimal>,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementResponse {
    pub account_id: String,
    pub account_number: String,
    pub start_date: String,
    pub end_date: String,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub transactions: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Transaction payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseRequest {
    pub reason: String,
}
