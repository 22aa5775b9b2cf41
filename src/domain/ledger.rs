//! Pure money arithmetic and posting plans.
//!
//! Nothing in this module touches the database. A [`PostingPlan`] describes a
//! complete money movement: the balance deltas to apply, the ledger row to
//! insert, and optionally an original transaction to flip to reversed. The
//! transaction repository executes the whole plan inside a single database
//! transaction, so a plan either lands in full or not at all.
//!
//! Balances travel as [`Decimal`] but are stored as integer minor units
//! (cents). `validate_amount` guarantees the conversion is exact.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::models::{
    Account, AccountStatus, Transaction, TransactionStatus, TransactionType,
};
use crate::errors::{ApiError, ApiResult};

const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest storable amount, matching a 10-digit, 2-decimal column.
fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

/// Checks an amount is positive, at most two decimal places, and in range,
/// then converts it to integer minor units.
pub fn validate_amount(amount: Decimal) -> ApiResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::InvalidAmount(
            "Amount must be greater than 0".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(ApiError::InvalidAmount(
            "Amount cannot have more than 2 decimal places".to_string(),
        ));
    }
    if amount > max_amount() {
        return Err(ApiError::InvalidAmount(
            "Amount exceeds the maximum allowed".to_string(),
        ));
    }
    (amount * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .ok_or_else(|| ApiError::InvalidAmount("Amount exceeds the maximum allowed".to_string()))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Converts an already-validated amount; callers must have run
/// [`validate_amount`] (or loaded the value from storage) first.
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .unwrap_or(0)
}

pub fn reference_prefix(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Deposit => "DEP",
        TransactionType::Withdrawal => "WTH",
        TransactionType::Transfer => "TRF",
        TransactionType::Fee => "TXN",
    }
}

pub const REVERSAL_PREFIX: &str = "REV";

/// Reference numbers are a 3-letter prefix plus 12 random characters from
/// `A-Z0-9`. Uniqueness is enforced by the database; collisions at this
/// keyspace are not worth retrying for.
pub fn generate_reference(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..12)
        .map(|_| REFERENCE_CHARSET[rng.random_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

/// 12 random digits. The caller retries on collision.
pub fn generate_account_number() -> String {
    let mut rng = rand::rng();
    (0..12)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Six-digit one-time passcode.
pub fn generate_otp_code() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

// ---------------------------------------------------------------------------
// Posting plans
// ---------------------------------------------------------------------------

/// One balance adjustment within a plan.
#[derive(Debug, Clone)]
pub struct BalanceLeg {
    pub account_id: String,
    /// Signed delta in minor units.
    pub delta_minor: i64,
    /// When set, the update refuses to drive the balance negative and this
    /// string becomes the insufficient-funds error detail.
    pub guard: Option<String>,
    /// The resulting balance of this leg is recorded as the ledger row's
    /// `balance_after`. At most one leg per plan sets this.
    pub record_balance_after: bool,
}

/// The ledger row a plan inserts. `balance_after` is filled in during
/// execution from the leg flagged `record_balance_after`.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub from_account_id: Option<String>,
    pub to_account_id: Option<String>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference_number: String,
    pub status: TransactionStatus,
    pub balance_after: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A complete, validated money movement awaiting atomic execution.
#[derive(Debug, Clone)]
pub struct PostingPlan {
    pub legs: Vec<BalanceLeg>,
    pub record: NewTransaction,
    /// Id of a completed transaction to mark reversed in the same unit of
    /// work. Execution fails if it is no longer in the completed state.
    pub reverse_original: Option<String>,
}

fn ensure_active(account: &Account, detail: &str) -> ApiResult<()> {
    if account.status != AccountStatus::Active {
        return Err(ApiError::InvalidState(detail.to_string()));
    }
    Ok(())
}

pub fn deposit_plan(
    account: &Account,
    amount: Decimal,
    description: Option<String>,
) -> ApiResult<PostingPlan> {
    let minor = validate_amount(amount)?;
    ensure_active(account, "Account is not active")?;

    Ok(PostingPlan {
        legs: vec![BalanceLeg {
            account_id: account.id.clone(),
            delta_minor: minor,
            guard: None,
            record_balance_after: true,
        }],
        record: NewTransaction {
            from_account_id: None,
            to_account_id: Some(account.id.clone()),
            transaction_type: TransactionType::Deposit,
            amount: from_minor_units(minor),
            currency: account.currency.clone(),
            description: Some(description.unwrap_or_else(|| "Deposit".to_string())),
            reference_number: generate_reference(reference_prefix(TransactionType::Deposit)),
            status: TransactionStatus::Completed,
            balance_after: None,
            metadata: None,
            processed_at: Some(Utc::now()),
        },
        reverse_original: None,
    })
}

pub fn withdrawal_plan(
    account: &Account,
    amount: Decimal,
    description: Option<String>,
) -> ApiResult<PostingPlan> {
    let minor = validate_amount(amount)?;
    ensure_active(account, "Account is not active")?;
    if account.balance < amount {
        return Err(ApiError::InsufficientFunds("Insufficient balance".to_string()));
    }

    Ok(PostingPlan {
        legs: vec![BalanceLeg {
            account_id: account.id.clone(),
            delta_minor: -minor,
            guard: Some("Insufficient balance".to_string()),
            record_balance_after: true,
        }],
        record: NewTransaction {
            from_account_id: Some(account.id.clone()),
            to_account_id: None,
            transaction_type: TransactionType::Withdrawal,
            amount: from_minor_units(minor),
            currency: account.currency.clone(),
            description: Some(description.unwrap_or_else(|| "Withdrawal".to_string())),
            reference_number: generate_reference(reference_prefix(TransactionType::Withdrawal)),
            status: TransactionStatus::Completed,
            balance_after: None,
            metadata: None,
            processed_at: Some(Utc::now()),
        },
        reverse_original: None,
    })
}

/// Transfer checks run in a fixed order: both accounts active, then source
/// funds, then currency match. The funds check here is advisory; the source
/// leg's guard re-checks atomically at execution time.
pub fn transfer_plan(
    from: &Account,
    to: &Account,
    amount: Decimal,
    description: Option<String>,
) -> ApiResult<PostingPlan> {
    let minor = validate_amount(amount)?;
    if from.status != AccountStatus::Active || to.status != AccountStatus::Active {
        return Err(ApiError::InvalidState(
            "One or both accounts are not active".to_string(),
        ));
    }
    if from.balance < amount {
        return Err(ApiError::InsufficientFunds(
            "Insufficient balance in source account".to_string(),
        ));
    }
    if from.currency != to.currency {
        return Err(ApiError::CurrencyMismatch(
            "Cannot transfer between accounts with different currencies".to_string(),
        ));
    }

    Ok(PostingPlan {
        legs: vec![
            BalanceLeg {
                account_id: from.id.clone(),
                delta_minor: -minor,
                guard: Some("Insufficient balance in source account".to_string()),
                record_balance_after: true,
            },
            BalanceLeg {
                account_id: to.id.clone(),
                delta_minor: minor,
                guard: None,
                record_balance_after: false,
            },
        ],
        record: NewTransaction {
            from_account_id: Some(from.id.clone()),
            to_account_id: Some(to.id.clone()),
            transaction_type: TransactionType::Transfer,
            amount: from_minor_units(minor),
            currency: from.currency.clone(),
            description: Some(description.unwrap_or_else(|| "Transfer".to_string())),
            reference_number: generate_reference(reference_prefix(TransactionType::Transfer)),
            status: TransactionStatus::Completed,
            balance_after: None,
            metadata: None,
            processed_at: Some(Utc::now()),
        },
        reverse_original: None,
    })
}

/// Builds the mirror-image posting for a completed transaction: credit the
/// original source, debit the original destination, flip the original to
/// reversed. The debit leg carries no funds guard, so a reversal always
/// succeeds even if the recipient has spent the money; the resulting
/// negative balance is the bank's claim against them.
pub fn reversal_plan(original: &Transaction, reason: String) -> ApiResult<PostingPlan> {
    if original.status != TransactionStatus::Completed {
        return Err(ApiError::InvalidState(
            "Only completed transactions can be reversed".to_string(),
        ));
    }
    let minor = to_minor_units(original.amount);

    let mut legs = Vec::new();
    if let Some(from_id) = &original.from_account_id {
        legs.push(BalanceLeg {
            account_id: from_id.clone(),
            delta_minor: minor,
            guard: None,
            record_balance_after: true,
        });
    }
    if let Some(to_id) = &original.to_account_id {
        legs.push(BalanceLeg {
            account_id: to_id.clone(),
            delta_minor: -minor,
            guard: None,
            record_balance_after: false,
        });
    }

    let metadata = serde_json::json!({
        "reversed_transaction_id": original.id,
        "reason": reason,
    });

    Ok(PostingPlan {
        legs,
        record: NewTransaction {
            from_account_id: original.to_account_id.clone(),
            to_account_id: original.from_account_id.clone(),
            transaction_type: original.transaction_type,
            amount: original.amount,
            currency: original.currency.clone(),
            description: Some(format!(
                "Reversal: {}",
                original.description.clone().unwrap_or_default()
            )),
            reference_number: generate_reference(REVERSAL_PREFIX),
            status: TransactionStatus::Completed,
            balance_after: None,
            metadata: Some(metadata),
            processed_at: Some(Utc::now()),
        },
        reverse_original: Some(original.id.clone()),
    })
}
