//! Back-office surface: cross-customer listings, account freezing and the
//! daily activity report.
//!
//! Authorization happens at the route layer; every operation here assumes an
//! admin caller and queries without ownership scoping.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::domain::models::{
    Account, AccountStatus, AccountType, Paginated, Role, Transaction, TransactionStatus,
    TransactionType, UserPublic,
};
use crate::errors::{ApiError, ApiResult};
use crate::storage::accounts::{AccountChanges, AccountFilter, AccountRepository};
use crate::storage::transactions::{TransactionFilter, TransactionRepository};
use crate::storage::users::{UserFilter, UserRepository};
use crate::storage::{Db, PageParams};

/// Service for admin-only reporting and interventions
#[derive(Clone)]
pub struct AdminService {
    users: UserRepository,
    accounts: AccountRepository,
    transactions: TransactionRepository,
}

/// Daily report payload, `date` in `YYYY-MM-DD`.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub summary: SummaryCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryCounts {
    pub users: UserCounts,
    pub accounts: AccountCounts,
    pub transactions: TransactionCounts,
    pub transaction_types: TransactionTypeCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCounts {
    pub total: i64,
    pub new_today: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCounts {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionCounts {
    pub total: i64,
    pub today: i64,
    pub volume_today: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionTypeCounts {
    pub deposits: i64,
    pub withdrawals: i64,
    pub transfers: i64,
}

impl AdminService {
    pub fn new(db: Db) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            accounts: AccountRepository::new(db.clone()),
            transactions: TransactionRepository::new(db),
        }
    }

    pub async fn list_users(
        &self,
        role: Option<Role>,
        is_active: Option<bool>,
        page: PageParams,
    ) -> ApiResult<Paginated<UserPublic>> {
        let params = page.clamped();
        let filter = UserFilter {
            role,
            is_active,
            ..Default::default()
        };

        let result = self.users.list(&filter, &params).await?;
        Ok(Paginated::new(
            result.items,
            result.total_count,
            params.page,
            params.per_page,
        )
        .map(UserPublic::from))
    }

    pub async fn list_accounts(
        &self,
        status: Option<AccountStatus>,
        account_type: Option<AccountType>,
        page: PageParams,
    ) -> ApiResult<Paginated<Account>> {
        let params = page.clamped();
        let filter = AccountFilter {
            status,
            account_type,
            ..Default::default()
        };

        let result = self.accounts.list(&filter, &params).await?;
        Ok(Paginated::new(
            result.items,
            result.total_count,
            params.page,
            params.per_page,
        ))
    }

    pub async fn list_transactions(
        &self,
        transaction_type: Option<TransactionType>,
        status: Option<TransactionStatus>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        page: PageParams,
    ) -> ApiResult<Paginated<Transaction>> {
        let params = page.clamped();
        let filter = TransactionFilter {
            transaction_type,
            status,
            created_from: start_date,
            created_to: end_date,
            ..Default::default()
        };

        let result = self.transactions.list(&filter, &params).await?;
        Ok(Paginated::new(
            result.items,
            result.total_count,
            params.page,
            params.per_page,
        ))
    }

    /// Freezing is not idempotent: a second freeze is rejected so the
    /// operator learns the account was already under intervention.
    pub async fn freeze_account(&self, account_id: &str) -> ApiResult<(String, Account)> {
        let account = self.accounts.get_or_fail(account_id).await?;
        if account.status == AccountStatus::Frozen {
            return Err(ApiError::InvalidState(
                "Account is already frozen".to_string(),
            ));
        }

        let frozen = self
            .accounts
            .update(
                account_id,
                &AccountChanges {
                    status: Some(AccountStatus::Frozen),
                    ..Default::default()
                },
            )
            .await?;

        info!("account {} frozen", frozen.account_number);
        Ok((
            format!("Account {} frozen successfully", frozen.account_number),
            frozen,
        ))
    }

    /// Activity report for one calendar day, defaulting to today. All-time
    /// totals sit next to day-scoped counts and the day's completed volume.
    pub async fn daily_summary(&self, date: Option<&str>) -> ApiResult<DailySummary> {
        let report_date = match date {
            Some(raw) => parse_report_date(raw)?,
            None => Utc::now().date_naive(),
        };

        let day_start = Utc.from_utc_datetime(&report_date.and_time(NaiveTime::MIN));
        let day_end = day_start + Duration::days(1) - Duration::microseconds(1);

        let total_users = self.users.count(&UserFilter::default()).await?;
        let new_users_today = self
            .users
            .count(&UserFilter {
                created_from: Some(day_start),
                created_to: Some(day_end),
                ..Default::default()
            })
            .await?;

        let total_accounts = self.accounts.count(&AccountFilter::default()).await?;
        let active_accounts = self
            .accounts
            .count(&AccountFilter {
                status: Some(AccountStatus::Active),
                ..Default::default()
            })
            .await?;

        let total_transactions = self
            .transactions
            .count(&TransactionFilter::default())
            .await?;
        let today_transactions = self.transactions.count(&day_filter(day_start, day_end, None)).await?;
        let volume_today = self
            .transactions
            .sum_completed_amount(day_start, day_end)
            .await?;

        let deposits = self
            .transactions
            .count(&day_filter(day_start, day_end, Some(TransactionType::Deposit)))
            .await?;
        let withdrawals = self
            .transactions
            .count(&day_filter(day_start, day_end, Some(TransactionType::Withdrawal)))
            .await?;
        let transfers = self
            .transactions
            .count(&day_filter(day_start, day_end, Some(TransactionType::Transfer)))
            .await?;

        Ok(DailySummary {
            date: report_date.to_string(),
            summary: SummaryCounts {
                users: UserCounts {
                    total: total_users,
                    new_today: new_users_today,
                },
                accounts: AccountCounts {
                    total: total_accounts,
                    active: active_accounts,
                },
                transactions: TransactionCounts {
                    total: total_transactions,
                    today: today_transactions,
                    volume_today,
                },
                transaction_types: TransactionTypeCounts {
                    deposits,
                    withdrawals,
                    transfers,
                },
            },
        })
    }
}

fn parse_report_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::Validation("Invalid date format. Use YYYY-MM-DD".to_string()))
}

fn day_filter(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    transaction_type: Option<TransactionType>,
) -> TransactionFilter {
    TransactionFilter {
        transaction_type,
        created_from: Some(from),
        created_to: Some(to),
        ..Default::default()
    }
}
