//! Account lifecycle: opening, updating, closing and reporting.
//!
//! ## Business Rules
//! - Customers manage only their own accounts; admins manage any
//! - Accounts always open with a zero balance; money arrives by deposit
//! - Closing is a soft delete (status `closed`); DELETE removes the row
//! - Interest rates above 1 are treated as percentages and divided by 100

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::auth::authorize;
use crate::domain::ledger;
use crate::domain::models::{
    Account, AccountStatus, BalanceResponse, CreateAccountRequest, Paginated, StatementResponse,
    UpdateAccountRequest, User,
};
use crate::errors::{ApiError, ApiResult};
use crate::storage::accounts::{AccountChanges, AccountFilter, AccountRepository, NewAccount};
use crate::storage::transactions::TransactionRepository;
use crate::storage::{Db, PageParams};

/// Rows returned on a statement. The range is echoed, not used as a filter.
const STATEMENT_ROW_LIMIT: i64 = 200;
const MAX_ACCOUNT_NUMBER_ATTEMPTS: u32 = 10;

/// Service for account management
#[derive(Clone)]
pub struct AccountService {
    accounts: AccountRepository,
    transactions: TransactionRepository,
}

impl AccountService {
    pub fn new(db: Db) -> Self {
        Self {
            accounts: AccountRepository::new(db.clone()),
            transactions: TransactionRepository::new(db),
        }
    }

    /// Customers see their own accounts; admins see everyone's.
    pub async fn list_accounts(
        &self,
        caller: &User,
        page: PageParams,
    ) -> ApiResult<Paginated<Account>> {
        let params = page.clamped();
        let filter = if caller.is_admin() {
            AccountFilter::default()
        } else {
            AccountFilter {
                user_id: Some(caller.id.clone()),
                ..Default::default()
            }
        };

        let result = self.accounts.list(&filter, &params).await?;
        Ok(Paginated::new(
            result.items,
            result.total_count,
            params.page,
            params.per_page,
        ))
    }

    /// Open an account with a generated number and a zero balance. Any
    /// balance in the request is ignored.
    pub async fn create_account(
        &self,
        caller: &User,
        req: CreateAccountRequest,
    ) -> ApiResult<(String, Account)> {
        let interest_rate = normalize_interest_rate(req.interest_rate)?;
        authorize(
            caller,
            Some(req.user_id.as_str()),
            "You can only create accounts for yourself",
        )?;

        let mut account_number = ledger::generate_account_number();
        let mut attempts = 1;
        while self
            .accounts
            .exists(&AccountFilter {
                account_number: Some(account_number.clone()),
                ..Default::default()
            })
            .await?
        {
            if attempts >= MAX_ACCOUNT_NUMBER_ATTEMPTS {
                return Err(ApiError::Unexpected(
                    "Failed to generate unique account number".to_string(),
                ));
            }
            account_number = ledger::generate_account_number();
            attempts += 1;
        }

        let account = self
            .accounts
            .create(NewAccount {
                user_id: req.user_id,
                account_number,
                account_type: req.account_type,
                currency: req.currency,
                overdraft_limit: req.overdraft_limit.unwrap_or_default(),
                interest_rate,
            })
            .await?;

        info!(
            "account {} opened for user {}",
            account.account_number, account.user_id
        );
        Ok((
            format!("Account {} created successfully", account.account_number),
            account,
        ))
    }

    pub async fn get_account(&self, caller: &User, account_id: &str) -> ApiResult<Account> {
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;
        Ok(account)
    }

    /// Patch mutable account fields. Balance, status and the account number
    /// are not reachable from here.
    pub async fn update_account(
        &self,
        caller: &User,
        account_id: &str,
        req: UpdateAccountRequest,
    ) -> ApiResult<(String, Account)> {
        let interest_rate = normalize_interest_rate(req.interest_rate)?;
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        let updated = self
            .accounts
            .update(
                account_id,
                &AccountChanges {
                    account_type: req.account_type,
                    currency: req.currency,
                    overdraft_limit: req.overdraft_limit,
                    interest_rate,
                    status: None,
                },
            )
            .await?;

        Ok((
            format!("Account {} updated successfully", updated.account_number),
            updated,
        ))
    }

    /// Hard delete. Ledger rows referencing the account keep their history
    /// with the account id nulled out.
    pub async fn delete_account(&self, caller: &User, account_id: &str) -> ApiResult<()> {
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        self.accounts.delete(account_id).await?;
        info!("account {} deleted", account.account_number);
        Ok(())
    }

    /// Soft delete: flip the status to closed. Already-closed accounts close
    /// again without complaint.
    pub async fn close_account(
        &self,
        caller: &User,
        account_id: &str,
    ) -> ApiResult<(String, Account)> {
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        let closed = self
            .accounts
            .update(
                account_id,
                &AccountChanges {
                    status: Some(AccountStatus::Closed),
                    ..Default::default()
                },
            )
            .await?;

        info!("account {} closed", closed.account_number);
        Ok((
            format!("Account {} closed successfully", closed.account_number),
            closed,
        ))
    }

    pub async fn balance(&self, caller: &User, account_id: &str) -> ApiResult<BalanceResponse> {
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        Ok(BalanceResponse {
            account_id: account.id,
            account_number: account.account_number,
            balance: account.balance,
            currency: account.currency,
            last_updated: account.updated_at,
        })
    }

    /// Recent activity in both directions, newest first. The date range is
    /// validated and echoed back; opening and closing balances are both the
    /// current balance.
    pub async fn statement(
        &self,
        caller: &User,
        account_id: &str,
        start_date: &str,
        end_date: &str,
    ) -> ApiResult<StatementResponse> {
        let account = self.accounts.get_or_fail(account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        let start = parse_statement_date(start_date)?;
        let end = parse_statement_date(end_date)?;

        let transactions = self
            .transactions
            .list_for_account(&account.id, STATEMENT_ROW_LIMIT)
            .await?;

        Ok(StatementResponse {
            account_id: account.id,
            account_number: account.account_number,
            start_date: start.to_string(),
            end_date: end.to_string(),
            opening_balance: account.balance,
            closing_balance: account.balance,
            transactions,
        })
    }
}

fn parse_statement_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::Validation("Invalid date format. Use YYYY-MM-DD".to_string()))
}

/// Rates above 1 are read as percentages. After normalization anything at or
/// above 10 (a thousand percent) is refused.
fn normalize_interest_rate(rate: Option<Decimal>) -> ApiResult<Option<Decimal>> {
    let Some(mut rate) = rate else {
        return Ok(None);
    };
    if rate > Decimal::ONE {
        rate /= Decimal::ONE_HUNDRED;
    }
    if rate >= Decimal::TEN {
        return Err(ApiError::Validation(
            "Interest rate must be less than 1000%".to_string(),
        ));
    }
    Ok(Some(rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AccountType, Role};
    use crate::storage::users::{NewUser, UserRepository};
    use rust_decimal_macros::dec;

    async fn setup() -> (AccountService, Db, User, User) {
        let db = Db::init_test().await.expect("Failed to create test database");
        let users = UserRepository::new(db.clone());
        let customer = users
            .create(NewUser {
                email: "ada@example.com".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                phone_number: "+15550100".to_string(),
                date_of_birth: None,
                address: None,
                role: Role::Customer,
                is_active: true,
                hashed_password: "hash".to_string(),
            })
            .await
            .unwrap();
        let admin = users
            .create(NewUser {
                email: "root@example.com".to_string(),
                first_name: "Root".to_string(),
                last_name: "Admin".to_string(),
                phone_number: "+15550999".to_string(),
                date_of_birth: None,
                address: None,
                role: Role::Admin,
                is_active: true,
                hashed_password: "hash".to_string(),
            })
            .await
            .unwrap();
        (AccountService::new(db.clone()), db, customer, admin)
    }

    fn create_request(user_id: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            user_id: user_id.to_string(),
            account_type: AccountType::Checking,
            currency: "USD".to_string(),
            balance: None,
            overdraft_limit: None,
            interest_rate: None,
        }
    }

    #[tokio::test]
    async fn customers_create_accounts_only_for_themselves() {
        let (service, _db, customer, admin) = setup().await;

        let err = service
            .create_account(&customer, create_request(&admin.id))
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "You can only create accounts for yourself");

        // Admins can open accounts on anyone's behalf.
        let (detail, account) = service
            .create_account(&admin, create_request(&customer.id))
            .await
            .unwrap();
        assert_eq!(account.user_id, customer.id);
        assert!(detail.ends_with("created successfully"));
        assert_eq!(account.account_number.len(), 12);
    }

    #[tokio::test]
    async fn requested_opening_balance_is_ignored() {
        let (service, _db, customer, _) = setup().await;
        let mut req = create_request(&customer.id);
        req.balance = Some(dec!(9999.99));

        let (_, account) = service.create_account(&customer, req).await.unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn interest_rates_above_one_are_percentages() {
        let (service, _db, customer, _) = setup().await;
        let mut req = create_request(&customer.id);
        req.account_type = AccountType::Savings;
        req.interest_rate = Some(dec!(5));

        let (_, account) = service.create_account(&customer, req).await.unwrap();
        assert_eq!(account.interest_rate, Some(dec!(0.05)));

        let mut absurd = create_request(&customer.id);
        absurd.interest_rate = Some(dec!(1000));
        let err = service
            .create_account(&customer, absurd)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Interest rate must be less than 1000%");
    }

    #[tokio::test]
    async fn ownership_is_enforced_on_reads() {
        let (service, db, customer, admin) = setup().await;
        let users = UserRepository::new(db);
        let other = users
            .create(NewUser {
                email: "eve@example.com".to_string(),
                first_name: "Eve".to_string(),
                last_name: "Nosy".to_string(),
                phone_number: "+15550111".to_string(),
                date_of_birth: None,
                address: None,
                role: Role::Customer,
                is_active: true,
                hashed_password: "hash".to_string(),
            })
            .await
            .unwrap();

        let (_, account) = service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();

        let err = service.get_account(&other, &account.id).await.unwrap_err();
        assert_eq!(err.detail(), "Access denied to this account");
        assert!(service.get_account(&admin, &account.id).await.is_ok());
        assert!(service.get_account(&customer, &account.id).await.is_ok());
    }

    #[tokio::test]
    async fn listing_scopes_to_the_caller() {
        let (service, db, customer, admin) = setup().await;
        let users = UserRepository::new(db);
        let other = users
            .create(NewUser {
                email: "eve@example.com".to_string(),
                first_name: "Eve".to_string(),
                last_name: "Other".to_string(),
                phone_number: "+15550111".to_string(),
                date_of_birth: None,
                address: None,
                role: Role::Customer,
                is_active: true,
                hashed_password: "hash".to_string(),
            })
            .await
            .unwrap();

        service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();
        service
            .create_account(&other, create_request(&other.id))
            .await
            .unwrap();

        let mine = service
            .list_accounts(&customer, PageParams::default())
            .await
            .unwrap();
        assert_eq!(mine.total_count, 1);
        assert!(mine.data.iter().all(|a| a.user_id == customer.id));

        let all = service
            .list_accounts(&admin, PageParams::default())
            .await
            .unwrap();
        assert_eq!(all.total_count, 2);
        assert_eq!(all.total_pages, 1);
    }

    #[tokio::test]
    async fn close_is_a_soft_delete_and_idempotent() {
        let (service, _db, customer, _) = setup().await;
        let (_, account) = service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();

        let (detail, closed) = service
            .close_account(&customer, &account.id)
            .await
            .unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
        assert!(detail.ends_with("closed successfully"));

        // Closing twice is not an error.
        let (_, still_closed) = service
            .close_account(&customer, &account.id)
            .await
            .unwrap();
        assert_eq!(still_closed.status, AccountStatus::Closed);

        // The row is still there for reads.
        assert!(service.get_account(&customer, &account.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let (service, _db, customer, _) = setup().await;
        let (_, account) = service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();

        service
            .delete_account(&customer, &account.id)
            .await
            .unwrap();
        let err = service
            .get_account(&customer, &account.id)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), format!("Account with ID {} not found", account.id));
    }

    #[tokio::test]
    async fn balance_snapshot_reflects_the_account() {
        let (service, _db, customer, _) = setup().await;
        let (_, account) = service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();

        let snapshot = service.balance(&customer, &account.id).await.unwrap();
        assert_eq!(snapshot.account_id, account.id);
        assert_eq!(snapshot.account_number, account.account_number);
        assert_eq!(snapshot.balance, Decimal::ZERO);
        assert_eq!(snapshot.currency, "USD");
    }

    #[tokio::test]
    async fn statement_validates_and_echoes_the_range() {
        let (service, _db, customer, _) = setup().await;
        let (_, account) = service
            .create_account(&customer, create_request(&customer.id))
            .await
            .unwrap();

        let err = service
            .statement(&customer, &account.id, "2026-13-01", "2026-01-31")
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Invalid date format. Use YYYY-MM-DD");

        let statement = service
            .statement(&customer, &account.id, "2026-01-01", "2026-01-31")
            .await
            .unwrap();
        assert_eq!(statement.start_date, "2026-01-01");
        assert_eq!(statement.end_date, "2026-01-31");
        assert_eq!(statement.opening_balance, statement.closing_balance);
        assert!(statement.transactions.is_empty());
    }
}
