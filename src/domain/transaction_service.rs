//! Money movement: deposits, withdrawals, transfers and reversals.
//!
//! ## Key Responsibilities
//! - Authorize the caller against the accounts involved
//! - Build a validated posting plan and hand it to the ledger repository,
//!   which executes it atomically
//! - Publish completed-transaction events for the notification worker
//!
//! ## Business Rules
//! - Customers move money only through accounts they own; admins through any
//! - Only admins reverse, and only completed transactions can be reversed
//! - A reversal never re-checks funds on the account it debits; if the
//!   recipient already spent the money their balance goes negative
//! - Notifications are handed off after commit and never fail the request

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::auth::authorize;
use crate::domain::ledger;
use crate::domain::models::{
    Account, DepositRequest, Paginated, ReverseRequest, Transaction, TransferRequest, User,
    WithdrawRequest,
};
use crate::domain::notifier::{NotificationEvent, Notifier};
use crate::email::title_case;
use crate::errors::ApiResult;
use crate::storage::accounts::AccountRepository;
use crate::storage::transactions::{TransactionFilter, TransactionRepository};
use crate::storage::users::UserRepository;
use crate::storage::{Db, PageParams};

/// How many of a customer's accounts the unscoped listing considers.
const USER_ACCOUNTS_LIMIT: i64 = 100;

/// Service for posting and querying transactions
#[derive(Clone)]
pub struct TransactionService {
    users: UserRepository,
    accounts: AccountRepository,
    transactions: TransactionRepository,
    notifier: Notifier,
}

impl TransactionService {
    pub fn new(db: Db, notifier: Notifier) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            accounts: AccountRepository::new(db.clone()),
            transactions: TransactionRepository::new(db),
            notifier,
        }
    }

    pub async fn deposit(
        &self,
        caller: &User,
        req: DepositRequest,
    ) -> ApiResult<(String, Transaction)> {
        let account = self.accounts.get_or_fail(&req.account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        let plan = ledger::deposit_plan(&account, req.amount, req.description)?;
        let transaction = self.transactions.post(&plan).await?;

        self.notify_holder(
            &account,
            &transaction,
            transaction.balance_after.unwrap_or(account.balance),
            transaction.description.clone().unwrap_or_default(),
            None,
        )
        .await;

        info!(
            "deposit {} posted to account {}",
            transaction.reference_number, account.account_number
        );
        Ok((
            format!(
                "Deposit of {} {} completed successfully",
                transaction.amount, account.currency
            ),
            transaction,
        ))
    }

    pub async fn withdraw(
        &self,
        caller: &User,
        req: WithdrawRequest,
    ) -> ApiResult<(String, Transaction)> {
        let account = self.accounts.get_or_fail(&req.account_id).await?;
        authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;

        let plan = ledger::withdrawal_plan(&account, req.amount, req.description)?;
        let transaction = self.transactions.post(&plan).await?;

        self.notify_holder(
            &account,
            &transaction,
            transaction.balance_after.unwrap_or(account.balance),
            transaction.description.clone().unwrap_or_default(),
            None,
        )
        .await;

        info!(
            "withdrawal {} posted to account {}",
            transaction.reference_number, account.account_number
        );
        Ok((
            format!(
                "Withdrawal of {} {} completed successfully",
                transaction.amount, account.currency
            ),
            transaction,
        ))
    }

    /// Both holders are notified when the accounts belong to different
    /// users; the recipient's receipt shows their own balance.
    pub async fn transfer(
        &self,
        caller: &User,
        req: TransferRequest,
    ) -> ApiResult<(String, Transaction)> {
        let from = self.accounts.get_or_fail(&req.from_account_id).await?;
        let to = self.accounts.get_or_fail(&req.to_account_id).await?;
        authorize(caller, Some(from.user_id.as_str()), "Access denied to source account")?;

        let plan = ledger::transfer_plan(&from, &to, req.amount, req.description.clone())?;
        let transaction = self.transactions.post(&plan).await?;

        let last4_pair = (last4(&from.account_number), last4(&to.account_number));
        self.notify_holder(
            &from,
            &transaction,
            transaction.balance_after.unwrap_or(from.balance),
            transaction.description.clone().unwrap_or_default(),
            Some(last4_pair.clone()),
        )
        .await;

        if to.user_id != from.user_id {
            match self.accounts.get(&to.id).await {
                Ok(Some(fresh_to)) => {
                    let received = format!(
                        "Received transfer: {}",
                        req.description.unwrap_or_else(|| "Transfer".to_string())
                    );
                    self.notify_holder(
                        &fresh_to,
                        &transaction,
                        fresh_to.balance,
                        received,
                        Some(last4_pair),
                    )
                    .await;
                }
                Ok(None) => {}
                Err(err) => warn!("skipping recipient notification: {err}"),
            }
        }

        info!(
            "transfer {} posted: {} -> {}",
            transaction.reference_number, from.account_number, to.account_number
        );
        Ok((
            format!(
                "Transfer of {} {} completed successfully",
                transaction.amount, from.currency
            ),
            transaction,
        ))
    }

    /// With an account id: that account's activity, after an ownership
    /// check. Without one: everything touching the caller's accounts, or the
    /// whole ledger for admins.
    pub async fn list_transactions(
        &self,
        caller: &User,
        account_id: Option<&str>,
        page: PageParams,
    ) -> ApiResult<Paginated<Transaction>> {
        let params = page.clamped();

        let filter = if let Some(account_id) = account_id {
            let account = self.accounts.get_or_fail(account_id).await?;
            authorize(caller, Some(account.user_id.as_str()), "Access denied to this account")?;
            TransactionFilter {
                account_id: Some(account.id),
                ..Default::default()
            }
        } else if caller.is_admin() {
            TransactionFilter::default()
        } else {
            let account_ids = self
                .accounts
                .ids_for_user(&caller.id, USER_ACCOUNTS_LIMIT)
                .await?;
            if account_ids.is_empty() {
                return Ok(Paginated::new(Vec::new(), 0, params.page, params.per_page));
            }
            TransactionFilter {
                account_ids: Some(account_ids),
                ..Default::default()
            }
        };

        let result = self.transactions.list(&filter, &params).await?;
        Ok(Paginated::new(
            result.items,
            result.total_count,
            params.page,
            params.per_page,
        ))
    }

    /// Visible to admins and to anyone owning either side.
    pub async fn get_transaction(
        &self,
        caller: &User,
        transaction_id: &str,
    ) -> ApiResult<Transaction> {
        let transaction = self.transactions.get_or_fail(transaction_id).await?;

        let owner = if caller.is_admin() {
            None
        } else {
            self.owned_side(caller, &transaction).await?
        };
        authorize(caller, owner.as_deref(), "Access denied to this transaction")?;

        Ok(transaction)
    }

    /// Post the mirror transaction and flip the original to reversed, as one
    /// atomic unit. Returns the refreshed original alongside the reversal.
    pub async fn reverse_transaction(
        &self,
        caller: &User,
        transaction_id: &str,
        req: ReverseRequest,
    ) -> ApiResult<(String, Transaction, Transaction)> {
        authorize(caller, None, "Only admins can reverse transactions")?;

        let original = self.transactions.get_or_fail(transaction_id).await?;
        let plan = ledger::reversal_plan(&original, req.reason)?;
        let reversal = self.transactions.post(&plan).await?;
        let original = self.transactions.get_or_fail(transaction_id).await?;

        info!(
            "transaction {} reversed as {}",
            original.reference_number, reversal.reference_number
        );
        Ok((
            format!(
                "Transaction {} reversed successfully",
                original.reference_number
            ),
            original,
            reversal,
        ))
    }

    /// Returns the caller's id when they own either side of the row.
    async fn owned_side(
        &self,
        caller: &User,
        transaction: &Transaction,
    ) -> ApiResult<Option<String>> {
        for account_id in [&transaction.from_account_id, &transaction.to_account_id]
            .into_iter()
            .flatten()
        {
            if let Some(account) = self.accounts.get(account_id).await? {
                if account.user_id == caller.id {
                    return Ok(Some(account.user_id));
                }
            }
        }
        Ok(None)
    }

    /// Publish a completed-transaction event for the account's holder.
    /// Failures are logged and swallowed; the money already moved.
    async fn notify_holder(
        &self,
        account: &Account,
        transaction: &Transaction,
        balance_after: Decimal,
        description: String,
        counterparty_last4: Option<(String, String)>,
    ) {
        let holder = match self.users.get(&account.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(err) => {
                warn!("skipping notification, holder lookup failed: {err}");
                return;
            }
        };

        let (from_account_last4, to_account_last4) = match counterparty_last4 {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };

        self.notifier.publish(NotificationEvent::TransactionCompleted {
            email: holder.email,
            name: title_case(&holder.first_name),
            transaction_type: transaction.transaction_type.as_str().to_uppercase(),
            reference_number: transaction.reference_number.clone(),
            amount: transaction.amount,
            currency: account.currency.clone(),
            account_number: account.account_number.clone(),
            balance_after,
            description,
            from_account_last4,
            to_account_last4,
            occurred_at: Utc::now(),
        });
    }
}

fn last4(account_number: &str) -> String {
    let start = account_number.len().saturating_sub(4);
    account_number[start..].to_string()
}
