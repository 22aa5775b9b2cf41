//! Completed-transaction notifications as an explicit event hand-off.
//!
//! Money movement never waits on email. Services publish a
//! [`NotificationEvent`] onto an unbounded channel and return; a background
//! worker drains the channel into whatever [`NotificationSink`] was
//! installed. Delivery failures are logged, not surfaced, so the ledger's
//! success does not depend on an SMTP server's mood.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::warn;

/// What happened, with everything a sink needs to tell the customer.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    TransactionCompleted {
        email: String,
        /// Recipient's first name, title-cased for the greeting.
        name: String,
        /// Uppercase type label, e.g. `DEPOSIT`.
        transaction_type: String,
        reference_number: String,
        amount: Decimal,
        currency: String,
        account_number: String,
        balance_after: Decimal,
        description: String,
        /// Last four digits of the source account, set for transfers.
        from_account_last4: Option<String>,
        /// Last four digits of the destination account, set for transfers.
        to_account_last4: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

/// Where events end up. Production installs an SMTP-backed sink; tests
/// install one that records events for assertions.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Handle services publish through. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: UnboundedSender<NotificationEvent>,
}

impl Notifier {
    /// Starts the delivery worker and returns the publishing handle. The
    /// worker runs until every `Notifier` clone is dropped.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotificationEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = sink.deliver(event).await {
                    warn!("failed to deliver notification: {err:#}");
                }
            }
        });

        Self { tx }
    }

    /// Hands the event off. Never blocks and never fails the caller; if the
    /// worker is gone the event is dropped with a log line.
    pub fn publish(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            warn!("notification worker is gone; dropping event");
        }
    }
}
