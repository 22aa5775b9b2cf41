//! Outbound email delivery over SMTP.
//!
//! ## Key Responsibilities
//! - Render HTML bodies from embedded Handlebars templates
//! - Build and send messages through a shared [`SmtpTransport`] pool
//! - Degrade to a no-op when SMTP is not configured, so local
//!   development works without a relay
//!
//! ## Design Notes
//! Sends are synchronous in `lettre`, so they run on the blocking pool.
//! Activation codes are the only send a request handler waits on; all
//! other mail goes through the notification worker via [`EmailSink`].

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::notifier::{NotificationEvent, NotificationSink};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "registration_verification",
        include_str!("email/templates/registration_verification.hbs"),
    ),
    (
        "password_reset",
        include_str!("email/templates/password_reset.hbs"),
    ),
    ("welcome", include_str!("email/templates/welcome.hbs")),
    (
        "transaction_notification",
        include_str!("email/templates/transaction_notification.hbs"),
    ),
];

/// Sends transactional email. Cheap to clone; the transport pool and the
/// compiled templates are shared.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<SmtpTransport>,
    from: Mailbox,
    frontend_url: String,
    templates: Arc<Handlebars<'static>>,
}

impl Mailer {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut templates = Handlebars::new();
        for (name, source) in TEMPLATES {
            templates
                .register_template_string(name, source)
                .with_context(|| format!("invalid email template {name}"))?;
        }

        let from = config
            .email_from
            .parse::<Mailbox>()
            .context("EMAIL_FROM is not a valid mailbox")?;

        let transport = match &config.smtp_host {
            Some(host) => {
                let mut builder = SmtpTransport::relay(host)
                    .with_context(|| format!("invalid SMTP relay host {host}"))?;
                if let (Some(user), Some(pass)) =
                    (&config.smtp_username, &config.smtp_password)
                {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                Some(builder.build())
            }
            None => {
                warn!("SMTP_HOST not set; outbound email is disabled");
                None
            }
        };

        Ok(Self {
            transport,
            from,
            frontend_url: config.frontend_url.clone(),
            templates: Arc::new(templates),
        })
    }

    /// Activation code for a freshly registered (or re-requested) account.
    pub async fn send_verification_code(
        &self,
        to: &str,
        name: &str,
        code: &str,
    ) -> anyhow::Result<()> {
        let body = self.render(
            "registration_verification",
            &json!({
                "verify_code": code,
                "recipient_email": to,
                "name": name,
            }),
        )?;
        self.dispatch(to, "Account Activation", body).await
    }

    /// Password reset code. The caller already decided the user exists.
    pub async fn send_password_reset_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let body = self.render(
            "password_reset",
            &json!({
                "reset_code": code,
                "recipient_email": to,
            }),
        )?;
        self.dispatch(to, "Password Reset", body).await
    }

    /// Welcome note after the account is activated.
    pub async fn send_welcome(
        &self,
        to: &str,
        first_name: &str,
        last_name: &str,
        account_type: &str,
        joined_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let body = self.render(
            "welcome",
            &json!({
                "recipient_email": to,
                "first_name": first_name,
                "last_name": last_name,
                "email": to,
                "account_type": account_type,
                "join_date": joined_at.format("%B %d, %Y").to_string(),
                "dashboard_url": format!("{}/dashboard", self.frontend_url),
            }),
        )?;
        self.dispatch(to, "Welcome aboard!", body).await
    }

    /// Receipt for a completed deposit, withdrawal or transfer.
    pub async fn send_transaction_notification(
        &self,
        event: &NotificationEvent,
    ) -> anyhow::Result<()> {
        let NotificationEvent::TransactionCompleted {
            email,
            name,
            transaction_type,
            reference_number,
            amount,
            currency,
            account_number,
            balance_after,
            description,
            from_account_last4,
            to_account_last4,
            occurred_at,
        } = event;

        let body = self.render(
            "transaction_notification",
            &json!({
                "recipient_email": email,
                "name": name,
                "transaction_type": transaction_type,
                "reference_number": reference_number,
                "amount": amount.to_string(),
                "currency": currency,
                "account_number": account_number,
                "balance_after": balance_after.to_string(),
                "transaction_date": occurred_at.format("%B %d, %Y at %I:%M %p").to_string(),
                "description": description,
                "from_account_last4": from_account_last4,
                "to_account_last4": to_account_last4,
                "dashboard_url": format!("{}/dashboard", self.frontend_url),
            }),
        )?;
        let subject = format!("Transaction Completed - {}", title_case(transaction_type));
        self.dispatch(email, &subject, body).await
    }

    fn render(&self, template: &str, data: &serde_json::Value) -> anyhow::Result<String> {
        self.templates
            .render(template, data)
            .with_context(|| format!("failed to render email template {template}"))
    }

    async fn dispatch(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()> {
        let Some(transport) = self.transport.clone() else {
            debug!(to, subject, "SMTP not configured; dropping outbound email");
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse::<Mailbox>()
                .with_context(|| format!("invalid recipient address {to}"))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .context("failed to build email message")?;

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("email delivery task failed")?
            .context("SMTP delivery failed")?;

        Ok(())
    }
}

/// Sink that turns completed-transaction events into receipt emails.
pub struct EmailSink {
    mailer: Mailer,
}

impl EmailSink {
    pub fn new(mailer: Mailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    async fn deliver(&self, event: NotificationEvent) -> anyhow::Result<()> {
        match &event {
            NotificationEvent::TransactionCompleted { .. } => {
                self.mailer.send_transaction_notification(&event).await
            }
        }
    }
}

/// Title-cases each word: `DEPOSIT` becomes `Deposit`, `mary jane` becomes
/// `Mary Jane`. Used for subjects and greeting names.
pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
