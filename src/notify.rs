//! Fire-and-forget email notifications.
//!
//! Request handlers call [`Notifier::enqueue`], which never blocks and never fails from
//! the caller's point of view. A single background worker drains the queue and hands
//! each rendered message to a [`Mailer`]. Delivery failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::config::MailConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PasswordReset,
    EmailConfirmation,
    OrderStatus,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PasswordReset => "password_reset",
            NotificationKind::EmailConfirmation => "email_confirmation",
            NotificationKind::OrderStatus => "order_status",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            NotificationKind::PasswordReset => "Password Reset Token",
            NotificationKind::EmailConfirmation => "Email Confirmation Token",
            NotificationKind::OrderStatus => "Order Status Update",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn render(&self) -> OutgoingEmail {
        let body = match self.kind {
            NotificationKind::PasswordReset | NotificationKind::EmailConfirmation => self
                .payload
                .get("token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            NotificationKind::OrderStatus => {
                let order = self.payload.get("order_id").and_then(Value::as_str);
                let state = self.payload.get("state").and_then(Value::as_str);
                match (order, state) {
                    (Some(order), Some(state)) => format!("Your order {order} is now {state}."),
                    _ => "Your order has been processed".to_string(),
                }
            }
        };

        OutgoingEmail {
            to: self.recipient.clone(),
            subject: self.kind.subject().to_string(),
            body,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()>;

    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.body, "email (not sent)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, config: &MailConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;
        self.transport.send(message).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

pub fn mailer_from_config(config: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match &config.smtp_host {
        Some(host) => Ok(Arc::new(SmtpMailer::new(host, config)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Queue without a worker attached. The receiver is handed back to the caller.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue drained by a background worker on the current tokio runtime.
    pub fn spawn(mailer: Arc<dyn Mailer>, capacity: usize) -> Self {
        let (notifier, receiver) = Self::channel(capacity);
        tokio::spawn(run_worker(receiver, mailer));
        notifier
    }

    pub fn enqueue(&self, kind: NotificationKind, recipient: &str, payload: Value) {
        let notification = Notification {
            kind,
            recipient: recipient.to_string(),
            payload,
        };
        match self.sender.try_send(notification) {
            Ok(()) => tracing::debug!(kind = kind.as_str(), recipient, "notification queued"),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(kind = kind.as_str(), recipient, "notification queue full, dropping")
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(kind = kind.as_str(), recipient, "notification worker gone, dropping")
            }
        }
    }
}

pub async fn run_worker(mut receiver: mpsc::Receiver<Notification>, mailer: Arc<dyn Mailer>) {
    tracing::info!(mailer = mailer.name(), "notification worker started");
    while let Some(notification) = receiver.recv().await {
        let email = notification.render();
        if let Err(err) = mailer.send(&email).await {
            tracing::warn!(
                error = %err,
                kind = notification.kind.as_str(),
                to = %email.to,
                "email delivery failed"
            );
        }
    }
    tracing::info!("notification worker stopped");
}
