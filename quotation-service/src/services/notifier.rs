//! Outbound notifications.
//!
//! The `Notifier` trait is the seam between lifecycle logic and delivery.
//! Production uses SMTP via lettre; tests use `MockNotifier`, which records
//! every message for assertion.

use crate::config::SmtpSettings;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

/// What kind of lifecycle message is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    QuotationSent,
    Reminder,
    FollowUp,
    ResponseReceived,
    Escalation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::QuotationSent => "quotation_sent",
            NotificationKind::Reminder => "reminder",
            NotificationKind::FollowUp => "follow_up",
            NotificationKind::ResponseReceived => "response_received",
            NotificationKind::Escalation => "escalation",
        }
    }
}

/// A rendered outbound message.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), AppError>;
}

pub struct SmtpNotifier {
    settings: SmtpSettings,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Result<Self, AppError> {
        let creds = Credentials::new(settings.user.clone(), settings.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(settings.port)
            .credentials(creds)
            .build();

        Ok(Self {
            settings,
            transport,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        let from_mailbox: Mailbox = format!(
            "{} <{}>",
            self.settings.from_name, self.settings.from_email
        )
        .parse()
        .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = notification
            .to
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&notification.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        info!(
            to = %notification.to,
            kind = notification.kind.as_str(),
            "Notification sent"
        );

        Ok(())
    }
}

/// Records notifications instead of delivering them.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_next: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Make the next send fail instead of recording.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::EmailError("mock delivery failure".to_string()));
        }
        info!(
            to = %notification.to,
            kind = notification.kind.as_str(),
            "[MOCK] Notification would be sent"
        );
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
