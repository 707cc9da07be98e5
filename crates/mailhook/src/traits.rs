//! Mail sender trait definition and shared error types.

use crate::config::{Party, SmtpConfig};

/// Errors that can occur while turning a hook call into a delivered email.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template rendering failed: {0}")]
    Template(#[from] RenderError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("mail plug-in is not configured")]
    Unconfigured,
}

/// A template could not be expanded with the supplied parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("undefined placeholder '{name}'")]
    Undefined { name: String },

    #[error("invalid template at byte {position}: {message}")]
    Syntax { position: usize, message: String },
}

/// Why an SMTP delivery attempt failed.
///
/// Every variant carries the underlying cause as text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("cannot build message: {0}")]
    Message(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notification {
    /// The rendered subject line.
    pub subject: String,
    /// The rendered plain-text body.
    pub body: String,
}

/// Capability that delivers one message to one recipient.
///
/// Implementations open their own connection per call and release it
/// before returning, whatever the outcome.
#[async_trait::async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver `message` from `from` to `to` through the given SMTP server.
    async fn send(
        &self,
        message: &Notification,
        from: &Party,
        to: &Party,
        smtp: &SmtpConfig,
    ) -> Result<(), DeliveryError>;

    /// Human-readable name for this sender (e.g., "smtp").
    fn name(&self) -> &str;
}
