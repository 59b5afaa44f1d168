//! Briefing delivery.

mod email;

pub use email::{subject_for, EmailSettings, SmtpNotifier, DEFAULT_SENDER_NAME, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BriefingConfig;

/// Errors while composing or sending a briefing email.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A configured address could not be parsed.
    #[error("invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    /// The message could not be assembled.
    #[error("failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),

    /// Connection, TLS, or authentication failure against the SMTP server.
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Sends a generated briefing to the user's receiver address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `html` verbatim as the message body.
    async fn send(&self, config: &BriefingConfig, html: &str) -> Result<(), DeliveryError>;
}
