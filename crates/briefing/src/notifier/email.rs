//! Email delivery over Gmail SMTP.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{DeliveryError, Notifier};
use crate::config::{reference_timezone, BriefingConfig};

/// Default Gmail SMTP host.
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Default Gmail SMTP port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Display name on the `From` header.
pub const DEFAULT_SENDER_NAME: &str = "AI News Briefing";

/// SMTP provider settings shared by every user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// Display name paired with each user's sender address.
    pub sender_name: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }
}

/// Subject line for a briefing delivered on `date`.
#[must_use]
pub fn subject_for(date: NaiveDate) -> String {
    format!("[Today's Briefing] {} News Summary", date.format("%Y-%m-%d"))
}

/// Delivers briefings through SMTP using each user's own credentials.
pub struct SmtpNotifier {
    settings: EmailSettings,
}

impl SmtpNotifier {
    #[must_use]
    pub const fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    /// Assemble the message for `config` without sending it.
    pub fn build_message(
        &self,
        config: &BriefingConfig,
        html: &str,
        date: NaiveDate,
    ) -> Result<Message, DeliveryError> {
        let from_address: Address =
            config
                .sender_email
                .trim()
                .parse()
                .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                    field: "sender",
                    reason: e.to_string(),
                })?;
        let to: Mailbox = config
            .receiver_email
            .trim()
            .parse()
            .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                field: "receiver",
                reason: e.to_string(),
            })?;
        let from = Mailbox::new(Some(self.settings.sender_name.clone()), from_address);

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject_for(date))
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        Ok(message)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, config: &BriefingConfig, html: &str) -> Result<(), DeliveryError> {
        let today = Utc::now().with_timezone(&reference_timezone()).date_naive();
        let email = self.build_message(config, html, today)?;

        let creds = Credentials::new(
            config.sender_email.trim().to_string(),
            config.sender_app_password.expose().to_string(),
        );

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_host)?
                .port(self.settings.smtp_port)
                .credentials(creds)
                .build();

        mailer.send(email).await?;

        tracing::info!(
            to = %config.receiver_email,
            smtp_host = %self.settings.smtp_host,
            "Briefing email sent"
        );

        Ok(())
    }
}
