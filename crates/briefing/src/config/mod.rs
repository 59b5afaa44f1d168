//! Per-user briefing configuration.
//!
//! One [`BriefingConfig`] exists per user. It is created implicitly on the
//! first save, merged with [`ConfigPatch`] updates afterwards, and never
//! deleted by the service itself.

mod schedule;
mod secret;

pub use schedule::{
    is_due, next_run, reference_timezone, ScheduleFrequency, ScheduleTime,
    REFERENCE_UTC_OFFSET_SECS, WEEKLY_DELIVERY_DAY,
};
pub use secret::SecretString;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating or updating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// One or more required credential fields are empty.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// `scheduleTime` is not a valid `HH:MM` value.
    #[error("invalid schedule time '{0}', expected HH:MM")]
    InvalidScheduleTime(String),

    /// `scheduleFrequency` is not one of `daily`, `weekly`, `none`.
    #[error("invalid schedule frequency '{0}', expected daily, weekly, or none")]
    InvalidFrequency(String),
}

/// Settings controlling generation and delivery for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BriefingConfig {
    /// Credential for the generative service.
    #[serde(alias = "geminiApiKey")]
    pub api_key: SecretString,
    /// Gmail address the briefing is sent from.
    pub sender_email: String,
    /// App password for `sender_email`.
    #[serde(alias = "appPassword")]
    pub sender_app_password: SecretString,
    /// Delivery target.
    pub receiver_email: String,
    /// Topics to search for. Order only affects prompt readability.
    pub keywords: Vec<String>,
    /// Preferred outlets or URLs.
    pub sources: Vec<String>,
    /// Delivery time in the reference timezone.
    pub schedule_time: ScheduleTime,
    #[serde(alias = "scheduleDay")]
    pub schedule_frequency: ScheduleFrequency,
}

impl BriefingConfig {
    /// Check that every credential needed for a run is present.
    ///
    /// Keywords and sources may be empty; the prompt falls back to a
    /// generic request in that case.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.api_key.is_blank() {
            missing.push("apiKey");
        }
        if self.sender_email.trim().is_empty() {
            missing.push("senderEmail");
        }
        if self.sender_app_password.is_blank() {
            missing.push("senderAppPassword");
        }
        if self.receiver_email.trim().is_empty() {
            missing.push("receiverEmail");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFields(missing))
        }
    }

    /// Apply a partial update. Absent fields keep their current value.
    #[must_use]
    pub fn merge(mut self, patch: ConfigPatch) -> Self {
        if let Some(v) = patch.api_key {
            self.api_key = v;
        }
        if let Some(v) = patch.sender_email {
            self.sender_email = v.trim().to_string();
        }
        if let Some(v) = patch.sender_app_password {
            self.sender_app_password = v;
        }
        if let Some(v) = patch.receiver_email {
            self.receiver_email = v.trim().to_string();
        }
        if let Some(v) = patch.keywords {
            self.keywords = normalize_list(v);
        }
        if let Some(v) = patch.sources {
            self.sources = normalize_list(v);
        }
        if let Some(v) = patch.schedule_time {
            self.schedule_time = v;
        }
        if let Some(v) = patch.schedule_frequency {
            self.schedule_frequency = v;
        }
        self
    }

    /// Whether the cron trigger should run this user's job at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        is_due(self.schedule_frequency, self.schedule_time, now)
    }

    /// A view that is safe to return over HTTP or print.
    #[must_use]
    pub fn redacted(&self, now: DateTime<Utc>) -> ConfigView {
        ConfigView {
            has_api_key: !self.api_key.is_blank(),
            sender_email: self.sender_email.clone(),
            has_sender_app_password: !self.sender_app_password.is_blank(),
            receiver_email: self.receiver_email.clone(),
            keywords: self.keywords.clone(),
            sources: self.sources.clone(),
            schedule_time: self.schedule_time,
            schedule_frequency: self.schedule_frequency,
            next_run: next_run(self.schedule_frequency, self.schedule_time, now)
                .map(|t| t.to_rfc3339()),
        }
    }
}

/// A partial configuration update, merged onto the stored config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, alias = "geminiApiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    #[serde(default, alias = "appPassword", skip_serializing_if = "Option::is_none")]
    pub sender_app_password: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<ScheduleTime>,
    #[serde(default, alias = "scheduleDay", skip_serializing_if = "Option::is_none")]
    pub schedule_frequency: Option<ScheduleFrequency>,
}

impl ConfigPatch {
    /// True when the patch would not change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.sender_email.is_none()
            && self.sender_app_password.is_none()
            && self.receiver_email.is_none()
            && self.keywords.is_none()
            && self.sources.is_none()
            && self.schedule_time.is_none()
            && self.schedule_frequency.is_none()
    }
}

impl From<BriefingConfig> for ConfigPatch {
    fn from(config: BriefingConfig) -> Self {
        Self {
            api_key: Some(config.api_key),
            sender_email: Some(config.sender_email),
            sender_app_password: Some(config.sender_app_password),
            receiver_email: Some(config.receiver_email),
            keywords: Some(config.keywords),
            sources: Some(config.sources),
            schedule_time: Some(config.schedule_time),
            schedule_frequency: Some(config.schedule_frequency),
        }
    }
}

/// Redacted rendering of a [`BriefingConfig`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub has_api_key: bool,
    pub sender_email: String,
    pub has_sender_app_password: bool,
    pub receiver_email: String,
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
    pub schedule_time: ScheduleTime,
    pub schedule_frequency: ScheduleFrequency,
    /// Next automatic delivery (RFC 3339, reference timezone).
    pub next_run: Option<String>,
}

/// Trim entries, drop blanks, and remove duplicates while keeping order.
fn normalize_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}
