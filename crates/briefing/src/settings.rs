//! Service-wide settings and wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::SecretString;
use crate::generator::{
    GeminiGenerator, PromptOptions, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
};
use crate::job::{BriefingJob, DEFAULT_MAX_CONCURRENCY};
use crate::notifier::{EmailSettings, SmtpNotifier};
use crate::store::{CryptoError, FileConfigStore, SecretCipher};

/// Default location of the config document.
pub const DEFAULT_STORE_PATH: &str = "data/briefing-configs.json";

/// Default listen address for the trigger server.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default generation request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("BRIEFING_ENCRYPTION_KEY is not set (generate one with `briefing keygen`)")]
    MissingEncryptionKey,

    #[error("invalid encryption key: {0}")]
    InvalidEncryptionKey(#[from] CryptoError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Settings shared by every user's job.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// JSON document holding all user configs.
    pub store_path: PathBuf,
    /// Hex AES-256 key for credentials at rest.
    pub encryption_key: Option<SecretString>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub request_timeout: Duration,
    pub prompt: PromptOptions,
    pub email: EmailSettings,
    /// Jobs run at once by batch triggers.
    pub max_concurrency: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            encryption_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            prompt: PromptOptions::default(),
            email: EmailSettings::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ServiceSettings {
    /// Open the encrypted file store.
    pub fn open_store(&self) -> Result<FileConfigStore, SettingsError> {
        let key = self
            .encryption_key
            .as_ref()
            .filter(|k| !k.is_blank())
            .ok_or(SettingsError::MissingEncryptionKey)?;
        let cipher = SecretCipher::from_hex_key(key.expose())?;
        Ok(FileConfigStore::new(self.store_path.clone(), cipher))
    }

    /// Build the production generator.
    pub fn generator(&self) -> Result<GeminiGenerator, SettingsError> {
        Ok(GeminiGenerator::new(self.prompt.clone(), self.request_timeout)?
            .with_base_url(self.gemini_base_url.clone())
            .with_model(self.gemini_model.clone()))
    }

    /// Wire store, generator, and notifier into a job runner.
    pub fn build_job(&self) -> Result<BriefingJob, SettingsError> {
        let store = self.open_store()?;
        let generator = self.generator()?;
        let notifier = SmtpNotifier::new(self.email.clone());

        tracing::debug!(
            store = %self.store_path.display(),
            model = %self.gemini_model,
            smtp_host = %self.email.smtp_host,
            max_concurrency = self.max_concurrency,
            "Service configured"
        );

        Ok(BriefingJob::new(Arc::new(store), Arc::new(generator), Arc::new(notifier))
            .with_max_concurrency(self.max_concurrency))
    }
}
