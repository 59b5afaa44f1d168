//! JSON file configuration store with encrypted credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{check_user_id, ConfigStore, SecretCipher, StoreError};
use crate::config::{BriefingConfig, ConfigPatch, ScheduleFrequency, ScheduleTime, SecretString};

/// On-disk document holding every user's config.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    users: BTreeMap<String, StoredConfig>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// A config as persisted: credential fields hold hex ciphertext.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredConfig {
    api_key_encrypted: String,
    sender_email: String,
    sender_app_password_encrypted: String,
    receiver_email: String,
    keywords: Vec<String>,
    sources: Vec<String>,
    schedule_time: ScheduleTime,
    schedule_frequency: ScheduleFrequency,
}

/// Config store persisted as a single JSON document.
///
/// Every operation re-reads the file, so edits made by another process
/// between calls are picked up. Writes go to a sibling temp file and are
/// renamed into place.
pub struct FileConfigStore {
    path: PathBuf,
    cipher: SecretCipher,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, cipher: SecretCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(StoreDocument::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(doc)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn seal(&self, secret: &SecretString) -> Result<String, StoreError> {
        if secret.expose().is_empty() {
            return Ok(String::new());
        }
        Ok(self.cipher.encrypt(secret.expose())?)
    }

    fn open(&self, sealed: &str) -> Result<SecretString, StoreError> {
        if sealed.is_empty() {
            return Ok(SecretString::default());
        }
        Ok(SecretString::new(self.cipher.decrypt(sealed)?))
    }

    fn to_stored(&self, config: &BriefingConfig) -> Result<StoredConfig, StoreError> {
        Ok(StoredConfig {
            api_key_encrypted: self.seal(&config.api_key)?,
            sender_email: config.sender_email.clone(),
            sender_app_password_encrypted: self.seal(&config.sender_app_password)?,
            receiver_email: config.receiver_email.clone(),
            keywords: config.keywords.clone(),
            sources: config.sources.clone(),
            schedule_time: config.schedule_time,
            schedule_frequency: config.schedule_frequency,
        })
    }

    fn from_stored(&self, stored: &StoredConfig) -> Result<BriefingConfig, StoreError> {
        Ok(BriefingConfig {
            api_key: self.open(&stored.api_key_encrypted)?,
            sender_email: stored.sender_email.clone(),
            sender_app_password: self.open(&stored.sender_app_password_encrypted)?,
            receiver_email: stored.receiver_email.clone(),
            keywords: stored.keywords.clone(),
            sources: stored.sources.clone(),
            schedule_time: stored.schedule_time,
            schedule_frequency: stored.schedule_frequency,
        })
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, user_id: &str) -> Result<Option<BriefingConfig>, StoreError> {
        let doc = self.load().await?;
        doc.users
            .get(user_id)
            .map(|stored| self.from_stored(stored))
            .transpose()
    }

    async fn set(&self, user_id: &str, patch: ConfigPatch) -> Result<BriefingConfig, StoreError> {
        check_user_id(user_id)?;
        let _guard = self.write_lock.lock().await;

        let mut doc = self.load().await?;
        let current = match doc.users.get(user_id) {
            Some(stored) => self.from_stored(stored)?,
            None => BriefingConfig::default(),
        };
        let merged = current.merge(patch);

        doc.users.insert(user_id.to_string(), self.to_stored(&merged)?);
        doc.updated_at = Some(Utc::now());
        self.save(&doc).await?;

        tracing::debug!(user_id, path = %self.path.display(), "Saved user config");
        Ok(merged)
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load().await?.users.into_keys().collect())
    }
}
