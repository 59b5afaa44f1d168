//! Per-user configuration storage.
//!
//! The pipeline only needs `get`, `set` (merge/upsert), and `list_users`.
//! Two backends are provided:
//! - [`MemoryConfigStore`] for tests and ephemeral runs
//! - [`FileConfigStore`], a JSON document with credentials encrypted at rest

mod crypto;
mod file;
mod memory;

pub use crypto::{CryptoError, SecretCipher, KEY_SIZE};
pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BriefingConfig, ConfigPatch};

/// Errors from a configuration store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("credential encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid user id '{0}'")]
    InvalidUserId(String),
}

/// Storage boundary for per-user settings.
///
/// Implementations never delete a configuration on their own.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the stored config for a user, `None` if nothing was saved.
    async fn get(&self, user_id: &str) -> Result<Option<BriefingConfig>, StoreError>;

    /// Merge `patch` into the user's config, creating it from defaults if
    /// absent. Returns the stored result.
    async fn set(&self, user_id: &str, patch: ConfigPatch) -> Result<BriefingConfig, StoreError>;

    /// All users with a saved config, in ascending order.
    async fn list_users(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject ids that are empty or contain control characters.
pub(crate) fn check_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() || user_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}
