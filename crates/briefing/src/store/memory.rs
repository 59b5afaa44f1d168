//! In-memory configuration store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{check_user_id, ConfigStore, StoreError};
use crate::config::{BriefingConfig, ConfigPatch};

/// Config store backed by a map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<BTreeMap<String, BriefingConfig>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with complete configs.
    #[must_use]
    pub fn with_configs(configs: impl IntoIterator<Item = (String, BriefingConfig)>) -> Self {
        Self {
            configs: RwLock::new(configs.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, user_id: &str) -> Result<Option<BriefingConfig>, StoreError> {
        Ok(self.configs.read().await.get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, patch: ConfigPatch) -> Result<BriefingConfig, StoreError> {
        check_user_id(user_id)?;
        let mut configs = self.configs.write().await;
        let merged = configs.remove(user_id).unwrap_or_default().merge(patch);
        configs.insert(user_id.to_string(), merged.clone());
        Ok(merged)
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.configs.read().await.keys().cloned().collect())
    }
}
