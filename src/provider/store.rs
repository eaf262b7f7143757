//! Persistent store provider
//!
//! Mid-priority source and the only writable one. Secret values are encrypted
//! on write and decrypted on read. Read-side failures degrade to absent so
//! that a broken store or a single corrupted secret never blocks resolution.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};

use crate::common::Result;
use crate::registry::{SettingRegistry, SettingValue, ValueType};
use crate::secret::SecretCipher;
use crate::store::SettingStore;

use super::{ConfigSource, ResolvedValue, SettingProvider};

/// Provider over the abstract core settings table
pub struct StoreProvider {
    registry: Arc<SettingRegistry>,
    store: Arc<dyn SettingStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl StoreProvider {
    pub fn new(
        registry: Arc<SettingRegistry>,
        store: Arc<dyn SettingStore>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            registry,
            store,
            cipher,
        }
    }
}

#[async_trait]
impl SettingProvider for StoreProvider {
    fn source(&self) -> ConfigSource {
        ConfigSource::PersistentStore
    }

    async fn get(&self, key: &str) -> Result<Option<ResolvedValue>> {
        let row = match self.store.get(key).await {
            Ok(row) => row,
            Err(e) => {
                // Reads degrade gracefully; the engine falls through to the
                // next provider.
                warn!("Store read failed for '{}': {}", key, e);
                return Ok(None);
            }
        };
        let Some(row) = row else {
            return Ok(None);
        };

        let descriptor = self.registry.lookup(key);
        let secret = descriptor.is_some_and(|d| d.secret);

        let raw = if secret {
            match self.cipher.decrypt(&row.value) {
                Ok(plain) => plain,
                Err(e) => {
                    // A corrupted secret must not block retrieval of other
                    // settings; recover to empty string.
                    error!("Failed to decrypt stored secret '{}': {}", key, e);
                    String::new()
                }
            }
        } else {
            row.value.clone()
        };

        let value_type = descriptor.map_or(ValueType::String, |d| d.value_type);
        match SettingValue::from_raw(key, &raw, value_type) {
            Ok(value) => Ok(Some(ResolvedValue {
                key: key.to_string(),
                value,
                source: ConfigSource::PersistentStore,
                last_modified: Some(row.last_modified),
                modified_by: row.modified_by,
            })),
            Err(e) => {
                warn!("Ignoring stored value for '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    fn can_write(&self, _key: &str) -> bool {
        true
    }

    async fn write(
        &self,
        key: &str,
        value: &SettingValue,
        modified_by: Option<&str>,
    ) -> Result<()> {
        let secret = self.registry.lookup(key).is_some_and(|d| d.secret);
        let payload = if secret {
            self.cipher.encrypt(&value.to_string())
        } else {
            value.to_string()
        };
        // Storage failures on write are always surfaced to the caller.
        self.store.put(key, &payload, modified_by).await
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        self.store.keys().await
    }
}
