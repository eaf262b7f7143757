//! Compiled-in default provider
//!
//! Lowest-priority source: answers with the descriptor's default, or absent
//! when the descriptor has none.

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::Result;
use crate::registry::SettingRegistry;

use super::{ConfigSource, ResolvedValue, SettingProvider};

/// Default value provider backed by the setting registry
pub struct DefaultProvider {
    registry: Arc<SettingRegistry>,
}

impl DefaultProvider {
    pub fn new(registry: Arc<SettingRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SettingProvider for DefaultProvider {
    fn source(&self) -> ConfigSource {
        ConfigSource::Default
    }

    async fn get(&self, key: &str) -> Result<Option<ResolvedValue>> {
        Ok(self
            .registry
            .lookup(key)
            .and_then(|d| d.default.clone())
            .map(|value| ResolvedValue::bare(key, value, ConfigSource::Default)))
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .registry
            .all()
            .filter(|d| d.default.is_some())
            .map(|d| d.key.clone())
            .collect())
    }
}
