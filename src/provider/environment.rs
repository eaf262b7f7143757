//! Environment variable provider
//!
//! Highest-priority source. Values are read through the descriptor's backing
//! variable name, converted to the declared type, and treated as read-only:
//! an environment-sourced value can only change by restarting the process
//! with a different environment.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::common::{mask_value, Result};
use crate::registry::{SettingRegistry, SettingValue, ValueType};

use super::{ConfigSource, ResolvedValue, SettingProvider};

/// Read an environment variable, treating unset and empty as absent
pub(crate) fn raw_env(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// Environment variable configuration provider
pub struct EnvProvider {
    registry: Arc<SettingRegistry>,
}

impl EnvProvider {
    pub fn new(registry: Arc<SettingRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SettingProvider for EnvProvider {
    fn source(&self) -> ConfigSource {
        ConfigSource::Environment
    }

    async fn get(&self, key: &str) -> Result<Option<ResolvedValue>> {
        let descriptor = self.registry.lookup(key);

        // Keys outside the static catalog (dynamically-named module keys)
        // fall back to the key itself as the variable name.
        let var_name = descriptor.map_or(key, |d| d.env_var.as_str());
        let raw = match raw_env(var_name) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let value_type = descriptor.map_or(ValueType::String, |d| d.value_type);
        let secret = descriptor.is_some_and(|d| d.secret);

        match SettingValue::from_raw(key, &raw, value_type) {
            Ok(value) => {
                debug!(
                    "Resolved '{}' from environment variable {}={}",
                    key,
                    var_name,
                    mask_value(var_name, &raw, secret)
                );
                Ok(Some(ResolvedValue::bare(key, value, self.source())))
            }
            Err(e) => {
                // Conversion failures are logged and treated as absent, never
                // propagated to the caller.
                warn!(
                    "Ignoring environment variable {}={}: {}",
                    var_name,
                    mask_value(var_name, &raw, secret),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .registry
            .all()
            .filter(|d| raw_env(&d.env_var).is_some())
            .map(|d| d.key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SettingDescriptor, SettingRegistry};
    use serial_test::serial;

    fn registry() -> Arc<SettingRegistry> {
        Arc::new(
            SettingRegistry::builder()
                .register(
                    SettingDescriptor::new("SQUIRREL_MAX_LOGIN_ATTEMPTS", ValueType::Int)
                        .default(5_i64),
                )
                .register(
                    SettingDescriptor::new("SQUIRREL_ENABLE_CACHING", ValueType::Bool)
                        .default(true),
                )
                .build(),
        )
    }

    #[tokio::test]
    #[serial]
    async fn test_unset_variable_is_absent() {
        env::remove_var("SQUIRREL_MAX_LOGIN_ATTEMPTS");
        let provider = EnvProvider::new(registry());
        assert!(provider.get("SQUIRREL_MAX_LOGIN_ATTEMPTS").await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_empty_variable_is_absent() {
        env::set_var("SQUIRREL_MAX_LOGIN_ATTEMPTS", "");
        let provider = EnvProvider::new(registry());
        assert!(provider.get("SQUIRREL_MAX_LOGIN_ATTEMPTS").await.unwrap().is_none());
        env::remove_var("SQUIRREL_MAX_LOGIN_ATTEMPTS");
    }

    #[tokio::test]
    #[serial]
    async fn test_typed_conversion() {
        env::set_var("SQUIRREL_MAX_LOGIN_ATTEMPTS", "7");
        env::set_var("SQUIRREL_ENABLE_CACHING", "yes");
        let provider = EnvProvider::new(registry());

        let attempts = provider.get("SQUIRREL_MAX_LOGIN_ATTEMPTS").await.unwrap().unwrap();
        assert_eq!(attempts.value, SettingValue::Int(7));
        assert_eq!(attempts.source, ConfigSource::Environment);
        assert!(attempts.last_modified.is_none());

        let caching = provider.get("SQUIRREL_ENABLE_CACHING").await.unwrap().unwrap();
        assert_eq!(caching.value, SettingValue::Bool(true));

        env::remove_var("SQUIRREL_MAX_LOGIN_ATTEMPTS");
        env::remove_var("SQUIRREL_ENABLE_CACHING");
    }

    #[tokio::test]
    #[serial]
    async fn test_parse_failure_degrades_to_absent() {
        env::set_var("SQUIRREL_MAX_LOGIN_ATTEMPTS", "many");
        let provider = EnvProvider::new(registry());
        assert!(provider.get("SQUIRREL_MAX_LOGIN_ATTEMPTS").await.unwrap().is_none());
        env::remove_var("SQUIRREL_MAX_LOGIN_ATTEMPTS");
    }

    #[tokio::test]
    #[serial]
    async fn test_unknown_key_uses_key_as_variable_name() {
        env::set_var("PLUGIN_LUCENE_SEARCH_INDEXPATH", "/var/lib/squirrel/index");
        let provider = EnvProvider::new(registry());
        let resolved = provider.get("PLUGIN_LUCENE_SEARCH_INDEXPATH").await.unwrap().unwrap();
        assert_eq!(
            resolved.value,
            SettingValue::String("/var/lib/squirrel/index".to_string())
        );
        env::remove_var("PLUGIN_LUCENE_SEARCH_INDEXPATH");
    }

    #[tokio::test]
    #[serial]
    async fn test_writes_are_unsupported() {
        let provider = EnvProvider::new(registry());
        assert!(!provider.can_write("SQUIRREL_ENABLE_CACHING"));
        let err = provider
            .write("SQUIRREL_ENABLE_CACHING", &SettingValue::Bool(false), None)
            .await;
        assert!(matches!(err, Err(crate::common::ConfigError::Unsupported(_))));
    }
}
