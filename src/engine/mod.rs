//! Resolution engine
//!
//! Holds the ordered provider list and implements get, set, provenance lookup
//! and validation. Providers are sorted once at construction by descending
//! priority and the list is immutable for the engine's lifetime.

mod validation;

pub use self::validation::check_rule;

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::timeout;

use crate::common::{ConfigError, Result};
use crate::provider::{ConfigSource, ResolvedValue, SettingProvider};
use crate::registry::{SettingRegistry, SettingValue, ValueType};

/// Default per-provider read timeout
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Layered configuration resolution engine
///
/// Construction is two-phase by design: build the engine bare, then wrap it
/// in any caching decorator afterwards, so a host cache never becomes a
/// constructor-cycle problem.
pub struct SettingsEngine {
    registry: Arc<SettingRegistry>,
    providers: Vec<Arc<dyn SettingProvider>>,
    provider_timeout: Duration,
}

impl SettingsEngine {
    /// Create an engine over the given providers
    ///
    /// Providers are sorted by descending priority once, here.
    pub fn new(registry: Arc<SettingRegistry>, mut providers: Vec<Arc<dyn SettingProvider>>) -> Self {
        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        Self {
            registry,
            providers,
            provider_timeout: PROVIDER_TIMEOUT,
        }
    }

    /// Override the per-provider read timeout
    pub fn with_provider_timeout(mut self, provider_timeout: Duration) -> Self {
        self.provider_timeout = provider_timeout;
        self
    }

    /// The registry this engine resolves against
    pub fn registry(&self) -> &Arc<SettingRegistry> {
        &self.registry
    }

    /// First non-absent result in priority order
    ///
    /// A provider that fails or times out is logged and treated as absent;
    /// one failing provider never blocks resolution from a lower-priority
    /// one.
    async fn first_hit(&self, key: &str) -> Option<ResolvedValue> {
        for provider in &self.providers {
            match timeout(self.provider_timeout, provider.get(key)).await {
                Ok(Ok(Some(resolved))) => return Some(resolved),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(
                        "Provider '{}' failed while resolving '{}': {}",
                        provider.source(),
                        key,
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        "Provider '{}' timed out while resolving '{}'",
                        provider.source(),
                        key
                    );
                }
            }
        }
        None
    }

    /// Resolve a key to its effective value with provenance
    ///
    /// Falls back to the registry default, then to the type's zero value;
    /// never fails.
    pub async fn resolve(&self, key: &str) -> ResolvedValue {
        if let Some(resolved) = self.first_hit(key).await {
            return resolved;
        }
        match self.registry.lookup(key) {
            Some(descriptor) => {
                let value = descriptor
                    .default
                    .clone()
                    .unwrap_or_else(|| SettingValue::zero(descriptor.value_type));
                ResolvedValue::bare(key, value, ConfigSource::Default)
            }
            None => ResolvedValue::bare(
                key,
                SettingValue::zero(ValueType::String),
                ConfigSource::Default,
            ),
        }
    }

    /// Effective value for a key
    pub async fn get(&self, key: &str) -> SettingValue {
        self.resolve(key).await.value
    }

    /// Which source currently supplies the key's effective value
    pub async fn source(&self, key: &str) -> ConfigSource {
        self.first_hit(key)
            .await
            .map_or(ConfigSource::Default, |r| r.source)
    }

    /// Validate a value against the key's descriptor rule
    ///
    /// Pure; returns every violation. Keys without a descriptor or without a
    /// rule validate trivially.
    pub fn validate(&self, key: &str, value: &SettingValue) -> Vec<String> {
        self.registry
            .lookup(key)
            .and_then(|d| d.rule.as_ref())
            .map_or_else(Vec::new, |rule| check_rule(rule, value))
    }

    /// Write a new value through the first writable provider
    ///
    /// Fails with `ImmutableSetting` when the key's current source is the
    /// environment (checked before validation; environment-sourced values can
    /// only change via a restart) or when the descriptor forbids runtime
    /// edits; fails with `Validation` on rule violations; fails with
    /// `NoWritableProvider` when no provider accepts writes.
    pub async fn set(
        &self,
        key: &str,
        value: SettingValue,
        modified_by: Option<&str>,
    ) -> Result<()> {
        if self.source(key).await == ConfigSource::Environment {
            return Err(ConfigError::ImmutableSetting(key.to_string()));
        }

        if self
            .registry
            .lookup(key)
            .is_some_and(|d| !d.runtime_mutable)
        {
            return Err(ConfigError::ImmutableSetting(key.to_string()));
        }

        let violations = self.validate(key, &value);
        if !violations.is_empty() {
            return Err(ConfigError::Validation {
                key: key.to_string(),
                violations,
            });
        }

        for provider in &self.providers {
            if provider.can_write(key) {
                return provider.write(key, &value, modified_by).await;
            }
        }
        Err(ConfigError::NoWritableProvider(key.to_string()))
    }

    /// Resolve every operator-visible setting, in catalog order
    ///
    /// Backs operator-facing configuration listings.
    pub async fn resolve_visible(&self) -> Vec<ResolvedValue> {
        let keys: Vec<String> = self
            .registry
            .ui_visible()
            .map(|d| d.key.clone())
            .collect();
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            resolved.push(self.resolve(&key).await);
        }
        resolved
    }
}
