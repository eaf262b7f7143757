//! Extension module settings
//!
//! Plugins ("extension modules") declare a configuration schema and an
//! enable/disable lifecycle. This module defines the manifest types, the
//! environment-variable naming convention, and the ordinary enable/disable
//! write path; [`sync`] holds the reconciliation pass that runs at module
//! load.

pub mod sync;

pub use self::sync::{ModuleSynchronizer, SyncReport};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};

use crate::common::{ConfigError, Result};
use crate::provider::raw_env;
use crate::registry::{is_falsy, is_truthy};
use crate::store::{ModuleRecord, ModuleStore};

/// One key of a module's declared configuration schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSchemaEntry {
    pub key: String,
    pub required: bool,
    pub secret: bool,
    pub default: Option<String>,
}

impl ModuleSchemaEntry {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            required: false,
            secret: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}

/// A discovered module: identity plus declared configuration schema
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    pub id: String,
    pub version: String,
    pub core: bool,
    pub schema: Vec<ModuleSchemaEntry>,
}

impl ModuleManifest {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            core: false,
            schema: Vec::new(),
        }
    }

    pub fn core(mut self) -> Self {
        self.core = true;
        self
    }

    pub fn entry(mut self, entry: ModuleSchemaEntry) -> Self {
        self.schema.push(entry);
        self
    }
}

/// The extension module registry collaborator
///
/// Implemented by the module loader; this crate only consumes the declared
/// manifests and invokes the lifecycle hooks.
#[async_trait]
pub trait ExtensionRegistry: Send + Sync {
    /// Every discovered module, with its declared schema
    fn manifests(&self) -> Vec<ModuleManifest>;

    /// Called after a module's record transitions to enabled
    async fn on_enabled(&self, _module_id: &str) -> Result<()> {
        Ok(())
    }

    /// Called after a module's record transitions to disabled
    async fn on_disabled(&self, _module_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Upper-case a module id, mapping `-` and `.` to `_`
fn sanitize_module_id(module_id: &str) -> String {
    module_id.to_uppercase().replace(['-', '.'], "_")
}

/// Controlling environment variable for one module setting
///
/// For module `lucene-search` and key `INDEXPATH` this is
/// `PLUGIN_LUCENE_SEARCH_INDEXPATH`.
pub fn module_env_var(module_id: &str, key: &str) -> String {
    format!(
        "PLUGIN_{}_{}",
        sanitize_module_id(module_id),
        key.to_uppercase()
    )
}

/// Module-level enable/disable override variable
pub fn module_enabled_var(module_id: &str) -> String {
    format!("PLUGIN_{}_ENABLED", sanitize_module_id(module_id))
}

/// Current enable override from the environment
///
/// `Some(true)`/`Some(false)` for recognized truthy/falsy values; `None` when
/// the variable is unset or carries an unrecognized value (logged, ignored).
pub fn enable_override(module_id: &str) -> Option<bool> {
    let var = module_enabled_var(module_id);
    let raw = raw_env(&var)?;
    if is_truthy(&raw) {
        Some(true)
    } else if is_falsy(&raw) {
        Some(false)
    } else {
        warn!("Ignoring unrecognized value for {}", var);
        None
    }
}

/// Ordinary write path for module lifecycle state
///
/// Enforces the environment enable-lock and the rule that a module may only
/// be enabled once it is configured.
pub struct ModuleManager {
    store: Arc<dyn ModuleStore>,
    registry: Arc<dyn ExtensionRegistry>,
}

impl ModuleManager {
    pub fn new(store: Arc<dyn ModuleStore>, registry: Arc<dyn ExtensionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Enable or disable a module
    ///
    /// Fails with `LockedByEnvironment` for as long as the module's
    /// `_ENABLED` variable is set, regardless of the requested state.
    pub async fn set_enabled(&self, module_id: &str, enabled: bool) -> Result<()> {
        if enable_override(module_id).is_some() {
            return Err(ConfigError::LockedByEnvironment(
                module_id.to_string(),
                module_enabled_var(module_id),
            ));
        }

        let mut record = self
            .store
            .module(module_id)
            .await?
            .ok_or_else(|| ConfigError::UnknownModule(module_id.to_string()))?;

        if enabled && !record.configured {
            return Err(ConfigError::ModuleNotConfigured(module_id.to_string()));
        }

        if record.enabled == enabled {
            return Ok(());
        }

        record.enabled = enabled;
        record.updated = Utc::now();
        self.store.upsert_module(&record).await?;
        info!(
            "Module '{}' {}",
            module_id,
            if enabled { "enabled" } else { "disabled" }
        );

        if enabled {
            self.registry.on_enabled(module_id).await
        } else {
            self.registry.on_disabled(module_id).await
        }
    }

    /// Delete a module and its settings
    ///
    /// Core modules cannot be deleted.
    pub async fn delete(&self, module_id: &str) -> Result<()> {
        let record = self
            .store
            .module(module_id)
            .await?
            .ok_or_else(|| ConfigError::UnknownModule(module_id.to_string()))?;
        if record.core {
            return Err(ConfigError::CoreModule(module_id.to_string()));
        }
        self.store.delete_module(module_id).await?;
        info!("Module '{}' deleted", module_id);
        Ok(())
    }

    /// Current record for a module
    pub async fn module(&self, module_id: &str) -> Result<Option<ModuleRecord>> {
        self.store.module(module_id).await
    }
}
