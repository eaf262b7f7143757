//! Persistent store abstraction
//!
//! The engine treats storage as an abstract key/value collaborator: a flat
//! table for core settings and a module-settings table plus module table for
//! plugins. Backends implement these traits; [`MemoryStore`] is the bundled
//! reference backend.

mod memory;

pub use self::memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::Result;

/// One row of the core settings table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSetting {
    pub key: String,
    /// Raw stored payload; encrypted when the descriptor marks the key secret
    pub value: String,
    pub last_modified: DateTime<Utc>,
    pub modified_by: Option<String>,
}

/// One row of the module settings table
///
/// Invariant: when `from_environment` is true, `value` is `None` (the value
/// is never duplicated into the store) and `env_var` names the controlling
/// variable; when false, `value` holds the store-resident payload, encrypted
/// at rest when `secret` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSettingRecord {
    pub module_id: String,
    pub key: String,
    pub value: Option<String>,
    pub from_environment: bool,
    pub env_var: Option<String>,
    pub secret: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ModuleSettingRecord {
    /// Create a record controlled by an environment variable
    pub fn environment_sourced(module_id: &str, key: &str, env_var: &str, secret: bool) -> Self {
        let now = Utc::now();
        Self {
            module_id: module_id.to_string(),
            key: key.to_string(),
            value: None,
            from_environment: true,
            env_var: Some(env_var.to_string()),
            secret,
            created: now,
            updated: now,
        }
    }

    /// Create a record holding a store-resident value
    pub fn store_sourced(module_id: &str, key: &str, value: &str, secret: bool) -> Self {
        let now = Utc::now();
        Self {
            module_id: module_id.to_string(),
            key: key.to_string(),
            value: Some(value.to_string()),
            from_environment: false,
            env_var: None,
            secret,
            created: now,
            updated: now,
        }
    }

    /// Flip to environment-sourced, dropping any stored value
    pub fn take_from_environment(&mut self, env_var: &str) {
        self.from_environment = true;
        self.env_var = Some(env_var.to_string());
        self.value = None;
        self.updated = Utc::now();
    }

    /// Flip to store-sourced with the given payload
    pub fn return_to_store(&mut self, value: &str) {
        self.from_environment = false;
        self.env_var = None;
        self.value = Some(value.to_string());
        self.updated = Utc::now();
    }
}

/// One row of the module table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module_id: String,
    pub version: String,
    /// May only be true while `configured` is true
    pub enabled: bool,
    /// True once every required key has a value from some source
    pub configured: bool,
    /// Core modules cannot be deleted
    pub core: bool,
    pub updated: DateTime<Utc>,
}

impl ModuleRecord {
    pub fn new(module_id: &str, version: &str, core: bool) -> Self {
        Self {
            module_id: module_id.to_string(),
            version: version.to_string(),
            enabled: false,
            configured: false,
            core,
            updated: Utc::now(),
        }
    }
}

/// Core settings table
#[async_trait]
pub trait SettingStore: Send + Sync {
    /// Fetch one row; `Ok(None)` when the key has no row
    async fn get(&self, key: &str) -> Result<Option<StoredSetting>>;

    /// Insert or update one row
    async fn put(&self, key: &str, value: &str, modified_by: Option<&str>) -> Result<()>;

    /// Every key with a row
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Module table and module settings table
#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn module(&self, module_id: &str) -> Result<Option<ModuleRecord>>;

    async fn modules(&self) -> Result<Vec<ModuleRecord>>;

    async fn upsert_module(&self, record: &ModuleRecord) -> Result<()>;

    /// All setting records for one module
    ///
    /// Backends that cannot enforce key uniqueness may return duplicates; the
    /// reconciliation pass cleans them up.
    async fn module_settings(&self, module_id: &str) -> Result<Vec<ModuleSettingRecord>>;

    /// Insert or update the given records as one atomic batch
    ///
    /// Every existing row for a committed record's key is replaced, so a
    /// batch also collapses duplicate rows for its keys. Either every record
    /// is persisted or none is; a crash mid-pass must never leave a module
    /// with half-updated records.
    async fn commit_settings(&self, module_id: &str, records: &[ModuleSettingRecord])
        -> Result<()>;

    /// Delete every record for `key` under `module_id`
    async fn delete_setting(&self, module_id: &str, key: &str) -> Result<()>;

    /// Delete a module and all of its setting records
    async fn delete_module(&self, module_id: &str) -> Result<()>;
}
