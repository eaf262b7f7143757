//! In-memory store backend
//!
//! Reference implementation of the store traits, used by the test suite and
//! by hosts that have not wired a database yet. Writes are last-write-wins;
//! the batch commit is atomic under the table lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::common::{ConfigError, Result};

use super::{ModuleRecord, ModuleSettingRecord, ModuleStore, SettingStore, StoredSetting};

/// In-memory store over `RwLock`ed tables
#[derive(Default)]
pub struct MemoryStore {
    settings: RwLock<HashMap<String, StoredSetting>>,
    modules: RwLock<HashMap<String, ModuleRecord>>,
    module_settings: RwLock<HashMap<String, Vec<ModuleSettingRecord>>>,
    /// When set, every operation fails with a storage error
    fail: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, to exercise degradation paths
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of row writes (puts, upserts, deletes) performed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Append a module setting record without enforcing key uniqueness
    ///
    /// Mirrors backends that cannot enforce uniqueness, so the duplicate
    /// cleanup in the reconciliation pass can be exercised.
    pub fn insert_raw_module_setting(&self, record: ModuleSettingRecord) {
        let mut table = self.module_settings.write().unwrap();
        table
            .entry(record.module_id.clone())
            .or_default()
            .push(record);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(ConfigError::Storage("memory store failure injected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SettingStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredSetting>> {
        self.check()?;
        Ok(self.settings.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str, modified_by: Option<&str>) -> Result<()> {
        self.check()?;
        let row = StoredSetting {
            key: key.to_string(),
            value: value.to_string(),
            last_modified: Utc::now(),
            modified_by: modified_by.map(str::to_string),
        };
        self.settings.write().unwrap().insert(key.to_string(), row);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.settings.read().unwrap().keys().cloned().collect())
    }
}

#[async_trait]
impl ModuleStore for MemoryStore {
    async fn module(&self, module_id: &str) -> Result<Option<ModuleRecord>> {
        self.check()?;
        Ok(self.modules.read().unwrap().get(module_id).cloned())
    }

    async fn modules(&self) -> Result<Vec<ModuleRecord>> {
        self.check()?;
        Ok(self.modules.read().unwrap().values().cloned().collect())
    }

    async fn upsert_module(&self, record: &ModuleRecord) -> Result<()> {
        self.check()?;
        self.modules
            .write()
            .unwrap()
            .insert(record.module_id.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn module_settings(&self, module_id: &str) -> Result<Vec<ModuleSettingRecord>> {
        self.check()?;
        Ok(self
            .module_settings
            .read()
            .unwrap()
            .get(module_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_settings(
        &self,
        module_id: &str,
        records: &[ModuleSettingRecord],
    ) -> Result<()> {
        self.check()?;
        if records.is_empty() {
            return Ok(());
        }
        // Single lock acquisition for the whole batch keeps it atomic.
        let mut table = self.module_settings.write().unwrap();
        let rows = table.entry(module_id.to_string()).or_default();
        for record in records {
            rows.retain(|r| r.key != record.key);
            rows.push(record.clone());
        }
        self.writes.fetch_add(records.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn delete_setting(&self, module_id: &str, key: &str) -> Result<()> {
        self.check()?;
        let mut table = self.module_settings.write().unwrap();
        if let Some(rows) = table.get_mut(module_id) {
            let before = rows.len();
            rows.retain(|r| r.key != key);
            if rows.len() != before {
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn delete_module(&self, module_id: &str) -> Result<()> {
        self.check()?;
        self.modules.write().unwrap().remove(module_id);
        self.module_settings.write().unwrap().remove(module_id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
