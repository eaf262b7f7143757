//! Module settings reconciliation
//!
//! At module-load time (and on explicit reload) the synchronizer makes the
//! persisted settings of every module agree with the module's declared schema
//! and the current set of environment variables. Each module's pass is
//! isolated: one failing module never aborts the others.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::common::{ConfigError, Result};
use crate::provider::raw_env;
use crate::secret::SecretCipher;
use crate::store::{ModuleRecord, ModuleSettingRecord, ModuleStore};

use super::{
    enable_override, module_env_var, ExtensionRegistry, ModuleManifest, ModuleSchemaEntry,
};

/// Outcome summary of one module's reconciliation pass
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub module_id: String,
    /// Records created or updated in the batch commit
    pub written: usize,
    /// Duplicate records removed before comparison
    pub duplicates_removed: usize,
    pub configured: bool,
    pub enabled: bool,
    /// A forced enable was requested but the required-field gate failed
    pub enable_blocked: bool,
}

/// Reconciles persisted module settings against schema and environment
pub struct ModuleSynchronizer {
    store: Arc<dyn ModuleStore>,
    registry: Arc<dyn ExtensionRegistry>,
    cipher: Arc<dyn SecretCipher>,
}

impl ModuleSynchronizer {
    pub fn new(
        store: Arc<dyn ModuleStore>,
        registry: Arc<dyn ExtensionRegistry>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
        }
    }

    /// Run one reconciliation pass over every discovered module
    ///
    /// Per-module failures are logged and skipped. Cancellation is honored
    /// between modules; a cancelled pass leaves no partial writes because the
    /// per-module batch commit is atomic.
    pub async fn run(&self, cancel: &CancellationToken) -> Vec<SyncReport> {
        let manifests = self.registry.manifests();
        info!("Reconciling settings for {} module(s)", manifests.len());

        let mut reports = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            if cancel.is_cancelled() {
                warn!("Reconciliation cancelled; remaining modules skipped");
                break;
            }
            match self.sync_module(&manifest, cancel).await {
                Ok(report) => {
                    debug!(
                        "Module '{}': {} record(s) written, {} duplicate(s) removed",
                        report.module_id, report.written, report.duplicates_removed
                    );
                    reports.push(report);
                }
                Err(e) => {
                    error!("Reconciliation failed for module '{}': {}", manifest.id, e);
                }
            }
        }
        reports
    }

    /// Re-run reconciliation for a single module (operator reload request)
    pub async fn reload(&self, module_id: &str, cancel: &CancellationToken) -> Result<SyncReport> {
        let manifest = self
            .registry
            .manifests()
            .into_iter()
            .find(|m| m.id == module_id)
            .ok_or_else(|| ConfigError::UnknownModule(module_id.to_string()))?;
        self.sync_module(&manifest, cancel).await
    }

    /// One module's reconciliation pass
    pub async fn sync_module(
        &self,
        manifest: &ModuleManifest,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        // Step 1: enable-lock check. A falsy override disables immediately;
        // a truthy one is only committed after the batch succeeds.
        let override_state = enable_override(&manifest.id);

        let mut module = match self.store.module(&manifest.id).await? {
            Some(record) => record,
            None => {
                let record = ModuleRecord::new(&manifest.id, &manifest.version, manifest.core);
                self.store.upsert_module(&record).await?;
                info!("Discovered module '{}' ({})", manifest.id, manifest.version);
                record
            }
        };

        if module.version != manifest.version {
            module.version = manifest.version.clone();
            module.updated = Utc::now();
            self.store.upsert_module(&module).await?;
        }

        if override_state == Some(false) && module.enabled {
            module.enabled = false;
            module.updated = Utc::now();
            self.store.upsert_module(&module).await?;
            info!(
                "Module '{}' disabled by environment override",
                manifest.id
            );
            self.registry.on_disabled(&manifest.id).await?;
        }

        // Step 2: per-key environment scan.
        let scans: Vec<(&ModuleSchemaEntry, String, bool)> = manifest
            .schema
            .iter()
            .map(|entry| {
                let var = module_env_var(&manifest.id, &entry.key);
                let present = raw_env(&var).is_some();
                (entry, var, present)
            })
            .collect();

        // Load existing records; drop duplicates, keeping the first per key.
        // The survivor is forced into the batch below; the commit replaces
        // every row for a committed key, so cleanup and restore happen in
        // the same atomic store call.
        let mut records = self.store.module_settings(&manifest.id).await?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut rewrite: HashSet<String> = HashSet::new();
        let mut duplicates_removed = 0;
        records.retain(|record| {
            if seen.insert(record.key.clone()) {
                true
            } else {
                rewrite.insert(record.key.clone());
                duplicates_removed += 1;
                false
            }
        });

        // Step 3: required-field gate. A required key with no environment
        // variable, no schema default, and no previously-entered store value
        // blocks auto-enable but not record reconciliation.
        let missing_required: Vec<&str> = scans
            .iter()
            .filter(|(entry, _, present)| {
                entry.required
                    && !present
                    && entry.default.is_none()
                    && !records.iter().any(|r| {
                        r.key == entry.key
                            && !r.from_environment
                            && r.value.as_deref().is_some_and(|v| !v.is_empty())
                    })
            })
            .map(|(entry, _, _)| entry.key.as_str())
            .collect();
        let gate_ok = missing_required.is_empty();
        if !gate_ok {
            warn!(
                "Module '{}' is missing required settings: {}",
                manifest.id,
                missing_required.join(", ")
            );
        }

        // Step 4: record reconciliation.
        let mut batch: Vec<ModuleSettingRecord> = Vec::new();
        for (entry, var, present) in &scans {
            let existing = records.iter_mut().find(|r| r.key == entry.key);
            match (present, existing) {
                (true, Some(record)) => {
                    if !record.from_environment {
                        // The environment took over; never duplicate the
                        // value into the store.
                        record.take_from_environment(var);
                        batch.push(record.clone());
                    } else if record.env_var.as_deref() != Some(var.as_str()) {
                        record.env_var = Some(var.clone());
                        record.updated = Utc::now();
                        batch.push(record.clone());
                    } else if rewrite.contains(&entry.key) {
                        batch.push(record.clone());
                    }
                }
                (true, None) => {
                    batch.push(ModuleSettingRecord::environment_sourced(
                        &manifest.id,
                        &entry.key,
                        var,
                        entry.secret,
                    ));
                }
                (false, Some(record)) => {
                    if record.from_environment {
                        // The override went away; keep any residual stored
                        // value, else fall back to the schema default rather
                        // than silently losing configuration.
                        let payload = record
                            .value
                            .clone()
                            .filter(|v| !v.is_empty())
                            .unwrap_or_else(|| self.default_payload(entry));
                        record.return_to_store(&payload);
                        batch.push(record.clone());
                    } else if rewrite.contains(&entry.key) {
                        batch.push(record.clone());
                    }
                }
                (false, None) => {
                    // Create the record up front so the setting is visible to
                    // operators before it is ever configured.
                    let payload = self.default_payload(entry);
                    batch.push(ModuleSettingRecord::store_sourced(
                        &manifest.id,
                        &entry.key,
                        &payload,
                        entry.secret,
                    ));
                }
            }
        }

        // Records outside the schema with duplicate rows also need their
        // kept copy in the batch so the commit collapses the extras.
        let schema_keys: HashSet<&str> = manifest.schema.iter().map(|e| e.key.as_str()).collect();
        for record in &records {
            if rewrite.contains(&record.key) && !schema_keys.contains(record.key.as_str()) {
                batch.push(record.clone());
            }
        }

        // Step 5: commit. All-or-nothing; a cancelled pass writes nothing.
        if cancel.is_cancelled() {
            return Err(ConfigError::Cancelled);
        }
        if !batch.is_empty() {
            self.store.commit_settings(&manifest.id, &batch).await?;
        }

        // Step 6: state commit, only after a successful batch commit. A
        // passing gate marks the module configured whether or not an enable
        // override is in play, so the ordinary enable path opens up as soon
        // as every required key has a value from some source. An
        // already-enabled module is never disabled here; that only happens
        // through the explicit lock path in step 1.
        if gate_ok && !module.configured {
            module.configured = true;
            module.updated = Utc::now();
            self.store.upsert_module(&module).await?;
            info!("Module '{}' is now configured", manifest.id);
        }

        let mut enable_blocked = false;
        if override_state == Some(true) {
            if gate_ok {
                if !module.enabled {
                    module.enabled = true;
                    module.updated = Utc::now();
                    self.store.upsert_module(&module).await?;
                    info!("Module '{}' enabled by environment override", manifest.id);
                    self.registry.on_enabled(&manifest.id).await?;
                }
            } else {
                enable_blocked = true;
            }
        }

        Ok(SyncReport {
            module_id: manifest.id.clone(),
            written: batch.len(),
            duplicates_removed,
            configured: module.configured,
            enabled: module.enabled,
            enable_blocked,
        })
    }

    /// Store payload for a schema entry's default value
    ///
    /// Secrets are encrypted before they land in a record; a missing default
    /// becomes an empty value.
    fn default_payload(&self, entry: &ModuleSchemaEntry) -> String {
        match &entry.default {
            Some(default) if entry.secret => self.cipher.encrypt(default),
            Some(default) => default.clone(),
            None => String::new(),
        }
    }
}
