//! Tests for module settings reconciliation
//!
//! Covers the enable-lock, the required-field gate, idempotency of repeated
//! passes, environment flips, duplicate cleanup and per-module isolation.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use squirrel_config::{
    ConfigError, ExtensionRegistry, KeyedCipher, MemoryStore, ModuleManager, ModuleManifest,
    ModuleSchemaEntry, ModuleSettingRecord, ModuleStore, ModuleSynchronizer, Result,
};

struct TestRegistry {
    manifests: Vec<ModuleManifest>,
    enabled_calls: Mutex<Vec<String>>,
    disabled_calls: Mutex<Vec<String>>,
    fail_enable_hook: AtomicBool,
}

impl TestRegistry {
    fn new(manifests: Vec<ModuleManifest>) -> Self {
        Self {
            manifests,
            enabled_calls: Mutex::new(Vec::new()),
            disabled_calls: Mutex::new(Vec::new()),
            fail_enable_hook: AtomicBool::new(false),
        }
    }

    fn enabled_calls(&self) -> Vec<String> {
        self.enabled_calls.lock().unwrap().clone()
    }

    fn disabled_calls(&self) -> Vec<String> {
        self.disabled_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtensionRegistry for TestRegistry {
    fn manifests(&self) -> Vec<ModuleManifest> {
        self.manifests.clone()
    }

    async fn on_enabled(&self, module_id: &str) -> Result<()> {
        if self.fail_enable_hook.load(Ordering::SeqCst) && module_id == "broken-module" {
            return Err(ConfigError::Storage("hook failure injected".to_string()));
        }
        self.enabled_calls.lock().unwrap().push(module_id.to_string());
        Ok(())
    }

    async fn on_disabled(&self, module_id: &str) -> Result<()> {
        self.disabled_calls.lock().unwrap().push(module_id.to_string());
        Ok(())
    }
}

fn lucene_manifest() -> ModuleManifest {
    ModuleManifest::new("lucene-search", "2.1.0")
        .entry(ModuleSchemaEntry::new("INDEXPATH").required())
        .entry(ModuleSchemaEntry::new("BATCHSIZE").default("100"))
}

fn synchronizer(
    store: Arc<MemoryStore>,
    registry: Arc<TestRegistry>,
) -> ModuleSynchronizer {
    let _ = env_logger::builder().is_test(true).try_init();
    ModuleSynchronizer::new(store, registry, Arc::new(KeyedCipher::new("test-install-key")))
}

fn clear_lucene_vars() {
    env::remove_var("PLUGIN_LUCENE_SEARCH_ENABLED");
    env::remove_var("PLUGIN_LUCENE_SEARCH_INDEXPATH");
    env::remove_var("PLUGIN_LUCENE_SEARCH_BATCHSIZE");
}

#[tokio::test]
#[serial]
async fn test_enable_blocked_by_missing_required_setting() {
    clear_lucene_vars();
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "true");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());

    let cancel = CancellationToken::new();
    let reports = sync.run(&cancel).await;
    assert_eq!(reports.len(), 1);

    // Required INDEXPATH has no source anywhere, so the forced enable is
    // refused but reconciliation itself still completes.
    let report = &reports[0];
    assert!(!report.configured);
    assert!(!report.enabled);
    assert!(report.enable_blocked);
    assert!(registry.enabled_calls().is_empty());

    // Records were still created so operators can see the pending settings.
    let rows = store.module_settings("lucene-search").await.unwrap();
    assert_eq!(rows.len(), 2);

    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_forced_enable_with_required_value_present() {
    clear_lucene_vars();
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "true");
    env::set_var("PLUGIN_LUCENE_SEARCH_INDEXPATH", "/var/lib/search");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());

    let reports = sync.run(&CancellationToken::new()).await;
    let report = &reports[0];
    assert!(report.configured);
    assert!(report.enabled);
    assert!(!report.enable_blocked);
    assert_eq!(registry.enabled_calls(), vec!["lucene-search"]);

    // INDEXPATH is environment-sourced; its value never lands in the store.
    let rows = store.module_settings("lucene-search").await.unwrap();
    let indexpath = rows.iter().find(|r| r.key == "INDEXPATH").unwrap();
    assert!(indexpath.from_environment);
    assert!(indexpath.value.is_none());
    assert_eq!(
        indexpath.env_var.as_deref(),
        Some("PLUGIN_LUCENE_SEARCH_INDEXPATH")
    );

    // BATCHSIZE got its schema default as a store-resident value.
    let batchsize = rows.iter().find(|r| r.key == "BATCHSIZE").unwrap();
    assert!(!batchsize.from_environment);
    assert_eq!(batchsize.value.as_deref(), Some("100"));

    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_repeated_pass_is_idempotent() {
    clear_lucene_vars();
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "true");
    env::set_var("PLUGIN_LUCENE_SEARCH_INDEXPATH", "/var/lib/search");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());

    sync.run(&CancellationToken::new()).await;
    let after_first = store.write_count();

    // Nothing changed between runs, so the second pass writes nothing.
    sync.run(&CancellationToken::new()).await;
    assert_eq!(store.write_count(), after_first);

    // And the lifecycle hook only fired on the actual transition.
    assert_eq!(registry.enabled_calls(), vec!["lucene-search"]);

    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_environment_override_withdrawn_keeps_residual_value() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    // Legacy row: flagged environment-sourced but still carrying the value an
    // operator entered before the variable took over.
    let mut residual =
        ModuleSettingRecord::store_sourced("lucene-search", "INDEXPATH", "/srv/old-index", false);
    residual.from_environment = true;
    residual.env_var = Some("PLUGIN_LUCENE_SEARCH_INDEXPATH".to_string());
    store.insert_raw_module_setting(residual);

    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let rows = store.module_settings("lucene-search").await.unwrap();
    let indexpath = rows.iter().find(|r| r.key == "INDEXPATH").unwrap();
    assert!(!indexpath.from_environment);
    assert!(indexpath.env_var.is_none());
    assert_eq!(indexpath.value.as_deref(), Some("/srv/old-index"));
}

#[tokio::test]
#[serial]
async fn test_environment_override_withdrawn_falls_back_to_default() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    store.insert_raw_module_setting(ModuleSettingRecord::environment_sourced(
        "lucene-search",
        "BATCHSIZE",
        "PLUGIN_LUCENE_SEARCH_BATCHSIZE",
        false,
    ));

    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let rows = store.module_settings("lucene-search").await.unwrap();
    let batchsize = rows.iter().find(|r| r.key == "BATCHSIZE").unwrap();
    assert!(!batchsize.from_environment);
    assert_eq!(batchsize.value.as_deref(), Some("100"));
}

#[tokio::test]
#[serial]
async fn test_duplicate_records_cleaned_up() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    store.insert_raw_module_setting(ModuleSettingRecord::store_sourced(
        "lucene-search",
        "BATCHSIZE",
        "250",
        false,
    ));
    store.insert_raw_module_setting(ModuleSettingRecord::store_sourced(
        "lucene-search",
        "BATCHSIZE",
        "999",
        false,
    ));

    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    let reports = sync.run(&CancellationToken::new()).await;
    assert_eq!(reports[0].duplicates_removed, 1);

    let rows = store.module_settings("lucene-search").await.unwrap();
    let batch: Vec<_> = rows.iter().filter(|r| r.key == "BATCHSIZE").collect();
    assert_eq!(batch.len(), 1);
    // First row wins.
    assert_eq!(batch[0].value.as_deref(), Some("250"));
}

#[tokio::test]
#[serial]
async fn test_enable_locked_by_environment() {
    clear_lucene_vars();
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "false");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let manager = ModuleManager::new(store.clone(), registry.clone());
    let err = manager.set_enabled("lucene-search", true).await;
    assert!(matches!(err, Err(ConfigError::LockedByEnvironment(_, _))));

    // The lock applies to disable requests too.
    let err = manager.set_enabled("lucene-search", false).await;
    assert!(matches!(err, Err(ConfigError::LockedByEnvironment(_, _))));

    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_store_values_configure_module_for_ordinary_enable() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    // An operator entered the required value through the admin surface; no
    // environment variable is involved anywhere.
    store.insert_raw_module_setting(ModuleSettingRecord::store_sourced(
        "lucene-search",
        "INDEXPATH",
        "/srv/index",
        false,
    ));

    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    let reports = sync.run(&CancellationToken::new()).await;
    assert!(reports[0].configured);
    assert!(!reports[0].enabled);

    let record = store.module("lucene-search").await.unwrap().unwrap();
    assert!(record.configured);
    assert!(!record.enabled);

    // The ordinary write path now works.
    let manager = ModuleManager::new(store.clone(), registry.clone());
    manager.set_enabled("lucene-search", true).await.unwrap();
    assert!(store.module("lucene-search").await.unwrap().unwrap().enabled);
    assert_eq!(registry.enabled_calls(), vec!["lucene-search"]);
}

#[tokio::test]
#[serial]
async fn test_secret_schema_default_is_encrypted_at_rest() {
    clear_lucene_vars();

    let manifest = ModuleManifest::new("lucene-search", "2.1.0")
        .entry(ModuleSchemaEntry::new("APIKEY").secret().default("s3cret-default"));
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![manifest]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let rows = store.module_settings("lucene-search").await.unwrap();
    let apikey = rows.iter().find(|r| r.key == "APIKEY").unwrap();
    assert!(apikey.secret);
    assert!(!apikey.from_environment);

    // The committed record never carries the plaintext, and the payload
    // round-trips through the same cipher.
    let payload = apikey.value.as_deref().unwrap();
    assert_ne!(payload, "s3cret-default");
    assert!(!payload.contains("s3cret-default"));
    use squirrel_config::SecretCipher;
    let cipher = KeyedCipher::new("test-install-key");
    assert_eq!(cipher.decrypt(payload).unwrap(), "s3cret-default");
}

#[tokio::test]
#[serial]
async fn test_enable_requires_configured_module() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let manager = ModuleManager::new(store.clone(), registry.clone());
    let err = manager.set_enabled("lucene-search", true).await;
    assert!(matches!(err, Err(ConfigError::ModuleNotConfigured(_))));
}

#[tokio::test]
#[serial]
async fn test_core_module_cannot_be_deleted() {
    clear_lucene_vars();

    let core = ModuleManifest::new("page-store", "1.0.0").core();
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![core]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;

    let manager = ModuleManager::new(store.clone(), registry.clone());
    let err = manager.delete("page-store").await;
    assert!(matches!(err, Err(ConfigError::CoreModule(_))));
    assert!(manager.module("page-store").await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn test_cancellation_writes_nothing() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let reports = sync.run(&cancel).await;
    assert!(reports.is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_one_failing_module_does_not_abort_the_pass() {
    clear_lucene_vars();
    env::set_var("PLUGIN_BROKEN_MODULE_ENABLED", "true");
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "true");
    env::set_var("PLUGIN_LUCENE_SEARCH_INDEXPATH", "/var/lib/search");

    let broken = ModuleManifest::new("broken-module", "0.1.0");
    let registry = Arc::new(TestRegistry::new(vec![broken, lucene_manifest()]));
    registry.fail_enable_hook.store(true, Ordering::SeqCst);

    let store = Arc::new(MemoryStore::new());
    let sync = synchronizer(store.clone(), registry.clone());
    let reports = sync.run(&CancellationToken::new()).await;

    // The broken module's pass errored and produced no report, but the next
    // module was still reconciled and enabled.
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].module_id, "lucene-search");
    assert!(reports[0].enabled);
    assert_eq!(registry.enabled_calls(), vec!["lucene-search"]);

    env::remove_var("PLUGIN_BROKEN_MODULE_ENABLED");
    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_disable_override_fires_lifecycle_hook() {
    clear_lucene_vars();
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "true");
    env::set_var("PLUGIN_LUCENE_SEARCH_INDEXPATH", "/var/lib/search");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());
    sync.run(&CancellationToken::new()).await;
    assert!(store.module("lucene-search").await.unwrap().unwrap().enabled);

    // Operator flips the override to a falsy value and restarts.
    env::set_var("PLUGIN_LUCENE_SEARCH_ENABLED", "no");
    sync.run(&CancellationToken::new()).await;

    let record = store.module("lucene-search").await.unwrap().unwrap();
    assert!(!record.enabled);
    assert_eq!(registry.disabled_calls(), vec!["lucene-search"]);

    clear_lucene_vars();
}

#[tokio::test]
#[serial]
async fn test_reload_single_module() {
    clear_lucene_vars();

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TestRegistry::new(vec![lucene_manifest()]));
    let sync = synchronizer(store.clone(), registry.clone());

    let report = sync
        .reload("lucene-search", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.module_id, "lucene-search");
    assert_eq!(report.written, 2);

    let err = sync.reload("no-such-module", &CancellationToken::new()).await;
    assert!(matches!(err, Err(ConfigError::UnknownModule(_))));
}
