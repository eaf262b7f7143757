//! Squirrel Config: layered configuration resolution for the Squirrel server
//!
//! This library decides, for every named setting, which of several competing
//! sources controls the effective value — operator-set environment variables
//! always win, runtime edits land in a persistent store, and compiled-in
//! defaults fill the gaps — and keeps persisted extension-module settings
//! consistent with that resolution whenever the environment changes between
//! process restarts.
//!
//! # Main Features
//!
//! - Priority-ordered providers (environment > persistent store > default)
//!   with graceful per-provider degradation
//! - Immutable setting catalog with typed values and validation rules
//! - Secret values encrypted at rest and masked in logs
//! - Per-module settings reconciliation with environment enable-locks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use squirrel_config::{
//!     DefaultProvider, EnvProvider, KeyedCipher, MemoryStore, SettingsEngine,
//!     StoreProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = squirrel_config::registry::builtin();
//!     let store = Arc::new(MemoryStore::new());
//!     let cipher = Arc::new(KeyedCipher::new("install-key"));
//!
//!     let engine = SettingsEngine::new(
//!         registry.clone(),
//!         vec![
//!             Arc::new(EnvProvider::new(registry.clone())),
//!             Arc::new(StoreProvider::new(registry.clone(), store, cipher)),
//!             Arc::new(DefaultProvider::new(registry)),
//!         ],
//!     );
//!
//!     let caching = engine.get("SQUIRREL_ENABLE_CACHING").await;
//!     println!("caching enabled: {}", caching);
//! }
//! ```

// Public modules
pub mod common;
pub mod engine;
pub mod module;
pub mod provider;
pub mod registry;
pub mod secret;
pub mod store;

// Re-export commonly used structures and functions for convenience
pub use common::{ConfigError, Result};
pub use engine::SettingsEngine;
pub use module::{
    ExtensionRegistry, ModuleManager, ModuleManifest, ModuleSchemaEntry, ModuleSynchronizer,
    SyncReport,
};
pub use provider::{
    ConfigSource, DefaultProvider, EnvProvider, ResolvedValue, SettingProvider, StoreProvider,
};
pub use registry::{
    SettingCategory, SettingDescriptor, SettingRegistry, SettingValue, ValidationRule, ValueType,
};
pub use secret::{KeyedCipher, SecretCipher};
pub use store::{
    MemoryStore, ModuleRecord, ModuleSettingRecord, ModuleStore, SettingStore, StoredSetting,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
