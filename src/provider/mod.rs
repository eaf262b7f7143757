//! Configuration source providers
//!
//! Each provider answers "what is the value for key K, if any" with a fixed
//! priority, and the writable variant supports write-back. The engine only
//! ever talks to the [`SettingProvider`] trait.

mod defaults;
mod environment;
mod store;

pub use self::defaults::DefaultProvider;
pub use self::environment::EnvProvider;
pub use self::store::StoreProvider;

pub(crate) use self::environment::raw_env;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::Result;
use crate::registry::SettingValue;

/// Which provider supplies a key's effective value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Environment,
    PersistentStore,
    Default,
}

impl ConfigSource {
    /// Fixed priority per variant; higher wins
    pub fn priority(self) -> i32 {
        match self {
            ConfigSource::Environment => 100,
            ConfigSource::PersistentStore => 50,
            ConfigSource::Default => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Environment => "environment",
            ConfigSource::PersistentStore => "store",
            ConfigSource::Default => "default",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transient result of a lookup; created fresh on every resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub key: String,
    pub value: SettingValue,
    pub source: ConfigSource,
    /// Only meaningful for store-sourced values
    pub last_modified: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl ResolvedValue {
    /// A value with no provenance beyond its source tag
    pub fn bare(key: &str, value: SettingValue, source: ConfigSource) -> Self {
        Self {
            key: key.to_string(),
            value,
            source,
            last_modified: None,
            modified_by: None,
        }
    }
}

/// A source of configuration values with a fixed priority
///
/// `get` must not fail for an unknown key; it returns `Ok(None)`. Providers
/// that hit I/O trouble on reads log and degrade to absent so that one
/// failing source never blocks resolution from a lower-priority one.
#[async_trait]
pub trait SettingProvider: Send + Sync {
    /// Source tag for values produced by this provider
    fn source(&self) -> ConfigSource;

    /// Resolution priority; defaults to the source tag's fixed priority
    fn priority(&self) -> i32 {
        self.source().priority()
    }

    /// Value for `key`, or `Ok(None)` when this source has nothing for it
    async fn get(&self, key: &str) -> Result<Option<ResolvedValue>>;

    /// Whether this provider accepts writes for `key`
    fn can_write(&self, _key: &str) -> bool {
        false
    }

    /// Write `value` back to this source
    async fn write(
        &self,
        _key: &str,
        _value: &SettingValue,
        _modified_by: Option<&str>,
    ) -> Result<()> {
        Err(crate::common::ConfigError::Unsupported(
            self.source().as_str(),
        ))
    }

    /// Every key this source currently has a value for
    async fn all_keys(&self) -> Result<Vec<String>>;
}
