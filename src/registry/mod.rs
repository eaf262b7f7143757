//! Setting schema registry
//!
//! This module defines the static catalog of every known setting: key,
//! display metadata, value type, default, validation rule, secrecy and
//! mutability flags. The catalog is pure data with no I/O; it is built once
//! at startup through [`RegistryBuilder`] and injected into every consumer.

mod catalog;

pub use self::catalog::builtin;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::{error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::{ConfigError, Result};

/// Declared type of a setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Int,
    Bool,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Int => write!(f, "integer"),
            ValueType::Bool => write!(f, "boolean"),
        }
    }
}

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl SettingValue {
    /// The declared type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            SettingValue::String(_) => ValueType::String,
            SettingValue::Int(_) => ValueType::Int,
            SettingValue::Bool(_) => ValueType::Bool,
        }
    }

    /// The zero value for a declared type
    ///
    /// Used as the final resolution fallback for keys with no descriptor and
    /// no value from any provider.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String => SettingValue::String(String::new()),
            ValueType::Int => SettingValue::Int(0),
            ValueType::Bool => SettingValue::Bool(false),
        }
    }

    /// Convert a raw string (environment variable or store payload) to the
    /// declared type
    ///
    /// Booleans accept case-insensitive `true`, `1`, `yes` as true and treat
    /// everything else as false, so boolean conversion never fails. Integers
    /// use locale-invariant parsing and report a conversion error on failure.
    pub fn from_raw(key: &str, raw: &str, value_type: ValueType) -> Result<Self> {
        match value_type {
            ValueType::String => Ok(SettingValue::String(raw.to_string())),
            ValueType::Bool => Ok(SettingValue::Bool(is_truthy(raw))),
            ValueType::Int => raw
                .trim()
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|_| ConfigError::TypeConversion {
                    key: key.to_string(),
                    expected: "integer",
                }),
        }
    }

    /// The value as a boolean, when it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an integer, when it is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a string slice, when it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::String(s) => write!(f, "{}", s),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::String(s.to_string())
    }
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        SettingValue::Int(i)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

/// Recognized truthy spellings for boolean conversion
pub fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Recognized falsy spellings
///
/// Distinct from "not truthy": the module enable override only locks state
/// when the value is explicitly recognized in one of the two sets.
pub fn is_falsy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no")
}

/// Setting category, used to group settings in operator-facing listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingCategory {
    General,
    Appearance,
    Security,
    Performance,
    Email,
    Search,
    Advanced,
}

impl fmt::Display for SettingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingCategory::General => write!(f, "general"),
            SettingCategory::Appearance => write!(f, "appearance"),
            SettingCategory::Security => write!(f, "security"),
            SettingCategory::Performance => write!(f, "performance"),
            SettingCategory::Email => write!(f, "email"),
            SettingCategory::Search => write!(f, "search"),
            SettingCategory::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for SettingCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "general" => Ok(SettingCategory::General),
            "appearance" => Ok(SettingCategory::Appearance),
            "security" => Ok(SettingCategory::Security),
            "performance" => Ok(SettingCategory::Performance),
            "email" => Ok(SettingCategory::Email),
            "search" => Ok(SettingCategory::Search),
            "advanced" => Ok(SettingCategory::Advanced),
            _ => Err(ConfigError::UnknownSetting(format!("category '{}'", s))),
        }
    }
}

/// Validation rule attached to a descriptor
///
/// All applicable checks are evaluated by the engine; none short-circuits.
#[derive(Debug, Clone, Default)]
pub struct ValidationRule {
    /// Inclusive lower bound for numeric values
    pub min: Option<i64>,
    /// Inclusive upper bound for numeric values
    pub max: Option<i64>,
    /// Allowed values, matched case-insensitively against the stringified value
    pub allowed: Option<Vec<String>>,
    /// Value must parse as an absolute http/https URL
    pub absolute_url: bool,
    /// Value must match this pattern
    pub pattern: Option<Regex>,
}

impl ValidationRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the value to be within the inclusive range
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    /// Restrict the value to a fixed set, matched case-insensitively
    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Require an absolute http/https URL
    pub fn absolute_url(mut self) -> Self {
        self.absolute_url = true;
        self
    }

    /// Require the value to match a regular expression
    ///
    /// An invalid pattern is logged and ignored rather than panicking; the
    /// catalog is static, so this only ever fires during development.
    pub fn pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.pattern = Some(re),
            Err(e) => error!("Invalid validation pattern '{}': {}", pattern, e),
        }
        self
    }

    /// True when the rule contains no checks at all
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.allowed.is_none()
            && !self.absolute_url
            && self.pattern.is_none()
    }
}

/// Immutable description of a single known setting
///
/// Defined once at process start; the full catalog is a read-only table keyed
/// by `key` for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    /// Unique setting key
    pub key: String,
    /// Human-readable name for operator-facing listings
    pub display_name: String,
    /// Longer description of what the setting controls
    pub description: String,
    /// Grouping category
    pub category: SettingCategory,
    /// Declared value type
    pub value_type: ValueType,
    /// Compiled-in default, if any
    pub default: Option<SettingValue>,
    /// Backing environment variable name
    pub env_var: String,
    /// Value must never be stored or logged in clear text
    pub secret: bool,
    /// May be changed at runtime without a restart
    pub runtime_mutable: bool,
    /// Shown in operator-facing listings
    pub ui_visible: bool,
    /// Optional validation rule
    pub rule: Option<ValidationRule>,
}

impl SettingDescriptor {
    /// Create a descriptor with the common defaults: backed by an environment
    /// variable of the same name, visible, mutable, not secret, no rule.
    pub fn new(key: &str, value_type: ValueType) -> Self {
        Self {
            key: key.to_string(),
            display_name: key.to_string(),
            description: String::new(),
            category: SettingCategory::General,
            value_type,
            default: None,
            env_var: key.to_string(),
            secret: false,
            runtime_mutable: true,
            ui_visible: true,
            rule: None,
        }
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn category(mut self, category: SettingCategory) -> Self {
        self.category = category;
        self
    }

    pub fn default(mut self, value: impl Into<SettingValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn env_var(mut self, name: &str) -> Self {
        self.env_var = name.to_string();
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Mark the setting as requiring a restart to change
    pub fn requires_restart(mut self) -> Self {
        self.runtime_mutable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.ui_visible = false;
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// The process-wide read-only setting catalog
///
/// Lookup is by exact key. Definition order is preserved for `all()` so
/// operator listings stay stable across runs.
#[derive(Debug, Default)]
pub struct SettingRegistry {
    descriptors: Vec<SettingDescriptor>,
    index: HashMap<String, usize>,
}

impl SettingRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a descriptor by key
    ///
    /// Returns `None` for unrecognized keys; callers must handle the absent
    /// case explicitly. Dynamically-named module keys intentionally fall
    /// outside the static catalog.
    pub fn lookup(&self, key: &str) -> Option<&SettingDescriptor> {
        self.index.get(key).map(|&i| &self.descriptors[i])
    }

    /// All descriptors in definition order
    pub fn all(&self) -> impl Iterator<Item = &SettingDescriptor> {
        self.descriptors.iter()
    }

    /// Descriptors in the given category
    pub fn by_category(
        &self,
        category: SettingCategory,
    ) -> impl Iterator<Item = &SettingDescriptor> {
        self.descriptors.iter().filter(move |d| d.category == category)
    }

    /// Descriptors flagged for operator-facing listings
    pub fn ui_visible(&self) -> impl Iterator<Item = &SettingDescriptor> {
        self.descriptors.iter().filter(|d| d.ui_visible)
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for [`SettingRegistry`]
///
/// The builder is the only way to construct a registry, so the catalog is
/// immutable from the moment it exists.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<SettingDescriptor>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    /// Register a descriptor
    ///
    /// Registering the same key twice replaces the earlier descriptor and
    /// logs a warning; the catalog should never do this on purpose.
    pub fn register(mut self, descriptor: SettingDescriptor) -> Self {
        if let Some(&i) = self.index.get(&descriptor.key) {
            warn!("Setting '{}' registered twice, replacing", descriptor.key);
            self.descriptors[i] = descriptor;
        } else {
            self.index
                .insert(descriptor.key.clone(), self.descriptors.len());
            self.descriptors.push(descriptor);
        }
        self
    }

    pub fn build(self) -> SettingRegistry {
        SettingRegistry {
            descriptors: self.descriptors,
            index: self.index,
        }
    }
}
