//! Error handling module
//!
//! This module defines the error types and result type alias used across the
//! configuration engine. Reads are designed to degrade rather than fail, so
//! most of these variants only ever surface on the write paths.

use thiserror::Error;

/// Configuration engine error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The key is not present in the setting registry
    ///
    /// Returned only by call sites that require a descriptor. Ordinary
    /// resolution treats unknown keys as dynamically-named and never fails.
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    /// Attempted write to a value currently supplied by the environment
    #[error("setting '{0}' is controlled by an environment variable and cannot be changed at runtime")]
    ImmutableSetting(String),

    /// The value failed the descriptor's validation rule
    ///
    /// Carries every collected violation, not just the first.
    #[error("invalid value for '{key}': {}", violations.join("; "))]
    Validation {
        key: String,
        violations: Vec<String>,
    },

    /// No provider accepts writes for this key
    #[error("no writable provider for setting '{0}'")]
    NoWritableProvider(String),

    /// A raw environment string did not parse to the declared type
    ///
    /// Recovered to absent on the read path; kept as an error type so the
    /// conversion helpers can report precisely what went wrong.
    #[error("value for '{key}' is not a valid {expected}")]
    TypeConversion { key: String, expected: &'static str },

    /// Persistent store I/O error
    #[error("storage error: {0}")]
    Storage(String),

    /// Corrupted or invalid secret payload
    #[error("failed to decrypt secret value: {0}")]
    Decrypt(String),

    /// Module enable/disable blocked by an active environment override
    #[error("module '{0}' enable state is locked by environment variable {1}")]
    LockedByEnvironment(String, String),

    /// No module record exists for this identifier
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Enable requested before every required setting has a value
    #[error("module '{0}' cannot be enabled until it is configured")]
    ModuleNotConfigured(String),

    /// Delete requested for a core module
    #[error("module '{0}' is a core module and cannot be deleted")]
    CoreModule(String),

    /// Write attempted against a read-only provider
    #[error("provider '{0}' does not support writes")]
    Unsupported(&'static str),

    /// The operation was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;
