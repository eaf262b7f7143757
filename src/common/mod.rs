//! Common module
//!
//! Shared error types and logging helpers used throughout the crate.

pub mod error;
pub mod log;

pub use self::error::{ConfigError, Result};
pub use self::log::{mask_value, MASKED, PLUGIN_ENV_PREFIX};
