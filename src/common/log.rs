//! Logging helpers
//!
//! Secret values must never reach the log in clear text. Every code path that
//! logs a raw setting value goes through [`mask_value`] first.

/// Placeholder written to the log in place of a secret value
pub const MASKED: &str = "********";

/// Prefix used by plugin-scoped environment variables
///
/// Keys under this prefix may carry plugin secrets we have no descriptor for,
/// so they are masked unconditionally.
pub const PLUGIN_ENV_PREFIX: &str = "PLUGIN_";

/// Mask a value before logging it
///
/// Secret keys and plugin-scoped keys are always masked; everything else is
/// passed through unchanged.
pub fn mask_value<'a>(key: &str, value: &'a str, secret: bool) -> &'a str {
    if secret || key.starts_with(PLUGIN_ENV_PREFIX) {
        MASKED
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_masked() {
        assert_eq!(mask_value("SQUIRREL_SMTP_PASSWORD", "hunter2", true), MASKED);
    }

    #[test]
    fn test_plugin_key_is_masked_without_descriptor() {
        assert_eq!(
            mask_value("PLUGIN_LUCENE_SEARCH_APIKEY", "abc123", false),
            MASKED
        );
    }

    #[test]
    fn test_plain_value_passes_through() {
        assert_eq!(mask_value("SQUIRREL_SITE_NAME", "My Wiki", false), "My Wiki");
    }
}
