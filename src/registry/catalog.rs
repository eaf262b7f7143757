//! Built-in setting catalog
//!
//! Single source of truth for the server's own settings. The table is built
//! exactly once through the registry builder; consumers receive it by
//! injection so tests can substitute a smaller registry.

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{
    RegistryBuilder, SettingCategory, SettingDescriptor, SettingRegistry, ValidationRule,
    ValueType,
};

/// Environment variable prefix for all core settings
pub const ENV_PREFIX: &str = "SQUIRREL_";

static BUILTIN: Lazy<Arc<SettingRegistry>> = Lazy::new(|| Arc::new(build().build()));

/// The built-in catalog, built on first use and shared afterwards
pub fn builtin() -> Arc<SettingRegistry> {
    Arc::clone(&BUILTIN)
}

fn build() -> RegistryBuilder {
    SettingRegistry::builder()
        // --- General ---
        .register(
            SettingDescriptor::new("SQUIRREL_SITE_NAME", ValueType::String)
                .display_name("Site name")
                .description("Name shown in the page header and browser title")
                .default("Squirrel Wiki"),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_SITE_URL", ValueType::String)
                .display_name("Site URL")
                .description("Public base URL of this installation")
                .default("http://localhost:8080")
                .rule(ValidationRule::new().absolute_url()),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_DEFAULT_LOCALE", ValueType::String)
                .display_name("Default locale")
                .description("Locale used for users without an explicit preference")
                .default("en-US")
                .rule(ValidationRule::new().pattern(r"^[a-z]{2}(-[A-Z]{2})?$")),
        )
        // --- Appearance ---
        .register(
            SettingDescriptor::new("SQUIRREL_THEME", ValueType::String)
                .display_name("Theme")
                .description("Active UI theme")
                .category(SettingCategory::Appearance)
                .default("light")
                .rule(ValidationRule::new().allowed(["light", "dark", "auto"])),
        )
        // --- Security ---
        .register(
            SettingDescriptor::new("SQUIRREL_MAX_LOGIN_ATTEMPTS", ValueType::Int)
                .display_name("Max login attempts")
                .description("Failed login attempts before an account is locked out")
                .category(SettingCategory::Security)
                .default(5_i64)
                .rule(ValidationRule::new().range(3, 10)),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_SESSION_TIMEOUT_MINUTES", ValueType::Int)
                .display_name("Session timeout")
                .description("Idle minutes before a session expires")
                .category(SettingCategory::Security)
                .default(60_i64)
                .rule(ValidationRule::new().range(5, 1440)),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_ALLOW_REGISTRATION", ValueType::Bool)
                .display_name("Allow registration")
                .description("Whether visitors can create their own accounts")
                .category(SettingCategory::Security)
                .default(false),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_API_KEY", ValueType::String)
                .display_name("API key")
                .description("Key required for API access")
                .category(SettingCategory::Security)
                .secret(),
        )
        // --- Performance ---
        .register(
            SettingDescriptor::new("SQUIRREL_ENABLE_CACHING", ValueType::Bool)
                .display_name("Enable caching")
                .description("Cache rendered pages in memory")
                .category(SettingCategory::Performance)
                .default(true),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_CACHE_TTL_SECONDS", ValueType::Int)
                .display_name("Cache TTL")
                .description("Seconds a cached page stays valid")
                .category(SettingCategory::Performance)
                .default(300_i64)
                .rule(ValidationRule::new().range(1, 86_400)),
        )
        // --- Email ---
        .register(
            SettingDescriptor::new("SQUIRREL_SMTP_HOST", ValueType::String)
                .display_name("SMTP host")
                .description("Outgoing mail server")
                .category(SettingCategory::Email)
                .default("localhost"),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_SMTP_PORT", ValueType::Int)
                .display_name("SMTP port")
                .category(SettingCategory::Email)
                .default(25_i64)
                .rule(ValidationRule::new().range(1, 65_535)),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_SMTP_PASSWORD", ValueType::String)
                .display_name("SMTP password")
                .category(SettingCategory::Email)
                .secret(),
        )
        // --- Advanced ---
        .register(
            SettingDescriptor::new("SQUIRREL_DATA_DIR", ValueType::String)
                .display_name("Data directory")
                .description("Filesystem location for uploads and attachments")
                .category(SettingCategory::Advanced)
                .default("data")
                .requires_restart(),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_LOG_LEVEL", ValueType::String)
                .display_name("Log level")
                .category(SettingCategory::Advanced)
                .default("info")
                .rule(ValidationRule::new().allowed(["error", "warn", "info", "debug", "trace"])),
        )
        .register(
            SettingDescriptor::new("SQUIRREL_INSTALL_ID", ValueType::String)
                .display_name("Installation id")
                .category(SettingCategory::Advanced)
                .requires_restart()
                .hidden(),
        )
}
