//! # ember-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EmberSettings::default()`]
//! 2. **User file**: `~/.ember/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `EMBER_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<EmberSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.ember/settings.json` with env var
/// overrides. If loading fails, logs the error and returns compiled defaults.
pub fn get_settings() -> &'static EmberSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to load settings, using defaults");
            EmberSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: EmberSettings) -> std::result::Result<(), EmberSettings> {
    SETTINGS.set(settings)
}
