//! # sitehub-settings
//!
//! Layered configuration for the sitehub collaboration hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SitehubSettings::default()`]
//! 2. **Settings file**: `$SITEHUB_CONFIG` or `~/.sitehub/settings.json`
//! 3. **Environment variables**: `SITEHUB_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
