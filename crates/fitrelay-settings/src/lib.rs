//! # fitrelay-settings
//!
//! Configuration for the relay, loaded in three layers (lowest first):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `PORT`, `WS_PORT`, `DATABASE_URL`, `FITRELAY_*`
//!
//! Settings are loaded once at startup and handed to the server by value.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
