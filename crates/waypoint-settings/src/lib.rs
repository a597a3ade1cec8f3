//! # waypoint-settings
//!
//! Layered configuration for the waypoint session engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WaypointSettings::default()`]
//! 2. **User file**: `~/.waypoint/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WAYPOINT_*` overrides (highest priority)
//!
//! Settings are read once at startup and never change while running.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, resolve_path, settings_path, waypoint_home,
};
pub use types::*;
