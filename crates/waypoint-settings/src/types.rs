//! Settings schema. Defaults carry the product constants.

use serde::{Deserialize, Serialize};

/// Root settings object (`~/.waypoint/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaypointSettings {
    pub session: SessionSettings,
    pub gate: GateSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl WaypointSettings {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.session.inactivity_timeout_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "session.inactivityTimeoutSecs must be > 0".into(),
            ));
        }
        if self.session.max_session_age_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "session.maxSessionAgeSecs must be > 0".into(),
            ));
        }
        if !(self.gate.distance_threshold_m.is_finite() && self.gate.distance_threshold_m > 0.0) {
            return Err(crate::SettingsError::InvalidValue(
                "gate.distanceThresholdM must be a positive number".into(),
            ));
        }
        if self.gate.resend_interval_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "gate.resendIntervalSecs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Session rollover policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Inactivity after which the next event starts a new session.
    pub inactivity_timeout_secs: u64,
    /// Maximum session age before rollover.
    pub max_session_age_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 30 * 60,
            max_session_age_secs: 240 * 60,
        }
    }
}

/// Location send-gate thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateSettings {
    pub distance_threshold_m: f64,
    pub resend_interval_secs: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            distance_threshold_m: 200.0,
            resend_interval_secs: 12 * 60 * 60,
        }
    }
}

/// Where durable state lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite key-value database path. Relative paths resolve against `~/.waypoint`.
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "database/waypoint.db".to_string(),
        }
    }
}

/// Logging output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Persist warn+ logs to SQLite.
    pub log_to_sqlite: bool,
    pub log_database_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_to_sqlite: false,
            log_database_path: "database/logs.db".to_string(),
        }
    }
}
