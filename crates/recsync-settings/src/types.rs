//! Settings types. Field names are camelCase on disk; every section is
//! defaulted so partial files are valid.

use recsync_core::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document (`~/.recsync/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecsyncSettings {
    pub server: ServerSettings,
    pub sync: SyncConfig,
    pub logging: LoggingSettings,
}

/// Where the recording service lives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Base address, e.g. `http://192.168.2.2:8080`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl RecsyncSettings {
    /// Reject combinations the reconnection policy cannot honour.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if sync.max_reconnect_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "maxReconnectAttempts must be at least 1".into(),
            ));
        }
        if sync.base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "baseDelayMs must be greater than 0".into(),
            ));
        }
        if sync.cap_delay_ms < sync.base_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "capDelayMs ({}) is below baseDelayMs ({})",
                sync.cap_delay_ms, sync.base_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = RecsyncSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.logging.level, "info");
        assert!(settings.server.address.is_none());
        assert_eq!(settings.sync.max_reconnect_attempts, 5);
    }

    #[test]
    fn rejects_cap_below_base() {
        let mut settings = RecsyncSettings::default();
        settings.sync.base_delay_ms = 5000;
        settings.sync.cap_delay_ms = 1000;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("capDelayMs (1000)"));
    }

    #[test]
    fn rejects_zero_attempts_and_zero_base() {
        let mut settings = RecsyncSettings::default();
        settings.sync.max_reconnect_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = RecsyncSettings::default();
        settings.sync.base_delay_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let settings: RecsyncSettings =
            serde_json::from_str(r#"{"server":{"address":"http://blueos.local:6060"}}"#).unwrap();
        assert_eq!(settings.server.address.as_deref(), Some("http://blueos.local:6060"));
        assert_eq!(settings.sync, SyncConfig::default());
        assert!(!settings.logging.json);
    }
}
