//! Tunables for the sync client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::DeviceId;

/// Default reconnection budget per outage.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default base delay for exponential backoff in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default backoff cap in milliseconds.
pub const DEFAULT_CAP_DELAY_MS: u64 = 30_000;
/// Default global alert cooldown in milliseconds.
pub const DEFAULT_NOTIFICATION_COOLDOWN_MS: u64 = 30_000;
/// Default socket open timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Default snapshot request timeout in milliseconds.
pub const DEFAULT_SNAPSHOT_TIMEOUT_MS: u64 = 10_000;

/// Configuration for one sync client instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Reconnect attempts before giving up (default: 5).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between reconnect attempts in ms (default: 30000).
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    /// Minimum spacing between user-facing alerts in ms (default: 30000).
    #[serde(default = "default_notification_cooldown_ms")]
    pub notification_cooldown_ms: u64,
    /// Socket open timeout in ms (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Snapshot request timeout in ms (default: 10000).
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
    /// Restrict the stream and snapshot to one device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_filter: Option<DeviceId>,
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_cap_delay_ms() -> u64 {
    DEFAULT_CAP_DELAY_MS
}
fn default_notification_cooldown_ms() -> u64 {
    DEFAULT_NOTIFICATION_COOLDOWN_MS
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_snapshot_timeout_ms() -> u64 {
    DEFAULT_SNAPSHOT_TIMEOUT_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            cap_delay_ms: DEFAULT_CAP_DELAY_MS,
            notification_cooldown_ms: DEFAULT_NOTIFICATION_COOLDOWN_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            snapshot_timeout_ms: DEFAULT_SNAPSHOT_TIMEOUT_MS,
            device_filter: None,
        }
    }
}

impl SyncConfig {
    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_millis(self.notification_cooldown_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}
