//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use recsync_core::DeviceId;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RecsyncSettings;

/// Resolve the path to the settings file (`~/.recsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".recsync").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RecsyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unreadable or invalid file is an error.
/// The merged result is validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<RecsyncSettings> {
    let defaults = serde_json::to_value(RecsyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RecsyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RECSYNC_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_env_overrides<F>(settings: &mut RecsyncSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("RECSYNC_SERVER") {
        settings.server.address = Some(v);
    }
    if let Some(v) = env.string("RECSYNC_DEVICE") {
        settings.sync.device_filter = Some(DeviceId::from_raw(v));
    }
    if let Some(v) = env.u32("RECSYNC_MAX_RECONNECT_ATTEMPTS", 1, 1000) {
        settings.sync.max_reconnect_attempts = v;
    }
    if let Some(v) = env.u64("RECSYNC_BASE_DELAY_MS", 1, 3_600_000) {
        settings.sync.base_delay_ms = v;
    }
    if let Some(v) = env.u64("RECSYNC_CAP_DELAY_MS", 1, 3_600_000) {
        settings.sync.cap_delay_ms = v;
    }
    if let Some(v) = env.u64("RECSYNC_NOTIFICATION_COOLDOWN_MS", 0, 86_400_000) {
        settings.sync.notification_cooldown_ms = v;
    }
    if let Some(v) = env.string("RECSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RECSYNC_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.u64(name, u64::from(min), u64::from(max))
            .and_then(|v| u32::try_from(v).ok())
    }
}
