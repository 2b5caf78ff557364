use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SyncError;

/// Identifier of a recording device, as assigned by the recording service.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Latest known recording state of one device.
///
/// Records are replaced wholesale on every update for the same device; fields
/// the client does not model (`file_path`, `device_type`, ...) ride along in
/// `extra` and are re-serialized untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub device_id: DeviceId,
    pub is_active: bool,
    #[serde(default, alias = "started_at", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    pub fn new(device_id: impl Into<DeviceId>, is_active: bool) -> Self {
        Self {
            device_id: device_id.into(),
            is_active,
            start_time: None,
            extra: Map::new(),
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.extra.insert(key.into(), value);
        self
    }

    /// Decode a single stream frame. One frame carries exactly one record.
    pub fn from_frame(raw: &str) -> Result<Self, SyncError> {
        serde_json::from_str(raw).map_err(|e| SyncError::MalformedFrame {
            reason: e.to_string(),
        })
    }
}

/// Body of the status-listing endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(rename = "AllRecordingStatus", default)]
    pub all_recording_status: Vec<SessionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn decodes_service_frame() {
        let raw = r#"{
            "device_id": "9a1d5e8c-0000-4000-8000-000000000001",
            "file_path": "recordings/device_9a1d.mcap",
            "is_active": true,
            "start_time": "2024-05-01T12:30:00Z",
            "device_type": "Ping360"
        }"#;
        let record = SessionRecord::from_frame(raw).unwrap();
        assert_eq!(record.device_id.as_str(), "9a1d5e8c-0000-4000-8000-000000000001");
        assert!(record.is_active);
        assert_eq!(
            record.start_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap())
        );
        assert_eq!(record.extra["device_type"], "Ping360");
        assert_eq!(record.extra["file_path"], "recordings/device_9a1d.mcap");
    }

    #[test]
    fn accepts_started_at_alias() {
        let raw = r#"{"device_id":"D1","is_active":false,"started_at":"2024-05-01T00:00:00Z"}"#;
        let record = SessionRecord::from_frame(raw).unwrap();
        assert!(record.start_time.is_some());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn extra_fields_survive_reserialization() {
        let raw = r#"{"device_id":"D1","is_active":true,"device_type":"Ping1D"}"#;
        let record = SessionRecord::from_frame(raw).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["device_type"], "Ping1D");
        assert!(json.get("start_time").is_none());
    }

    #[test]
    fn rejects_non_json_frame() {
        assert_matches!(
            SessionRecord::from_frame("not json"),
            Err(SyncError::MalformedFrame { .. })
        );
    }

    #[test]
    fn rejects_frame_without_active_flag() {
        assert_matches!(
            SessionRecord::from_frame(r#"{"device_id":"D1"}"#),
            Err(SyncError::MalformedFrame { .. })
        );
    }

    #[test]
    fn snapshot_missing_list_is_empty() {
        let body: SnapshotResponse = serde_json::from_str("{}").unwrap();
        assert!(body.all_recording_status.is_empty());
    }

    #[test]
    fn snapshot_decodes_list() {
        let body: SnapshotResponse = serde_json::from_str(
            r#"{"AllRecordingStatus":[{"device_id":"A","is_active":true},{"device_id":"B","is_active":false}]}"#,
        )
        .unwrap();
        assert_eq!(body.all_recording_status.len(), 2);
        assert_eq!(body.all_recording_status[1].device_id, DeviceId::from("B"));
    }

    #[test]
    fn device_id_display_and_parse() {
        let id: DeviceId = "dev-1".parse().unwrap();
        assert_eq!(id.to_string(), "dev-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"dev-1\"");
    }
}
