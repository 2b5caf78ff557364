//! One-shot status snapshot used to seed the registry.

use std::time::Duration;

use async_trait::async_trait;
use recsync_core::{SessionRecord, SnapshotResponse, SyncError};
use tracing::debug;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<SessionRecord>, SyncError>;
}

/// `GET`s the status-listing endpoint with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("recsync/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, url: &str) -> Result<Vec<SessionRecord>, SyncError> {
        debug!(url, "fetching recording status snapshot");
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            SyncError::snapshot(reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SnapshotFetchFailed {
                status: Some(status.as_u16()),
                reason: format!("unexpected status {status}"),
            });
        }

        let body: SnapshotResponse = response
            .json()
            .await
            .map_err(|e| SyncError::snapshot(format!("invalid body: {e}")))?;
        Ok(body.all_recording_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STATUS_PATH: &str = "/v1/device_manager/GetAllRecordingStatus";

    async fn server_with(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn decodes_status_list() {
        let server = server_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "AllRecordingStatus": [
                {"device_id": "D1", "is_active": true, "file_path": "a.mcap"},
                {"device_id": "D2", "is_active": false}
            ]
        })))
        .await;

        let source = HttpSnapshotSource::new(Duration::from_secs(5));
        let records = source
            .fetch(&format!("{}{STATUS_PATH}", server.uri()))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_active);
        assert_eq!(records[0].extra["file_path"], "a.mcap");
    }

    #[tokio::test]
    async fn non_success_status_is_soft_failure() {
        let server = server_with(ResponseTemplate::new(503)).await;
        let source = HttpSnapshotSource::new(Duration::from_secs(5));
        let err = source
            .fetch(&format!("{}{STATUS_PATH}", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_soft());
        assert_matches!(err, SyncError::SnapshotFetchFailed { status: Some(503), .. });
    }

    #[tokio::test]
    async fn garbage_body_is_soft_failure() {
        let server = server_with(ResponseTemplate::new(200).set_body_string("<html>")).await;
        let source = HttpSnapshotSource::new(Duration::from_secs(5));
        let err = source
            .fetch(&format!("{}{STATUS_PATH}", server.uri()))
            .await
            .unwrap_err();
        assert_matches!(err, SyncError::SnapshotFetchFailed { status: None, .. });
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = server_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"AllRecordingStatus": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .await;
        let source = HttpSnapshotSource::new(Duration::from_millis(50));
        let err = source
            .fetch(&format!("{}{STATUS_PATH}", server.uri()))
            .await
            .unwrap_err();
        assert_matches!(err, SyncError::SnapshotFetchFailed { ref reason, .. } if reason == "request timed out");
    }
}
