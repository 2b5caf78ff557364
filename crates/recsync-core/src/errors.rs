use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a stream connection went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultReason {
    /// Open failed or the transport broke underneath us.
    NetworkError,
    /// The server closed the socket or the stream ended.
    RemoteClosed,
    /// Handshake or framing violated the websocket protocol.
    ProtocolError,
}

impl FaultReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::RemoteClosed => "remote_closed",
            Self::ProtocolError => "protocol_error",
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single normalized signal for every way a connection can fail.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct ConnectionFault {
    pub reason: FaultReason,
    pub detail: String,
}

impl ConnectionFault {
    pub fn new(reason: FaultReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FaultReason::NetworkError, detail)
    }

    pub fn remote_closed(detail: impl Into<String>) -> Self {
        Self::new(FaultReason::RemoteClosed, detail)
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(FaultReason::ProtocolError, detail)
    }
}

/// Error taxonomy for the sync client.
///
/// Soft errors (a bad frame, a failed snapshot) are absorbed and surface only
/// through the observable error flag. Exhaustion is terminal until the next
/// manual start.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("connection fault: {0}")]
    Connection(#[from] ConnectionFault),

    #[error("reconnection exhausted after {attempts} attempts")]
    ReconnectionExhausted { attempts: u32 },

    #[error("snapshot fetch failed: {reason}")]
    SnapshotFetchFailed { status: Option<u16>, reason: String },

    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("sync client is no longer running")]
    ClientClosed,
}

impl SyncError {
    pub fn snapshot(reason: impl Into<String>) -> Self {
        Self::SnapshotFetchFailed {
            status: None,
            reason: reason.into(),
        }
    }

    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_owned(),
            reason: reason.into(),
        }
    }

    /// Only exhaustion stops automatic recovery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectionExhausted { .. })
    }

    /// Failures absorbed locally without touching the stream.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::SnapshotFetchFailed { .. }
        )
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::Connection(fault) => fault.reason.as_str(),
            Self::ReconnectionExhausted { .. } => "reconnection_exhausted",
            Self::SnapshotFetchFailed { .. } => "snapshot_fetch_failed",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::ClientClosed => "client_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_terminal_classification() {
        assert!(SyncError::MalformedFrame { reason: "eof".into() }.is_soft());
        assert!(SyncError::snapshot("timeout").is_soft());
        assert!(SyncError::ReconnectionExhausted { attempts: 5 }.is_terminal());

        let fault: SyncError = ConnectionFault::network("refused").into();
        assert!(!fault.is_soft());
        assert!(!fault.is_terminal());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(
            SyncError::from(ConnectionFault::remote_closed("bye")).error_kind(),
            "remote_closed"
        );
        assert_eq!(
            SyncError::invalid_address("", "empty").error_kind(),
            "invalid_address"
        );
        assert_eq!(SyncError::ClientClosed.error_kind(), "client_closed");
    }

    #[test]
    fn fault_display_includes_reason() {
        let fault = ConnectionFault::protocol("bad handshake");
        assert_eq!(fault.to_string(), "protocol_error: bad handshake");
    }

    #[test]
    fn invalid_address_display() {
        let err = SyncError::invalid_address("ftp://x", "unsupported scheme");
        assert_eq!(
            err.to_string(),
            "invalid server address \"ftp://x\": unsupported scheme"
        );
    }
}
