use serde::{Deserialize, Serialize};

use crate::errors::FaultReason;
use crate::session::SessionRecord;

/// Signals published to every subscriber of a sync client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    ConnectionChanged {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<FaultReason>,
    },

    /// A streamed record replaced the registry entry for its device.
    SessionUpdated {
        record: SessionRecord,
        was_active: bool,
    },

    SnapshotApplied {
        applied: usize,
        skipped: usize,
    },

    SnapshotFailed {
        reason: String,
    },

    FrameDropped {
        reason: String,
    },

    ReconnectScheduled {
        attempt: u32,
        delay_ms: u64,
    },

    /// Terminal until the next manual start.
    ReconnectionExhausted {
        attempts: u32,
    },

    Stopped,
}
