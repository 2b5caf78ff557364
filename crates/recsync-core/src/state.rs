use serde::{Deserialize, Serialize};

/// Lifecycle of the single stream socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    /// Connected or on its way there.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Phase of the reconnection state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPhase {
    #[default]
    Idle,
    Scheduled,
    Exhausted,
}

/// Observable view of the reconnection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_delay_ms: u64,
    pub phase: ReconnectPhase,
}
