//! Connection Handle: owns the single stream socket and its lifecycle.
//!
//! The socket itself lives in a pump task that forwards [`SocketSignal`]s to
//! the driver. Every signal carries the generation it was opened under;
//! signals from a superseded or closed socket are ignored.

use std::sync::Arc;

use futures::StreamExt;
use recsync_core::{ConnectionFault, ConnectionState, SessionRecord, SyncError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::transport::StreamConnector;

#[derive(Debug)]
pub enum SocketEvent {
    Opened,
    Frame(String),
    Fault(ConnectionFault),
}

#[derive(Debug)]
pub struct SocketSignal {
    pub generation: u64,
    pub event: SocketEvent,
}

pub struct ConnectionHandle {
    connector: Arc<dyn StreamConnector>,
    signals: mpsc::UnboundedSender<SocketSignal>,
    state: ConnectionState,
    url: Option<String>,
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        signals: mpsc::UnboundedSender<SocketSignal>,
    ) -> Self {
        Self {
            connector,
            signals,
            state: ConnectionState::Disconnected,
            url: None,
            generation: 0,
            pump: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open the socket at `url`.
    ///
    /// No-op (returns `false`) when already connecting or connected to the
    /// same URL. A live socket to a different URL is replaced.
    pub fn connect(&mut self, url: &str) -> bool {
        if self.state.is_live() && self.url.as_deref() == Some(url) {
            debug!(url, state = ?self.state, "connect ignored, socket already live");
            return false;
        }
        self.abort_pump();

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.url = Some(url.to_owned());
        debug!(url, generation = self.generation, "opening stream socket");

        self.pump = Some(tokio::spawn(pump(
            Arc::clone(&self.connector),
            url.to_owned(),
            self.generation,
            self.signals.clone(),
        )));
        true
    }

    /// Open acknowledgment from the pump. Returns `true` on the
    /// `Connecting -> Connected` transition.
    pub fn on_opened(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        info!(url = self.url.as_deref().unwrap_or_default(), generation, "stream connected");
        true
    }

    /// Parse one inbound frame. `None` for frames from a stale socket.
    ///
    /// A malformed frame is returned as an error but leaves the socket open.
    pub fn accept_frame(
        &self,
        generation: u64,
        raw: &str,
    ) -> Option<Result<SessionRecord, SyncError>> {
        if generation != self.generation || self.state != ConnectionState::Connected {
            return None;
        }
        Some(SessionRecord::from_frame(raw))
    }

    /// Fault from the pump. Returns `true` if it concerns the live socket,
    /// which is then `Disconnected`.
    pub fn on_fault(&mut self, generation: u64, fault: &ConnectionFault) -> bool {
        if generation != self.generation || !self.state.is_live() {
            return false;
        }
        self.abort_pump();
        self.state = ConnectionState::Disconnected;
        info!(generation, reason = %fault.reason, detail = %fault.detail, "stream connection lost");
        true
    }

    /// Idempotent. Always ends `Disconnected`; signals still in flight from
    /// the closed socket are invalidated.
    pub fn close(&mut self) {
        if self.state.is_live() {
            self.state = ConnectionState::Closing;
            debug!(generation = self.generation, "closing stream socket");
        }
        self.abort_pump();
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
    }

    fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.abort_pump();
    }
}

async fn pump(
    connector: Arc<dyn StreamConnector>,
    url: String,
    generation: u64,
    signals: mpsc::UnboundedSender<SocketSignal>,
) {
    let send = |event| signals.send(SocketSignal { generation, event }).is_ok();

    let mut frames = match connector.connect(&url).await {
        Ok(frames) => frames,
        Err(fault) => {
            let _ = send(SocketEvent::Fault(fault));
            return;
        }
    };
    if !send(SocketEvent::Opened) {
        return;
    }

    while let Some(item) = frames.next().await {
        match item {
            Ok(text) => {
                if !send(SocketEvent::Frame(text)) {
                    return;
                }
            }
            Err(fault) => {
                let _ = send(SocketEvent::Fault(fault));
                return;
            }
        }
    }
    let _ = send(SocketEvent::Fault(ConnectionFault::remote_closed("stream ended")));
}
