//! Stream transport seam.
//!
//! A connector opens the recording-events socket and yields text frames
//! until the connection ends. Every way the socket can fail is reported as a
//! [`ConnectionFault`], so callers never see transport-specific errors.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use recsync_core::ConnectionFault;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

/// Inbound text frames. An `Err` item ends the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionFault>> + Send>>;

/// Opens a server-push stream.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FrameStream, ConnectionFault>;
}

/// `tokio-tungstenite` backed connector.
#[derive(Clone, Debug)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, ConnectionFault> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                ConnectionFault::network(format!(
                    "connect timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(classify_ws_error)?;

        debug!(url, "websocket handshake complete");

        // Read half only; the channel is push-only.
        let (_sink, source) = ws.split();
        let frames = source.filter_map(|msg| futures::future::ready(frame_from_message(msg)));
        Ok(Box::pin(frames))
    }
}

fn frame_from_message(
    msg: Result<Message, WsError>,
) -> Option<Result<String, ConnectionFault>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Message::Close(frame)) => {
            let detail = frame.map_or_else(
                || "close frame".to_string(),
                |f| format!("close frame {}: {}", u16::from(f.code), f.reason.as_str()),
            );
            Some(Err(ConnectionFault::remote_closed(detail)))
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(classify_ws_error(e))),
    }
}

/// Map a tungstenite error onto the fault taxonomy.
pub fn classify_ws_error(err: WsError) -> ConnectionFault {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ConnectionFault::remote_closed(err.to_string())
        }
        WsError::Io(_) | WsError::Url(_) => ConnectionFault::network(err.to_string()),
        other => ConnectionFault::protocol(other.to_string()),
    }
}
