//! Live recording-session sync client.
//!
//! [`SessionSyncClient`] keeps one stream socket to the recording service,
//! seeds its registry from a one-shot status snapshot, applies streamed
//! session records as they arrive and recovers from connection loss with
//! bounded exponential backoff. Connectivity and per-device changes are
//! surfaced as rate-limited alerts and as a typed event feed.

pub mod address;
pub mod client;
pub mod connection;
pub mod gate;
pub mod mock;
pub mod reconnect;
pub mod registry;
pub mod snapshot;
pub mod transport;

pub use address::ServerAddress;
pub use client::{EventStream, SessionSyncClient};
pub use gate::NotificationGate;
pub use reconnect::{FaultDecision, ReconnectPolicy};
pub use registry::{SeedOutcome, SessionRegistry};
pub use snapshot::{HttpSnapshotSource, SnapshotSource};
pub use transport::{FrameStream, StreamConnector, WsConnector};
