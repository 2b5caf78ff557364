//! # recsync-core
//!
//! Shared vocabulary for the recording-session sync client:
//!
//! - **Wire model**: [`SessionRecord`], [`SnapshotResponse`], [`DeviceId`]
//! - **Errors**: [`SyncError`] taxonomy and [`ConnectionFault`] normalization
//! - **Config**: [`SyncConfig`] with serde defaults
//! - **Backoff**: capped exponential delay math
//! - **Signals**: [`SyncEvent`] for subscribers, [`Alert`] for the UI alert sink

pub mod alert;
pub mod backoff;
pub mod config;
pub mod errors;
pub mod events;
pub mod session;
pub mod state;

pub use alert::{Alert, AlertSink, Severity};
pub use config::SyncConfig;
pub use errors::{ConnectionFault, FaultReason, SyncError};
pub use events::SyncEvent;
pub use session::{DeviceId, SessionRecord, SnapshotResponse};
pub use state::{ConnectionState, ReconnectPhase, ReconnectState};
