//! Scriptable connector and snapshot source for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use recsync_core::{ConnectionFault, SessionRecord, SyncError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::snapshot::SnapshotSource;
use crate::transport::{FrameStream, StreamConnector};

type FrameSender = mpsc::UnboundedSender<Result<String, ConnectionFault>>;

/// Connector whose stream is fed by the test.
///
/// Every successful `connect` opens a fresh in-memory stream and replaces the
/// previous one, which then ends.
#[derive(Default)]
pub struct MockConnector {
    connects: AtomicUsize,
    urls: Mutex<Vec<String>>,
    refusals: AtomicUsize,
    live: Mutex<Option<FrameSender>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connects with a network fault.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    /// Whether a stream is currently open on the test side.
    pub fn is_open(&self) -> bool {
        self.live.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver a text frame on the open stream. `false` if none is open.
    pub fn push_frame(&self, raw: &str) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(raw.to_owned())).is_ok())
    }

    /// Deliver a fault; the stream is finished afterwards.
    pub fn push_fault(&self, fault: ConnectionFault) -> bool {
        self.live
            .lock()
            .take()
            .is_some_and(|tx| tx.send(Err(fault)).is_ok())
    }

    /// End the open stream without a fault item.
    pub fn end_stream(&self) {
        let _ = self.live.lock().take();
    }
}

#[async_trait]
impl StreamConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, ConnectionFault> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_owned());

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ConnectionFault::network("connection refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Snapshot source returning scripted results in order.
///
/// Once the script runs out every fetch returns an empty list.
#[derive(Default)]
pub struct MockSnapshotSource {
    fetches: AtomicUsize,
    responses: Mutex<VecDeque<Result<Vec<SessionRecord>, SyncError>>>,
    gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

impl MockSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SessionRecord>) -> Self {
        let source = Self::new();
        source.push_response(Ok(records));
        source
    }

    pub fn with_error(error: SyncError) -> Self {
        let source = Self::new();
        source.push_response(Err(error));
        source
    }

    pub fn push_response(&self, response: Result<Vec<SessionRecord>, SyncError>) {
        self.responses.lock().push_back(response);
    }

    /// Hold the next fetch until the returned sender fires or is dropped.
    pub fn hold_next(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshotSource {
    async fn fetch(&self, _url: &str) -> Result<Vec<SessionRecord>, SyncError> {
        let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
        let held = self.gate.lock().take();
        if let Some(release) = held {
            let _ = release.await;
        }
        self.responses.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
