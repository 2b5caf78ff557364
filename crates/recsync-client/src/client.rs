//! Session Sync Client: composes the connection, reconnection policy,
//! registry and notification gate behind one shareable handle.
//!
//! All state transitions happen on a single driver task. Socket signals,
//! timer expiries, snapshot completions and lifecycle commands are funneled
//! into one `select!` loop and handled one at a time, so the registry and the
//! reconnection state are never mutated concurrently. Reads go through a
//! shared lock and never wait on the driver.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use recsync_core::{
    Alert, AlertSink, ConnectionFault, DeviceId, ReconnectState, SessionRecord, Severity,
    SyncConfig, SyncError, SyncEvent,
};
use recsync_telemetry::MetricsRecorder;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::address::ServerAddress;
use crate::connection::{ConnectionHandle, SocketEvent, SocketSignal};
use crate::gate::NotificationGate;
use crate::reconnect::{FaultDecision, ReconnectPolicy};
use crate::registry::SessionRegistry;
use crate::snapshot::{HttpSnapshotSource, SnapshotSource};
use crate::transport::{StreamConnector, WsConnector};

/// Typed event feed returned by [`SessionSyncClient::subscribe`].
pub type EventStream = Pin<Box<dyn Stream<Item = SyncEvent> + Send>>;

const EVENT_CAPACITY: usize = 256;

pub const METRIC_FRAMES_RECEIVED: &str = "frames.received";
pub const METRIC_FRAMES_DROPPED: &str = "frames.dropped";
pub const METRIC_CONNECTIONS_OPENED: &str = "connections.opened";
pub const METRIC_CONNECTION_FAULTS: &str = "connections.faults";
pub const METRIC_RECONNECT_SCHEDULED: &str = "reconnect.scheduled";
pub const METRIC_RECONNECT_DELAY: &str = "reconnect.delay_ms";
pub const METRIC_NOTIFICATIONS_EMITTED: &str = "notifications.emitted";
pub const METRIC_NOTIFICATIONS_SUPPRESSED: &str = "notifications.suppressed";
pub const METRIC_SNAPSHOT_APPLIED: &str = "snapshot.applied";
pub const METRIC_SNAPSHOT_FAILED: &str = "snapshot.failed";
pub const METRIC_SESSIONS_ACTIVE: &str = "sessions.active";

enum Command {
    Start {
        address: ServerAddress,
        ack: oneshot::Sender<()>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

type SnapshotResult = (u64, Result<Vec<SessionRecord>, SyncError>);

/// Handle to one sync client instance. Cheap to clone; every clone talks to
/// the same connection and registry.
///
/// The driver task shuts down once the last handle is dropped.
#[derive(Clone)]
pub struct SessionSyncClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<RwLock<SessionRegistry>>,
    reconnect: Arc<RwLock<ReconnectState>>,
    connected: watch::Receiver<bool>,
    last_error: watch::Receiver<Option<String>>,
    events: broadcast::Sender<SyncEvent>,
    metrics: Arc<MetricsRecorder>,
}

impl SessionSyncClient {
    /// Create a client and spawn its driver. Must be called inside a Tokio
    /// runtime. Nothing connects until [`start`](Self::start).
    pub fn new(
        config: SyncConfig,
        connector: Arc<dyn StreamConnector>,
        snapshots: Arc<dyn SnapshotSource>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);
        let (last_error_tx, last_error_rx) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let registry = Arc::new(RwLock::new(SessionRegistry::new()));
        let metrics = Arc::new(MetricsRecorder::new());
        let policy = ReconnectPolicy::new(&config);
        let reconnect = Arc::new(RwLock::new(policy.state()));

        let driver = Driver {
            gate: NotificationGate::new(config.notification_cooldown(), alerts),
            connection: ConnectionHandle::new(connector, socket_tx),
            policy,
            config: config.clone(),
            address: None,
            snapshots,
            snapshot_task: None,
            snapshot_epoch: 0,
            snapshot_tx,
            timer_tx,
            registry: Arc::clone(&registry),
            reconnect: Arc::clone(&reconnect),
            connected: connected_tx,
            last_error: last_error_tx,
            events: events_tx.clone(),
            metrics: Arc::clone(&metrics),
        };
        let _driver: JoinHandle<()> =
            tokio::spawn(driver.run(commands_rx, socket_rx, timer_rx, snapshot_rx));

        Self {
            inner: Arc::new(Inner {
                config,
                commands: commands_tx,
                registry,
                reconnect,
                connected: connected_rx,
                last_error: last_error_rx,
                events: events_tx,
                metrics,
            }),
        }
    }

    /// Client backed by the websocket connector and HTTP snapshot source.
    pub fn with_defaults(config: SyncConfig, alerts: Arc<dyn AlertSink>) -> Self {
        let connector = Arc::new(WsConnector::new(config.connect_timeout()));
        let snapshots = Arc::new(HttpSnapshotSource::new(config.snapshot_timeout()));
        Self::new(config, connector, snapshots, alerts)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Begin syncing against `address`.
    ///
    /// A no-op when already started for the same address. Restarts when the
    /// previous run exhausted its reconnection budget or when the address
    /// differs. An invalid address fails before anything is attempted.
    pub async fn start(&self, address: &str) -> Result<(), SyncError> {
        let address = ServerAddress::parse(address)?;
        let (ack, done) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Start { address, ack })
            .map_err(|_| SyncError::ClientClosed)?;
        done.await.map_err(|_| SyncError::ClientClosed)
    }

    /// Cancel any pending reconnect, close the socket and clear the registry.
    ///
    /// Returns once the teardown has happened; no reconnect fires afterwards.
    /// Safe to call repeatedly or before `start`.
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        if self.inner.commands.send(Command::Stop { ack }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn is_device_recording(&self, device_id: &DeviceId) -> bool {
        self.inner.registry.read().is_active(device_id)
    }

    pub fn get_recording_session(&self, device_id: &DeviceId) -> Option<SessionRecord> {
        self.inner.registry.read().get(device_id).cloned()
    }

    /// Every known session, ordered by device id.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.inner.registry.read().sessions()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    pub fn watch_last_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.last_error.clone()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        *self.inner.reconnect.read()
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.inner.metrics)
    }

    /// Attach a consumer. Dropping the stream detaches it.
    ///
    /// A consumer that falls too far behind skips the oldest events.
    pub fn subscribe(&self) -> EventStream {
        let stream = BroadcastStream::new(self.inner.events.subscribe()).filter_map(|item| {
            futures::future::ready(match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                    None
                }
            })
        });
        Box::pin(stream)
    }
}

struct Driver {
    config: SyncConfig,
    address: Option<ServerAddress>,
    connection: ConnectionHandle,
    policy: ReconnectPolicy,
    gate: NotificationGate,
    snapshots: Arc<dyn SnapshotSource>,
    snapshot_task: Option<JoinHandle<()>>,
    snapshot_epoch: u64,
    snapshot_tx: mpsc::UnboundedSender<SnapshotResult>,
    timer_tx: mpsc::UnboundedSender<u64>,
    registry: Arc<RwLock<SessionRegistry>>,
    reconnect: Arc<RwLock<ReconnectState>>,
    connected: watch::Sender<bool>,
    last_error: watch::Sender<Option<String>>,
    events: broadcast::Sender<SyncEvent>,
    metrics: Arc<MetricsRecorder>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut socket: mpsc::UnboundedReceiver<SocketSignal>,
        mut timers: mpsc::UnboundedReceiver<u64>,
        mut snapshots: mpsc::UnboundedReceiver<SnapshotResult>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
                Some(signal) = socket.recv() => self.handle_socket(signal),
                Some(epoch) = timers.recv() => self.handle_timer(epoch),
                Some((epoch, result)) = snapshots.recv() => self.handle_snapshot(epoch, result),
            }
        }
        debug!("all client handles dropped, shutting down");
        self.teardown();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { address, ack } => {
                self.start(address);
                let _ = ack.send(());
            }
            Command::Stop { ack } => {
                self.teardown();
                self.publish(SyncEvent::Stopped);
                info!("sync client stopped");
                let _ = ack.send(());
            }
        }
    }

    fn start(&mut self, address: ServerAddress) {
        if let Some(current) = self.address.clone() {
            if current == address && !self.policy.is_exhausted() {
                debug!(%address, "already started");
                return;
            }
            if current != address {
                info!(from = %current, to = %address, "switching server address");
                self.teardown();
            }
        }

        info!(%address, "starting recording session sync");
        self.policy.reset();
        self.sync_reconnect_view();
        self.address = Some(address);
        self.fetch_snapshot();
        self.open();
    }

    fn open(&mut self) {
        let Some(address) = &self.address else { return };
        let url = address.stream_url(self.config.device_filter.as_ref());
        let _ = self.connection.connect(&url);
    }

    fn fetch_snapshot(&mut self) {
        let Some(address) = &self.address else { return };
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        self.snapshot_epoch += 1;

        let epoch = self.snapshot_epoch;
        let url = address.snapshot_url();
        let source = Arc::clone(&self.snapshots);
        let timeout = self.config.snapshot_timeout();
        let tx = self.snapshot_tx.clone();
        self.snapshot_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, source.fetch(&url)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::snapshot(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                ))),
            };
            let _ = tx.send((epoch, result));
        }));
    }

    fn handle_snapshot(&mut self, epoch: u64, result: Result<Vec<SessionRecord>, SyncError>) {
        if epoch != self.snapshot_epoch {
            return;
        }
        self.snapshot_task = None;

        match result {
            Ok(records) => {
                let filter = self.config.device_filter.as_ref();
                let records = records
                    .into_iter()
                    .filter(|r| filter.map_or(true, |id| &r.device_id == id));
                let outcome = self.registry.write().seed(records);
                self.metrics
                    .counter_inc(METRIC_SNAPSHOT_APPLIED, &[], outcome.applied as u64);
                self.record_active_gauge();
                info!(
                    applied = outcome.applied,
                    skipped = outcome.skipped,
                    "recording status snapshot applied"
                );
                self.publish(SyncEvent::SnapshotApplied {
                    applied: outcome.applied,
                    skipped: outcome.skipped,
                });
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "recording status snapshot failed");
                self.metrics.counter_inc(METRIC_SNAPSHOT_FAILED, &[], 1);
                self.set_error(Some(e.to_string()));
                self.publish(SyncEvent::SnapshotFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn handle_socket(&mut self, signal: SocketSignal) {
        let SocketSignal { generation, event } = signal;
        match event {
            SocketEvent::Opened => self.on_opened(generation),
            SocketEvent::Frame(raw) => self.on_frame(generation, &raw),
            SocketEvent::Fault(fault) => self.on_fault(generation, fault),
        }
    }

    fn on_opened(&mut self, generation: u64) {
        if !self.connection.on_opened(generation) {
            return;
        }
        self.policy.on_connected();
        self.sync_reconnect_view();
        self.metrics.counter_inc(METRIC_CONNECTIONS_OPENED, &[], 1);
        let _ = self.connected.send_replace(true);
        self.set_error(None);
        self.publish(SyncEvent::ConnectionChanged {
            connected: true,
            reason: None,
        });
        self.notify(Alert::new(
            "Connected",
            "Connected to recording service",
            Severity::Success,
        ));
    }

    fn on_frame(&mut self, generation: u64, raw: &str) {
        let record = match self.connection.accept_frame(generation, raw) {
            None => return,
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!(error = %e, "dropping malformed frame");
                self.metrics.counter_inc(METRIC_FRAMES_DROPPED, &[], 1);
                self.set_error(Some(e.to_string()));
                self.publish(SyncEvent::FrameDropped {
                    reason: e.to_string(),
                });
                return;
            }
        };
        self.metrics.counter_inc(METRIC_FRAMES_RECEIVED, &[], 1);

        if let Some(filter) = &self.config.device_filter {
            if &record.device_id != filter {
                debug!(device_id = %record.device_id, "ignoring frame for filtered-out device");
                return;
            }
        }

        let previous = self.registry.write().apply(record.clone());
        let was_active = previous.is_some_and(|p| p.is_active);
        self.record_active_gauge();
        debug!(device_id = %record.device_id, was_active, is_active = record.is_active, "session updated");

        match (was_active, record.is_active) {
            (false, true) => self.notify(Alert::new(
                "Recording started",
                format!("Device {} started recording", record.device_id),
                Severity::Info,
            )),
            (true, false) => self.notify(Alert::new(
                "Recording stopped",
                format!("Device {} stopped recording", record.device_id),
                Severity::Info,
            )),
            _ => {}
        }
        self.publish(SyncEvent::SessionUpdated { record, was_active });
    }

    fn on_fault(&mut self, generation: u64, fault: ConnectionFault) {
        if !self.connection.on_fault(generation, &fault) {
            return;
        }
        self.metrics
            .counter_inc(METRIC_CONNECTION_FAULTS, &[("reason", fault.reason.as_str())], 1);
        let _ = self.connected.send_replace(false);
        self.set_error(Some(SyncError::from(fault.clone()).to_string()));
        self.publish(SyncEvent::ConnectionChanged {
            connected: false,
            reason: Some(fault.reason),
        });

        let decision = self.policy.on_fault();
        match decision {
            FaultDecision::Retry { attempt, delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                self.policy.schedule(delay, self.timer_tx.clone());
                self.sync_reconnect_view();
                self.metrics.counter_inc(METRIC_RECONNECT_SCHEDULED, &[], 1);
                self.metrics
                    .histogram_observe(METRIC_RECONNECT_DELAY, &[], delay_ms as f64);
                info!(attempt, delay_ms, max = self.config.max_reconnect_attempts, "reconnect scheduled");
                self.publish(SyncEvent::ReconnectScheduled { attempt, delay_ms });
                self.notify(Alert::new(
                    "Connection lost",
                    format!(
                        "Connection lost, retrying ({attempt}/{})",
                        self.config.max_reconnect_attempts
                    ),
                    Severity::Warning,
                ));
            }
            FaultDecision::Exhausted { attempts } => {
                self.sync_reconnect_view();
                let err = SyncError::ReconnectionExhausted { attempts };
                warn!(attempts, "giving up on recording service until restarted");
                self.set_error(Some(err.to_string()));
                self.publish(SyncEvent::ReconnectionExhausted { attempts });
                self.metrics.counter_inc(METRIC_NOTIFICATIONS_EMITTED, &[], 1);
                // Terminal: must reach the user even inside the cooldown window.
                self.gate.force_emit(Alert::new(
                    "Connection failed",
                    format!("Unable to reach recording service after {attempts} attempts"),
                    Severity::Error,
                ));
            }
        }
    }

    fn handle_timer(&mut self, epoch: u64) {
        if !self.policy.fire(epoch) {
            return;
        }
        self.sync_reconnect_view();
        debug!(attempt = self.policy.state().attempts, "reconnect timer fired");
        self.open();
    }

    /// Ordered teardown: timers, socket, pending snapshot, registry.
    fn teardown(&mut self) {
        self.policy.reset();
        self.connection.close();
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        self.snapshot_epoch += 1;
        self.registry.write().clear();
        self.address = None;

        self.sync_reconnect_view();
        self.record_active_gauge();
        let _ = self.connected.send_replace(false);
        self.set_error(None);
    }

    fn notify(&mut self, alert: Alert) {
        if self.gate.try_emit(alert) {
            self.metrics.counter_inc(METRIC_NOTIFICATIONS_EMITTED, &[], 1);
        } else {
            self.metrics.counter_inc(METRIC_NOTIFICATIONS_SUPPRESSED, &[], 1);
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_error(&self, error: Option<String>) {
        let _ = self.last_error.send_if_modified(|current| {
            if *current == error {
                return false;
            }
            *current = error;
            true
        });
    }

    fn sync_reconnect_view(&self) {
        *self.reconnect.write() = self.policy.state();
    }

    fn record_active_gauge(&self) {
        let active = self.registry.read().active_count();
        self.metrics
            .gauge_set(METRIC_SESSIONS_ACTIVE, &[], active as f64);
    }
}
