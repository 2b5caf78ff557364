//! Notification Gate: one global cooldown for every user-facing alert.

use std::sync::Arc;
use std::time::Duration;

use recsync_core::{Alert, AlertSink};
use tokio::time::Instant;
use tracing::debug;

pub struct NotificationGate {
    cooldown: Duration,
    last_sent_at: Option<Instant>,
    sink: Arc<dyn AlertSink>,
}

impl NotificationGate {
    pub fn new(cooldown: Duration, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            cooldown,
            last_sent_at: None,
            sink,
        }
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Forward `alert` unless one was sent within the cooldown window.
    pub fn try_emit(&mut self, alert: Alert) -> bool {
        self.try_emit_at(alert, Instant::now())
    }

    pub fn try_emit_at(&mut self, alert: Alert, now: Instant) -> bool {
        let open = match self.last_sent_at {
            None => true,
            Some(last) => {
                self.cooldown.is_zero() || now.saturating_duration_since(last) > self.cooldown
            }
        };
        if !open {
            debug!(title = %alert.title, "alert suppressed by cooldown");
            return false;
        }
        self.last_sent_at = Some(now);
        self.sink.emit(alert);
        true
    }

    /// Bypass the cooldown. Still restarts the window.
    ///
    /// Reserved for the reconnection-exhausted alert: it is the last alert an
    /// outage produces and must not be swallowed by an earlier warning's
    /// window. Everything else goes through [`Self::try_emit`].
    pub fn force_emit(&mut self, alert: Alert) {
        self.last_sent_at = Some(Instant::now());
        self.sink.emit(alert);
    }
}
