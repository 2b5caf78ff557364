//! User-facing alerts handed to the UI collaborator.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity tag rendered by the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    #[serde(rename = "severityTag")]
    pub severity: Severity,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Destination for alerts that passed the notification gate.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: Alert);
}

impl<F> AlertSink for F
where
    F: Fn(Alert) + Send + Sync,
{
    fn emit(&self, alert: Alert) {
        self(alert);
    }
}

impl AlertSink for mpsc::UnboundedSender<Alert> {
    fn emit(&self, alert: Alert) {
        // Receiver gone means the UI detached; nothing left to tell.
        let _ = self.send(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn severity_tag_on_the_wire() {
        let alert = Alert::new("Recording started", "Device D1 started recording", Severity::Info);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severityTag"], "info");
        assert_eq!(json["title"], "Recording started");
    }

    #[test]
    fn closure_sink_receives_alert() {
        let seen = Mutex::new(Vec::new());
        let sink = |alert: Alert| seen.lock().unwrap().push(alert.title);
        sink.emit(Alert::new("a", "b", Severity::Warning));
        assert_eq!(seen.lock().unwrap().as_slice(), ["a"]);
    }

    #[test]
    fn channel_sink_forwards_and_tolerates_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(Alert::new("x", "y", Severity::Error));
        assert_eq!(rx.try_recv().unwrap().severity, Severity::Error);
        drop(rx);
        tx.emit(Alert::new("x", "y", Severity::Error));
    }
}
