use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Type of metric.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// One metric value as seen by [`MetricsRecorder::snapshot`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub metric_type: MetricType,
}

/// Point-in-time view of every recorded metric.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub samples: Vec<MetricSample>,
}

impl MetricsSnapshot {
    pub fn find(&self, name: &str) -> Option<&MetricSample> {
        self.samples.iter().find(|s| s.name == name)
    }
}

/// In-memory counter. Monotonically increasing.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
    fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// In-memory gauge, stored as `f64` bits.
struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0f64.to_bits()),
        }
    }
    fn set(&self, v: f64) {
        self.value.store(v.to_bits(), Ordering::Relaxed);
    }
    fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Most recent observations kept per histogram for percentiles.
pub const HISTOGRAM_WINDOW: usize = 1024;

/// In-memory histogram. `count`, `sum`, `min` and `max` cover every
/// observation; percentiles come from the last [`HISTOGRAM_WINDOW`] values.
struct Histogram {
    state: Mutex<HistogramState>,
}

#[derive(Default)]
struct HistogramState {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    recent: VecDeque<f64>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            state: Mutex::new(HistogramState::default()),
        }
    }
    fn observe(&self, value: f64) {
        let mut state = self.state.lock();
        if state.count == 0 {
            state.min = value;
            state.max = value;
        } else {
            state.min = state.min.min(value);
            state.max = state.max.max(value);
        }
        state.count += 1;
        state.sum += value;
        if state.recent.len() == HISTOGRAM_WINDOW {
            let _ = state.recent.pop_front();
        }
        state.recent.push_back(value);
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn summary(&self) -> HistogramSummary {
        let state = self.state.lock();
        if state.count == 0 {
            return HistogramSummary::default();
        }
        let mut recent: Vec<f64> = state.recent.iter().copied().collect();
        recent.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let len = recent.len();
        HistogramSummary {
            count: state.count,
            sum: state.sum,
            min: state.min,
            max: state.max,
            p50: recent[len / 2],
            p95: recent[((len as f64 * 0.95) as usize).min(len - 1)],
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.to_string(),
            labels: sorted,
        }
    }

    fn label_map(&self) -> BTreeMap<String, String> {
        self.labels.iter().cloned().collect()
    }
}

/// Process-local metrics for one sync client. Nothing is persisted.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    gauges: RwLock<HashMap<MetricKey, Gauge>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        if let Some(c) = self.counters.read().get(&key) {
            c.increment(n);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(Counter::new)
            .increment(n);
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        if let Some(g) = self.gauges.read().get(&key) {
            g.set(value);
            return;
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(Gauge::new)
            .set(value);
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        if let Some(h) = self.histograms.read().get(&key) {
            h.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(key)
            .or_insert_with(Histogram::new)
            .observe(value);
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, Counter::get)
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = MetricKey::new(name, labels);
        self.gauges.read().get(&key).map_or(0.0, Gauge::get)
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms
            .read()
            .get(&key)
            .map(Histogram::summary)
            .unwrap_or_default()
    }

    /// Collect every metric; histograms report their p50.
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut samples = Vec::new();

        for (key, counter) in self.counters.read().iter() {
            samples.push(MetricSample {
                name: key.name.clone(),
                labels: key.label_map(),
                value: counter.get() as f64,
                metric_type: MetricType::Counter,
            });
        }
        for (key, gauge) in self.gauges.read().iter() {
            samples.push(MetricSample {
                name: key.name.clone(),
                labels: key.label_map(),
                value: gauge.get(),
                metric_type: MetricType::Gauge,
            });
        }
        for (key, histogram) in self.histograms.read().iter() {
            samples.push(MetricSample {
                name: key.name.clone(),
                labels: key.label_map(),
                value: histogram.summary().p50,
                metric_type: MetricType::Histogram,
            });
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_basic() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("connections.faults", &[("reason", "remote_closed")], 1);
        recorder.counter_inc("connections.faults", &[("reason", "remote_closed")], 1);
        recorder.counter_inc("connections.faults", &[("reason", "network_error")], 1);

        assert_eq!(recorder.counter_get("connections.faults", &[("reason", "remote_closed")]), 2);
        assert_eq!(recorder.counter_get("connections.faults", &[("reason", "network_error")]), 1);
        assert_eq!(recorder.counter_get("connections.faults", &[("reason", "protocol_error")]), 0);
    }

    #[test]
    fn label_order_does_not_matter() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("x", &[("a", "1"), ("b", "2")], 3);
        assert_eq!(recorder.counter_get("x", &[("b", "2"), ("a", "1")]), 3);
    }

    #[test]
    fn gauge_overwrites() {
        let recorder = MetricsRecorder::new();
        recorder.gauge_set("sessions.active", &[], 4.0);
        recorder.gauge_set("sessions.active", &[], 2.0);
        assert_eq!(recorder.gauge_get("sessions.active", &[]), 2.0);
        assert_eq!(recorder.gauge_get("missing", &[]), 0.0);
    }

    #[test]
    fn histogram_summary_values() {
        let recorder = MetricsRecorder::new();
        for v in [1000.0, 2000.0, 4000.0, 8000.0] {
            recorder.histogram_observe("reconnect.delay_ms", &[], v);
        }
        let summary = recorder.histogram_summary("reconnect.delay_ms", &[]);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.sum, 15_000.0);
        assert_eq!(summary.min, 1000.0);
        assert_eq!(summary.max, 8000.0);
        assert_eq!(summary.p50, 4000.0);
    }

    #[test]
    fn histogram_memory_is_bounded() {
        let recorder = MetricsRecorder::new();
        let total = HISTOGRAM_WINDOW * 3;
        for v in 0..total {
            recorder.histogram_observe("reconnect.delay_ms", &[], v as f64);
        }
        let summary = recorder.histogram_summary("reconnect.delay_ms", &[]);
        assert_eq!(summary.count, total as u64);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, (total - 1) as f64);
        assert_eq!(summary.sum, (0..total).map(|v| v as f64).sum::<f64>());
        // Percentiles only see the most recent window.
        assert!(summary.p50 >= (total - HISTOGRAM_WINDOW) as f64);

        let histograms = recorder.histograms.read();
        let key = MetricKey::new("reconnect.delay_ms", &[]);
        assert_eq!(histograms[&key].state.lock().recent.len(), HISTOGRAM_WINDOW);
    }

    #[test]
    fn histogram_empty() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.histogram_summary("nothing", &[]), HistogramSummary::default());
    }

    #[test]
    fn snapshot_collects_all_types() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("frames.received", &[], 7);
        recorder.gauge_set("sessions.active", &[], 1.0);
        recorder.histogram_observe("reconnect.delay_ms", &[], 500.0);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.samples.len(), 3);
        assert_eq!(snapshot.find("frames.received").unwrap().value, 7.0);
        assert_eq!(
            snapshot.find("reconnect.delay_ms").unwrap().metric_type,
            MetricType::Histogram
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["timestamp"].is_string());
    }
}
