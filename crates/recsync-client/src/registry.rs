//! Session Registry: latest known record per device.

use std::collections::{HashMap, HashSet};

use recsync_core::{DeviceId, SessionRecord};

/// Result of seeding the registry from a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub applied: usize,
    /// Entries skipped because the stream already reported that device.
    pub skipped: usize,
}

/// In-memory map from device to its latest record.
///
/// Streamed records always win over snapshot records: once a device has been
/// updated through [`apply`](Self::apply), a later [`seed`](Self::seed) leaves
/// it alone. The snapshot is only a baseline for devices the stream has not
/// mentioned yet.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DeviceId, SessionRecord>,
    streamed: HashSet<DeviceId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk upsert from a snapshot. Never removes entries.
    pub fn seed(&mut self, records: impl IntoIterator<Item = SessionRecord>) -> SeedOutcome {
        let mut outcome = SeedOutcome::default();
        for record in records {
            if self.streamed.contains(&record.device_id) {
                outcome.skipped += 1;
                continue;
            }
            let _ = self.sessions.insert(record.device_id.clone(), record);
            outcome.applied += 1;
        }
        outcome
    }

    /// Upsert a streamed record, returning the one it replaced.
    pub fn apply(&mut self, record: SessionRecord) -> Option<SessionRecord> {
        let _ = self.streamed.insert(record.device_id.clone());
        self.sessions.insert(record.device_id.clone(), record)
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<&SessionRecord> {
        self.sessions.get(device_id)
    }

    /// `false` for unknown devices.
    pub fn is_active(&self, device_id: &DeviceId) -> bool {
        self.sessions.get(device_id).is_some_and(|r| r.is_active)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.streamed.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.values().filter(|r| r.is_active).count()
    }

    /// Owned copy of every record, ordered by device id.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        let mut all: Vec<SessionRecord> = self.sessions.values().cloned().collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, active: bool) -> SessionRecord {
        SessionRecord::new(id, active)
    }

    #[test]
    fn apply_returns_previous() {
        let mut reg = SessionRegistry::new();
        assert!(reg.apply(rec("D1", true)).is_none());
        let prev = reg.apply(rec("D1", false)).unwrap();
        assert!(prev.is_active);
        assert!(!reg.is_active(&"D1".into()));
    }

    #[test]
    fn apply_replaces_wholesale() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("D1", true).with_extra("file_path", "a.mcap".into()));
        reg.apply(rec("D1", true));
        assert!(reg.get(&"D1".into()).unwrap().extra.is_empty());
    }

    #[test]
    fn new_device_leaves_others_untouched() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("D1", true));
        reg.apply(rec("D2", false));
        let before = reg.get(&"D1".into()).cloned();
        reg.apply(rec("D3", true));
        assert_eq!(reg.get(&"D1".into()).cloned(), before);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.active_count(), 2);
    }

    #[test]
    fn unknown_device_is_not_active() {
        let reg = SessionRegistry::new();
        assert!(!reg.is_active(&"nope".into()));
        assert!(reg.get(&"nope".into()).is_none());
    }

    #[test]
    fn seed_does_not_override_streamed_state() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("D1", false));
        let outcome = reg.seed(vec![rec("D1", true), rec("D2", true)]);
        assert_eq!(outcome, SeedOutcome { applied: 1, skipped: 1 });
        assert!(!reg.is_active(&"D1".into()));
        assert!(reg.is_active(&"D2".into()));
    }

    #[test]
    fn stream_overrides_seeded_state() {
        let mut reg = SessionRegistry::new();
        reg.seed(vec![rec("D1", true)]);
        let prev = reg.apply(rec("D1", false)).unwrap();
        assert!(prev.is_active);
        assert!(!reg.is_active(&"D1".into()));
    }

    #[test]
    fn empty_seed_keeps_entries() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("D1", true));
        assert_eq!(reg.seed(Vec::new()), SeedOutcome::default());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn clear_forgets_stream_precedence() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("D1", false));
        reg.clear();
        assert!(reg.is_empty());
        reg.seed(vec![rec("D1", true)]);
        assert!(reg.is_active(&"D1".into()));
    }

    #[test]
    fn sessions_sorted_by_device() {
        let mut reg = SessionRegistry::new();
        reg.apply(rec("b", true));
        reg.apply(rec("a", false));
        let ids: Vec<String> = reg.sessions().into_iter().map(|r| r.device_id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
