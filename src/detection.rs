// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera detection table: `DetectionKey -> first-seen instant`, with
//! TTL eviction. Written only by the [`crate::puller`]; read-only
//! snapshotted by handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

/// Suffix appended to a raw `SimpleItem` name when its `Value` reports the
/// sensor inactive. Keys ending in this suffix never trigger media sinks.
pub const INACTIVE_SUFFIX: &str = "_False";

pub fn is_sentinel(key: &str) -> bool {
    key.ends_with(INACTIVE_SUFFIX)
}

/// First-seen moment of a detection key, carried in two clocks: `at` (a
/// monotonic [`Instant`]) drives TTL eviction and `(key, instant)` equality
/// for the handled ledger; `wall` is the incident time used verbatim as the
/// saved-media basename.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seen {
    pub at: Instant,
    pub wall: DateTime<Local>,
}

impl Seen {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: Local::now(),
        }
    }
}

/// Thread-safe `DetectionKey -> first-seen` map. The mutex is only ever held
/// for the duration of a single insert/evict/snapshot call, never across an
/// `.await`.
#[derive(Clone, Default)]
pub struct DetectionTable {
    inner: Arc<Mutex<HashMap<String, Seen>>>,
}

impl DetectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` if absent. Re-inserting an existing key is a no-op — the
    /// first-seen moment is preserved so all consumers agree on the trigger
    /// identity.
    pub fn insert_if_absent(&self, key: String, seen: Seen) {
        let mut guard = self.inner.lock();
        guard.entry(key).or_insert(seen);
    }

    /// Remove every entry older than `expiry`.
    pub fn evict_older_than(&self, expiry: Duration, now: Instant) {
        let mut guard = self.inner.lock();
        guard.retain(|_, s| now.duration_since(s.at) <= expiry);
    }

    /// Snapshot entries whose key is targeted and not a `_False` sentinel.
    pub fn snapshot_relevant(&self, matches: impl Fn(&str) -> bool) -> Vec<(String, Seen)> {
        let guard = self.inner.lock();
        guard
            .iter()
            .filter(|(k, _)| !is_sentinel(k) && matches(k))
            .map(|(k, s)| (k.clone(), *s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Seen> {
        self.inner.lock().get(key).copied()
    }
}

/// Per-handler memory of which `(key, instant)` pairs have already been
/// acted upon. Handler-local; never shared or persisted.
#[derive(Default)]
pub struct HandledLedger {
    entries: HashMap<String, Instant>,
}

impl HandledLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trigger `(keys, instant)` is "new" if at least one key in the
    /// snapshot is missing from the ledger or recorded under a different
    /// instant.
    pub fn is_new_trigger(&self, snapshot: &[(String, Seen)]) -> bool {
        snapshot
            .iter()
            .any(|(k, s)| self.entries.get(k) != Some(&s.at))
    }

    /// Mark every key in the snapshot as handled at its instant — "if any is
    /// handled, all are".
    pub fn mark_handled(&mut self, snapshot: &[(String, Seen)]) {
        for (k, s) in snapshot {
            self.entries.insert(k.clone(), s.at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen_at(base: Instant, wall: DateTime<Local>, offset: Duration) -> Seen {
        Seen {
            at: base + offset,
            wall,
        }
    }

    #[test]
    fn reinserting_preserves_first_seen_instant() {
        let table = DetectionTable::new();
        let t0 = Instant::now();
        let wall = Local::now();
        table.insert_if_absent("IsPeople".into(), seen_at(t0, wall, Duration::ZERO));
        table.insert_if_absent(
            "IsPeople".into(),
            seen_at(t0, wall, Duration::from_secs(5)),
        );
        assert_eq!(table.get("IsPeople").unwrap().at, t0);
    }

    #[test]
    fn eviction_removes_only_expired_entries() {
        let table = DetectionTable::new();
        let t0 = Instant::now();
        let wall = Local::now();
        table.insert_if_absent("Old".into(), seen_at(t0, wall, Duration::ZERO));
        let later = t0 + Duration::from_secs(120);
        table.insert_if_absent("Fresh".into(), Seen { at: later, wall });
        table.evict_older_than(Duration::from_secs(60), later);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Fresh").unwrap().at, later);
    }

    #[test]
    fn snapshot_excludes_sentinel_and_unmatched_keys() {
        let table = DetectionTable::new();
        let now = Seen::now();
        table.insert_if_absent("IsPeople".into(), now);
        table.insert_if_absent("IsPeople_False".into(), now);
        table.insert_if_absent("IsCar".into(), now);

        let snap = table.snapshot_relevant(|k| k == "IsPeople");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "IsPeople");
    }

    #[test]
    fn handled_ledger_fires_once_per_trigger_instant() {
        let mut ledger = HandledLedger::new();
        let t0 = Seen::now();
        let snap = vec![("IsPeople".to_string(), t0), ("IsCar".to_string(), t0)];

        assert!(ledger.is_new_trigger(&snap));
        ledger.mark_handled(&snap);
        assert!(!ledger.is_new_trigger(&snap));

        // A later instant for the same key is a new, distinct incident.
        let t1 = Seen {
            at: t0.at + Duration::from_secs(61),
            wall: t0.wall,
        };
        let snap2 = vec![("IsPeople".to_string(), t1)];
        assert!(ledger.is_new_trigger(&snap2));
    }
}
