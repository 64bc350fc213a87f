// ── Activity log ──
//
// Bounded, newest-first feed of human-readable events. A display aid:
// entries are immutable once recorded and the only query is "most
// recent k".

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    Connection,
    Price,
    Availability,
    Status,
    NewListing,
    Announcement,
    Service,
    Error,
    UserJoined,
    UserLeft,
    PageChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub kind: ActivityKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
    next_id: u64,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Prepend an entry, evicting from the tail past capacity.
    pub fn record(
        &mut self,
        kind: ActivityKind,
        message: impl Into<String>,
        location: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.entries.push_front(ActivityEntry {
            id,
            kind,
            message: message.into(),
            timestamp,
            location,
        });
        self.entries.truncate(self.capacity);
        id
    }

    /// The `k` newest entries, newest first.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter().take(k)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.entries.front()
    }

    /// Drop entries stamped at or before `cutoff`. Returns how many went.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sixty_records_keep_newest_fifty() {
        let mut log = ActivityLog::default();
        let now = Utc::now();
        for i in 1..=60 {
            log.record(ActivityKind::Price, format!("record #{i}"), None, now);
        }

        assert_eq!(log.len(), 50);
        assert_eq!(log.latest().unwrap().message, "record #60");
        assert_eq!(log.iter().last().unwrap().message, "record #11");
    }

    #[test]
    fn recent_is_newest_first() {
        let mut log = ActivityLog::default();
        let now = Utc::now();
        log.record(ActivityKind::Connection, "a", None, now);
        log.record(ActivityKind::Connection, "b", None, now);
        log.record(ActivityKind::Connection, "c", None, now);

        let recent: Vec<_> = log.recent(2).map(|e| e.message.as_str()).collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn prune_drops_old_entries() {
        let mut log = ActivityLog::default();
        let now = Utc::now();
        log.record(
            ActivityKind::UserJoined,
            "old",
            None,
            now - chrono::Duration::hours(25),
        );
        log.record(ActivityKind::UserJoined, "fresh", None, now);

        assert_eq!(log.prune_older_than(now - chrono::Duration::hours(24)), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().message, "fresh");
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut log = ActivityLog::with_capacity(2);
        let now = Utc::now();
        let a = log.record(ActivityKind::Service, "a", None, now);
        let b = log.record(ActivityKind::Service, "b", None, now);
        let c = log.record(ActivityKind::Service, "c", None, now);
        assert!(a < b && b < c);
        assert_eq!(log.len(), 2);
    }
}
