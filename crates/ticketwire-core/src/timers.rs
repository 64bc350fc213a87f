//! Deadline bookkeeping for deferred effects.
//!
//! Components never spawn their own sleeps. Each one owns a [`TimerSet`]
//! of keyed deadlines; the hub asks for the earliest deadline, sleeps until
//! then, and hands the due keys back to the component. Cancelling a key,
//! or disposing the whole set, guarantees the effect never runs.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Add;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

// ── Moment ───────────────────────────────────────────────────────────

/// A point in time as seen by the client.
///
/// `at` drives timers (monotonic, pausable in tests); `wall` stamps
/// entries shown to the user and is compared against server timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub at: Instant,
    pub wall: DateTime<Utc>,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: Utc::now(),
        }
    }
}

impl Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let wall = chrono::Duration::from_std(rhs)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall);
        Self {
            at: self.at + rhs,
            wall,
        }
    }
}

// ── TimerSet ─────────────────────────────────────────────────────────

/// Keyed one-shot deadlines.
///
/// Scheduling a key that is already pending replaces its deadline.
/// Keys due at the same instant fire in scheduling order.
#[derive(Debug)]
pub struct TimerSet<K> {
    queue: BTreeMap<(Instant, u64), K>,
    index: HashMap<K, (Instant, u64)>,
    seq: u64,
    disposed: bool,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            seq: 0,
            disposed: false,
        }
    }
}

impl<K: Clone + Eq + Hash> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `key` to fire at `deadline`. Ignored once disposed.
    pub fn schedule(&mut self, key: K, deadline: Instant) {
        if self.disposed {
            return;
        }
        self.cancel(&key);
        let slot = (deadline, self.seq);
        self.seq += 1;
        self.queue.insert(slot, key.clone());
        self.index.insert(key, slot);
    }

    /// Disarm `key`. Returns whether it was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.queue.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Disarm every key matching `pred`. Returns how many were pending.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let doomed: Vec<K> = self.index.keys().filter(|k| pred(k)).cloned().collect();
        for key in &doomed {
            self.cancel(key);
        }
        doomed.len()
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Pending keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.index.keys()
    }

    pub fn deadline_of(&self, key: &K) -> Option<Instant> {
        self.index.get(key).map(|(at, _)| *at)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every key due at or before `now`, oldest first,
    /// paired with the deadline it was scheduled for.
    pub fn drain_due(&mut self, now: Instant) -> Vec<(Instant, K)> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            let (at, _) = *entry.key();
            if at > now {
                break;
            }
            let key = entry.remove();
            self.index.remove(&key);
            due.push((at, key));
        }
        due
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cancel everything and refuse future schedules.
    pub fn dispose(&mut self) {
        self.queue.clear();
        self.index.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fires_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule("late", t0 + Duration::from_secs(5));
        timers.schedule("early", t0 + Duration::from_secs(1));

        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_secs(1)));
        assert!(timers.drain_due(t0).is_empty());

        let due = timers.drain_due(t0 + Duration::from_secs(10));
        let keys: Vec<_> = due.into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec!["early", "late"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn reschedule_replaces() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(1, t0 + Duration::from_secs(1));
        timers.schedule(1, t0 + Duration::from_secs(3));

        assert_eq!(timers.len(), 1);
        assert!(timers.drain_due(t0 + Duration::from_secs(2)).is_empty());
        assert_eq!(timers.drain_due(t0 + Duration::from_secs(3)).len(), 1);
    }

    #[test]
    fn cancel_where_filters() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule((1, 'a'), t0);
        timers.schedule((1, 'b'), t0);
        timers.schedule((2, 'a'), t0);

        assert_eq!(timers.cancel_where(|(scope, _)| *scope == 1), 2);
        assert_eq!(timers.len(), 1);
        assert!(timers.is_scheduled(&(2, 'a')));
    }

    #[test]
    fn disposed_set_stays_empty() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule("x", t0);
        timers.dispose();
        timers.schedule("y", t0);

        assert!(timers.is_disposed());
        assert!(timers.next_deadline().is_none());
        assert!(timers.drain_due(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn moment_advances_both_clocks() {
        let m = Moment::now();
        let later = m + Duration::from_millis(1500);
        assert_eq!(later.at - m.at, Duration::from_millis(1500));
        assert_eq!((later.wall - m.wall).num_milliseconds(), 1500);
    }
}
