// ── Notification queue ──
//
// Transient alerts with a two-step exit: after `ttl` an entry turns
// invisible, and `exit` later it is removed. The removal deadline is
// measured from when the hide was due, not from when `advance` noticed,
// so a late tick never extends an entry's life.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::timers::{Moment, TimerSet};

pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_millis(5000);
pub const DEFAULT_NOTIFICATION_EXIT: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_VISIBLE: usize = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    PriceDrop,
    PriceIncrease,
    TargetPrice,
    Announcement,
    Maintenance,
    Info,
}

/// What a caller hands to [`NotificationQueue::push`].
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related: Option<String>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            related: None,
        }
    }

    #[must_use]
    pub fn related(mut self, entity: impl Into<String>) -> Self {
        self.related = Some(entity.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    pub created_at: DateTime<Utc>,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    pub ttl: Duration,
    pub exit: Duration,
    pub max_visible: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_NOTIFICATION_TTL,
            exit: DEFAULT_NOTIFICATION_EXIT,
            max_visible: DEFAULT_MAX_VISIBLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
    Hide(u64),
    Remove(u64),
}

#[derive(Debug, Default)]
pub struct NotificationQueue {
    entries: VecDeque<NotificationEntry>,
    timers: TimerSet<Phase>,
    config: NotificationConfig,
    next_id: u64,
}

impl NotificationQueue {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            timers: TimerSet::new(),
            config,
            next_id: 1,
        }
    }

    /// Append a visible entry and schedule its hide. If that pushes the
    /// visible count past the bound, the oldest visible entry starts
    /// exiting now.
    pub fn push(&mut self, draft: NotificationDraft, now: Moment) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;

        self.entries.push_back(NotificationEntry {
            id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            related: draft.related,
            created_at: now.wall,
            visible: true,
        });
        self.timers.schedule(Phase::Hide(id), now.at + self.config.ttl);

        while self.visible_count() > self.config.max_visible.max(1) {
            let Some(oldest) = self.entries.iter().find(|e| e.visible).map(|e| e.id) else {
                break;
            };
            tracing::trace!(id = oldest, "visible bound reached, retiring oldest alert");
            self.begin_exit(oldest, now.at);
        }

        id
    }

    /// Start the exit of `id` immediately. Returns `false` if the entry is
    /// unknown or already exiting.
    pub fn dismiss(&mut self, id: u64, now: Moment) -> bool {
        self.begin_exit(id, now.at)
    }

    /// Fire every due hide/remove. Returns whether anything changed.
    pub fn advance(&mut self, now: Moment) -> bool {
        let mut changed = false;
        // Loop: a hide due early enough can make its removal due too.
        loop {
            let due = self.timers.drain_due(now.at);
            if due.is_empty() {
                break;
            }
            for (deadline, phase) in due {
                changed |= match phase {
                    Phase::Hide(id) => self.begin_exit(id, deadline),
                    Phase::Remove(id) => self.remove(id),
                };
            }
        }
        changed
    }

    fn begin_exit(&mut self, id: u64, from: Instant) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        if !entry.visible {
            return false;
        }
        entry.visible = false;
        self.timers.cancel(&Phase::Hide(id));
        self.timers.schedule(Phase::Remove(id), from + self.config.exit);
        true
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn get(&self, id: u64) -> Option<&NotificationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// All entries still held, oldest first, including exiting ones.
    pub fn entries(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.entries.iter()
    }

    pub fn visible(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.entries.iter().filter(|e| e.visible)
    }

    pub fn visible_count(&self) -> usize {
        self.visible().count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Drop all pending hides/removals. Entries stay as they are.
    pub fn dispose(&mut self) {
        self.timers.dispose();
    }
}
