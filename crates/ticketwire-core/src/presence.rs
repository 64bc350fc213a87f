// ── Presence tracker ──
//
// Who is on the platform right now, derived from presence-channel
// membership plus client whispers. Typing flags are transient: each one
// is cleared by a timer scoped to the subscription that delivered it, so
// tearing that subscription down can never leave a stale flag behind.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::model::{Availability, EntityId, PresenceStatus, PresenceUser};
use crate::optimistic::{OptimisticField, Pending, Settled};
use crate::registry::SubscriptionId;
use crate::timers::{Moment, TimerSet};

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(3);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_IDLE_AFTER: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
pub struct PresenceConfig {
    pub typing_ttl: Duration,
    pub stale_after: Duration,
    pub idle_after: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            typing_ttl: DEFAULT_TYPING_TTL,
            stale_after: DEFAULT_STALE_AFTER,
            idle_after: DEFAULT_IDLE_AFTER,
        }
    }
}

/// Partial status update carried by a `status_change` whisper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<PresenceStatus>,
    pub availability: Option<Availability>,
    pub active_chats: Option<u32>,
}

#[derive(Debug)]
pub struct PresenceTracker {
    users: Vec<PresenceUser>,
    typing: TimerSet<(SubscriptionId, EntityId)>,
    own_status: OptimisticField<PresenceStatus>,
    config: PresenceConfig,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            users: Vec::new(),
            typing: TimerSet::new(),
            own_status: OptimisticField::new(PresenceStatus::Online),
            config,
        }
    }

    // ── Membership ───────────────────────────────────────────────

    /// Replace the local set with a full snapshot.
    pub fn here(&mut self, users: Vec<PresenceUser>) {
        debug!(count = users.len(), "presence snapshot");
        self.typing.cancel_where(|_| true);
        self.users = users
            .into_iter()
            .map(|mut u| {
                u.is_typing = false;
                u
            })
            .collect();
    }

    /// Insert or replace a member. Replacing keeps the member's position.
    /// Returns `true` for a newcomer.
    pub fn joining(&mut self, mut user: PresenceUser) -> bool {
        user.is_typing = false;
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => {
                *existing = user;
                false
            }
            None => {
                self.users.push(user);
                true
            }
        }
    }

    pub fn leaving(&mut self, id: &EntityId) -> Option<PresenceUser> {
        let pos = self.users.iter().position(|u| &u.id == id)?;
        self.typing.cancel_where(|(_, user)| user == id);
        Some(self.users.remove(pos))
    }

    // ── Whispers ─────────────────────────────────────────────────

    /// Set or clear a typing flag. A set flag clears itself after
    /// `typing_ttl` unless refreshed; the timer belongs to `scope`.
    pub fn typing(
        &mut self,
        scope: SubscriptionId,
        user_id: &EntityId,
        is_typing: bool,
        now: Moment,
    ) -> bool {
        let Some(user) = self.users.iter_mut().find(|u| &u.id == user_id) else {
            trace!(%user_id, "typing whisper for unknown user");
            return false;
        };
        user.is_typing = is_typing;

        let key = (scope, user_id.clone());
        if is_typing {
            self.typing.schedule(key, now.at + self.config.typing_ttl);
        } else {
            self.typing.cancel(&key);
        }
        true
    }

    /// Record a navigation. Returns the user so the caller can describe it.
    pub fn page_change(&mut self, user_id: &EntityId, page: &str) -> Option<&PresenceUser> {
        let user = self.users.iter_mut().find(|u| &u.id == user_id)?;
        user.current_page = Some(page.to_owned());
        Some(user)
    }

    pub fn status_change(&mut self, user_id: &EntityId, update: &StatusUpdate) -> bool {
        let Some(user) = self.users.iter_mut().find(|u| &u.id == user_id) else {
            return false;
        };
        if let Some(status) = update.status {
            user.status = status;
        }
        if let Some(availability) = update.availability {
            user.availability = availability;
        }
        if let Some(chats) = update.active_chats {
            user.active_chats = chats;
        }
        true
    }

    pub fn heartbeat(&mut self, user_id: &EntityId, at: DateTime<Utc>, page: Option<&str>) -> bool {
        let Some(user) = self.users.iter_mut().find(|u| &u.id == user_id) else {
            return false;
        };
        user.last_activity_at = Some(at);
        if let Some(page) = page {
            user.current_page = Some(page.to_owned());
        }
        true
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Drop members whose last activity is older than `stale_after`.
    /// Members without a timestamp are always kept.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<PresenceUser> {
        let stale_after =
            chrono::Duration::from_std(self.config.stale_after).unwrap_or(chrono::Duration::MAX);
        let (keep, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.users)
            .into_iter()
            .partition(|u| {
                u.last_activity_at
                    .is_none_or(|at| now.signed_duration_since(at) <= stale_after)
            });
        self.users = keep;

        for user in &gone {
            self.typing.cancel_where(|(_, id)| id == &user.id);
        }
        if !gone.is_empty() {
            debug!(removed = gone.len(), "swept stale presence");
        }
        gone
    }

    /// Clear typing flags whose timers are due.
    pub fn advance(&mut self, now: Moment) -> bool {
        let mut changed = false;
        for (_, (_, user_id)) in self.typing.drain_due(now.at) {
            // Another subscription may still hold a live timer for this user.
            if typing_pending(&self.typing, &user_id) {
                continue;
            }
            if let Some(user) = self.users.iter_mut().find(|u| u.id == user_id) {
                changed |= std::mem::replace(&mut user.is_typing, false);
            }
        }
        changed
    }

    /// Cancel timers owned by `scope` and clear the flags they guarded.
    pub fn cancel_scoped(&mut self, scope: SubscriptionId) -> usize {
        let mut cleared = Vec::new();
        let cancelled = self.typing.cancel_where(|(s, id)| {
            if *s == scope {
                cleared.push(id.clone());
                true
            } else {
                false
            }
        });
        for id in cleared {
            if typing_pending(&self.typing, &id) {
                continue;
            }
            if let Some(user) = self.users.iter_mut().find(|u| u.id == id) {
                user.is_typing = false;
            }
        }
        cancelled
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.typing.next_deadline()
    }

    pub fn dispose(&mut self) {
        self.typing.dispose();
    }

    // ── Own status ───────────────────────────────────────────────

    pub fn own_status(&self) -> PresenceStatus {
        *self.own_status.get()
    }

    /// Show `status` immediately; settle once the server answers.
    pub fn begin_own_status(&mut self, status: PresenceStatus) -> Pending<PresenceStatus> {
        self.own_status.begin(status)
    }

    pub fn settle_own_status(&mut self, pending: Pending<PresenceStatus>, confirmed: bool) -> Settled {
        self.own_status.settle(pending, confirmed)
    }

    // ── Views ────────────────────────────────────────────────────

    pub fn users(&self) -> &[PresenceUser] {
        &self.users
    }

    pub fn get(&self, id: &EntityId) -> Option<&PresenceUser> {
        self.users.iter().find(|u| &u.id == id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Staff members, available first, then fewest active chats. Ties keep
    /// their membership order.
    pub fn agents(&self) -> Vec<&PresenceUser> {
        let mut agents: Vec<_> = self.users.iter().filter(|u| u.role.is_staff()).collect();
        agents.sort_by_key(|u| (u.availability != Availability::Available, u.active_chats));
        agents
    }

    pub fn idle_count(&self, now: DateTime<Utc>) -> usize {
        let idle_after =
            chrono::Duration::from_std(self.config.idle_after).unwrap_or(chrono::Duration::MAX);
        self.users.iter().filter(|u| u.is_idle(now, idle_after)).count()
    }
}

/// Any subscription still holds a typing timer for `user_id`.
fn typing_pending(timers: &TimerSet<(SubscriptionId, EntityId)>, user_id: &EntityId) -> bool {
    timers.keys().any(|(_, id)| id == user_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Role;
    use pretty_assertions::assert_eq;

    fn agent(id: u64, availability: Availability, chats: u32) -> PresenceUser {
        let mut u = PresenceUser::new(id, format!("agent-{id}"));
        u.role = Role::Agent;
        u.availability = availability;
        u.active_chats = chats;
        u
    }

    fn ids(users: &[&PresenceUser]) -> Vec<u64> {
        users.iter().map(|u| u.id.as_numeric().unwrap()).collect()
    }

    #[test]
    fn sweep_keeps_users_without_timestamp() {
        let now = Utc::now();
        let mut tracker = PresenceTracker::default();

        let mut stale = PresenceUser::new(1, "stale");
        stale.last_activity_at = Some(now - chrono::Duration::minutes(16));
        let mut fresh = PresenceUser::new(2, "fresh");
        fresh.last_activity_at = Some(now - chrono::Duration::minutes(14));
        let unknown = PresenceUser::new(3, "no timestamp");

        tracker.here(vec![stale, fresh, unknown]);
        let removed = tracker.sweep(now);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "stale");
        let left: Vec<_> = tracker.users().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(left, vec!["fresh", "no timestamp"]);
    }

    #[test]
    fn agents_sort_is_stable() {
        let mut tracker = PresenceTracker::default();
        tracker.here(vec![
            agent(1, Availability::Busy, 0),
            agent(2, Availability::Available, 2),
            agent(3, Availability::Available, 1),
            agent(4, Availability::Available, 1),
            PresenceUser::new(5, "customer"),
            agent(6, Availability::Available, 1),
        ]);

        assert_eq!(ids(&tracker.agents()), vec![3, 4, 6, 2, 1]);
    }

    #[test]
    fn joining_upserts_in_place() {
        let mut tracker = PresenceTracker::default();
        tracker.here(vec![PresenceUser::new(1, "a"), PresenceUser::new(2, "b")]);

        assert!(!tracker.joining(PresenceUser::new(1, "a-renamed")));
        assert!(tracker.joining(PresenceUser::new(3, "c")));

        let names: Vec<_> = tracker.users().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a-renamed", "b", "c"]);
    }

    #[test]
    fn typing_clears_after_ttl() {
        let t0 = Moment::now();
        let scope = SubscriptionId(1);
        let mut tracker = PresenceTracker::default();
        tracker.here(vec![PresenceUser::new(7, "t")]);
        let id = EntityId::from(7);

        assert!(tracker.typing(scope, &id, true, t0));
        assert!(tracker.get(&id).unwrap().is_typing);

        tracker.advance(t0 + Duration::from_millis(2999));
        assert!(tracker.get(&id).unwrap().is_typing);

        assert!(tracker.advance(t0 + DEFAULT_TYPING_TTL));
        assert!(!tracker.get(&id).unwrap().is_typing);
    }

    #[test]
    fn cancel_scoped_clears_only_that_scope() {
        let t0 = Moment::now();
        let mut tracker = PresenceTracker::default();
        tracker.here(vec![PresenceUser::new(1, "a"), PresenceUser::new(2, "b")]);

        tracker.typing(SubscriptionId(1), &EntityId::from(1), true, t0);
        tracker.typing(SubscriptionId(2), &EntityId::from(2), true, t0);

        assert_eq!(tracker.cancel_scoped(SubscriptionId(1)), 1);
        assert!(!tracker.get(&EntityId::from(1)).unwrap().is_typing);
        assert!(tracker.get(&EntityId::from(2)).unwrap().is_typing);
        assert!(tracker.next_deadline().is_some());
    }

    #[test]
    fn status_change_is_partial() {
        let mut tracker = PresenceTracker::default();
        tracker.here(vec![agent(1, Availability::Available, 2)]);

        tracker.status_change(
            &EntityId::from(1),
            &StatusUpdate {
                status: Some(PresenceStatus::Busy),
                availability: None,
                active_chats: Some(4),
            },
        );
        let user = tracker.get(&EntityId::from(1)).unwrap();
        assert_eq!(user.status, PresenceStatus::Busy);
        assert_eq!(user.availability, Availability::Available);
        assert_eq!(user.active_chats, 4);
    }

    #[test]
    fn own_status_rolls_back() {
        let mut tracker = PresenceTracker::default();
        let pending = tracker.begin_own_status(PresenceStatus::Away);
        assert_eq!(tracker.own_status(), PresenceStatus::Away);
        assert_eq!(tracker.settle_own_status(pending, false), Settled::Reverted);
        assert_eq!(tracker.own_status(), PresenceStatus::Online);
    }
}
