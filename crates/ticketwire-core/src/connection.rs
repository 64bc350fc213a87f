// ── Connection monitor ──
//
// Reflects the transport's lifecycle; never retries anything itself.
// Each transition is written to the activity log and drives the status
// badge: shown while the link is anything but healthy, hidden a short
// while after it becomes connected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ticketwire_api::{LinkEvent, LinkState};

use crate::activity::{ActivityKind, ActivityLog};
use crate::timers::{Moment, TimerSet};

pub const DEFAULT_BADGE_HIDE_DELAY: Duration = Duration::from_secs(2);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
    Unavailable,
}

impl From<LinkState> for ConnectionState {
    fn from(state: LinkState) -> Self {
        match state {
            LinkState::Connecting => Self::Connecting,
            LinkState::Connected => Self::Connected,
            LinkState::Disconnected => Self::Disconnected,
            LinkState::Unavailable => Self::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BadgeTone {
    Positive,
    Pending,
    Negative,
    Critical,
    Muted,
}

impl ConnectionState {
    pub fn tone(self) -> BadgeTone {
        match self {
            Self::Connected => BadgeTone::Positive,
            Self::Connecting => BadgeTone::Pending,
            Self::Disconnected => BadgeTone::Negative,
            Self::Error => BadgeTone::Critical,
            Self::Unavailable => BadgeTone::Muted,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Connected => "Live",
            Self::Connecting => "Connecting...",
            Self::Disconnected => "Disconnected",
            Self::Error => "Connection error",
            Self::Unavailable => "Live updates unavailable",
        }
    }

    pub fn is_live(self) -> bool {
        self == Self::Connected
    }
}

/// UI-visible status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBadge {
    pub visible: bool,
    pub tone: BadgeTone,
    pub label: String,
}

// ── ConnectionMonitor ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HideBadge;

#[derive(Debug)]
pub struct ConnectionMonitor {
    state: ConnectionState,
    badge_visible: bool,
    socket_id: Option<String>,
    last_error: Option<String>,
    hide_delay: Duration,
    timers: TimerSet<HideBadge>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_BADGE_HIDE_DELAY)
    }
}

impl ConnectionMonitor {
    pub fn new(hide_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Connecting,
            badge_visible: true,
            socket_id: None,
            last_error: None,
            hide_delay,
            timers: TimerSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn socket_id(&self) -> Option<&str> {
        self.socket_id.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn badge(&self) -> StatusBadge {
        StatusBadge {
            visible: self.badge_visible,
            tone: self.state.tone(),
            label: self.state.label().to_owned(),
        }
    }

    /// Apply a lifecycle signal. Channel messages are ignored.
    /// Returns whether state or badge changed.
    pub fn observe(&mut self, event: &LinkEvent, now: Moment, activity: &mut ActivityLog) -> bool {
        match event {
            LinkEvent::Connected => {
                let changed = self.enter(ConnectionState::Connected, now);
                if changed {
                    info!("live updates connected");
                    activity.record(
                        ActivityKind::Connection,
                        "Connected to live updates",
                        None,
                        now.wall,
                    );
                }
                changed
            }
            LinkEvent::Disconnected => {
                self.socket_id = None;
                let changed = self.enter(ConnectionState::Disconnected, now);
                if changed {
                    warn!("live updates disconnected");
                    activity.record(
                        ActivityKind::Connection,
                        "Live updates disconnected",
                        None,
                        now.wall,
                    );
                }
                changed
            }
            LinkEvent::Error { message } => {
                // Always logged: two errors in a row can carry different causes.
                self.enter(ConnectionState::Error, now);
                self.last_error = Some(message.clone());
                warn!(error = %message, "live updates error");
                activity.record(
                    ActivityKind::Error,
                    format!("Connection error: {message}"),
                    None,
                    now.wall,
                );
                true
            }
            LinkEvent::StateChange { previous, current } => {
                let current = ConnectionState::from(*current);
                let changed = self.enter(current, now);
                if changed {
                    activity.record(
                        ActivityKind::Connection,
                        format!(
                            "Connection: {} \u{2192} {current}",
                            ConnectionState::from(*previous)
                        ),
                        None,
                        now.wall,
                    );
                }
                changed
            }
            LinkEvent::Established { socket_id } => {
                debug!(socket_id, "socket id assigned");
                self.socket_id = Some(socket_id.clone());
                false
            }
            LinkEvent::Message(_) => false,
        }
    }

    /// Move to `next`, updating the badge. No-op when already there.
    fn enter(&mut self, next: ConnectionState, now: Moment) -> bool {
        if self.state == next {
            return false;
        }
        debug!(from = %self.state, to = %next, "connection state");
        self.state = next;

        match next {
            ConnectionState::Connected => {
                self.last_error = None;
                self.timers.schedule(HideBadge, now.at + self.hide_delay);
            }
            ConnectionState::Connecting
            | ConnectionState::Disconnected
            | ConnectionState::Error
            | ConnectionState::Unavailable => {
                self.timers.cancel(&HideBadge);
                self.badge_visible = true;
            }
        }
        true
    }

    /// Fire the pending badge hide if due.
    pub fn advance(&mut self, now: Moment) -> bool {
        let mut changed = false;
        for (_, HideBadge) in self.timers.drain_due(now.at) {
            if self.state == ConnectionState::Connected && self.badge_visible {
                self.badge_visible = false;
                changed = true;
            }
        }
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn dispose(&mut self) {
        self.timers.dispose();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(n: f64) -> Duration {
        Duration::from_secs_f64(n)
    }

    #[test]
    fn starts_connecting_with_badge() {
        let monitor = ConnectionMonitor::default();
        assert_eq!(monitor.state(), ConnectionState::Connecting);
        assert!(monitor.badge().visible);
        assert_eq!(monitor.badge().tone, BadgeTone::Pending);
    }

    #[test]
    fn disconnect_then_quick_reconnect_hides_badge() {
        let t0 = Moment::now();
        let mut monitor = ConnectionMonitor::default();
        let mut log = ActivityLog::default();

        monitor.observe(&LinkEvent::Connected, t0, &mut log);
        monitor.advance(t0 + secs(2.0));
        assert!(!monitor.badge().visible);

        let t1 = t0 + secs(10.0);
        monitor.observe(&LinkEvent::Disconnected, t1, &mut log);
        assert!(monitor.badge().visible);
        assert_eq!(monitor.badge().tone, BadgeTone::Negative);

        let t2 = t1 + secs(1.5);
        monitor.observe(&LinkEvent::Connected, t2, &mut log);
        assert!(monitor.badge().visible, "stays up until the delay passes");

        monitor.advance(t2 + secs(1.9));
        assert!(monitor.badge().visible);
        monitor.advance(t2 + DEFAULT_BADGE_HIDE_DELAY);
        assert!(!monitor.badge().visible);
        assert!(monitor.next_deadline().is_none());
    }

    #[test]
    fn disconnect_cancels_pending_hide() {
        let t0 = Moment::now();
        let mut monitor = ConnectionMonitor::default();
        let mut log = ActivityLog::default();

        monitor.observe(&LinkEvent::Connected, t0, &mut log);
        monitor.observe(&LinkEvent::Disconnected, t0 + secs(0.5), &mut log);
        monitor.advance(t0 + secs(5.0));
        assert!(monitor.badge().visible);
    }

    #[test]
    fn every_transition_is_logged() {
        let t0 = Moment::now();
        let mut monitor = ConnectionMonitor::default();
        let mut log = ActivityLog::default();

        monitor.observe(&LinkEvent::Connected, t0, &mut log);
        monitor.observe(&LinkEvent::Disconnected, t0, &mut log);
        monitor.observe(
            &LinkEvent::StateChange {
                previous: LinkState::Disconnected,
                current: LinkState::Connecting,
            },
            t0,
            &mut log,
        );
        monitor.observe(
            &LinkEvent::Error {
                message: "handshake refused".into(),
            },
            t0,
            &mut log,
        );

        let messages: Vec<_> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Connection error: handshake refused",
                "Connection: disconnected \u{2192} connecting",
                "Live updates disconnected",
                "Connected to live updates",
            ]
        );
        assert_eq!(monitor.state(), ConnectionState::Error);
        assert_eq!(monitor.last_error(), Some("handshake refused"));
    }

    #[test]
    fn repeated_state_is_not_logged_twice() {
        let t0 = Moment::now();
        let mut monitor = ConnectionMonitor::default();
        let mut log = ActivityLog::default();

        monitor.observe(&LinkEvent::Disconnected, t0, &mut log);
        monitor.observe(&LinkEvent::Disconnected, t0, &mut log);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn established_records_socket_id() {
        let mut monitor = ConnectionMonitor::default();
        let mut log = ActivityLog::default();
        let changed = monitor.observe(
            &LinkEvent::Established {
                socket_id: "1234.5678".into(),
            },
            Moment::now(),
            &mut log,
        );
        assert!(!changed);
        assert_eq!(monitor.socket_id(), Some("1234.5678"));
        assert!(log.is_empty());
    }
}
