//! The synchronous heart of the client.
//!
//! A [`Hub`] owns the channel registry, every live-state component and the
//! transport. It never sleeps and never spawns: callers feed it link events
//! and the current [`Moment`], ask it for the next deadline, and call
//! [`Hub::advance`] when that deadline passes. [`LiveClient`] does exactly
//! that from a single task; tests do it by hand.
//!
//! [`LiveClient`]: crate::LiveClient

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use ticketwire_api::{LinkEvent, LinkState};

use crate::activity::{ActivityEntry, ActivityLog};
use crate::chat::{ChatOutbound, ChatSession};
use crate::config::{ChannelSelection, ClientConfig, Timings};
use crate::connection::{ConnectionMonitor, ConnectionState, StatusBadge};
use crate::dispatch::{DispatchOutcome, HandlerMap};
use crate::handlers;
use crate::format::page_id_for_path;
use crate::model::{
    AgentInfo, ChatMessage, ChatSummary, EntityId, PresenceStatus, PresenceUser, TicketSnapshot,
};
use crate::notifications::{NotificationDraft, NotificationEntry, NotificationQueue};
use crate::optimistic::{Pending, Settled};
use crate::presence::PresenceTracker;
use crate::registry::{ChannelRegistry, SubscriptionHandle};
use crate::storage::{AccessibilitySettings, KeyValueStore};
use crate::tickets::{AvailabilityBanner, TicketBoard};
use crate::timers::{Moment, TimerSet, earliest};
use crate::transport::Transport;

pub const TICKET_FEED_CHANNEL: &str = "tickets.global";
pub const SYSTEM_CHANNEL: &str = "system.announcements";

pub fn user_channel(user_id: &EntityId) -> String {
    format!("user.{user_id}")
}

pub fn ticket_channel(ticket_id: &EntityId) -> String {
    format!("ticket.{ticket_id}")
}

/// Inverse of [`ticket_channel`].
fn ticket_id_for_channel(channel: &str) -> Option<EntityId> {
    channel
        .strip_prefix("ticket.")
        .filter(|id| !id.is_empty())
        .map(EntityId::from)
}

// ── Outbound ─────────────────────────────────────────────────────────

/// A client event bound for the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    /// Channel to whisper on. `None` means there is no channel for it and
    /// only the REST path applies.
    pub channel: Option<String>,
    pub event: String,
    pub data: Value,
}

/// How [`Hub::send`] delivered an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SendRoute {
    /// Whispered over the broadcast link.
    Whispered,
    /// The link could not take it; the caller should `POST /events`.
    Fallback(Outbound),
}

// ── LiveState ────────────────────────────────────────────────────────

/// Counters for the running session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveStats {
    pub events_received: u64,
    pub events_handled: u64,
    pub events_ignored: u64,
    pub malformed_payloads: u64,
    pub handler_failures: u64,
    pub whispers_sent: u64,
    pub fallback_sends: u64,
}

/// Everything the handlers mutate.
#[derive(Debug)]
pub struct LiveState {
    pub activity: ActivityLog,
    pub notifications: NotificationQueue,
    pub connection: ConnectionMonitor,
    pub presence: PresenceTracker,
    pub tickets: TicketBoard,
    pub chat: ChatSession,
    pub accessibility: AccessibilitySettings,
    pub stats: LiveStats,
    pub(crate) outbox: Vec<Outbound>,
}

impl LiveState {
    pub fn new(timings: &Timings, store: Arc<dyn KeyValueStore>) -> Self {
        let accessibility = AccessibilitySettings::load(store.as_ref());
        let mut notifications = timings.notifications();
        if accessibility.reduced_motion {
            notifications.exit = Duration::ZERO;
        }
        Self {
            activity: ActivityLog::with_capacity(timings.activity_capacity),
            notifications: NotificationQueue::new(notifications),
            connection: ConnectionMonitor::new(timings.badge_hide_delay),
            presence: PresenceTracker::new(timings.presence()),
            tickets: TicketBoard::new(timings.banner_ttl),
            chat: ChatSession::load(store).with_typing_ttl(timings.agent_typing_ttl),
            accessibility,
            stats: LiveStats::default(),
            outbox: Vec::new(),
        }
    }

    /// Queue an event for the server. Sent once the current dispatch
    /// finishes.
    pub fn queue(&mut self, channel: Option<&str>, event: impl Into<String>, data: Value) {
        self.outbox.push(Outbound {
            channel: channel.map(str::to_owned),
            event: event.into(),
            data,
        });
    }

    pub(crate) fn queue_chat(&mut self, channel: Option<&str>, outbound: ChatOutbound) {
        self.queue(channel, outbound.event, outbound.data);
    }

    fn advance(&mut self, now: Moment) -> bool {
        let mut changed = self.notifications.advance(now);
        changed |= self.connection.advance(now);
        changed |= self.presence.advance(now);
        changed |= self.tickets.advance(now);
        changed |= self.chat.advance(now);
        changed
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.notifications.next_deadline(),
            self.connection.next_deadline(),
            self.presence.next_deadline(),
            self.tickets.next_deadline(),
            self.chat.next_deadline(),
        ])
    }

    fn dispose(&mut self) {
        self.notifications.dispose();
        self.connection.dispose();
        self.presence.dispose();
        self.tickets.dispose();
        self.chat.dispose();
    }
}

// ── LiveView ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelView {
    pub name: String,
    pub subscribers: usize,
    pub joined: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatView {
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub unread: usize,
    pub agent: AgentInfo,
    pub agents_online: bool,
    pub open: bool,
    /// Archived sessions, newest first. Any of them can be resumed.
    pub history: Vec<ChatSummary>,
}

/// Immutable snapshot of the live state, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveView {
    pub connection: ConnectionState,
    pub badge: StatusBadge,
    pub socket_id: Option<String>,
    pub activity: Vec<ActivityEntry>,
    pub notifications: Vec<NotificationEntry>,
    pub presence: Vec<PresenceUser>,
    /// Members with no activity for longer than `idle_after`.
    pub idle_users: usize,
    pub agents: Vec<PresenceUser>,
    pub own_status: PresenceStatus,
    pub tickets: Vec<TicketSnapshot>,
    pub banner: Option<AvailabilityBanner>,
    pub chat: ChatView,
    pub channels: Vec<ChannelView>,
    pub stats: LiveStats,
}

impl LiveView {
    /// What a freshly started client looks like before its first update.
    pub fn empty() -> Self {
        Self {
            connection: ConnectionState::Connecting,
            badge: ConnectionMonitor::default().badge(),
            socket_id: None,
            activity: Vec::new(),
            notifications: Vec::new(),
            presence: Vec::new(),
            idle_users: 0,
            agents: Vec::new(),
            own_status: PresenceStatus::Online,
            tickets: Vec::new(),
            banner: None,
            chat: ChatView {
                session_id: None,
                messages: Vec::new(),
                unread: 0,
                agent: AgentInfo::default(),
                agents_online: false,
                open: false,
                history: Vec::new(),
            },
            channels: Vec::new(),
            stats: LiveStats::default(),
        }
    }
}

// ── Hub ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Maintenance {
    Heartbeat,
    Sweep,
}

pub struct Hub<T> {
    transport: T,
    registry: ChannelRegistry<LiveState>,
    state: LiveState,
    user_id: Option<EntityId>,
    page: String,
    presence_channel: Option<String>,
    /// Wall time of the latest event or tick.
    clock: DateTime<Utc>,
    maintenance: TimerSet<Maintenance>,
    timings: Timings,
    disposed: bool,
}

impl<T> std::fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("user_id", &self.user_id)
            .field("presence_channel", &self.presence_channel)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Hub<T> {
    pub fn new(
        transport: T,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        now: Moment,
    ) -> Self {
        let timings = config.timings;
        let mut maintenance = TimerSet::new();
        maintenance.schedule(Maintenance::Heartbeat, now.at + timings.heartbeat_interval);
        maintenance.schedule(Maintenance::Sweep, now.at + timings.sweep_interval);

        Self {
            transport,
            registry: ChannelRegistry::new(),
            state: LiveState::new(&timings, store),
            user_id: config.user_id.clone(),
            page: page_id_for_path(&config.page),
            presence_channel: None,
            clock: now.wall,
            maintenance,
            timings,
            disposed: false,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn subscribe(&mut self, channel: &str, handlers: HandlerMap<LiveState>) -> SubscriptionHandle {
        self.registry.subscribe(&mut self.transport, channel, handlers)
    }

    /// Drop a subscription and every timer it owns.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        if !self.registry.unsubscribe(&mut self.transport, handle) {
            return false;
        }
        let cancelled = self.state.presence.cancel_scoped(handle.id());
        if cancelled > 0 {
            debug!(id = %handle.id(), cancelled, "cancelled scoped timers");
        }
        if self.registry.refcount(handle.channel()) > 0 {
            return true;
        }
        if self.presence_channel.as_deref() == Some(handle.channel()) {
            self.presence_channel = None;
        }
        if let Some(ticket_id) = ticket_id_for_channel(handle.channel()) {
            if self.state.tickets.untrack(&ticket_id).is_some() {
                debug!(%ticket_id, "ticket no longer followed");
            }
        }
        true
    }

    pub fn follow_ticket_feed(&mut self) -> SubscriptionHandle {
        self.subscribe(TICKET_FEED_CHANNEL, handlers::ticket_feed())
    }

    pub fn follow_system(&mut self) -> SubscriptionHandle {
        self.subscribe(SYSTEM_CHANNEL, handlers::system())
    }

    /// Follow the private channel of `user_id`: alerts and support chat.
    pub fn follow_user(&mut self, user_id: &EntityId) -> SubscriptionHandle {
        self.subscribe(&user_channel(user_id), handlers::user())
    }

    /// Join a presence channel. Heartbeats and own-status whispers go to
    /// the most recently joined one.
    pub fn join_presence(&mut self, channel: &str) -> SubscriptionHandle {
        self.presence_channel = Some(channel.to_owned());
        self.subscribe(channel, handlers::presence())
    }

    /// Mirror one ticket from its own channel.
    pub fn track_ticket(&mut self, ticket_id: &EntityId) -> SubscriptionHandle {
        self.state.tickets.track(ticket_id.clone());
        self.subscribe(&ticket_channel(ticket_id), handlers::ticket(ticket_id.clone()))
    }

    /// Subscribe to everything `selection` asks for.
    pub fn follow(&mut self, selection: &ChannelSelection) -> Vec<SubscriptionHandle> {
        let mut handles = Vec::new();
        if selection.system {
            handles.push(self.follow_system());
        }
        if selection.ticket_feed {
            handles.push(self.follow_ticket_feed());
        }
        if selection.user {
            match self.user_id.clone() {
                Some(user_id) => handles.push(self.follow_user(&user_id)),
                None => debug!("no user id configured, private channel skipped"),
            }
        }
        if let Some(channel) = &selection.presence {
            handles.push(self.join_presence(channel));
        }
        for ticket_id in &selection.tickets {
            handles.push(self.track_ticket(ticket_id));
        }
        handles
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Feed one link event. Returns whether the view changed.
    pub fn handle_link_event(&mut self, event: &LinkEvent, now: Moment) -> bool {
        if self.disposed {
            return false;
        }
        self.clock = now.wall;
        if let LinkEvent::Message(wire) = event {
            let channel = wire.channel.as_deref().unwrap_or_default();
            let outcome = self.dispatch(channel, &wire.event, &wire.data, now);
            return !outcome.is_ignored();
        }

        let changed = self
            .state
            .connection
            .observe(event, now, &mut self.state.activity);
        match event {
            LinkEvent::Connected
            | LinkEvent::StateChange {
                current: LinkState::Connected,
                ..
            } => {
                self.registry.on_connected(&mut self.transport);
            }
            LinkEvent::Disconnected
            | LinkEvent::StateChange {
                current: LinkState::Disconnected | LinkState::Unavailable,
                ..
            } => self.registry.on_disconnected(),
            _ => {}
        }
        changed
    }

    /// Route an event to the channel's handlers, then send whatever they
    /// queued.
    pub fn dispatch(
        &mut self,
        channel: &str,
        event_name: &str,
        payload: &Value,
        now: Moment,
    ) -> DispatchOutcome {
        self.clock = now.wall;
        let outcome = self
            .registry
            .dispatch(channel, event_name, payload, &mut self.state, now);

        let stats = &mut self.state.stats;
        stats.events_received += 1;
        stats.events_handled += u64::try_from(outcome.handled).unwrap_or(u64::MAX);
        stats.handler_failures += u64::try_from(outcome.failed).unwrap_or(u64::MAX);
        if outcome.malformed {
            stats.malformed_payloads += 1;
        }
        if outcome.is_ignored() {
            stats.events_ignored += 1;
        }

        self.flush_outbox();
        outcome
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Fire everything due at `now`. Returns whether the view changed.
    pub fn advance(&mut self, now: Moment) -> bool {
        if self.disposed {
            return false;
        }
        self.clock = now.wall;
        let mut changed = self.state.advance(now);

        for (_, task) in self.maintenance.drain_due(now.at) {
            match task {
                Maintenance::Heartbeat => {
                    self.heartbeat(now);
                    changed |= self.prune_activity(now);
                    self.maintenance
                        .schedule(Maintenance::Heartbeat, now.at + self.timings.heartbeat_interval);
                }
                Maintenance::Sweep => {
                    changed |= !self.state.presence.sweep(now.wall).is_empty();
                    self.maintenance
                        .schedule(Maintenance::Sweep, now.at + self.timings.sweep_interval);
                }
            }
        }
        self.flush_outbox();
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if self.disposed {
            return None;
        }
        earliest([self.state.next_deadline(), self.maintenance.next_deadline()])
    }

    fn heartbeat(&mut self, now: Moment) {
        let (Some(channel), Some(user_id)) = (self.presence_channel.clone(), &self.user_id) else {
            return;
        };
        if !self.transport.is_available() {
            trace!("link down, heartbeat skipped");
            return;
        }
        let data = json!({
            "userId": user_id,
            "timestamp": now.wall.timestamp_millis(),
            "page": self.page,
        });
        match self.transport.whisper(&channel, "heartbeat", &data) {
            Ok(()) => self.state.stats.whispers_sent += 1,
            Err(e) => debug!(error = %e, "heartbeat whisper failed"),
        }
    }

    fn prune_activity(&mut self, now: Moment) -> bool {
        let Some(cutoff) = retention_cutoff(now, self.timings.activity_retention) else {
            return false;
        };
        let pruned = self.state.activity.prune_older_than(cutoff);
        if pruned > 0 {
            debug!(pruned, "pruned old activity");
        }
        pruned > 0
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Send a client event: whisper on `channel` when the link is up,
    /// otherwise hand it back for the REST path.
    pub fn send(&mut self, channel: Option<&str>, event: &str, data: Value) -> SendRoute {
        self.route(Outbound {
            channel: channel.map(str::to_owned),
            event: event.to_owned(),
            data,
        })
    }

    fn route(&mut self, outbound: Outbound) -> SendRoute {
        if let Some(channel) = outbound.channel.as_deref() {
            if self.transport.is_available() {
                match self.transport.whisper(channel, &outbound.event, &outbound.data) {
                    Ok(()) => {
                        self.state.stats.whispers_sent += 1;
                        return SendRoute::Whispered;
                    }
                    Err(e) => {
                        debug!(channel, event = %outbound.event, error = %e, "whisper failed, using fallback");
                    }
                }
            }
        }
        self.state.stats.fallback_sends += 1;
        SendRoute::Fallback(outbound)
    }

    /// Events handlers queued that could not be whispered. The caller
    /// posts them over REST.
    pub fn take_fallbacks(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.state.outbox)
    }

    /// Route queued events. Whispered ones are gone; fallbacks stay
    /// queued for [`take_fallbacks`](Self::take_fallbacks).
    fn flush_outbox(&mut self) {
        if self.state.outbox.is_empty() {
            return;
        }
        let queued = std::mem::take(&mut self.state.outbox);
        let mut fallbacks = Vec::new();
        for outbound in queued {
            if let SendRoute::Fallback(outbound) = self.route(outbound) {
                fallbacks.push(outbound);
            }
        }
        self.state.outbox = fallbacks;
    }

    // ── User actions ─────────────────────────────────────────────

    pub fn notify(&mut self, draft: NotificationDraft, now: Moment) -> u64 {
        self.state.notifications.push(draft, now)
    }

    pub fn dismiss_notification(&mut self, id: u64, now: Moment) -> bool {
        self.state.notifications.dismiss(id, now)
    }

    /// Tell others the user moved to `page`. Request paths are reduced
    /// to a page id first (`/tickets/42` is `ticket-42`).
    pub fn set_page(&mut self, page: &str, title: Option<&str>) -> Option<SendRoute> {
        self.page = page_id_for_path(page);
        let user_id = self.user_id.clone()?;
        let channel = self.presence_channel.clone()?;
        let data = json!({ "userId": user_id, "page": self.page, "pageTitle": title });
        Some(self.send(Some(&channel), "page_change", data))
    }

    /// Show `status` right away and announce it. Settle the returned
    /// change once the server has answered.
    pub fn begin_own_status(&mut self, status: PresenceStatus) -> (Pending<PresenceStatus>, Option<SendRoute>) {
        let pending = self.state.presence.begin_own_status(status);
        let route = match (self.user_id.clone(), self.presence_channel.clone()) {
            (Some(user_id), Some(channel)) => Some(self.send(
                Some(&channel),
                "status_change",
                json!({ "userId": user_id, "status": status }),
            )),
            _ => None,
        };
        (pending, route)
    }

    pub fn settle_own_status(&mut self, pending: Pending<PresenceStatus>, confirmed: bool) -> Settled {
        let settled = self.state.presence.settle_own_status(pending, confirmed);
        if settled == Settled::Reverted {
            info!(status = %self.state.presence.own_status(), "status change rejected, reverted");
        }
        settled
    }

    pub fn open_chat(&mut self, now: Moment) -> Vec<SendRoute> {
        let outbound = self.state.chat.open(now);
        self.route_chat(outbound)
    }

    /// Reopen an archived session. `None` if no such session exists.
    pub fn resume_chat(&mut self, session_id: &str, now: Moment) -> Option<Vec<SendRoute>> {
        if !self.state.chat.resume(session_id, now) {
            return None;
        }
        Some(self.open_chat(now))
    }

    pub fn minimize_chat(&mut self) {
        self.state.chat.minimize();
    }

    pub fn close_chat(&mut self, now: Moment) {
        self.state.chat.close(now);
    }

    pub fn send_chat(&mut self, text: &str, now: Moment) -> Option<SendRoute> {
        let outbound = self.state.chat.send_text(text, now)?;
        self.route_chat(vec![outbound]).pop()
    }

    pub fn set_agents_online(&mut self, agents_online: u32) {
        self.state.chat.set_agents_online(agents_online > 0);
    }

    fn route_chat(&mut self, outbound: Vec<ChatOutbound>) -> Vec<SendRoute> {
        let channel = self.user_id.as_ref().map(user_channel);
        outbound
            .into_iter()
            .map(|o| self.send(channel.as_deref(), o.event, o.data))
            .collect()
    }

    // ── Views ────────────────────────────────────────────────────

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection.state()
    }

    pub fn registry(&self) -> &ChannelRegistry<LiveState> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn view(&self) -> LiveView {
        let state = &self.state;
        LiveView {
            connection: state.connection.state(),
            badge: state.connection.badge(),
            socket_id: state.connection.socket_id().map(str::to_owned),
            activity: state.activity.iter().cloned().collect(),
            notifications: state.notifications.entries().cloned().collect(),
            presence: state.presence.users().to_vec(),
            idle_users: state.presence.idle_count(self.clock),
            agents: state.presence.agents().into_iter().cloned().collect(),
            own_status: state.presence.own_status(),
            tickets: state.tickets.tickets().cloned().collect(),
            banner: state.tickets.banner().cloned(),
            chat: ChatView {
                session_id: state.chat.session_id().map(str::to_owned),
                messages: state.chat.messages().to_vec(),
                unread: state.chat.unread(),
                agent: state.chat.agent().clone(),
                agents_online: state.chat.agents_online(),
                open: state.chat.is_open(),
                history: state.chat.history().to_vec(),
            },
            channels: self
                .registry
                .channels()
                .map(|name| ChannelView {
                    name: name.to_owned(),
                    subscribers: self.registry.refcount(name),
                    joined: self.registry.is_joined(name),
                })
                .collect(),
            stats: state.stats,
        }
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Cancel every timer and leave every channel. A disposed hub ignores
    /// further events and never fires a timer again.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state.dispose();
        self.maintenance.dispose();
        let dropped = self.registry.clear(&mut self.transport);
        for id in dropped {
            self.state.presence.cancel_scoped(id);
        }
        if !self.state.outbox.is_empty() {
            warn!(pending = self.state.outbox.len(), "dropping unsent events on dispose");
            self.state.outbox.clear();
        }
        debug!("hub disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

fn retention_cutoff(now: Moment, retention: Duration) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| now.wall.checked_sub_signed(d))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use ticketwire_api::WireEvent;

    use super::*;
    use crate::error::TransportError;
    use crate::model::PresenceUser;
    use crate::storage::MemoryStore;

    #[derive(Debug, Default)]
    struct FakeLink {
        connected: bool,
        joins: Vec<String>,
        leaves: Vec<String>,
        whispers: Vec<(String, String, Value)>,
    }

    impl Transport for FakeLink {
        fn is_available(&self) -> bool {
            self.connected
        }

        fn join(&mut self, channel: &str) -> Result<(), TransportError> {
            self.joins.push(channel.to_owned());
            Ok(())
        }

        fn leave(&mut self, channel: &str) -> Result<(), TransportError> {
            self.leaves.push(channel.to_owned());
            Ok(())
        }

        fn whisper(&mut self, channel: &str, event: &str, data: &Value) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::Unavailable);
            }
            self.whispers
                .push((channel.to_owned(), event.to_owned(), data.clone()));
            Ok(())
        }
    }

    fn hub(now: Moment) -> Hub<FakeLink> {
        let config = ClientConfig::new("https://tickets.example.com/api/".parse().unwrap()).with_user(42u64);
        Hub::new(FakeLink::default(), &config, Arc::new(MemoryStore::new()), now)
    }

    fn connect(hub: &mut Hub<FakeLink>, now: Moment) {
        hub.transport_mut().connected = true;
        hub.handle_link_event(&LinkEvent::Connected, now);
    }

    fn message(channel: &str, event: &str, data: Value) -> LinkEvent {
        LinkEvent::Message(Arc::new(WireEvent {
            channel: Some(channel.to_owned()),
            event: event.to_owned(),
            data,
        }))
    }

    #[test]
    fn default_selection_joins_on_connect() {
        let now = Moment::now();
        let mut hub = hub(now);
        hub.follow(&ChannelSelection::default());
        assert!(hub.transport().joins.is_empty());

        connect(&mut hub, now);
        assert_eq!(
            hub.transport().joins,
            vec!["system.announcements", "tickets.global", "user.42"]
        );
        let view = hub.view();
        assert!(view.channels.iter().all(|c| c.joined));
    }

    #[test]
    fn global_price_change_lands_in_activity() {
        let now = Moment::now();
        let mut hub = hub(now);
        hub.follow_ticket_feed();

        let changed = hub.handle_link_event(
            &message(
                TICKET_FEED_CHANNEL,
                "TicketPriceChanged",
                json!({"old_price": 100, "new_price": 80, "event_name": "Lakers vs Warriors"}),
            ),
            now,
        );

        assert!(changed);
        let entries: Vec<_> = hub.state().activity.iter().collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("Lakers vs Warriors"));
        assert!(entries[0].message.contains("$100.00"));
        assert!(entries[0].message.contains("$80.00"));
        assert_eq!(hub.state().stats.events_received, 1);
    }

    #[test]
    fn unknown_event_changes_nothing() {
        let now = Moment::now();
        let mut hub = hub(now);
        hub.follow_ticket_feed();

        let changed = hub.handle_link_event(
            &message(TICKET_FEED_CHANNEL, "TicketTeleported", json!({"x": 1})),
            now,
        );

        assert!(!changed);
        assert!(hub.state().activity.is_empty());
        assert_eq!(hub.state().stats.events_ignored, 1);
    }

    #[test]
    fn badge_hides_after_reconnect() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.handle_link_event(&LinkEvent::Disconnected, now);
        assert!(hub.view().badge.visible);

        let later = now + Duration::from_millis(500);
        connect(&mut hub, later);
        assert!(hub.view().badge.visible);

        let deadline = hub.next_deadline().unwrap();
        assert!(deadline <= later.at + Duration::from_secs(2));
        hub.advance(later + Duration::from_secs(2));
        assert!(!hub.view().badge.visible);
        assert_eq!(hub.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn reconnect_replays_joins() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.follow_system();
        assert_eq!(hub.transport().joins, vec!["system.announcements"]);

        hub.transport_mut().connected = false;
        hub.handle_link_event(&LinkEvent::Disconnected, now);
        connect(&mut hub, now);
        assert_eq!(
            hub.transport().joins,
            vec!["system.announcements", "system.announcements"]
        );
    }

    #[test]
    fn heartbeat_whispers_on_presence_channel() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.join_presence("presence-platform");

        hub.advance(now + Duration::from_secs(30));

        let (channel, event, data) = hub.transport().whispers.last().unwrap();
        assert_eq!(channel, "presence-platform");
        assert_eq!(event, "heartbeat");
        assert_eq!(data["userId"], json!(42));
        assert_eq!(data["page"], json!("home"));
        assert!(hub.next_deadline().unwrap() > now.at + Duration::from_secs(30));
    }

    #[test]
    fn heartbeat_skipped_while_offline() {
        let now = Moment::now();
        let mut hub = hub(now);
        hub.join_presence("presence-platform");
        hub.advance(now + Duration::from_secs(30));
        assert!(hub.transport().whispers.is_empty());
        assert!(hub.take_fallbacks().is_empty());
    }

    #[test]
    fn send_routes_by_availability() {
        let now = Moment::now();
        let mut hub = hub(now);

        let route = hub.send(Some("user.42"), "ping", json!({}));
        assert!(matches!(route, SendRoute::Fallback(ref o) if o.event == "ping"));

        connect(&mut hub, now);
        assert_eq!(hub.send(Some("user.42"), "ping", json!({})), SendRoute::Whispered);
        assert!(matches!(hub.send(None, "ping", json!({})), SendRoute::Fallback(_)));
        assert_eq!(hub.state().stats.fallback_sends, 2);
        assert_eq!(hub.state().stats.whispers_sent, 1);
    }

    #[test]
    fn read_receipt_falls_back_when_offline() {
        let now = Moment::now();
        let mut hub = hub(now);
        let user = hub.follow_user(&EntityId::from(42u64));
        let _ = hub.open_chat(now);
        hub.take_fallbacks();

        hub.dispatch(
            user.channel(),
            "ChatMessageReceived",
            &json!({"id": "m7", "content": "Your order shipped"}),
            now,
        );

        let fallbacks = hub.take_fallbacks();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].event, "message_read");
        assert!(hub.take_fallbacks().is_empty());
    }

    #[test]
    fn unsubscribe_cancels_typing_timer() {
        let now = Moment::now();
        let mut hub = hub(now);
        let presence = hub.join_presence("presence-platform");
        hub.state.presence.here(vec![PresenceUser::new(7u64, "Ana")]);
        hub.dispatch(
            "presence-platform",
            "client-typing",
            &json!({"userId": 7, "isTyping": true}),
            now,
        );
        assert!(hub.state.presence.next_deadline().is_some());

        assert!(hub.unsubscribe(&presence));
        assert!(hub.state.presence.next_deadline().is_none());
        assert!(!hub.unsubscribe(&presence));
    }

    #[test]
    fn own_status_reverts_when_rejected() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.join_presence("presence-platform");

        let (pending, route) = hub.begin_own_status(PresenceStatus::Busy);
        assert_eq!(route, Some(SendRoute::Whispered));
        assert_eq!(hub.view().own_status, PresenceStatus::Busy);

        assert_eq!(hub.settle_own_status(pending, false), Settled::Reverted);
        assert_eq!(hub.view().own_status, PresenceStatus::Online);
    }

    #[test]
    fn disposed_hub_is_inert() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.follow_system();
        hub.notify(
            NotificationDraft::new(crate::notifications::NotificationKind::Info, "t", "m"),
            now,
        );

        hub.dispose();
        assert!(hub.is_disposed());
        assert_eq!(hub.transport().leaves, vec!["system.announcements"]);
        assert_eq!(hub.next_deadline(), None);
        assert!(!hub.advance(now + Duration::from_secs(60)));
        assert!(!hub.handle_link_event(&LinkEvent::Disconnected, now));
    }

    #[test]
    fn last_unsubscribe_drops_ticket_snapshot() {
        let now = Moment::now();
        let mut hub = hub(now);
        let ticket = EntityId::from(7u64);
        let first = hub.track_ticket(&ticket);
        let second = hub.track_ticket(&ticket);
        assert_eq!(hub.view().tickets.len(), 1);

        assert!(hub.unsubscribe(&first));
        assert_eq!(hub.view().tickets.len(), 1);

        assert!(hub.unsubscribe(&second));
        assert!(hub.view().tickets.is_empty());
        assert!(hub.state().tickets.get(&ticket).is_none());
    }

    #[test]
    fn state_change_to_connected_joins_channels() {
        let now = Moment::now();
        let mut hub = hub(now);
        hub.follow_system();
        hub.transport_mut().connected = true;

        hub.handle_link_event(
            &LinkEvent::StateChange {
                previous: LinkState::Connecting,
                current: LinkState::Connected,
            },
            now,
        );
        assert_eq!(hub.transport().joins, vec!["system.announcements"]);

        // The paired `Connected` does not join twice.
        hub.handle_link_event(&LinkEvent::Connected, now);
        assert_eq!(hub.transport().joins, vec!["system.announcements"]);
    }

    #[test]
    fn page_change_sends_page_id() {
        let now = Moment::now();
        let mut hub = hub(now);
        connect(&mut hub, now);
        hub.join_presence("presence-platform");

        let route = hub.set_page("/tickets/42", Some("Row A seats"));
        assert_eq!(route, Some(SendRoute::Whispered));
        let (_, event, data) = hub.transport().whispers.last().unwrap();
        assert_eq!(event, "page_change");
        assert_eq!(data["page"], json!("ticket-42"));
        assert_eq!(data["pageTitle"], json!("Row A seats"));
    }

    #[test]
    fn view_counts_idle_members() {
        let now = Moment::now();
        let mut hub = hub(now);
        let mut idle = PresenceUser::new(1u64, "idle");
        idle.last_activity_at = Some(now.wall - chrono::Duration::minutes(11));
        let mut active = PresenceUser::new(2u64, "active");
        active.last_activity_at = Some(now.wall - chrono::Duration::minutes(2));
        hub.state.presence.here(vec![idle, active, PresenceUser::new(3u64, "unknown")]);

        assert_eq!(hub.view().idle_users, 1);
    }

    #[test]
    fn reduced_motion_removes_notifications_without_exit_delay() {
        let now = Moment::now();
        let store = Arc::new(MemoryStore::new());
        AccessibilitySettings {
            reduced_motion: true,
            ..AccessibilitySettings::default()
        }
        .save(store.as_ref())
        .unwrap();
        let config = ClientConfig::new("https://tickets.example.com/api/".parse().unwrap());
        let mut hub = Hub::new(FakeLink::default(), &config, store, now);
        assert!(hub.state().accessibility.reduced_motion);

        let id = hub.notify(
            NotificationDraft::new(crate::notifications::NotificationKind::Info, "t", "m"),
            now,
        );
        assert!(hub.dismiss_notification(id, now));
        hub.advance(now);
        assert!(hub.view().notifications.is_empty());
    }

    #[test]
    fn archived_chat_can_be_resumed() {
        let now = Moment::now();
        let mut hub = hub(now);
        let _ = hub.open_chat(now);
        hub.send_chat("where are my saturday tickets?", now);
        hub.close_chat(now);

        let view = hub.view();
        assert!(view.chat.session_id.is_none());
        assert_eq!(view.chat.history.len(), 1);
        let archived = view.chat.history[0].id.clone();

        assert!(hub.resume_chat("chat_missing", now).is_none());
        let routes = hub.resume_chat(&archived, now).unwrap();
        assert!(routes.iter().all(|r| matches!(r, SendRoute::Fallback(_))));

        let view = hub.view();
        assert_eq!(view.chat.session_id.as_deref(), Some(archived.as_str()));
        assert!(view.chat.open);
        assert_eq!(view.chat.messages.len(), 2);
    }
}
