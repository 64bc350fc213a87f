// ── Built-in channel handlers ──
//
// One handler map per channel family. Each handler folds a decoded
// `LiveEvent` into `LiveState`; anything that must go back to the server
// is queued on the state and sent by the hub once dispatch finishes.

use crate::activity::ActivityKind;
use crate::dispatch::{HandlerContext, HandlerMap};
use crate::error::HandlerError;
use crate::event::{EventKind, LiveEvent};
use crate::format::format_usd;
use crate::hub::LiveState;
use crate::model::{EntityId, PriceMovement};
use crate::notifications::{NotificationDraft, NotificationKind};
use crate::presence::StatusUpdate;
use crate::tickets::BannerKind;

type Ctx<'a, 'b> = &'a mut HandlerContext<'b, LiveState>;
type Outcome = Result<(), HandlerError>;

fn unexpected(expected: &'static str, event: &LiveEvent) -> HandlerError {
    HandlerError::UnexpectedEvent {
        expected,
        got: event.name(),
    }
}

// ── tickets.global ───────────────────────────────────────────────────

pub fn ticket_feed() -> HandlerMap<LiveState> {
    HandlerMap::new()
        .on(EventKind::TicketPriceChanged, global_price_changed)
        .on(EventKind::TicketAvailabilityChanged, global_availability_changed)
        .on(EventKind::TicketStatusChanged, global_status_changed)
        .on(EventKind::NewTicketListing, new_listing)
}

fn global_price_changed(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PriceChanged(change) = event else {
        return Err(unexpected("TicketPriceChanged", event));
    };
    let movement = PriceMovement::between(change.old_price, change.new_price);
    let message = format!(
        "Price {}: {} ({} → {})",
        movement.verb(),
        change.event_name,
        format_usd(change.old_price),
        format_usd(change.new_price),
    );
    ctx.state
        .activity
        .record(ActivityKind::Price, message, change.venue.clone(), ctx.now.wall);
    Ok(())
}

fn global_availability_changed(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::AvailabilityChanged(change) = event else {
        return Err(unexpected("TicketAvailabilityChanged", event));
    };
    let message = format!(
        "Availability changed: {} - {} tickets available",
        change.event_name, change.available_tickets
    );
    ctx.state.activity.record(
        ActivityKind::Availability,
        message,
        change.venue.clone(),
        ctx.now.wall,
    );

    match BannerKind::for_count(change.available_tickets) {
        Some(BannerKind::LowStock) => ctx.state.tickets.raise_banner(
            BannerKind::LowStock,
            format!(
                "Only {} tickets left for {}!",
                change.available_tickets, change.event_name
            ),
            ctx.now,
        ),
        Some(BannerKind::SoldOut) => ctx.state.tickets.raise_banner(
            BannerKind::SoldOut,
            format!("{} is now sold out!", change.event_name),
            ctx.now,
        ),
        None => {}
    }
    Ok(())
}

fn global_status_changed(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::StatusChanged(change) = event else {
        return Err(unexpected("TicketStatusChanged", event));
    };
    let message = format!(
        "Status changed: {} - {} → {}",
        change.event_name, change.old_status, change.new_status
    );
    ctx.state
        .activity
        .record(ActivityKind::Status, message, None, ctx.now.wall);
    Ok(())
}

fn new_listing(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::NewListing(listing) = event else {
        return Err(unexpected("NewTicketListing", event));
    };
    let message = match listing.price {
        Some(price) => format!("New listing: {} from {}", listing.event_name, format_usd(price)),
        None => format!("New listing: {}", listing.event_name),
    };
    ctx.state.activity.record(
        ActivityKind::NewListing,
        message,
        listing.venue.clone(),
        ctx.now.wall,
    );
    Ok(())
}

// ── system.announcements ─────────────────────────────────────────────

pub fn system() -> HandlerMap<LiveState> {
    HandlerMap::new()
        .on(EventKind::SystemAnnouncement, announcement)
        .on(EventKind::MaintenanceScheduled, maintenance)
        .on(EventKind::ServiceUpdate, service_update)
}

fn announcement(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::Announcement(announcement) = event else {
        return Err(unexpected("SystemAnnouncement", event));
    };
    ctx.state.notifications.push(
        NotificationDraft::new(
            NotificationKind::Announcement,
            "System Announcement",
            announcement.message.clone(),
        ),
        ctx.now,
    );
    ctx.state.activity.record(
        ActivityKind::Announcement,
        announcement.message.clone(),
        None,
        ctx.now.wall,
    );
    Ok(())
}

fn maintenance(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::Maintenance(window) = event else {
        return Err(unexpected("MaintenanceScheduled", event));
    };
    let message = match (window.scheduled_at, &window.message) {
        (Some(at), _) => format!(
            "Maintenance scheduled for {}",
            at.format("%Y-%m-%d %H:%M UTC")
        ),
        (None, Some(message)) => message.clone(),
        (None, None) => "Maintenance scheduled".to_owned(),
    };
    ctx.state.notifications.push(
        NotificationDraft::new(NotificationKind::Maintenance, "Scheduled Maintenance", message),
        ctx.now,
    );
    Ok(())
}

fn service_update(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::ServiceUpdate(update) = event else {
        return Err(unexpected("ServiceUpdate", event));
    };
    let message = format!("Service update: {} - {}", update.service, update.status);
    ctx.state
        .activity
        .record(ActivityKind::Service, message, None, ctx.now.wall);
    Ok(())
}

// ── user.{id} ────────────────────────────────────────────────────────

pub fn user() -> HandlerMap<LiveState> {
    HandlerMap::new()
        .on(EventKind::PriceAlert, price_alert)
        .on(EventKind::UserNotification, user_notification)
        .on(EventKind::ChatMessageReceived, chat_message)
        .on(EventKind::AgentJoinedChat, agent_joined)
        .on(EventKind::AgentLeftChat, agent_left)
        .on(EventKind::AgentTyping, agent_typing)
        .on(EventKind::MessageStatusUpdated, message_status)
}

fn price_alert(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PriceAlert(alert) = event else {
        return Err(unexpected("PriceAlert", event));
    };
    let mut draft = NotificationDraft::new(alert.alert_type, alert.title.clone(), alert.message.clone());
    if let Some(name) = &alert.event_name {
        draft = draft.related(name.clone());
    }
    ctx.state.notifications.push(draft, ctx.now);
    Ok(())
}

fn user_notification(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::UserNotification(note) = event else {
        return Err(unexpected("UserNotification", event));
    };
    let title = note.title.clone().unwrap_or_else(|| "Notification".to_owned());
    ctx.state.notifications.push(
        NotificationDraft::new(NotificationKind::Info, title, note.message.clone()),
        ctx.now,
    );
    Ok(())
}

fn chat_message(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::ChatMessage(message) = event else {
        return Err(unexpected("ChatMessageReceived", event));
    };
    if let Some(receipt) = ctx.state.chat.receive(message, ctx.now) {
        ctx.state.queue_chat(Some(ctx.channel), receipt);
    }
    Ok(())
}

fn agent_joined(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::AgentJoined(agent) = event else {
        return Err(unexpected("AgentJoinedChat", event));
    };
    ctx.state
        .chat
        .agent_joined(&agent.agent_name, agent.agent_avatar.as_deref(), ctx.now);
    Ok(())
}

fn agent_left(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::AgentLeft(agent) = event else {
        return Err(unexpected("AgentLeftChat", event));
    };
    ctx.state.chat.agent_left(&agent.agent_name, ctx.now);
    Ok(())
}

fn agent_typing(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::AgentTyping(typing) = event else {
        return Err(unexpected("AgentTyping", event));
    };
    ctx.state.chat.agent_typing(typing.is_typing, ctx.now);
    Ok(())
}

fn message_status(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::MessageStatus(update) = event else {
        return Err(unexpected("MessageStatusUpdated", event));
    };
    ctx.state
        .chat
        .mark_status(&update.message_id, update.status, ctx.now);
    Ok(())
}

// ── Presence channels ────────────────────────────────────────────────

pub fn presence() -> HandlerMap<LiveState> {
    HandlerMap::new()
        .on(EventKind::PresenceHere, presence_here)
        .on(EventKind::PresenceJoining, presence_joining)
        .on(EventKind::PresenceLeaving, presence_leaving)
        .on(EventKind::Typing, typing)
        .on(EventKind::PageChange, page_change)
        .on(EventKind::StatusChange, status_change)
        .on(EventKind::Heartbeat, heartbeat)
}

fn presence_here(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PresenceHere(users) = event else {
        return Err(unexpected("presence:here", event));
    };
    ctx.state.presence.here(users.clone());
    Ok(())
}

fn presence_joining(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PresenceJoining(user) = event else {
        return Err(unexpected("presence:joining", event));
    };
    ctx.state.presence.joining(user.clone());
    ctx.state.activity.record(
        ActivityKind::UserJoined,
        format!("{} joined", user.name),
        None,
        ctx.now.wall,
    );
    Ok(())
}

fn presence_leaving(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PresenceLeaving(user) = event else {
        return Err(unexpected("presence:leaving", event));
    };
    let name = ctx
        .state
        .presence
        .leaving(&user.id)
        .map_or_else(|| user.name.clone(), |gone| gone.name);
    ctx.state.activity.record(
        ActivityKind::UserLeft,
        format!("{name} left"),
        None,
        ctx.now.wall,
    );
    Ok(())
}

fn typing(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::Typing(whisper) = event else {
        return Err(unexpected("client-typing", event));
    };
    ctx.state
        .presence
        .typing(ctx.subscription, &whisper.user_id, whisper.is_typing, ctx.now);
    Ok(())
}

fn page_change(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::PageChange(whisper) = event else {
        return Err(unexpected("client-page_change", event));
    };
    let Some(name) = ctx
        .state
        .presence
        .page_change(&whisper.user_id, &whisper.page)
        .map(|user| user.name.clone())
    else {
        return Ok(());
    };
    ctx.state.activity.record(
        ActivityKind::PageChange,
        format!("{name} navigated to {}", whisper.destination()),
        Some(whisper.page.clone()),
        ctx.now.wall,
    );
    Ok(())
}

fn status_change(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::StatusChange(whisper) = event else {
        return Err(unexpected("client-status_change", event));
    };
    let update = StatusUpdate {
        status: whisper.status,
        availability: whisper.availability,
        active_chats: whisper.active_chats,
    };
    ctx.state.presence.status_change(&whisper.user_id, &update);
    Ok(())
}

fn heartbeat(ctx: Ctx<'_, '_>, event: &LiveEvent) -> Outcome {
    let LiveEvent::Heartbeat(whisper) = event else {
        return Err(unexpected("client-heartbeat", event));
    };
    ctx.state.presence.heartbeat(
        &whisper.user_id,
        whisper.timestamp.unwrap_or(ctx.now.wall),
        whisper.page.as_deref(),
    );
    Ok(())
}

// ── ticket.{id} ──────────────────────────────────────────────────────

/// Handlers that keep the board's snapshot of `ticket_id` current.
pub fn ticket(ticket_id: EntityId) -> HandlerMap<LiveState> {
    let price_id = ticket_id.clone();
    let availability_id = ticket_id.clone();
    let status_id = ticket_id.clone();
    HandlerMap::new()
        .on(EventKind::TicketPriceChanged, move |ctx: Ctx<'_, '_>, event: &LiveEvent| {
            let LiveEvent::PriceChanged(change) = event else {
                return Err(unexpected("TicketPriceChanged", event));
            };
            ctx.state
                .tickets
                .apply_price(&price_id, change.old_price, change.new_price);
            Ok(())
        })
        .on(EventKind::TicketAvailabilityChanged, move |ctx: Ctx<'_, '_>, event: &LiveEvent| {
            let LiveEvent::AvailabilityChanged(change) = event else {
                return Err(unexpected("TicketAvailabilityChanged", event));
            };
            ctx.state
                .tickets
                .apply_availability(&availability_id, change.available_tickets);
            Ok(())
        })
        .on(EventKind::TicketStatusChanged, move |ctx: Ctx<'_, '_>, event: &LiveEvent| {
            let LiveEvent::StatusChanged(change) = event else {
                return Err(unexpected("TicketStatusChanged", event));
            };
            ctx.state.tickets.apply_status(&status_id, change.new_status);
            Ok(())
        })
        .on(EventKind::TicketUpdated, move |ctx: Ctx<'_, '_>, event: &LiveEvent| {
            let LiveEvent::TicketUpdated(update) = event else {
                return Err(unexpected("TicketUpdated", event));
            };
            let board = &mut ctx.state.tickets;
            if let Some(price) = update.price {
                let old = board.get(&ticket_id).and_then(|t| t.price).unwrap_or(price);
                board.apply_price(&ticket_id, old, price);
            }
            if let Some(available) = update.available_tickets {
                board.apply_availability(&ticket_id, available);
            }
            if let Some(status) = update.status {
                board.apply_status(&ticket_id, status);
            }
            Ok(())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::Timings;
    use crate::dispatch::dispatch;
    use crate::model::{PresenceUser, TicketStatus};
    use crate::registry::SubscriptionId;
    use crate::storage::MemoryStore;
    use crate::timers::Moment;

    fn state() -> LiveState {
        LiveState::new(&Timings::default(), Arc::new(MemoryStore::new()))
    }

    fn run(
        map: HandlerMap<LiveState>,
        channel: &str,
        event: &str,
        payload: &serde_json::Value,
        state: &mut LiveState,
        now: Moment,
    ) -> crate::dispatch::DispatchOutcome {
        let mut subs = vec![(SubscriptionId(1), map)];
        dispatch(&mut subs, channel, event, payload, state, now)
    }

    #[test]
    fn global_price_change_records_formatted_activity() {
        let mut state = state();
        let outcome = run(
            ticket_feed(),
            "tickets.global",
            "TicketPriceChanged",
            &json!({
                "ticket_id": 7,
                "event_name": "Lakers vs Warriors",
                "venue": "Crypto.com Arena",
                "old_price": 100,
                "new_price": 80,
            }),
            &mut state,
            Moment::now(),
        );

        assert_eq!(outcome.handled, 1);
        assert_eq!(state.activity.len(), 1);
        let entry = state.activity.latest().unwrap();
        assert_eq!(entry.kind, ActivityKind::Price);
        assert_eq!(
            entry.message,
            "Price dropped: Lakers vs Warriors ($100.00 → $80.00)"
        );
        assert_eq!(entry.location.as_deref(), Some("Crypto.com Arena"));
    }

    #[test]
    fn low_availability_raises_banner() {
        let mut state = state();
        run(
            ticket_feed(),
            "tickets.global",
            "TicketAvailabilityChanged",
            &json!({"event_name": "Finals", "available_tickets": 3}),
            &mut state,
            Moment::now(),
        );
        let banner = state.tickets.banner().unwrap();
        assert_eq!(banner.kind, BannerKind::LowStock);
        assert_eq!(banner.message, "Only 3 tickets left for Finals!");

        run(
            ticket_feed(),
            "tickets.global",
            "TicketAvailabilityChanged",
            &json!({"event_name": "Finals", "available_tickets": 0}),
            &mut state,
            Moment::now(),
        );
        assert_eq!(state.tickets.banner().unwrap().message, "Finals is now sold out!");
    }

    #[test]
    fn plentiful_availability_leaves_banner_alone() {
        let mut state = state();
        run(
            ticket_feed(),
            "tickets.global",
            "TicketAvailabilityChanged",
            &json!({"event_name": "Finals", "available_tickets": 250}),
            &mut state,
            Moment::now(),
        );
        assert!(state.tickets.banner().is_none());
        assert_eq!(state.activity.len(), 1);
    }

    #[test]
    fn announcement_notifies_and_records() {
        let mut state = state();
        run(
            system(),
            "system.announcements",
            "SystemAnnouncement",
            &json!({"message": "New venues added"}),
            &mut state,
            Moment::now(),
        );
        let entry = state.notifications.entries().next().unwrap();
        assert_eq!(entry.kind, NotificationKind::Announcement);
        assert_eq!(entry.title, "System Announcement");
        assert_eq!(state.activity.latest().unwrap().message, "New venues added");
    }

    #[test]
    fn maintenance_formats_scheduled_time() {
        let mut state = state();
        run(
            system(),
            "system.announcements",
            "MaintenanceScheduled",
            &json!({"scheduled_at": "2026-03-01T02:00:00Z"}),
            &mut state,
            Moment::now(),
        );
        let entry = state.notifications.entries().next().unwrap();
        assert_eq!(entry.title, "Scheduled Maintenance");
        assert_eq!(entry.message, "Maintenance scheduled for 2026-03-01 02:00 UTC");
    }

    #[test]
    fn price_alert_keeps_kind_and_event() {
        let mut state = state();
        run(
            user(),
            "user.42",
            "PriceAlert",
            &json!({
                "alert_type": "target_price",
                "title": "Target reached",
                "message": "Now $45",
                "event_name": "Hamilton",
            }),
            &mut state,
            Moment::now(),
        );
        let entry = state.notifications.entries().next().unwrap();
        assert_eq!(entry.kind, NotificationKind::TargetPrice);
        assert_eq!(entry.related.as_deref(), Some("Hamilton"));
    }

    #[test]
    fn chat_message_while_closed_counts_unread() {
        let mut state = state();
        run(
            user(),
            "user.42",
            "ChatMessageReceived",
            &json!({"id": "m1", "type": "text", "content": "Hi there", "senderName": "Sam"}),
            &mut state,
            Moment::now(),
        );
        assert_eq!(state.chat.unread(), 1);
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn chat_message_while_open_queues_receipt_on_channel() {
        let mut state = state();
        let now = Moment::now();
        let _ = state.chat.open(now);
        run(
            user(),
            "user.42",
            "ChatMessageReceived",
            &json!({"id": "m1", "content": "Hi there"}),
            &mut state,
            now,
        );
        assert_eq!(state.chat.unread(), 0);
        let queued = state.outbox.last().unwrap();
        assert_eq!(queued.channel.as_deref(), Some("user.42"));
        assert_eq!(queued.event, "message_read");
    }

    #[test]
    fn page_change_describes_destination() {
        let mut state = state();
        state.presence.here(vec![PresenceUser::new(1u64, "Ana")]);
        run(
            presence(),
            "presence-platform",
            "client-page_change",
            &json!({"userId": 1, "page": "ticket-9", "pageTitle": "Row A seats"}),
            &mut state,
            Moment::now(),
        );
        let entry = state.activity.latest().unwrap();
        assert_eq!(entry.message, "Ana navigated to Row A seats");
        assert_eq!(entry.location.as_deref(), Some("ticket-9"));
        assert_eq!(
            state.presence.get(&EntityId::from(1u64)).unwrap().current_page.as_deref(),
            Some("ticket-9")
        );
    }

    #[test]
    fn page_change_from_unknown_user_records_nothing() {
        let mut state = state();
        let outcome = run(
            presence(),
            "presence-platform",
            "client-page_change",
            &json!({"userId": 99, "page": "home"}),
            &mut state,
            Moment::now(),
        );
        assert_eq!(outcome.handled, 1);
        assert!(state.activity.is_empty());
    }

    #[test]
    fn typing_flag_clears_after_ttl() {
        let mut state = state();
        state.presence.here(vec![PresenceUser::new(1u64, "Ana")]);
        let now = Moment::now();
        run(
            presence(),
            "presence-platform",
            "client-typing",
            &json!({"userId": 1, "isTyping": true}),
            &mut state,
            now,
        );
        let id = EntityId::from(1u64);
        assert!(state.presence.get(&id).unwrap().is_typing);

        state.presence.advance(now + Duration::from_secs(3));
        assert!(!state.presence.get(&id).unwrap().is_typing);
    }

    #[test]
    fn ticket_channel_updates_tracked_snapshot() {
        let mut state = state();
        let id = EntityId::from(9u64);
        state.tickets.track(id.clone());

        let now = Moment::now();
        run(
            ticket(id.clone()),
            "ticket.9",
            "TicketUpdated",
            &json!({"ticket_id": 9, "price": 55.5, "available_tickets": 0}),
            &mut state,
            now,
        );
        let snapshot = state.tickets.get(&id).unwrap();
        assert_eq!(snapshot.price, Some(55.5));
        assert_eq!(snapshot.available, Some(0));
        assert_eq!(snapshot.status, TicketStatus::SoldOut);
    }

    #[test]
    fn wrong_variant_is_reported() {
        let mut state = state();
        let mut ctx = HandlerContext {
            state: &mut state,
            now: Moment::now(),
            channel: "system.announcements",
            subscription: SubscriptionId(1),
        };
        let event = LiveEvent::AgentTyping(crate::event::AgentTypingPayload { is_typing: true });
        let err = announcement(&mut ctx, &event).unwrap_err();
        assert!(matches!(
            err,
            HandlerError::UnexpectedEvent {
                expected: "SystemAnnouncement",
                ..
            }
        ));
    }
}
