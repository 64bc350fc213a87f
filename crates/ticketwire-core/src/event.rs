//! Inbound event vocabulary.
//!
//! Every event the client understands has a wire name ([`EventKind`]) and a
//! typed payload. A payload is decoded exactly once, into [`LiveEvent`],
//! before any handler sees it; handlers never touch raw JSON.
//!
//! Ticket and system payloads use `snake_case` field names; whispers and
//! chat payloads use `camelCase`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::de;
use crate::model::{
    Availability, EntityId, MessageKind, MessageStatus, PresenceStatus, PresenceUser, TicketStatus,
};
use crate::notifications::NotificationKind;

// ── EventKind ────────────────────────────────────────────────────────

/// Closed set of inbound event names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
pub enum EventKind {
    // Ticket feeds
    TicketPriceChanged,
    TicketAvailabilityChanged,
    TicketStatusChanged,
    NewTicketListing,
    TicketUpdated,

    // System
    SystemAnnouncement,
    MaintenanceScheduled,
    ServiceUpdate,

    // Per-user
    PriceAlert,
    UserNotification,

    // Support chat
    ChatMessageReceived,
    AgentJoinedChat,
    AgentLeftChat,
    AgentTyping,
    MessageStatusUpdated,

    // Presence membership
    #[strum(serialize = "presence:here")]
    PresenceHere,
    #[strum(serialize = "presence:joining")]
    PresenceJoining,
    #[strum(serialize = "presence:leaving")]
    PresenceLeaving,

    // Client whispers
    #[strum(serialize = "client-typing")]
    Typing,
    #[strum(serialize = "client-page_change")]
    PageChange,
    #[strum(serialize = "client-status_change")]
    StatusChange,
    #[strum(serialize = "client-heartbeat")]
    Heartbeat,
}

impl EventKind {
    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

// ── Ticket payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChanged {
    #[serde(default)]
    pub ticket_id: Option<EntityId>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub event_name: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub old_price: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub new_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    #[serde(default)]
    pub ticket_id: Option<EntityId>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub event_name: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(deserialize_with = "de::u32_lenient")]
    pub available_tickets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    #[serde(default)]
    pub ticket_id: Option<EntityId>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub event_name: String,
    #[serde(default)]
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    #[serde(default)]
    pub ticket_id: Option<EntityId>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub event_name: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub price: Option<f64>,
}

/// Catch-all update on a single ticket channel. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdated {
    #[serde(default)]
    pub ticket_id: Option<EntityId>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_u32_lenient")]
    pub available_tickets: Option<u32>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
}

// ── System payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintenance {
    #[serde(default, deserialize_with = "de::opt_timestamp_lenient")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub service: String,
    pub status: String,
}

// ── User payloads ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    #[serde(default = "default_alert_kind")]
    pub alert_type: NotificationKind,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub message: String,
    #[serde(default)]
    pub event_name: Option<String>,
}

fn default_alert_kind() -> NotificationKind {
    NotificationKind::Info
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotification {
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
}

// ── Chat payloads ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingChatMessage {
    pub id: String,
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, deserialize_with = "de::opt_timestamp_lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_avatar: Option<String>,
}

fn default_message_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJoined {
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub agent_name: String,
    #[serde(default)]
    pub agent_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLeft {
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub agent_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTypingPayload {
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusChanged {
    pub message_id: String,
    pub status: MessageStatus,
}

// ── Whisper payloads ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingWhisper {
    pub user_id: EntityId,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageChangeWhisper {
    pub user_id: EntityId,
    pub page: String,
    #[serde(default)]
    pub page_title: Option<String>,
}

impl PageChangeWhisper {
    /// What to show for the destination: the title when there is one.
    pub fn destination(&self) -> &str {
        self.page_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeWhisper {
    pub user_id: EntityId,
    #[serde(default)]
    pub status: Option<PresenceStatus>,
    #[serde(default)]
    pub availability: Option<Availability>,
    #[serde(default, deserialize_with = "de::opt_u32_lenient")]
    pub active_chats: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatWhisper {
    pub user_id: EntityId,
    #[serde(default, deserialize_with = "de::opt_timestamp_lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<String>,
}

// ── LiveEvent ────────────────────────────────────────────────────────

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    PriceChanged(PriceChanged),
    AvailabilityChanged(AvailabilityChanged),
    StatusChanged(StatusChanged),
    NewListing(NewListing),
    TicketUpdated(TicketUpdated),
    Announcement(Announcement),
    Maintenance(Maintenance),
    ServiceUpdate(ServiceUpdate),
    PriceAlert(PriceAlert),
    UserNotification(UserNotification),
    ChatMessage(IncomingChatMessage),
    AgentJoined(AgentJoined),
    AgentLeft(AgentLeft),
    AgentTyping(AgentTypingPayload),
    MessageStatus(MessageStatusChanged),
    PresenceHere(Vec<PresenceUser>),
    PresenceJoining(PresenceUser),
    PresenceLeaving(PresenceUser),
    Typing(TypingWhisper),
    PageChange(PageChangeWhisper),
    StatusChange(StatusChangeWhisper),
    Heartbeat(HeartbeatWhisper),
}

impl LiveEvent {
    /// Decode `payload` as the event named by `kind`.
    pub fn decode(kind: EventKind, payload: &Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::TicketPriceChanged => Self::PriceChanged(PriceChanged::deserialize(payload)?),
            EventKind::TicketAvailabilityChanged => {
                Self::AvailabilityChanged(AvailabilityChanged::deserialize(payload)?)
            }
            EventKind::TicketStatusChanged => {
                Self::StatusChanged(StatusChanged::deserialize(payload)?)
            }
            EventKind::NewTicketListing => Self::NewListing(NewListing::deserialize(payload)?),
            EventKind::TicketUpdated => Self::TicketUpdated(TicketUpdated::deserialize(payload)?),
            EventKind::SystemAnnouncement => {
                Self::Announcement(Announcement::deserialize(payload)?)
            }
            EventKind::MaintenanceScheduled => {
                Self::Maintenance(Maintenance::deserialize(payload)?)
            }
            EventKind::ServiceUpdate => Self::ServiceUpdate(ServiceUpdate::deserialize(payload)?),
            EventKind::PriceAlert => Self::PriceAlert(PriceAlert::deserialize(payload)?),
            EventKind::UserNotification => {
                Self::UserNotification(UserNotification::deserialize(payload)?)
            }
            EventKind::ChatMessageReceived => {
                Self::ChatMessage(IncomingChatMessage::deserialize(payload)?)
            }
            EventKind::AgentJoinedChat => Self::AgentJoined(AgentJoined::deserialize(payload)?),
            EventKind::AgentLeftChat => Self::AgentLeft(AgentLeft::deserialize(payload)?),
            EventKind::AgentTyping => {
                Self::AgentTyping(AgentTypingPayload::deserialize(payload)?)
            }
            EventKind::MessageStatusUpdated => {
                Self::MessageStatus(MessageStatusChanged::deserialize(payload)?)
            }
            EventKind::PresenceHere => {
                Self::PresenceHere(Vec::<PresenceUser>::deserialize(payload)?)
            }
            EventKind::PresenceJoining => {
                Self::PresenceJoining(PresenceUser::deserialize(payload)?)
            }
            EventKind::PresenceLeaving => {
                Self::PresenceLeaving(PresenceUser::deserialize(payload)?)
            }
            EventKind::Typing => Self::Typing(TypingWhisper::deserialize(payload)?),
            EventKind::PageChange => Self::PageChange(PageChangeWhisper::deserialize(payload)?),
            EventKind::StatusChange => {
                Self::StatusChange(StatusChangeWhisper::deserialize(payload)?)
            }
            EventKind::Heartbeat => Self::Heartbeat(HeartbeatWhisper::deserialize(payload)?),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::PriceChanged(_) => EventKind::TicketPriceChanged,
            Self::AvailabilityChanged(_) => EventKind::TicketAvailabilityChanged,
            Self::StatusChanged(_) => EventKind::TicketStatusChanged,
            Self::NewListing(_) => EventKind::NewTicketListing,
            Self::TicketUpdated(_) => EventKind::TicketUpdated,
            Self::Announcement(_) => EventKind::SystemAnnouncement,
            Self::Maintenance(_) => EventKind::MaintenanceScheduled,
            Self::ServiceUpdate(_) => EventKind::ServiceUpdate,
            Self::PriceAlert(_) => EventKind::PriceAlert,
            Self::UserNotification(_) => EventKind::UserNotification,
            Self::ChatMessage(_) => EventKind::ChatMessageReceived,
            Self::AgentJoined(_) => EventKind::AgentJoinedChat,
            Self::AgentLeft(_) => EventKind::AgentLeftChat,
            Self::AgentTyping(_) => EventKind::AgentTyping,
            Self::MessageStatus(_) => EventKind::MessageStatusUpdated,
            Self::PresenceHere(_) => EventKind::PresenceHere,
            Self::PresenceJoining(_) => EventKind::PresenceJoining,
            Self::PresenceLeaving(_) => EventKind::PresenceLeaving,
            Self::Typing(_) => EventKind::Typing,
            Self::PageChange(_) => EventKind::PageChange,
            Self::StatusChange(_) => EventKind::StatusChange,
            Self::Heartbeat(_) => EventKind::Heartbeat,
        }
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_names_round_trip() {
        for kind in EventKind::iter() {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("presence:here"), Some(EventKind::PresenceHere));
        assert_eq!(EventKind::from_wire("client-page_change"), Some(EventKind::PageChange));
        assert_eq!(EventKind::from_wire("SomethingElse"), None);
    }

    #[test]
    fn price_change_accepts_string_prices() {
        let event = LiveEvent::decode(
            EventKind::TicketPriceChanged,
            &json!({"old_price": "100", "new_price": 80, "event_name": "Lakers vs Warriors"}),
        )
        .unwrap();
        let LiveEvent::PriceChanged(p) = event else {
            panic!("wrong variant");
        };
        assert_eq!(p.old_price, 100.0);
        assert_eq!(p.new_price, 80.0);
        assert_eq!(p.event_name, "Lakers vs Warriors");
        assert!(p.ticket_id.is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let result = LiveEvent::decode(
            EventKind::TicketAvailabilityChanged,
            &json!({"available_tickets": "lots"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn presence_here_decodes_members() {
        let event = LiveEvent::decode(
            EventKind::PresenceHere,
            &json!([
                {"id": 1, "name": "Ava", "role": "agent", "active_chats": 2},
                {"id": "u-2", "name": null}
            ]),
        )
        .unwrap();
        let LiveEvent::PresenceHere(users) = event else {
            panic!("wrong variant");
        };
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].active_chats, 2);
        assert_eq!(users[1].name, "");
    }

    #[test]
    fn whisper_payloads_are_camel_case() {
        let event = LiveEvent::decode(
            EventKind::PageChange,
            &json!({"userId": "7", "page": "ticket-42", "pageTitle": "Lakers tickets"}),
        )
        .unwrap();
        let LiveEvent::PageChange(w) = event else {
            panic!("wrong variant");
        };
        assert_eq!(w.user_id, EntityId::from(7));
        assert_eq!(w.destination(), "Lakers tickets");
        assert_eq!(LiveEvent::PageChange(w).name(), "client-page_change");
    }

    #[test]
    fn price_alert_kind_defaults_to_info() {
        let event =
            LiveEvent::decode(EventKind::PriceAlert, &json!({"title": "t", "message": "m"}))
                .unwrap();
        let LiveEvent::PriceAlert(alert) = event else {
            panic!("wrong variant");
        };
        assert_eq!(alert.alert_type, NotificationKind::Info);
    }
}
