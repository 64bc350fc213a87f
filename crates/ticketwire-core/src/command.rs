// ── Commands ──
//
// Requests routed through the live client's command channel to the task
// that owns the hub. Each one carries a oneshot for its result.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::dispatch::HandlerMap;
use crate::error::CoreError;
use crate::hub::LiveState;
use crate::model::{EntityId, PresenceStatus};
use crate::notifications::NotificationDraft;
use crate::optimistic::Settled;
use crate::registry::SubscriptionHandle;

#[derive(Debug)]
pub enum Command {
    // ── Subscriptions ────────────────────────────────────────────
    Subscribe {
        channel: String,
        handlers: HandlerMap<LiveState>,
    },
    Unsubscribe(SubscriptionHandle),
    JoinPresence {
        channel: String,
    },
    TrackTicket(EntityId),

    // ── Outbound ─────────────────────────────────────────────────
    /// Whisper on `channel` if the link is up, otherwise `POST /events`.
    Send {
        channel: Option<String>,
        event: String,
        data: Value,
    },
    SetPage {
        page: String,
        title: Option<String>,
    },
    SetStatus(PresenceStatus),

    // ── Local state ──────────────────────────────────────────────
    Notify(NotificationDraft),
    DismissNotification(u64),

    // ── Support chat ─────────────────────────────────────────────
    OpenChat,
    /// Reopen an archived session by id.
    ResumeChat(String),
    MinimizeChat,
    CloseChat,
    SendChat(String),
    RefreshAgentStatus,
}

/// How an outbound event left the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Whispered,
    /// Sent over the REST fallback.
    Posted,
    /// Nothing needed sending; the change was applied locally only.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    Subscribed(SubscriptionHandle),
    Removed(bool),
    Delivered(Delivery),
    /// Every event the command produced, in send order.
    DeliveredAll(Vec<Delivery>),
    Notified(u64),
    Status(Settled),
    AgentsOnline(u32),
}

pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}
