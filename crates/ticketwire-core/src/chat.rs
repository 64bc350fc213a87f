// ── Support chat session ──
//
// Conversation with a support agent: the message list, unread count,
// agent info and a short archive of past sessions. Every mutation is
// persisted under a fixed key so a restart picks the conversation back
// up. Methods that need to tell the server something return the
// outbound event instead of sending it; the hub decides the route.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::IncomingChatMessage;
use crate::model::{AgentInfo, ChatMessage, ChatSummary, MessageKind, MessageStatus, Sender};
use crate::storage::{self, CHAT_STATE_KEY, KeyValueStore};
use crate::timers::{Moment, TimerSet};

pub const DEFAULT_AGENT_TYPING_TTL: Duration = Duration::from_secs(3);

/// Archived sessions kept locally.
pub const HISTORY_LIMIT: usize = 10;

const SUBJECT_MIN_CHARS: usize = 10;
const SUBJECT_MAX_CHARS: usize = 50;
const DEFAULT_SUBJECT: &str = "General Support";

/// Something the session wants the server to know about.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutbound {
    pub event: &'static str,
    pub data: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedChat {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    history: Vec<ChatSummary>,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClearAgentTyping;

pub struct ChatSession {
    store: Arc<dyn KeyValueStore>,
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    history: Vec<ChatSummary>,
    agent: AgentInfo,
    agents_online: bool,
    unread: usize,
    open: bool,
    typing_ttl: Duration,
    timers: TimerSet<ClearAgentTyping>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.session_id)
            .field("messages", &self.messages.len())
            .field("history", &self.history.len())
            .field("unread", &self.unread)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Restore the persisted conversation, or start empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let saved: PersistedChat = storage::load_or_default(store.as_ref(), CHAT_STATE_KEY);
        let unread = saved.messages.iter().filter(|m| m.is_unread()).count();
        let saved_at = DateTime::<Utc>::from_timestamp_millis(saved.timestamp)
            .filter(|_| saved.timestamp > 0);
        debug!(
            session = ?saved.session_id,
            messages = saved.messages.len(),
            unread,
            ?saved_at,
            "chat state restored"
        );
        Self {
            store,
            session_id: saved.session_id,
            messages: saved.messages,
            history: saved.history,
            agent: AgentInfo::default(),
            agents_online: false,
            unread,
            open: false,
            typing_ttl: DEFAULT_AGENT_TYPING_TTL,
            timers: TimerSet::new(),
        }
    }

    #[must_use]
    pub fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the chat window: starts a session if there is none and marks
    /// everything read.
    pub fn open(&mut self, now: Moment) -> Vec<ChatOutbound> {
        self.open = true;
        let mut out = Vec::new();
        if self.session_id.is_none() {
            out.push(self.start_session(now));
        }
        out.extend(self.mark_all_read());
        out
    }

    /// Hide the window but keep the session.
    pub fn minimize(&mut self) {
        self.open = false;
    }

    /// Close the window. A session with messages is archived and the
    /// next `open` starts fresh.
    pub fn close(&mut self, now: Moment) {
        self.open = false;
        if self.messages.is_empty() {
            return;
        }
        self.archive(now);
        self.session_id = None;
        self.messages.clear();
        self.unread = 0;
        self.persist(now);
    }

    pub fn start_session(&mut self, now: Moment) -> ChatOutbound {
        let millis = now.wall.timestamp_millis();
        let session_id = format!("chat_{millis}");
        self.session_id = Some(session_id.clone());
        self.push(
            ChatMessage::system(format!("welcome_{millis}"), "Chat session started", now.wall),
            now,
        );
        ChatOutbound {
            event: "chat_session_started",
            data: json!({ "sessionId": session_id }),
        }
    }

    /// Reopen an archived session.
    pub fn resume(&mut self, session_id: &str, now: Moment) -> bool {
        let Some(summary) = self.history.iter().find(|s| s.id == session_id) else {
            return false;
        };
        self.messages.clone_from(&summary.messages);
        self.session_id = Some(summary.id.clone());
        self.unread = self.messages.iter().filter(|m| m.is_unread()).count();
        self.persist(now);
        true
    }

    // ── Outgoing ─────────────────────────────────────────────────

    /// Queue a text message from the user. Blank input is ignored.
    pub fn send_text(&mut self, text: &str, now: Moment) -> Option<ChatOutbound> {
        let content = text.trim();
        if content.is_empty() {
            return None;
        }
        let message = ChatMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            kind: MessageKind::Text,
            content: content.to_owned(),
            timestamp: now.wall,
            sender: Sender::User,
            sender_name: None,
            sender_avatar: None,
            status: Some(MessageStatus::Sending),
        };
        let data = serde_json::to_value(&message).unwrap_or(Value::Null);
        self.push(message, now);
        Some(ChatOutbound {
            event: "chat_message",
            data,
        })
    }

    // ── Incoming ─────────────────────────────────────────────────

    /// An agent message arrived. When the window is open it is read on
    /// arrival and the read receipt is returned.
    pub fn receive(&mut self, incoming: &IncomingChatMessage, now: Moment) -> Option<ChatOutbound> {
        if let Some(name) = &incoming.sender_name {
            self.agent.name = Some(name.clone());
            self.agent.avatar.clone_from(&incoming.sender_avatar);
        }
        let message = ChatMessage {
            id: incoming.id.clone(),
            kind: incoming.kind,
            content: incoming.content.clone(),
            timestamp: incoming.timestamp.unwrap_or(now.wall),
            sender: Sender::Agent,
            sender_name: incoming.sender_name.clone(),
            sender_avatar: incoming.sender_avatar.clone(),
            status: self.open.then_some(MessageStatus::Read),
        };
        self.push(message, now);

        if self.open {
            Some(self.read_receipt(&incoming.id))
        } else {
            self.unread += 1;
            None
        }
    }

    pub fn agent_joined(&mut self, name: &str, avatar: Option<&str>, now: Moment) {
        self.agents_online = true;
        self.agent = AgentInfo {
            name: Some(name.to_owned()),
            avatar: avatar.map(str::to_owned),
            is_typing: false,
        };
        self.timers.cancel(&ClearAgentTyping);
        let id = format!("agent_joined_{}", now.wall.timestamp_millis());
        self.push(
            ChatMessage::system(id, format!("{name} joined the chat"), now.wall),
            now,
        );
    }

    pub fn agent_left(&mut self, name: &str, now: Moment) {
        self.agent.is_typing = false;
        self.timers.cancel(&ClearAgentTyping);
        let id = format!("agent_left_{}", now.wall.timestamp_millis());
        self.push(
            ChatMessage::system(id, format!("{name} left the chat"), now.wall),
            now,
        );
    }

    /// Show or hide the agent typing indicator. A shown indicator
    /// clears itself after the typing TTL.
    pub fn agent_typing(&mut self, is_typing: bool, now: Moment) {
        self.agent.is_typing = is_typing;
        if is_typing {
            self.timers.schedule(ClearAgentTyping, now.at + self.typing_ttl);
        } else {
            self.timers.cancel(&ClearAgentTyping);
        }
    }

    pub fn mark_status(&mut self, message_id: &str, status: MessageStatus, now: Moment) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        message.status = Some(status);
        self.persist(now);
        true
    }

    /// Mark every unread agent message read. Returns one receipt per
    /// message.
    pub fn mark_all_read(&mut self) -> Vec<ChatOutbound> {
        let ids: Vec<String> = self
            .messages
            .iter_mut()
            .filter(|m| m.is_unread())
            .map(|m| {
                m.status = Some(MessageStatus::Read);
                m.id.clone()
            })
            .collect();
        self.unread = 0;
        ids.iter().map(|id| self.read_receipt(id)).collect()
    }

    pub fn set_agents_online(&mut self, online: bool) {
        self.agents_online = online;
        if !online {
            self.agent.is_typing = false;
            self.timers.cancel(&ClearAgentTyping);
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    pub fn advance(&mut self, now: Moment) -> bool {
        if self.timers.drain_due(now.at).is_empty() {
            return false;
        }
        std::mem::replace(&mut self.agent.is_typing, false)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn dispose(&mut self) {
        self.timers.dispose();
    }

    // ── Views ────────────────────────────────────────────────────

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn history(&self) -> &[ChatSummary] {
        &self.history
    }

    pub fn agent(&self) -> &AgentInfo {
        &self.agent
    }

    pub fn agents_online(&self) -> bool {
        self.agents_online
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Subject line for the current conversation.
    pub fn subject(&self) -> String {
        extract_subject(&self.messages)
    }

    // ── Internals ────────────────────────────────────────────────

    fn push(&mut self, message: ChatMessage, now: Moment) {
        self.messages.push(message);
        self.persist(now);
    }

    fn read_receipt(&self, message_id: &str) -> ChatOutbound {
        ChatOutbound {
            event: "message_read",
            data: json!({ "messageId": message_id, "sessionId": self.session_id }),
        }
    }

    fn archive(&mut self, now: Moment) {
        let (Some(first), Some(last)) = (self.messages.first(), self.messages.last()) else {
            return;
        };
        let summary = ChatSummary {
            id: self
                .session_id
                .clone()
                .unwrap_or_else(|| format!("chat_{}", first.timestamp.timestamp_millis())),
            subject: extract_subject(&self.messages),
            messages: self.messages.clone(),
            last_message: last.content.clone(),
            created_at: first.timestamp,
            updated_at: now.wall,
        };
        self.history.retain(|s| s.id != summary.id);
        self.history.insert(0, summary);
        self.history.truncate(HISTORY_LIMIT);
    }

    fn persist(&self, now: Moment) {
        let state = PersistedChatRef {
            session_id: self.session_id.as_deref(),
            messages: &self.messages,
            history: &self.history,
            timestamp: now.wall.timestamp_millis(),
        };
        if let Err(e) = storage::save(self.store.as_ref(), CHAT_STATE_KEY, &state) {
            warn!(error = %e, "failed to persist chat state");
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedChatRef<'a> {
    session_id: Option<&'a str>,
    messages: &'a [ChatMessage],
    history: &'a [ChatSummary],
    timestamp: i64,
}

/// First user text longer than ten characters, cut to fifty, or a
/// generic fallback.
pub fn extract_subject(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| {
            m.sender == Sender::User
                && m.kind == MessageKind::Text
                && m.content.chars().count() > SUBJECT_MIN_CHARS
        })
        .map_or_else(
            || DEFAULT_SUBJECT.to_owned(),
            |m| {
                let mut subject: String = m.content.chars().take(SUBJECT_MAX_CHARS).collect();
                if m.content.chars().count() > SUBJECT_MAX_CHARS {
                    subject.push_str("...");
                }
                subject
            },
        )
}
