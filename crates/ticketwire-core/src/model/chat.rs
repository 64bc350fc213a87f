// ── Support chat types ──
//
// Field names are camelCase because the same structures are written to
// the persisted chat state and exchanged with the chat endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::de;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
    System,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(
        serialize_with = "chrono::serde::ts_milliseconds::serialize",
        deserialize_with = "de::timestamp_lenient"
    )]
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl ChatMessage {
    pub fn system(id: impl Into<String>, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::System,
            content: content.into(),
            timestamp: at,
            sender: Sender::System,
            sender_name: None,
            sender_avatar: None,
            status: None,
        }
    }

    /// Agent message the user has not seen yet.
    pub fn is_unread(&self) -> bool {
        self.sender == Sender::Agent && self.status != Some(MessageStatus::Read)
    }
}

/// An archived conversation kept in the local history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub subject: String,
    pub messages: Vec<ChatMessage>,
    pub last_message: String,
    #[serde(
        serialize_with = "chrono::serde::ts_milliseconds::serialize",
        deserialize_with = "de::timestamp_lenient"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        serialize_with = "chrono::serde::ts_milliseconds::serialize",
        deserialize_with = "de::timestamp_lenient"
    )]
    pub updated_at: DateTime<Utc>,
}

/// The agent currently attached to the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub is_typing: bool,
}
