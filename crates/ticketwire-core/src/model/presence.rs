// ── Presence domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::de;
use super::entity_id::EntityId;

/// Role of a present user. Anything the server sends that we do not
/// recognise is treated as a plain user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Agent,
    Admin,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Agent | Self::Admin)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw
            .and_then(|s| s.to_ascii_lowercase().parse().ok())
            .unwrap_or_default())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Busy,
    Offline,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Availability {
    #[default]
    Available,
    Busy,
    Offline,
}

/// A member of a presence channel.
///
/// Built from the server's member payload; `status` defaults to online,
/// `availability` to available and `active_chats` to zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub id: EntityId,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub status: PresenceStatus,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub availability: Availability,
    #[serde(default, deserialize_with = "de::u32_or_zero")]
    pub active_chats: u32,
    #[serde(
        default,
        alias = "last_activity",
        deserialize_with = "de::opt_timestamp_lenient"
    )]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_page: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    /// Transient; never taken from the server payload.
    #[serde(skip_deserializing, default)]
    pub is_typing: bool,
}

impl PresenceUser {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
            role: Role::User,
            status: PresenceStatus::Online,
            availability: Availability::Available,
            active_chats: 0,
            last_activity_at: None,
            current_page: None,
            department: None,
            is_typing: false,
        }
    }

    /// No activity for longer than `idle_after`. Users without a
    /// timestamp are never idle.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_after: chrono::Duration) -> bool {
        self.last_activity_at
            .is_some_and(|at| now.signed_duration_since(at) > idle_after)
    }

    /// Staff member who is free to take a conversation.
    pub fn can_contact(&self) -> bool {
        self.role == Role::Agent && self.availability == Availability::Available
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn member_payload_defaults() {
        let user: PresenceUser =
            serde_json::from_str(r#"{"id": 3, "name": "Dana", "role": "agent"}"#).unwrap();
        assert_eq!(user.role, Role::Agent);
        assert_eq!(user.status, PresenceStatus::Online);
        assert_eq!(user.availability, Availability::Available);
        assert_eq!(user.active_chats, 0);
        assert!(user.last_activity_at.is_none());
        assert!(!user.is_typing);
    }

    #[test]
    fn unknown_role_is_user() {
        let user: PresenceUser =
            serde_json::from_str(r#"{"id": 1, "name": "X", "role": "superhero"}"#).unwrap();
        assert_eq!(user.role, Role::User);

        let user: PresenceUser =
            serde_json::from_str(r#"{"id": 1, "name": "X", "role": null}"#).unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn idle_after_threshold() {
        let now = Utc::now();
        let mut user = PresenceUser::new(1, "Sam");
        assert!(!user.is_idle(now, chrono::Duration::minutes(10)));

        user.last_activity_at = Some(now - chrono::Duration::minutes(11));
        assert!(user.is_idle(now, chrono::Duration::minutes(10)));

        user.last_activity_at = Some(now - chrono::Duration::minutes(9));
        assert!(!user.is_idle(now, chrono::Duration::minutes(10)));
    }
}
