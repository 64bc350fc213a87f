// ── Runtime client configuration ──
//
// These types describe how to reach the realtime server and how the live
// state behaves. They carry credentials and tuning but never touch disk:
// the config crate (or a test) builds a `ClientConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use ticketwire_api::{ReconnectConfig, TlsMode, TransportConfig};

use crate::activity::DEFAULT_ACTIVITY_CAPACITY;
use crate::chat::DEFAULT_AGENT_TYPING_TTL;
use crate::connection::DEFAULT_BADGE_HIDE_DELAY;
use crate::model::EntityId;
use crate::notifications::{
    DEFAULT_MAX_VISIBLE, DEFAULT_NOTIFICATION_EXIT, DEFAULT_NOTIFICATION_TTL, NotificationConfig,
};
use crate::presence::{
    DEFAULT_IDLE_AFTER, DEFAULT_STALE_AFTER, DEFAULT_TYPING_TTL, PresenceConfig,
};
use crate::tickets::DEFAULT_BANNER_TTL;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ACTIVITY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (local development servers).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// Which channels the client follows on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelection {
    /// `tickets.global`: price, availability and listing activity.
    pub ticket_feed: bool,
    /// `system.announcements`.
    pub system: bool,
    /// `user.{id}`: alerts and support chat. Needs a user id.
    pub user: bool,
    /// Presence channel to join, e.g. `platform.presence`.
    pub presence: Option<String>,
    /// Individual tickets to mirror (`ticket.{id}`).
    pub tickets: Vec<EntityId>,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            ticket_feed: true,
            system: true,
            user: true,
            presence: None,
            tickets: Vec::new(),
        }
    }
}

/// Every delay, interval and bound the live state uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub notification_ttl: Duration,
    pub notification_exit: Duration,
    pub max_visible_notifications: usize,
    pub activity_capacity: usize,
    pub activity_retention: Duration,
    pub badge_hide_delay: Duration,
    pub typing_ttl: Duration,
    pub agent_typing_ttl: Duration,
    pub stale_after: Duration,
    pub idle_after: Duration,
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub banner_ttl: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            notification_exit: DEFAULT_NOTIFICATION_EXIT,
            max_visible_notifications: DEFAULT_MAX_VISIBLE,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            activity_retention: DEFAULT_ACTIVITY_RETENTION,
            badge_hide_delay: DEFAULT_BADGE_HIDE_DELAY,
            typing_ttl: DEFAULT_TYPING_TTL,
            agent_typing_ttl: DEFAULT_AGENT_TYPING_TTL,
            stale_after: DEFAULT_STALE_AFTER,
            idle_after: DEFAULT_IDLE_AFTER,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            banner_ttl: DEFAULT_BANNER_TTL,
        }
    }
}

impl Timings {
    pub fn notifications(&self) -> NotificationConfig {
        NotificationConfig {
            ttl: self.notification_ttl,
            exit: self.notification_exit,
            max_visible: self.max_visible_notifications,
        }
    }

    pub fn presence(&self) -> PresenceConfig {
        PresenceConfig {
            typing_ttl: self.typing_ttl,
            stale_after: self.stale_after,
            idle_after: self.idle_after,
        }
    }
}

/// Configuration for one live client.
///
/// Built by the config crate or the CLI; core never reads config files.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Realtime endpoint. `None` runs without a broadcast link: every
    /// send takes the REST path and no channel is ever joined.
    pub ws_url: Option<Url>,
    /// JSON API root, e.g. `https://tickets.example.com/api/`.
    pub api_url: Url,
    pub tls: TlsVerification,
    /// REST request timeout.
    pub timeout: Duration,
    pub api_token: Option<SecretString>,
    /// The signed-in user, used for the private channel and whispers.
    pub user_id: Option<EntityId>,
    /// Page identifier reported in presence heartbeats.
    pub page: String,
    pub channels: ChannelSelection,
    pub reconnect: ReconnectConfig,
    pub timings: Timings,
    /// Where persisted client state lives. `None` keeps it in memory.
    pub data_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            ws_url: None,
            api_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            api_token: None,
            user_id: None,
            page: "home".into(),
            channels: ChannelSelection::default(),
            reconnect: ReconnectConfig::default(),
            timings: Timings::default(),
            data_dir: None,
        }
    }

    #[must_use]
    pub fn with_ws_url(mut self, ws_url: Url) -> Self {
        self.ws_url = Some(ws_url);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<EntityId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// HTTP settings for the REST fallback client.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            api_token: self.api_token.clone(),
        }
    }
}
