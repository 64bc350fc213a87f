//! Realtime layer between `ticketwire-api` and UI consumers (CLI / dashboards).
//!
//! This crate owns the live state of a ticketing session and the machinery
//! that keeps it current:
//!
//! - **[`LiveClient`]**: Async facade. [`connect()`](LiveClient::connect)
//!   starts the WebSocket link and spawns one task that owns the [`Hub`];
//!   callers send [`Command`]s and observe [`LiveView`] snapshots and
//!   [`ConnectionState`] through `watch` channels.
//!
//! - **[`Hub`]**: Fully synchronous core. Owns the [`ChannelRegistry`],
//!   every live-state component and the [`Transport`]. Time is passed in as
//!   a [`Moment`], so every timer-driven behaviour is testable without a
//!   runtime.
//!
//! - **Channel registry and dispatch**: Reference-counted channel joins
//!   with replay after reconnect; inbound events are parsed into a closed
//!   [`EventKind`], decoded once into a [`LiveEvent`] and handed to the
//!   subscribers' [`HandlerMap`]s in registration order.
//!
//! - **Live state**: [`NotificationQueue`], [`ActivityLog`],
//!   [`ConnectionMonitor`], [`PresenceTracker`], [`TicketBoard`] and
//!   [`ChatSession`]. Each owns its deferred effects in a [`TimerSet`].
//!
//! - **Persistence** ([`storage`]): Small JSON documents behind the
//!   [`KeyValueStore`] trait (support chat state, accessibility settings).

pub mod activity;
pub mod chat;
pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod format;
pub mod handlers;
pub mod hub;
pub mod model;
pub mod notifications;
pub mod optimistic;
pub mod presence;
pub mod registry;
pub mod storage;
pub mod tickets;
pub mod timers;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use chat::ChatSession;
pub use client::LiveClient;
pub use command::{Command, CommandResult, Delivery};
pub use config::{ChannelSelection, ClientConfig, Timings, TlsVerification};
pub use connection::{BadgeTone, ConnectionMonitor, ConnectionState, StatusBadge};
pub use dispatch::{DispatchOutcome, HandlerContext, HandlerMap};
pub use error::{CoreError, HandlerError, StorageError, TransportError};
pub use event::{EventKind, LiveEvent};
pub use hub::{Hub, LiveState, LiveStats, LiveView, Outbound, SendRoute};
pub use notifications::{NotificationDraft, NotificationEntry, NotificationKind, NotificationQueue};
pub use optimistic::{OptimisticField, Pending, Settled};
pub use presence::PresenceTracker;
pub use registry::{ChannelRegistry, SubscriptionHandle, SubscriptionId};
pub use storage::{AccessibilitySettings, FileStore, KeyValueStore, MemoryStore};
pub use tickets::{AvailabilityBanner, BannerKind, TicketBoard};
pub use timers::{Moment, TimerSet};
pub use transport::{NullTransport, Transport};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AgentInfo, Availability, AvailabilityLevel, ChatMessage, ChatSummary, EntityId, MessageKind,
    MessageStatus, PresenceStatus, PresenceUser, PriceMovement, Role, Sender, TicketSnapshot,
    TicketStatus,
};
