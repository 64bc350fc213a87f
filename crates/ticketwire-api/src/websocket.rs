//! WebSocket broadcast link with auto-reconnect.
//!
//! Connects to the broadcast server, streams parsed channel events and
//! lifecycle transitions through a [`tokio::sync::broadcast`] channel, and
//! writes outbound subscribe / unsubscribe / whisper frames queued through a
//! cloneable [`LinkHandle`]. Reconnection with exponential backoff + jitter
//! is handled here and nowhere else: consumers only observe the resulting
//! [`LinkEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticketwire_api::websocket::{ReconnectConfig, WebSocketLink, WireCommand};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("wss://tickets.example.com/app/live")?;
//!
//! let link = WebSocketLink::connect(url, ReconnectConfig::default(), cancel.clone());
//! let mut rx = link.subscribe();
//! link.handle().send(WireCommand::Subscribe { channel: "tickets.global".into() })?;
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//!
//! link.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Event name the server uses to hand out the socket id after the handshake.
const ESTABLISHED_EVENT: &str = "connection_established";

/// Prefix for client-to-client events relayed by the server.
pub const WHISPER_PREFIX: &str = "client-";

// ── Wire types ───────────────────────────────────────────────────────

/// One inbound frame: a named event on a channel.
///
/// `data` is normalised to structured JSON: servers that double-encode the
/// payload as a JSON string are unwrapped on parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(default)]
    pub channel: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Link lifecycle state, observable through [`LinkHandle::watch_state`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    /// Reconnection budget exhausted; the link will not come back.
    Unavailable,
}

/// Everything the link reports to its consumers.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Handshake completed.
    Connected,
    /// An established connection dropped (or was closed by the server).
    Disconnected,
    /// A connection attempt or an established connection failed.
    Error { message: String },
    /// Any transition not covered by `Connected` / `Disconnected`.
    StateChange {
        previous: LinkState,
        current: LinkState,
    },
    /// The server assigned a socket id.
    Established { socket_id: String },
    /// A channel event.
    Message(Arc<WireEvent>),
}

/// Outbound frames.
#[derive(Debug, Clone, PartialEq)]
pub enum WireCommand {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Whisper {
        channel: String,
        event: String,
        data: serde_json::Value,
    },
}

impl WireCommand {
    /// Serialize into the JSON text frame sent to the server.
    pub fn to_frame(&self) -> String {
        let value = match self {
            Self::Subscribe { channel } => serde_json::json!({
                "event": "subscribe",
                "data": { "channel": channel },
            }),
            Self::Unsubscribe { channel } => serde_json::json!({
                "event": "unsubscribe",
                "data": { "channel": channel },
            }),
            Self::Whisper {
                channel,
                event,
                data,
            } => serde_json::json!({
                "event": format!("{WHISPER_PREFIX}{event}"),
                "channel": channel,
                "data": data,
            }),
        };
        value.to_string()
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── LinkHandle ───────────────────────────────────────────────────────

/// Cloneable sender side of a running link.
///
/// Frames are queued and written by the background task; queueing never
/// blocks. Frames queued while the link is down are discarded on the next
/// handshake, so callers should check [`is_connected`](Self::is_connected)
/// and fall back to another path when it is `false`.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<WireCommand>,
    state: watch::Receiver<LinkState>,
}

impl LinkHandle {
    /// Queue an outbound frame.
    pub fn send(&self, command: WireCommand) -> Result<(), Error> {
        self.commands.send(command).map_err(|_| Error::LinkClosed)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Observe lifecycle changes.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }
}

// ── WebSocketLink ────────────────────────────────────────────────────

/// A running WebSocket link.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear down the background task.
pub struct WebSocketLink {
    events: broadcast::Sender<LinkEvent>,
    handle: LinkHandle,
    cancel: CancellationToken,
}

impl WebSocketLink {
    /// Spawn the connection loop for `ws_url`.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Must be called from within a Tokio runtime.
    pub fn connect(ws_url: Url, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let task = LinkTask {
            url: ws_url,
            reconnect,
            cancel: cancel.clone(),
            events: events.clone(),
            state: state_tx,
            commands: command_rx,
        };
        tokio::spawn(task.run());

        Self {
            events,
            handle: LinkHandle {
                commands: command_tx,
                state: state_rx,
            },
            cancel,
        }
    }

    /// Get a new receiver for link events.
    ///
    /// If a consumer falls behind it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// A cloneable handle for queueing outbound frames.
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// How a single connection ended without an error.
enum SessionEnd {
    /// Server closed the connection or the stream ended.
    Closed,
    /// Cancelled, or every `LinkHandle` was dropped.
    Shutdown,
}

struct LinkTask {
    url: Url,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    events: broadcast::Sender<LinkEvent>,
    state: watch::Sender<LinkState>,
    commands: mpsc::UnboundedReceiver<WireCommand>,
}

impl LinkTask {
    /// Main loop: connect → serve → on error, backoff → reconnect.
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            transition(&self.state, &self.events, LinkState::Connecting);

            let cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Ok(SessionEnd::Shutdown),
                result = self.connect_and_serve() => result,
            };

            if *self.state.borrow() == LinkState::Connected {
                transition(&self.state, &self.events, LinkState::Disconnected);
            }

            match result {
                Ok(SessionEnd::Shutdown) => break,
                // Clean disconnect: reset the attempt counter and reconnect immediately.
                Ok(SessionEnd::Closed) => {
                    tracing::info!("WebSocket disconnected cleanly, reconnecting");
                    attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "WebSocket error");
                    let _ = self.events.send(LinkEvent::Error {
                        message: e.to_string(),
                    });

                    if let Some(max) = self.reconnect.max_retries {
                        if attempt >= max {
                            tracing::error!(
                                max_retries = max,
                                "WebSocket reconnection limit reached, giving up"
                            );
                            transition(&self.state, &self.events, LinkState::Unavailable);
                            return;
                        }
                    }

                    let delay = calculate_backoff(attempt, &self.reconnect);
                    tracing::info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "Waiting before reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }

                    attempt = attempt.saturating_add(1);
                }
            }
        }

        transition(&self.state, &self.events, LinkState::Disconnected);
        tracing::debug!("WebSocket loop exiting");
    }

    /// Establish a single connection, then pump frames both ways until it drops.
    async fn connect_and_serve(&mut self) -> Result<SessionEnd, Error> {
        tracing::info!(url = %self.url, "Connecting to WebSocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        // Anything queued while we were down refers to the previous session.
        let mut stale = 0usize;
        while self.commands.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded frames queued while disconnected");
        }

        tracing::info!("WebSocket connected");
        transition(&self.state, &self.events, LinkState::Connected);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return Ok(SessionEnd::Shutdown);
                    };
                    tracing::trace!(?command, "Sending frame");
                    write
                        .send(tungstenite::Message::text(command.to_frame()))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            parse_and_broadcast(&text, &self.events);
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite handles pong replies automatically
                            tracing::trace!("WebSocket ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "WebSocket close frame received"
                                );
                            } else {
                                tracing::info!("WebSocket close frame received (no payload)");
                            }
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketConnect(e.to_string()));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(SessionEnd::Closed);
                        }
                        _ => {
                            // Binary, Pong, Frame -- ignore
                        }
                    }
                }
            }
        }
    }
}

/// Move to `next`, publishing the matching [`LinkEvent`]. No-op if unchanged.
fn transition(
    state: &watch::Sender<LinkState>,
    events: &broadcast::Sender<LinkEvent>,
    next: LinkState,
) {
    let previous = *state.borrow();
    if previous == next {
        return;
    }
    state.send_replace(next);

    let event = match next {
        LinkState::Connected => LinkEvent::Connected,
        LinkState::Disconnected => LinkEvent::Disconnected,
        LinkState::Connecting | LinkState::Unavailable => LinkEvent::StateChange {
            previous,
            current: next,
        },
    };
    // Ignore send errors -- just means no active subscribers right now
    let _ = events.send(event);
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame and broadcast the resulting event, if any.
fn parse_and_broadcast(text: &str, events: &broadcast::Sender<LinkEvent>) {
    let mut frame: WireEvent = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse WebSocket frame");
            return;
        }
    };

    // Some servers double-encode `data` as a JSON string.
    if let serde_json::Value::String(ref raw) = frame.data {
        if let Ok(inner) = serde_json::from_str::<serde_json::Value>(raw) {
            if inner.is_object() || inner.is_array() {
                frame.data = inner;
            }
        }
    }

    let event = if frame.event == ESTABLISHED_EVENT {
        match frame.data.get("socket_id").and_then(serde_json::Value::as_str) {
            Some(id) => LinkEvent::Established {
                socket_id: id.to_owned(),
            },
            None => {
                tracing::debug!("connection_established frame without socket_id");
                return;
            }
        }
    } else {
        LinkEvent::Message(Arc::new(frame))
    };

    let _ = events.send(event);
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25% to spread out reconnection storms from many clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(d10 <= Duration::from_secs(13));
    }

    #[test]
    fn subscribe_and_whisper_frames() {
        let sub = WireCommand::Subscribe {
            channel: "tickets.global".into(),
        };
        let frame: serde_json::Value = serde_json::from_str(&sub.to_frame()).unwrap();
        assert_eq!(
            frame,
            serde_json::json!({"event": "subscribe", "data": {"channel": "tickets.global"}})
        );

        let whisper = WireCommand::Whisper {
            channel: "presence-platform.presence".into(),
            event: "heartbeat".into(),
            data: serde_json::json!({"userId": 7}),
        };
        let frame: serde_json::Value = serde_json::from_str(&whisper.to_frame()).unwrap();
        assert_eq!(frame["event"], "client-heartbeat");
        assert_eq!(frame["channel"], "presence-platform.presence");
        assert_eq!(frame["data"]["userId"], 7);
    }

    #[test]
    fn parse_channel_event() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "channel": "tickets.global",
            "event": "TicketPriceChanged",
            "data": { "old_price": 100, "new_price": 80 }
        });
        parse_and_broadcast(&raw.to_string(), &tx);

        let LinkEvent::Message(event) = rx.try_recv().unwrap() else {
            panic!("expected a channel message");
        };
        assert_eq!(event.channel.as_deref(), Some("tickets.global"));
        assert_eq!(event.event, "TicketPriceChanged");
        assert_eq!(event.data["new_price"], 80);
    }

    #[test]
    fn double_encoded_data_is_unwrapped() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "channel": "ticket.42",
            "event": "TicketStatusChanged",
            "data": "{\"new_status\":\"sold_out\"}"
        });
        parse_and_broadcast(&raw.to_string(), &tx);

        let LinkEvent::Message(event) = rx.try_recv().unwrap() else {
            panic!("expected a channel message");
        };
        assert_eq!(event.data["new_status"], "sold_out");
    }

    #[test]
    fn established_frame_yields_socket_id() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = r#"{"event":"connection_established","data":"{\"socket_id\":\"123.456\"}"}"#;
        parse_and_broadcast(raw, &tx);

        match rx.try_recv().unwrap() {
            LinkEvent::Established { socket_id } => assert_eq!(socket_id, "123.456"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let (tx, mut rx) = broadcast::channel::<LinkEvent>(16);
        parse_and_broadcast("not json at all", &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn transitions_publish_matching_events() {
        let (events, mut rx) = broadcast::channel(16);
        let (state, _state_rx) = watch::channel(LinkState::Connecting);

        transition(&state, &events, LinkState::Connecting);
        assert!(rx.try_recv().is_err(), "no event for an unchanged state");

        transition(&state, &events, LinkState::Connected);
        assert!(matches!(rx.try_recv().unwrap(), LinkEvent::Connected));

        transition(&state, &events, LinkState::Disconnected);
        assert!(matches!(rx.try_recv().unwrap(), LinkEvent::Disconnected));

        transition(&state, &events, LinkState::Connecting);
        match rx.try_recv().unwrap() {
            LinkEvent::StateChange { previous, current } => {
                assert_eq!(previous, LinkState::Disconnected);
                assert_eq!(current, LinkState::Connecting);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
