// ── Core error types ──
//
// User-facing errors from ticketwire-core. Consumers never see raw HTTP
// status codes or WebSocket failures directly: the
// `From<ticketwire_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach realtime server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Live client is shut down")]
    ClientClosed,

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Request rejected by server: {message}")]
    Rejected { message: String },

    #[error("Unknown subscription {id} on channel '{channel}'")]
    UnknownSubscription { id: u64, channel: String },

    #[error("Unknown event '{name}'")]
    UnknownEvent { name: String },

    #[error("No archived chat session '{id}'")]
    UnknownChatSession { id: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error(transparent)]
    Storage(#[from] StorageError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
///
/// The registry and hub treat every variant as "degrade and carry on".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    Unavailable,

    #[error("transport is shut down")]
    Closed,

    #[error("transport refused the frame: {0}")]
    Refused(String),
}

/// Error returned by an event handler. Logged by the dispatcher, never
/// propagated past it.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler for {expected} received a {got} event")]
    UnexpectedEvent {
        expected: &'static str,
        got: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Key-value store failures. Reads that fail to parse never surface
/// as errors; see [`load_or_default`](crate::storage::load_or_default).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access stored key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ticketwire_api::Error> for CoreError {
    fn from(err: ticketwire_api::Error) -> Self {
        use ticketwire_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::InvalidHeader { name, reason } => CoreError::Config {
                message: format!("Invalid {name} header: {reason}"),
            },
            ApiError::Rejected { message } => CoreError::Rejected { message },
            ApiError::Status { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            ApiError::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            ApiError::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            ApiError::LinkClosed => CoreError::ClientClosed,
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
