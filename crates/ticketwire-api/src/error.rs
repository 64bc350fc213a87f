use thiserror::Error;

/// Top-level error type for the `ticketwire-api` crate.
///
/// Covers every failure mode of the two collaborator surfaces: the
/// WebSocket broadcast link and the JSON REST fallback.
/// `ticketwire-core` maps these into its own error type.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A configured header value cannot be sent (e.g. a token with
    /// control characters).
    #[error("Invalid {name} header: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    // ── REST fallback ───────────────────────────────────────────────
    /// The API answered with `success: false`.
    #[error("Request rejected by server: {message}")]
    Rejected { message: String },

    /// Non-success HTTP status with the response body.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The link task is gone; outbound frames can no longer be queued.
    #[error("WebSocket link is shut down")]
    LinkClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the failure means the realtime link is unusable.
    pub fn is_link_down(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::LinkClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Status {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(err.is_transient());

        let err = Error::Status {
            status: 422,
            message: "bad payload".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn rejected_is_not_link_down() {
        let err = Error::Rejected {
            message: "nope".into(),
        };
        assert!(!err.is_link_down());
        assert!(Error::LinkClosed.is_link_down());
    }
}
