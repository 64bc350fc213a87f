//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ticketwire_config::ConfigError;
use ticketwire_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {url}: {reason}")]
    #[diagnostic(
        code(ticketwire::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Try: ticketwire state --insecure"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ticketwire::timeout),
        help("Increase the timeout with --timeout or check server responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Live client stopped before the command finished")]
    #[diagnostic(code(ticketwire::closed))]
    Closed,

    // ── Server ───────────────────────────────────────────────────────
    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(ticketwire::rejected))]
    Rejected { message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(ticketwire::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ticketwire::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ticketwire::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: ticketwire config init --api-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No API URL configured")]
    #[diagnostic(
        code(ticketwire::no_config),
        help(
            "Create a profile with: ticketwire config init --api-url <URL>\n\
             Or pass --api-url / set TICKETWIRE_API_URL.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' already exists")]
    #[diagnostic(
        code(ticketwire::profile_exists),
        help("Pass --force to replace it.")
    )]
    ProfileExists { name: String },

    #[error(transparent)]
    #[diagnostic(code(ticketwire::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(ticketwire::json), help("Payloads must be a single JSON value."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Closed => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::ProfileNotFound { .. } | Self::Config(ConfigError::ProfileNotFound { .. }) => {
                exit_code::NOT_FOUND
            }
            Self::Validation { .. }
            | Self::Json(_)
            | Self::ProfileExists { .. }
            | Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::ClientClosed => Self::Closed,
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Rejected { message } => Self::Rejected { message },
            CoreError::Api { message, .. } => Self::ApiError { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::UnknownEvent { name } => Self::Validation {
                field: "event".into(),
                reason: format!("unknown event '{name}'"),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let rejected = CliError::from(CoreError::Rejected {
            message: "locked".into(),
        });
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);

        let timeout = CliError::from(CoreError::Timeout { timeout_secs: 5 });
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let closed = CliError::from(CoreError::ClientClosed);
        assert_eq!(closed.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn missing_profile_is_not_found() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "staging".into(),
        });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }
}
