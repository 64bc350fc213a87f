//! Shared configuration for ticketwire tools.
//!
//! TOML profiles, API token resolution (env + plaintext), and translation
//! to `ticketwire_core::ClientConfig`. The CLI adds flag-aware wrappers on
//! top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ticketwire_api::ReconnectConfig;
use ticketwire_core::{ChannelSelection, ClientConfig, EntityId, Timings, TlsVerification};

/// Prefix for environment overrides, e.g. `TICKETWIRE_DEFAULTS__TIMEOUT=10`.
pub const ENV_PREFIX: &str = "TICKETWIRE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub timings: TimingOverrides,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            timings: TimingOverrides::default(),
        }
    }
}

fn default_output() -> String {
    "pretty".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// Optional overrides for live-state timings. Unset fields keep the
/// client defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_ttl_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_visible_notifications: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_hide_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,
}

impl TimingOverrides {
    pub fn apply(&self, timings: &mut Timings) {
        if let Some(ms) = self.notification_ttl_ms {
            timings.notification_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_visible_notifications {
            timings.max_visible_notifications = n;
        }
        if let Some(n) = self.activity_capacity {
            timings.activity_capacity = n;
        }
        if let Some(ms) = self.badge_hide_delay_ms {
            timings.badge_hide_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.heartbeat_interval_secs {
            timings.heartbeat_interval = Duration::from_secs(secs);
        }
    }
}

/// A named server profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// JSON API root (e.g., "https://tickets.example.com/api/").
    pub api_url: String,

    /// Realtime endpoint (e.g., "wss://tickets.example.com/ws"). Without
    /// it every send goes over REST.
    pub ws_url: Option<String>,

    /// API token in plaintext. Prefer `api_token_env`.
    pub api_token: Option<String>,

    /// Environment variable name containing the API token.
    pub api_token_env: Option<String>,

    /// Signed-in user id, for the private channel and presence.
    pub user_id: Option<String>,

    /// Page id reported in presence heartbeats.
    pub page: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Where persisted client state lives. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub channels: Channels,

    #[serde(default)]
    pub reconnect: Reconnect,
}

impl Profile {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: None,
            api_token: None,
            api_token_env: None,
            user_id: None,
            page: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            data_dir: None,
            channels: Channels::default(),
            reconnect: Reconnect::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Channels {
    #[serde(default = "default_true")]
    pub ticket_feed: bool,
    #[serde(default = "default_true")]
    pub system: bool,
    #[serde(default = "default_true")]
    pub user: bool,
    pub presence: Option<String>,
    #[serde(default)]
    pub tickets: Vec<String>,
}

impl Default for Channels {
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

impl From<&Channels> for ChannelSelection {
    fn from(channels: &Channels) -> Self {
        Self {
            ticket_feed: channels.ticket_feed,
            system: channels.system,
            user: channels.user,
            presence: channels.presence.clone(),
            tickets: channels.tickets.iter().map(|t| EntityId::from(t.as_str())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Reconnect {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: None,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl From<&Reconnect> for ReconnectConfig {
    fn from(r: &Reconnect) -> Self {
        Self {
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            max_retries: r.max_retries,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hdtickets", "ticketwire")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for persisted client state.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("data");
            p
        },
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ticketwire");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults ← `path` ← `TICKETWIRE_*` environment.
///
/// A missing file is not an error; nested keys are separated by `__`
/// in variable names.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Resolve the API token: the profile's env var first, then plaintext.
pub fn resolve_api_token(profile: &Profile) -> Option<SecretString> {
    if let Some(ref env_name) = profile.api_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    profile
        .api_token
        .as_ref()
        .map(|token| SecretString::from(token.clone()))
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `ClientConfig` from a profile and the global defaults, without CLI
/// flag overrides.
pub fn profile_to_client_config(profile: &Profile, defaults: &Defaults) -> Result<ClientConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let ws_url = profile
        .ws_url
        .as_deref()
        .map(|raw| parse_url("ws_url", raw))
        .transpose()?;
    if let Some(ref ws) = ws_url {
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ConfigError::Validation {
                field: "ws_url".into(),
                reason: format!("expected a ws:// or wss:// URL, got '{ws}'"),
            });
        }
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = ClientConfig::new(api_url);
    config.ws_url = ws_url;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.api_token = resolve_api_token(profile);
    config.user_id = profile.user_id.as_deref().map(EntityId::from);
    if let Some(ref page) = profile.page {
        config.page.clone_from(page);
    }
    config.channels = ChannelSelection::from(&profile.channels);
    config.reconnect = ReconnectConfig::from(&profile.reconnect);
    defaults.timings.apply(&mut config.timings);
    config.data_dir = Some(profile.data_dir.clone().unwrap_or_else(data_dir));
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
timeout = 12

[defaults.timings]
badge_hide_delay_ms = 1500

[profiles.prod]
api_url = "https://tickets.example.com/api"
ws_url = "wss://tickets.example.com/ws"
user_id = "42"
api_token = "plain-token"

[profiles.prod.channels]
presence = "presence-platform"
tickets = ["7", "vip-9"]
ticket_feed = false
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn file_overrides_defaults() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        assert_eq!(config.defaults.timeout, 12);
        assert_eq!(config.defaults.output, "pretty");
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "prod");
        assert_eq!(profile.channels.tickets, vec!["7", "vip-9"]);
        assert!(profile.channels.system);
        assert!(!profile.channels.ticket_feed);
    }

    #[test]
    fn profile_builds_client_config() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        let (_, profile) = config.profile(Some("prod")).unwrap();

        let client = profile_to_client_config(profile, &config.defaults).unwrap();
        assert_eq!(client.api_url.as_str(), "https://tickets.example.com/api");
        assert_eq!(client.ws_url.unwrap().scheme(), "wss");
        assert_eq!(client.timeout, Duration::from_secs(12));
        assert_eq!(client.user_id, Some(EntityId::Numeric(42)));
        assert_eq!(client.timings.badge_hide_delay, Duration::from_millis(1500));
        assert_eq!(
            client.channels.tickets,
            vec![EntityId::Numeric(7), EntityId::Text("vip-9".into())]
        );
        assert_eq!(
            client.api_token.unwrap().expose_secret(),
            "plain-token"
        );
        assert_eq!(client.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn unknown_profile_is_reported() {
        let config = Config::default();
        let err = config.profile(Some("staging")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { ref name } if name == "staging"));
    }

    #[test]
    fn http_ws_url_is_rejected() {
        let mut profile = Profile::new("https://tickets.example.com/api/");
        profile.ws_url = Some("https://tickets.example.com/ws".into());
        let err = profile_to_client_config(&profile, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "ws_url"));
    }

    #[test]
    fn insecure_default_applies_without_override() {
        let profile = Profile::new("https://localhost:8443/api/");
        let defaults = Defaults {
            insecure: true,
            ..Defaults::default()
        };
        let client = profile_to_client_config(&profile, &defaults).unwrap();
        assert_eq!(client.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        let mut profile = Profile::new("https://tickets.example.com/api/");
        profile.channels.presence = Some("presence-platform".into());
        config.profiles.insert("default".into(), profile);

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles, config.profiles);
    }
}
