//! CLI configuration: a thin wrapper around `ticketwire_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --ws-url, --api-token, --user, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use ticketwire_core::{ClientConfig, EntityId, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use ticketwire_config::{
    Config, Profile, config_path, load_config_or_default, profile_to_client_config, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `ClientConfig` from the config file, the active profile and
/// CLI overrides. Flags win over profile values.
pub fn build_client_config(global: &GlobalOpts, cfg: &Config) -> Result<ClientConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut config = if let Some(profile) = cfg.profiles.get(&profile_name) {
        profile_to_client_config(profile, &cfg.defaults)?
    } else if global.profile.is_some() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    } else {
        // No profile: flags / env vars alone.
        let raw = global.api_url.as_deref().ok_or_else(|| CliError::NoConfig {
            path: config_path().display().to_string(),
        })?;
        let mut config = ClientConfig::new(parse_url("api-url", raw)?);
        config.timeout = Duration::from_secs(cfg.defaults.timeout);
        cfg.defaults.timings.apply(&mut config.timings);
        if cfg.defaults.insecure {
            config.tls = TlsVerification::DangerAcceptInvalid;
        }
        config
    };

    if let Some(ref raw) = global.api_url {
        config.api_url = parse_url("api-url", raw)?;
    }
    if let Some(ref raw) = global.ws_url {
        config.ws_url = Some(parse_url("ws-url", raw)?);
    }
    if let Some(ref token) = global.api_token {
        config.api_token = Some(SecretString::from(token.clone()));
    }
    if let Some(ref user) = global.user {
        config.user_id = Some(EntityId::from(user.as_str()));
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["ticketwire"];
        argv.extend_from_slice(args);
        argv.push("completions");
        argv.push("bash");
        Cli::parse_from(argv).global
    }

    #[test]
    fn flags_alone_build_a_config() {
        let global = global(&["--api-url", "https://t.example.com/api/", "--user", "7"]);
        let config = build_client_config(&global, &Config::default()).unwrap();
        assert_eq!(config.api_url.as_str(), "https://t.example.com/api/");
        assert_eq!(config.user_id, Some(EntityId::Numeric(7)));
        assert!(config.ws_url.is_none());
    }

    #[test]
    fn flags_override_profile() {
        let mut cfg = Config::default();
        let mut profile = Profile::new("https://a.example.com/api/");
        profile.timeout = Some(10);
        cfg.profiles.insert("default".into(), profile);

        let global = global(&["--timeout", "3", "-k", "--ws-url", "wss://b.example.com/ws"]);
        let config = build_client_config(&global, &cfg).unwrap();
        assert_eq!(config.api_url.as_str(), "https://a.example.com/api/");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(config.ws_url.unwrap().as_str(), "wss://b.example.com/ws");
    }

    #[test]
    fn explicit_missing_profile_is_an_error() {
        let global = global(&["--profile", "staging"]);
        let err = build_client_config(&global, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { ref name, .. } if name == "staging"));
    }

    #[test]
    fn nothing_configured_points_at_config_init() {
        let global = global(&[]);
        let err = build_client_config(&global, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }
}
