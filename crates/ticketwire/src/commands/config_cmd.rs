//! Config subcommand handlers.

use std::fmt::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let Some(p) = cfg.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "api_url = \"{}\"", p.api_url);
        if let Some(ref ws) = p.ws_url {
            let _ = writeln!(out, "ws_url = \"{ws}\"");
        }
        if p.api_token.is_some() {
            let _ = writeln!(out, "api_token = \"****\"");
        }
        if let Some(ref env) = p.api_token_env {
            let _ = writeln!(out, "api_token_env = \"{env}\"");
        }
        if let Some(ref user) = p.user_id {
            let _ = writeln!(out, "user_id = \"{user}\"");
        }
        if let Some(ref page) = p.page {
            let _ = writeln!(out, "page = \"{page}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ref presence) = p.channels.presence {
            let _ = writeln!(out, "channels.presence = \"{presence}\"");
        }
        if !p.channels.tickets.is_empty() {
            let _ = writeln!(out, "channels.tickets = {:?}", p.channels.tickets);
        }
    }

    out
}

/// Insert or replace `name`; refuses to overwrite unless `force`.
fn upsert_profile(
    cfg: &mut Config,
    name: &str,
    profile: Profile,
    make_default: bool,
    force: bool,
) -> Result<(), CliError> {
    if cfg.profiles.contains_key(name) && !force {
        return Err(CliError::ProfileExists { name: name.into() });
    }
    cfg.profiles.insert(name.to_owned(), profile);
    if make_default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(name.to_owned());
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            output::print_output(&format_config_redacted(&cfg), global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            api_url,
            ws_url,
            user,
            token_env,
            default,
            force,
        } => {
            let mut profile = Profile::new(api_url);
            profile.ws_url = ws_url;
            profile.user_id = user;
            profile.api_token_env = token_env;
            // Validate before touching the file.
            let mut cfg = config::load_config_or_default();
            config::profile_to_client_config(&profile, &cfg.defaults)?;

            let name = global.profile.clone().unwrap_or_else(|| "default".into());
            upsert_profile(&mut cfg, &name, profile, default, force)?;
            let path = config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("Profile '{name}' written to {}", path.display());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redacted_output_masks_token() {
        let mut cfg = Config::default();
        let mut profile = Profile::new("https://tickets.example.com/api/");
        profile.api_token = Some("s3cret".into());
        cfg.profiles.insert("default".into(), profile);

        let shown = format_config_redacted(&cfg);
        assert!(shown.contains("api_token = \"****\""));
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("[profiles.default]"));
    }

    #[test]
    fn existing_profile_needs_force() {
        let mut cfg = Config::default();
        let profile = Profile::new("https://a.example.com/api/");
        upsert_profile(&mut cfg, "prod", profile.clone(), false, false).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("prod"));

        let err = upsert_profile(&mut cfg, "prod", profile.clone(), false, false).unwrap_err();
        assert!(matches!(err, CliError::ProfileExists { .. }));
        upsert_profile(&mut cfg, "prod", profile, false, true).unwrap();
    }
}
