//! Output formatting: pretty lines, tables or JSON.
//!
//! Pretty output colors by event kind when color is enabled and renders
//! collections with `tabled`; JSON output serializes the core types
//! directly.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use ticketwire_core::{
    ActivityEntry, ActivityKind, ConnectionState, NotificationEntry, NotificationKind,
};

use crate::cli::{ColorMode, OutputFormat};

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Rendering settings derived from the global flags.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, color: ColorMode, quiet: bool) -> Self {
        Self {
            format,
            color: should_color(color),
            quiet,
        }
    }

    /// Pretty lines come from `pretty`; JSON formats serialize `data`.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T, pretty: impl FnOnce() -> String) -> String {
        match self.format {
            OutputFormat::Pretty => pretty(),
            OutputFormat::Json => render_json_pretty(data),
            OutputFormat::JsonCompact => render_json_compact(data),
        }
    }

    pub fn emit<T: Serialize + ?Sized>(&self, data: &T, pretty: impl FnOnce() -> String) {
        print_output(&self.render(data, pretty), self.quiet);
    }

    pub fn activity_line(&self, entry: &ActivityEntry) -> String {
        let time = entry.timestamp.format("%H:%M:%S").to_string();
        let tag = format!("[{}]", entry.kind);
        let location = entry
            .location
            .as_deref()
            .map(|l| format!(" @ {l}"))
            .unwrap_or_default();
        if !self.color {
            return format!("{time} {tag} {}{location}", entry.message);
        }
        let tag = match entry.kind {
            ActivityKind::Price | ActivityKind::NewListing => tag.cyan().to_string(),
            ActivityKind::Availability | ActivityKind::Status => tag.yellow().to_string(),
            ActivityKind::Announcement | ActivityKind::Service => tag.magenta().to_string(),
            ActivityKind::Error => tag.red().bold().to_string(),
            ActivityKind::Connection => tag.blue().to_string(),
            ActivityKind::UserJoined | ActivityKind::UserLeft | ActivityKind::PageChange => {
                tag.dimmed().to_string()
            }
        };
        format!("{} {tag} {}{}", time.dimmed(), entry.message, location.dimmed())
    }

    pub fn notification_line(&self, entry: &NotificationEntry) -> String {
        let head = format!("{}: {}", entry.title, entry.message);
        if !self.color {
            return format!("! {head}");
        }
        let bang = match entry.kind {
            NotificationKind::PriceDrop | NotificationKind::TargetPrice => "!".green().to_string(),
            NotificationKind::PriceIncrease => "!".red().to_string(),
            NotificationKind::Maintenance => "!".yellow().to_string(),
            NotificationKind::Announcement | NotificationKind::Info => "!".blue().to_string(),
        };
        format!("{bang} {}", head.bold())
    }

    pub fn connection_line(&self, state: ConnectionState) -> String {
        let label = format!("connection: {state}");
        if !self.color {
            return label;
        }
        match state {
            ConnectionState::Connected => label.green().to_string(),
            ConnectionState::Connecting => label.yellow().to_string(),
            ConnectionState::Disconnected | ConnectionState::Error => label.red().to_string(),
            ConnectionState::Unavailable => label.dimmed().to_string(),
        }
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty-printed JSON.
pub fn render_json_pretty<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Compact single-line JSON.
pub fn render_json_compact<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plain() -> Printer {
        Printer {
            format: OutputFormat::Pretty,
            color: false,
            quiet: false,
        }
    }

    #[test]
    fn activity_line_without_color() {
        let entry = ActivityEntry {
            id: 1,
            kind: ActivityKind::Price,
            message: "Price dropped: Lakers vs Warriors ($100.00 → $80.00)".into(),
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 18, 4, 5).unwrap(),
            location: None,
        };
        assert_eq!(
            plain().activity_line(&entry),
            "18:04:05 [price] Price dropped: Lakers vs Warriors ($100.00 → $80.00)"
        );
    }

    #[test]
    fn json_format_ignores_pretty_renderer() {
        let printer = Printer {
            format: OutputFormat::JsonCompact,
            ..plain()
        };
        let out = printer.render(&serde_json::json!({"a": 1}), || unreachable!());
        assert_eq!(out, r#"{"a":1}"#);
    }
}
