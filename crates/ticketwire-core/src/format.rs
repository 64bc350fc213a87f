// ── Display helpers ──
//
// Small formatting routines shared by activity messages, notifications
// and the CLI.

use chrono::{DateTime, Utc};

/// Format a dollar amount with thousands separators: `$1,234.50`.
pub fn format_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return "$0.00".into();
    }
    let cents = (amount.abs() * 100.0).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = cents as u64;
    let (dollars, rem) = (cents / 100, cents % 100);

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{rem:02}")
}

/// Coarse "how long ago" label.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "Just now".into()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

/// Up to two uppercase initials from a display name.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}

/// Stable page identifier for a request path, used in presence whispers.
///
/// `/tickets/42` becomes `ticket-42`, `/events/7` becomes `event-7`;
/// anything else has its non-alphanumeric runs collapsed to `-`.
pub fn page_id_for_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    let mut segments = trimmed.split('/');
    match (segments.next(), segments.next()) {
        (Some("tickets"), Some(id)) if !id.is_empty() => return format!("ticket-{id}"),
        (Some("events"), Some(id)) if !id.is_empty() => return format!("event-{id}"),
        _ => {}
    }

    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches('-');
    if out.is_empty() {
        "home".into()
    } else {
        out.to_owned()
    }
}
