//! `ticketwire watch`: stream what changes in the live view.

use std::collections::HashSet;
use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use tokio_stream::StreamExt;

use ticketwire_core::format::{format_usd, initials, relative_time};
use ticketwire_core::{
    ActivityEntry, ClientConfig, ConnectionState, EntityId, LiveClient, LiveView, NotificationEntry,
    PresenceUser, TicketSnapshot,
};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Printer};

/// One line of watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem<'a> {
    Connection { state: ConnectionState },
    Activity(&'a ActivityEntry),
    Notification(&'a NotificationEntry),
}

/// Remembers what has already been printed so each view only yields the
/// delta.
#[derive(Debug, Default)]
pub struct Feed {
    connection: Option<ConnectionState>,
    last_activity: u64,
    notifications: HashSet<u64>,
}

impl Feed {
    pub fn update<'a>(&mut self, view: &'a LiveView) -> Vec<FeedItem<'a>> {
        let mut items = Vec::new();

        if self.connection != Some(view.connection) {
            self.connection = Some(view.connection);
            items.push(FeedItem::Connection {
                state: view.connection,
            });
        }

        let mut fresh: Vec<&ActivityEntry> = view
            .activity
            .iter()
            .filter(|e| e.id > self.last_activity)
            .collect();
        fresh.sort_by_key(|e| e.id);
        if let Some(last) = fresh.last() {
            self.last_activity = last.id;
        }
        items.extend(fresh.into_iter().map(FeedItem::Activity));

        for entry in &view.notifications {
            if entry.visible && self.notifications.insert(entry.id) {
                items.push(FeedItem::Notification(entry));
            }
        }
        // Forget ids the queue has dropped.
        self.notifications
            .retain(|id| view.notifications.iter().any(|n| n.id == *id));

        items
    }
}

fn line(printer: &Printer, item: &FeedItem<'_>) -> String {
    match item {
        FeedItem::Connection { state } => printer.connection_line(*state),
        FeedItem::Activity(entry) => printer.activity_line(entry),
        FeedItem::Notification(entry) => printer.notification_line(entry),
    }
}

// ── Summary tables ──────────────────────────────────────────────────

#[derive(Tabled)]
struct TicketRow {
    #[tabled(rename = "Ticket")]
    id: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Left")]
    available: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last move")]
    movement: String,
}

impl From<&TicketSnapshot> for TicketRow {
    fn from(t: &TicketSnapshot) -> Self {
        Self {
            id: t.id.to_string(),
            price: t.price.map_or_else(|| "-".into(), format_usd),
            available: t.available.map_or_else(|| "-".into(), |n| n.to_string()),
            status: t.status.to_string(),
            movement: t.last_movement.map(|m| m.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct PresenceRow {
    #[tabled(rename = "")]
    initials: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Page")]
    page: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

impl PresenceRow {
    fn new(user: &PresenceUser, now: DateTime<Utc>, idle_after: chrono::Duration) -> Self {
        let status = if user.is_idle(now, idle_after) {
            format!("{} (idle)", user.status)
        } else {
            user.status.to_string()
        };
        Self {
            initials: initials(&user.name),
            name: user.name.clone(),
            status,
            page: user.current_page.clone().unwrap_or_default(),
            last_seen: user
                .last_activity_at
                .map(|at| relative_time(at, now))
                .unwrap_or_default(),
        }
    }
}

fn summary(view: &LiveView, now: DateTime<Utc>, idle_after: Duration) -> String {
    let idle_after = chrono::Duration::from_std(idle_after).unwrap_or(chrono::Duration::MAX);
    let mut out = String::new();
    let _ = writeln!(out, "connection:   {}", view.connection);
    let _ = writeln!(out, "activity:     {} entries", view.activity.len());
    let _ = writeln!(
        out,
        "online users: {} ({} idle)",
        view.presence.len(),
        view.idle_users
    );
    if !view.presence.is_empty() {
        let rows: Vec<PresenceRow> = view
            .presence
            .iter()
            .map(|u| PresenceRow::new(u, now, idle_after))
            .collect();
        let _ = writeln!(out, "{}", output::render_table(&rows));
    }
    if !view.tickets.is_empty() {
        let rows: Vec<TicketRow> = view.tickets.iter().map(TicketRow::from).collect();
        let _ = writeln!(out, "{}", output::render_table(&rows));
    }
    let stats = &view.stats;
    let _ = write!(
        out,
        "events:       {} received, {} handled, {} ignored, {} malformed",
        stats.events_received, stats.events_handled, stats.events_ignored, stats.malformed_payloads
    );
    out
}

pub async fn handle(
    mut config: ClientConfig,
    args: WatchArgs,
    printer: Printer,
) -> Result<(), CliError> {
    config
        .channels
        .tickets
        .extend(args.tickets.iter().map(|t| EntityId::from(t.as_str())));
    if args.presence.is_some() {
        config.channels.presence = args.presence;
    }
    if args.no_feed {
        config.channels.ticket_feed = false;
    }
    if args.no_system {
        config.channels.system = false;
    }

    let idle_after = config.timings.idle_after;
    let client = LiveClient::connect(&config)?;
    let mut views = client.view_stream();
    let mut feed = Feed::default();

    let duration = args.duration;
    let stop = async move {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = &mut stop => break,
            view = views.next() => {
                let Some(view) = view else { break };
                for item in feed.update(&view) {
                    let rendered = match printer.format {
                        OutputFormat::Pretty => line(&printer, &item),
                        OutputFormat::Json | OutputFormat::JsonCompact => {
                            output::render_json_compact(&item)
                        }
                    };
                    output::print_output(&rendered, printer.quiet);
                }
            }
        }
    }

    let last = client.view();
    client.shutdown().await;
    tracing::debug!(stats = ?last.stats, "watch finished");

    if args.summary {
        printer.emit(&*last, || summary(&last, Utc::now(), idle_after));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketwire_core::{ActivityKind, NotificationKind};

    fn entry(id: u64, message: &str) -> ActivityEntry {
        ActivityEntry {
            id,
            kind: ActivityKind::Price,
            message: message.into(),
            timestamp: chrono::Utc::now(),
            location: None,
        }
    }

    #[test]
    fn feed_yields_only_new_items() {
        let mut view = LiveView::empty();
        view.activity = vec![entry(2, "second"), entry(1, "first")];
        let mut feed = Feed::default();

        let items = feed.update(&view);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], FeedItem::Connection { state: ConnectionState::Connecting }));
        assert!(matches!(items[1], FeedItem::Activity(e) if e.message == "first"));

        view.activity.insert(0, entry(3, "third"));
        let items = feed.update(&view);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], FeedItem::Activity(e) if e.id == 3));
    }

    #[test]
    fn notifications_print_once_while_visible() {
        let mut view = LiveView::empty();
        view.notifications = vec![NotificationEntry {
            id: 9,
            kind: NotificationKind::PriceDrop,
            title: "Price Alert".into(),
            message: "Lakers dropped".into(),
            related: None,
            created_at: chrono::Utc::now(),
            visible: true,
        }];
        let mut feed = Feed::default();
        assert_eq!(feed.update(&view).len(), 2);
        assert!(feed.update(&view).is_empty());
    }

    #[test]
    fn summary_renders_tables() {
        let now = chrono::Utc::now();
        let mut view = LiveView::empty();
        let mut ticket = TicketSnapshot::new(42u64);
        ticket.price = Some(1234.5);
        ticket.available = Some(3);
        view.tickets = vec![ticket];
        let mut ana = PresenceUser::new(7u64, "ana maria");
        ana.current_page = Some("ticket-42".into());
        ana.last_activity_at = Some(now - chrono::Duration::minutes(12));
        view.presence = vec![ana];
        view.idle_users = 1;

        let out = summary(&view, now, Duration::from_secs(600));
        assert!(out.contains("online users: 1 (1 idle)"));
        assert!(out.contains("│ AM "));
        assert!(out.contains("online (idle)"));
        assert!(out.contains("12m ago"));
        assert!(out.contains("$1,234.50"));
        assert!(out.contains("│ Ticket "));
        assert!(!out.contains("ticket 42 "));
    }

    #[test]
    fn feed_items_serialize_with_type_tag() {
        let item = FeedItem::Connection {
            state: ConnectionState::Connected,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"type": "connection", "state": "connected"}));
    }
}
