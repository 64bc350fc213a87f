//! `ticketwire state`: one REST snapshot.

use std::fmt::Write;

use ticketwire_core::{ClientConfig, LiveClient};

use crate::cli::StateArgs;
use crate::error::CliError;
use crate::output::Printer;

/// `key: value` lines; nested values stay as compact JSON.
fn pretty(data: &serde_json::Map<String, serde_json::Value>) -> String {
    let width = data.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::new();
    for (key, value) in data {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = writeln!(out, "{key:<width$}  {rendered}");
    }
    out.trim_end().to_owned()
}

pub async fn handle(
    mut config: ClientConfig,
    args: StateArgs,
    printer: Printer,
) -> Result<(), CliError> {
    // A snapshot needs no socket.
    config.ws_url = None;
    let client = LiveClient::connect(&config)?;
    let result = client.fetch_state(&args.period).await;
    client.shutdown().await;

    let snapshot = result?;
    printer.emit(&snapshot.data, || pretty(&snapshot.data));
    Ok(())
}
