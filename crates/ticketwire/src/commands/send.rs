//! `ticketwire send`: emit one client event.

use ticketwire_core::{ClientConfig, Delivery, LiveClient};

use crate::cli::SendArgs;
use crate::error::CliError;
use crate::output::Printer;

use super::util::parse_payload;

pub async fn handle(
    mut config: ClientConfig,
    args: SendArgs,
    printer: Printer,
) -> Result<(), CliError> {
    let data = parse_payload(&args.data)?;

    // A one-shot command exits before any whisper could be observed, so
    // sends always take the REST route.
    config.ws_url = None;
    let client = LiveClient::connect(&config)?;
    let result = client
        .send(args.channel.as_deref(), args.event.as_str(), data)
        .await;
    client.shutdown().await;

    let delivery = result?;
    let label = match delivery {
        Delivery::Whispered => "whispered",
        Delivery::Posted => "posted",
        Delivery::Local => "applied locally",
    };
    printer.emit(
        &serde_json::json!({"event": args.event, "delivery": label}),
        || format!("{}: {label}", args.event),
    );
    Ok(())
}
