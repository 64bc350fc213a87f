//! Command dispatch for everything that talks to the server.

pub mod config_cmd;
pub mod send;
pub mod state;
pub mod util;
pub mod watch;

use ticketwire_core::ClientConfig;

use crate::cli::Command;
use crate::error::CliError;
use crate::output::Printer;

pub async fn dispatch(cmd: Command, config: ClientConfig, printer: Printer) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(config, args, printer).await,
        Command::State(args) => state::handle(config, args, printer).await,
        Command::Send(args) => send::handle(config, args, printer).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local commands are handled before connecting".into(),
        )),
    }
}
