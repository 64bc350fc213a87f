//! Clap derive structures for the `ticketwire` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ticketwire -- follow live ticket prices, availability and announcements
#[derive(Debug, Parser)]
#[command(
    name = "ticketwire",
    version,
    about = "Follow a ticketing platform's realtime feed from the terminal",
    long_about = "Connects to the realtime broadcast server, follows the ticket feed,\n\
        system announcements and your private channel, and falls back to the\n\
        REST API when the socket is unavailable.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "TICKETWIRE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// JSON API root (overrides profile)
    #[arg(long, env = "TICKETWIRE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Realtime WebSocket endpoint (overrides profile)
    #[arg(long, env = "TICKETWIRE_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// API bearer token
    #[arg(long, env = "TICKETWIRE_API_TOKEN", global = true, hide_env = true)]
    pub api_token: Option<String>,

    /// Signed-in user id (private channel and presence)
    #[arg(long, short = 'u', env = "TICKETWIRE_USER", global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TICKETWIRE_OUTPUT",
        default_value = "pretty",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "TICKETWIRE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TICKETWIRE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines (default)
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON, one document per line
    JsonCompact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live activity, notifications and connection changes
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch a state snapshot over REST
    State(StateArgs),

    /// Send a client event (whisper or REST fallback)
    Send(SendArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also mirror these tickets (`ticket.{id}` channels)
    #[arg(long = "ticket", short = 't', value_name = "ID")]
    pub tickets: Vec<String>,

    /// Join a presence channel
    #[arg(long, value_name = "CHANNEL")]
    pub presence: Option<String>,

    /// Skip the global ticket feed
    #[arg(long)]
    pub no_feed: bool,

    /// Skip system announcements
    #[arg(long)]
    pub no_system: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Print the full live view on exit
    #[arg(long)]
    pub summary: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STATE / SEND
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Reporting period passed through to the server
    #[arg(long, default_value = "today")]
    pub period: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Event name, without the `client-` prefix
    pub event: String,

    /// JSON payload
    #[arg(default_value = "{}")]
    pub data: String,

    /// Channel to whisper on when the socket is up
    #[arg(long, short = 'C')]
    pub channel: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current configuration (secrets masked)
    Show,

    /// Create or update a profile
    Init {
        /// JSON API root, e.g. https://tickets.example.com/api/
        #[arg(long)]
        api_url: String,

        /// Realtime endpoint, e.g. wss://tickets.example.com/ws
        #[arg(long)]
        ws_url: Option<String>,

        /// Signed-in user id
        #[arg(long)]
        user: Option<String>,

        /// Environment variable holding the API token
        #[arg(long)]
        token_env: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,

        /// Replace an existing profile of the same name
        #[arg(long)]
        force: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
