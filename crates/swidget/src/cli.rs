//! Clap derive structures for the `swidget` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// swidget -- control Swidget outlets, switches, and dimmers on the LAN
#[derive(Debug, Parser)]
#[command(
    name = "swidget",
    version,
    about = "Control Swidget smart devices from the command line",
    long_about = "Discover, inspect, and control Swidget outlets, switches, dimmers,\n\
        and timer switches over their local HTTPS and WebSocket API.",
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
    /// Device profile to use
    #[arg(long, short = 'p', env = "SWIDGET_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device address (overrides profile)
    #[arg(long, short = 'H', env = "SWIDGET_HOST", global = true)]
    pub host: Option<String>,

    /// Device secret key
    #[arg(long, env = "SWIDGET_SECRET", global = true, hide_env = true)]
    pub secret: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SWIDGET_OUTPUT",
        default_value = "table",
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
    #[arg(long, short = 'k', env = "SWIDGET_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SWIDGET_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
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
    /// Search the local network for devices
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Show device identity, type, and current state
    Info,

    /// Show realtime readings (power, sensors)
    #[command(alias = "r")]
    Readings,

    /// Turn the device (or its USB insert) on
    On(PowerArgs),

    /// Turn the device (or its USB insert) off
    Off(PowerArgs),

    /// Set dimmer brightness
    Brightness(BrightnessArgs),

    /// Start a countdown timer on a timer switch
    Timer(TimerArgs),

    /// Check that the device answers
    Ping,

    /// Flash the device LED to identify it
    Blink,

    /// Stream state changes until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICE COMMANDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Seconds to wait for replies
    #[arg(long, short = 'w', default_value = "5")]
    pub window: u64,

    /// SSDP search target
    #[arg(long)]
    pub service_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct PowerArgs {
    /// Switch the USB insert instead of the main load
    #[arg(long)]
    pub usb: bool,
}

#[derive(Debug, Args)]
pub struct BrightnessArgs {
    /// Level in percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub level: u8,
}

#[derive(Debug, Args)]
pub struct TimerArgs {
    /// Minutes until the load turns off
    pub minutes: u32,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after this many changes
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Poll over REST instead of using the WebSocket
    #[arg(long)]
    pub poll: bool,
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
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g., "host", "timeout", "websocket")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a device secret key in the system keyring
    SetSecret {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
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
