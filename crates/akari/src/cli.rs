//! Clap derive structures for the `akari` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// akari -- discover, monitor and configure Akari devices
#[derive(Debug, Parser)]
#[command(
    name = "akari",
    version,
    about = "Supervise and configure Akari home-automation devices",
    long_about = "Talks to the HTTP control plane of Akari devices.\n\n\
        One-shot commands target a configured entry (--entry) or an explicit\n\
        address (--host/--port). `watch` follows MQTT discovery and polls\n\
        every announced device until interrupted.",
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
    /// Configured entry to target
    #[arg(long, short = 'e', env = "AKARI_ENTRY", global = true)]
    pub entry: Option<String>,

    /// Device address (bypasses configured entries)
    #[arg(long, short = 'H', global = true, conflicts_with = "entry")]
    pub host: Option<String>,

    /// Device control-plane port, with --host
    #[arg(long, short = 'P', global = true, requires = "host")]
    pub port: Option<u16>,

    /// Device API key (overrides configured keys for the target)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long, env = "AKARI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (default: `defaults.output`, else table)
    #[arg(long, short = 'o', env = "AKARI_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show CPU temperature, memory, uptime and module state
    Health,

    /// Read or write a device configuration section
    Config(ConfigArgs),

    /// List devices configured on the remote unit
    #[command(alias = "dev")]
    Devices,

    /// Restart the device service
    Restart,

    /// Ask the device to reload its configuration
    Reload,

    /// Check connectivity and credentials
    Probe,

    /// Follow discovery and poll devices until Ctrl-C
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print one section (mqtt, devices, covers, sensors, modbus, system)
    Get {
        section: String,
    },

    /// Replace one section with a JSON object
    Set {
        section: String,

        /// Inline JSON object
        #[arg(long, short = 'd', conflicts_with = "file", required_unless_present = "file")]
        data: Option<String>,

        /// Read the JSON object from a file
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// MQTT broker host (overrides `mqtt.host`)
    #[arg(long, env = "AKARI_BROKER")]
    pub broker: Option<String>,

    /// MQTT broker port (overrides `mqtt.port`)
    #[arg(long)]
    pub broker_port: Option<u16>,

    /// Discovery topic pattern (overrides `discovery.topic`)
    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
