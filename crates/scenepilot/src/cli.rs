//! Clap derive structures for the `scenepilot` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// scenepilot -- emotion-driven scene switching for live production
#[derive(Debug, Parser)]
#[command(
    name = "scenepilot",
    version,
    about = "Switch live-production scenes from detected emotions",
    long_about = "Drives the scene switcher of a live-production app over its\n\
        WebSocket control protocol. Emotion observations go in, scene\n\
        switches come out, gated by confidence, duration and cooldowns.",
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
    /// Control surface host (overrides config)
    #[arg(long, env = "SCENEPILOT_HOST", global = true)]
    pub host: Option<String>,

    /// Control surface port (overrides config)
    #[arg(long, env = "SCENEPILOT_PORT", global = true)]
    pub port: Option<u16>,

    /// Authentication token sent during the handshake
    #[arg(long, env = "SCENEPILOT_AUTH_TOKEN", global = true, hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SCENEPILOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SCENEPILOT_OUTPUT",
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

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
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
    /// Inspect and switch scenes on the control surface
    #[command(alias = "s")]
    Scenes(ScenesArgs),

    /// Show transport, scene and mapping status
    Status,

    /// Drive live switching from a JSON-lines emotion feed on stdin
    Run(RunArgs),

    /// Dry-run the decision engine over a JSON-lines feed, offline
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Inspect and manage emotion-to-scene mappings
    #[command(alias = "m")]
    Mappings(MappingsArgs),

    /// Record how well a scene suited an emotion
    Feedback(FeedbackArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

// ── Scenes ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScenesArgs {
    #[command(subcommand)]
    pub command: ScenesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ScenesCommand {
    /// List scenes with their local trigger configuration
    #[command(alias = "ls")]
    List,

    /// Print the current program scene
    Current,

    /// Switch to a scene now, ignoring cooldowns
    Switch {
        /// Scene name as shown by `scenes list`
        name: String,

        /// Transition to use (Cut, Fade, Slide, Stinger, Swipe, Luma Wipe)
        #[arg(long, short = 't')]
        transition: Option<String>,

        /// Transition duration in milliseconds
        #[arg(long, requires = "transition")]
        duration_ms: Option<u64>,
    },
}

// ── Run / Evaluate ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not write learned mappings back on exit
    #[arg(long)]
    pub no_save: bool,

    /// Start with automatic switching disabled
    #[arg(long)]
    pub no_auto_switch: bool,
}

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// JSON-lines file of emotion observations (stdin when omitted)
    pub input: Option<PathBuf>,

    /// Print only frames that would switch
    #[arg(long)]
    pub switches_only: bool,
}

// ── Mappings ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MappingsArgs {
    #[command(subcommand)]
    pub command: MappingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum MappingsCommand {
    /// Show the effective mappings (defaults overlaid by the mapping file)
    #[command(alias = "ls")]
    Show,

    /// Write the effective mappings to a file, or to stdout
    Export {
        /// Destination file
        path: Option<PathBuf>,
    },

    /// Clear learned preferences and scene performance
    Reset {
        /// Also restore the built-in mapping table
        #[arg(long)]
        all: bool,
    },
}

// ── Feedback ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FeedbackArgs {
    /// Emotion the scene was chosen for
    pub emotion: String,

    /// Scene that was shown
    pub scene: String,

    /// Satisfaction from 0.0 to 1.0
    pub satisfaction: f64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (token redacted)
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
