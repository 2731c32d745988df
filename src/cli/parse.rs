//! CLI parse: clap types for Vigil. No behavior; definitions only.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Vigil CLI - offline queue, background sync and usage limits
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Inspect and drain the offline mutation queue, manage usage limits and consent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Offline mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Replay queued mutations against the remote service
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Usage limits for an owner
    Thresholds {
        #[command(subcommand)]
        command: ThresholdCommands,
    },
    /// Show aggregated usage statistics for an owner
    Stats {
        owner: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML (auth token redacted)
    Config,
    /// Grant or revoke usage tracking consent
    #[command(group(ArgGroup::new("decision").required(true).args(["grant", "revoke"])))]
    Consent {
        owner: String,
        #[arg(long)]
        grant: bool,
        #[arg(long)]
        revoke: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List pending mutations in drain order
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Queue a request for later delivery
    Enqueue {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "POST")]
        method: String,
        /// high, medium or low
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        body: Option<String>,
        /// Header as NAME:VALUE (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
        /// Retry budget (defaults to queue.max_retries)
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Remove a mutation by id
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Drain the queue once and print the summary
    Once {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Drain on start, then on every periodic wake until interrupted
    Watch {
        /// Override sync.periodic_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ThresholdCommands {
    /// Show the configured limits
    Get {
        owner: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Store limits; unspecified limits use the defaults
    Set {
        owner: String,
        #[arg(long)]
        daily: Option<u64>,
        #[arg(long)]
        weekly: Option<u64>,
        #[arg(long = "break")]
        break_reminder: Option<u64>,
        /// Store the limits but turn alerts off
        #[arg(long)]
        disabled: bool,
    },
    /// Evaluate limits for a session of the given length
    Check {
        owner: String,
        #[arg(long, default_value = "0")]
        session_minutes: u64,
    },
}
