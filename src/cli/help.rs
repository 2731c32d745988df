//! CLI command names used in log spans.

use crate::cli::parse::{Commands, QueueCommands, SyncCommands, ThresholdCommands};

/// Dotted command name (e.g. "queue.list", "sync.once").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Queue { command } => format!("queue.{}", queue_command_name(command)),
        Commands::Sync { command } => format!("sync.{}", sync_command_name(command)),
        Commands::Thresholds { command } => {
            format!("thresholds.{}", threshold_command_name(command))
        }
        Commands::Stats { .. } => "stats".to_string(),
        Commands::Config => "config".to_string(),
        Commands::Consent { .. } => "consent".to_string(),
    }
}

pub fn queue_command_name(command: &QueueCommands) -> &'static str {
    match command {
        QueueCommands::List { .. } => "list",
        QueueCommands::Enqueue { .. } => "enqueue",
        QueueCommands::Remove { .. } => "remove",
    }
}

pub fn sync_command_name(command: &SyncCommands) -> &'static str {
    match command {
        SyncCommands::Once { .. } => "once",
        SyncCommands::Watch { .. } => "watch",
    }
}

pub fn threshold_command_name(command: &ThresholdCommands) -> &'static str {
    match command {
        ThresholdCommands::Get { .. } => "get",
        ThresholdCommands::Set { .. } => "set",
        ThresholdCommands::Check { .. } => "check",
    }
}
