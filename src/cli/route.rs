//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::help::command_name;
use crate::cli::parse::{Commands, QueueCommands, SyncCommands, ThresholdCommands};
use crate::cli::presentation::{
    format_breaches_text, format_queue_list_text, format_stats_text, format_sync_summary_text,
    format_thresholds_text,
};
use crate::config::{ConfigLoader, VigilConfig};
use crate::consent::{AlwaysGranted, ConsentToggle, ToggleState, UsagePermission};
use crate::error::{ApiError, StorageError};
use crate::gateway::{HttpGateway, RemoteGateway};
use crate::queue::{OfflineMutationQueue, Priority, QueuedMutation};
use crate::sync::{spawn_periodic_wake, SyncCoordinator, SyncMessage, WakeSignal};
use crate::threshold::{ThresholdConfig, ThresholdEvaluator};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Runtime context for CLI execution: loaded config, the offline queue and the gateway.
pub struct RunContext {
    config: VigilConfig,
    queue: OfflineMutationQueue,
    gateway: Arc<dyn RemoteGateway>,
    permission: Arc<dyn UsagePermission>,
    runtime: Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.ensure_valid()?;

        let queue_path = config.storage.resolve_queue_path(&workspace_root);
        std::fs::create_dir_all(&queue_path)
            .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;
        let queue = OfflineMutationQueue::open(&queue_path)?;
        debug!(path = %queue_path.display(), "Opened offline queue");

        let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(config.gateway.clone())?);
        Self::from_parts(config, queue, gateway)
    }

    /// Assemble a context from already-built parts.
    pub fn from_parts(
        config: VigilConfig,
        queue: OfflineMutationQueue,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Result<Self, ApiError> {
        let runtime = Runtime::new()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        let queue = queue.with_max_retries(config.queue.max_retries);
        Ok(Self {
            config,
            queue,
            gateway,
            permission: Arc::new(AlwaysGranted),
            runtime,
        })
    }

    /// Host usage-access check consulted by `consent --grant`.
    pub fn with_permission(mut self, permission: Arc<dyn UsagePermission>) -> Self {
        self.permission = permission;
        self
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn queue(&self) -> &OfflineMutationQueue {
        &self.queue
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let name = command_name(command);
        let started = Instant::now();
        info!(command = %name, "Executing command");
        let result = self.execute_inner(command);
        match &result {
            Ok(_) => info!(
                command = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Command finished"
            ),
            Err(e) => warn!(command = %name, error = %e, "Command failed"),
        }
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Queue { command } => self.handle_queue_command(command),
            Commands::Sync { command } => self.handle_sync_command(command),
            Commands::Thresholds { command } => self.handle_threshold_command(command),
            Commands::Stats { owner, format } => {
                let stats = self.runtime.block_on(self.gateway.fetch_stats(owner))?;
                if format == "json" {
                    to_json(&stats)
                } else {
                    Ok(format_stats_text(owner, &stats))
                }
            }
            Commands::Config => {
                let mut shown = self.config.clone();
                if shown.gateway.auth_token.is_some() {
                    shown.gateway.auth_token = Some("***".to_string());
                }
                toml::to_string_pretty(&shown).map_err(|e| ApiError::Output(e.to_string()))
            }
            Commands::Consent { owner, grant, .. } => {
                let toggle =
                    ConsentToggle::new(Arc::clone(&self.gateway), Arc::clone(&self.permission));
                let state = if *grant {
                    self.runtime.block_on(toggle.enable(owner))?
                } else {
                    self.runtime.block_on(toggle.disable(owner))?
                };
                match state {
                    ToggleState::Enabled => Ok(format!("Usage tracking enabled for {}.", owner)),
                    ToggleState::Disabled => Ok(format!("Usage tracking disabled for {}.", owner)),
                    ToggleState::PermissionRequired => Err(ApiError::PermissionDenied(format!(
                        "usage access has not been granted on this host; tracking for {} stays off",
                        owner
                    ))),
                }
            }
        }
    }

    fn handle_queue_command(&self, command: &QueueCommands) -> Result<String, ApiError> {
        match command {
            QueueCommands::List { format } => {
                let pending = self.queue.dequeue_all_ordered()?;
                if format == "json" {
                    to_json(&pending)
                } else {
                    Ok(format_queue_list_text(&pending))
                }
            }
            QueueCommands::Enqueue {
                url,
                method,
                priority,
                body,
                headers,
                max_retries,
            } => {
                let priority: Priority = priority.parse()?;
                let mut mutation = QueuedMutation::new(url.as_str(), method.as_str(), priority)
                    .with_max_retries(max_retries.unwrap_or(self.queue.max_retries()));
                for raw in headers {
                    let (name, value) = parse_header(raw)?;
                    mutation = mutation.with_header(name, value);
                }
                if let Some(body) = body {
                    mutation = mutation.with_body(body.as_str());
                }
                let id = self.queue.enqueue(mutation)?;
                Ok(format!("Queued {}", id))
            }
            QueueCommands::Remove { id } => {
                if self.queue.remove_by_id(id)? {
                    Ok(format!("Removed {}", id))
                } else {
                    Err(StorageError::NotFound(id.clone()).into())
                }
            }
        }
    }

    fn handle_sync_command(&self, command: &SyncCommands) -> Result<String, ApiError> {
        match command {
            SyncCommands::Once { format } => {
                let coordinator = SyncCoordinator::new(
                    self.queue.clone(),
                    Arc::clone(&self.gateway),
                    &self.config.sync,
                );
                let summary = self.runtime.block_on(coordinator.drain_once())?;
                if format == "json" {
                    to_json(&SyncMessage::SyncComplete(summary))
                } else {
                    Ok(format_sync_summary_text(&summary))
                }
            }
            SyncCommands::Watch { interval_secs } => {
                let interval = interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.sync.periodic_interval());
                let cycles = self.watch(interval, None, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for interrupt, stopping watch");
                    }
                })?;
                Ok(format!("Sync watch stopped after {} cycle(s)", cycles))
            }
        }
    }

    /// Drain now, then on every periodic wake, until `stop` resolves or
    /// `max_cycles` summaries have been printed. Returns the cycle count.
    fn watch<F>(
        &self,
        interval: Duration,
        max_cycles: Option<usize>,
        stop: F,
    ) -> Result<usize, ApiError>
    where
        F: Future<Output = ()>,
    {
        self.runtime.block_on(async {
            let coordinator = SyncCoordinator::new(
                self.queue.clone(),
                Arc::clone(&self.gateway),
                &self.config.sync,
            );
            let handle = coordinator.spawn();
            let mut summaries = handle.subscribe();
            let periodic = spawn_periodic_wake(self.config.sync.tag.clone(), interval, handle.waker());
            handle.wake(WakeSignal::Manual).await;
            info!(interval_secs = interval.as_secs(), "Watching offline queue");

            tokio::pin!(stop);
            let mut cycles = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    message = summaries.recv() => match message {
                        Ok(SyncMessage::SyncComplete(summary)) => {
                            cycles += 1;
                            println!("{}", format_sync_summary_text(&summary));
                            if max_cycles.is_some_and(|max| cycles >= max) {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Missed sync summaries");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            periodic.abort();
            handle.shutdown().await;
            Ok(cycles)
        })
    }

    fn handle_threshold_command(&self, command: &ThresholdCommands) -> Result<String, ApiError> {
        match command {
            ThresholdCommands::Get { owner, format } => {
                let config = self.runtime.block_on(self.gateway.fetch_thresholds(owner))?;
                if format == "json" {
                    to_json(&config)
                } else {
                    Ok(format_thresholds_text(owner, config.as_ref()))
                }
            }
            ThresholdCommands::Set {
                owner,
                daily,
                weekly,
                break_reminder,
                disabled,
            } => {
                let mut config = ThresholdConfig::new(owner.as_str());
                if let Some(daily) = daily {
                    config.daily_limit_minutes = *daily;
                }
                if let Some(weekly) = weekly {
                    config.weekly_limit_minutes = *weekly;
                }
                if let Some(break_reminder) = break_reminder {
                    config.break_reminder_minutes = *break_reminder;
                }
                config.enabled = !disabled;
                self.runtime.block_on(self.gateway.set_thresholds(&config))?;
                Ok(format_thresholds_text(owner, Some(&config)))
            }
            ThresholdCommands::Check {
                owner,
                session_minutes,
            } => {
                let evaluator = ThresholdEvaluator::new(Arc::clone(&self.gateway));
                let breaches = self
                    .runtime
                    .block_on(evaluator.check(owner, session_minutes.saturating_mul(60_000)));
                Ok(format_breaches_text(owner, &breaches))
            }
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), ApiError> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ApiError::InvalidMutation(format!(
            "Header '{}' must look like NAME:VALUE",
            raw
        ))),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|e| ApiError::Output(e.to_string()))
}
