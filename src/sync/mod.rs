//! Sync Coordinator
//!
//! Background drainer for the offline mutation queue. It runs as its own task,
//! takes wake signals over an mpsc channel, replays queued mutations through
//! the gateway, and broadcasts a summary after every drain.

pub mod retry;
pub mod wake;

pub use retry::{RetryDecision, RetryPolicy};
pub use wake::{spawn_periodic_wake, ConnectivityWatcher, WakeSignal};

use crate::error::{GatewayError, StorageError};
use crate::gateway::{DeliveryOutcome, RemoteGateway};
use crate::queue::{OfflineMutationQueue, QueuedMutation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const WAKE_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Sync scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name the periodic wake is registered under
    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default = "default_periodic_interval_secs")]
    pub periodic_interval_secs: u64,

    /// Per-attempt delivery timeout; unset means no timeout
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_tag() -> String {
    "vigil-background-sync".to_string()
}

fn default_periodic_interval_secs() -> u64 {
    900
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            periodic_interval_secs: default_periodic_interval_secs(),
            request_timeout_secs: None,
        }
    }
}

impl SyncConfig {
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tag.trim().is_empty() {
            return Err("tag cannot be empty".to_string());
        }
        if self.periodic_interval_secs == 0 {
            return Err("periodic_interval_secs must be greater than zero".to_string());
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request_timeout_secs must be greater than zero when set".to_string());
        }
        Ok(())
    }
}

/// Outcome of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success_count: usize,
    /// Records dropped after exhausting their retries
    pub failure_count: usize,
    pub total: usize,
}

/// Messages broadcast from the coordinator to foreground listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    SyncComplete(SyncSummary),
}

pub struct SyncCoordinator {
    queue: OfflineMutationQueue,
    gateway: Arc<dyn RemoteGateway>,
    policy: RetryPolicy,
    request_timeout: Option<Duration>,
    events: broadcast::Sender<SyncMessage>,
}

impl SyncCoordinator {
    pub fn new(
        queue: OfflineMutationQueue,
        gateway: Arc<dyn RemoteGateway>,
        config: &SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            gateway,
            policy: RetryPolicy,
            request_timeout: config.request_timeout(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.events.subscribe()
    }

    /// Drain every queued mutation once and broadcast the summary.
    ///
    /// Per-mutation failures never abort the cycle; only a failure to list the
    /// queue does, in which case nothing is broadcast.
    pub async fn drain_once(&self) -> Result<SyncSummary, StorageError> {
        let pending = self.queue.dequeue_all_ordered().map_err(|err| {
            warn!(error = %err, "Failed to read offline queue, skipping sync cycle");
            err
        })?;

        let mut summary = SyncSummary {
            total: pending.len(),
            ..SyncSummary::default()
        };

        for mutation in &pending {
            let failure = match self.deliver(mutation).await {
                Ok(outcome) if outcome.is_success() => {
                    summary.success_count += 1;
                    self.remove(mutation);
                    continue;
                }
                Ok(outcome) => format!("status {}", outcome.status),
                Err(err) => err.to_string(),
            };

            match self.policy.on_failure(mutation) {
                RetryDecision::Drop => {
                    summary.failure_count += 1;
                    warn!(
                        mutation_id = %mutation.id,
                        url = %mutation.url,
                        attempts = mutation.retry_count + 1,
                        reason = %failure,
                        "Dropping mutation after final failed attempt"
                    );
                    self.remove(mutation);
                }
                RetryDecision::Retry => match self.queue.increment_retry(&mutation.id) {
                    Ok(updated) => debug!(
                        mutation_id = %mutation.id,
                        retry_count = updated.retry_count,
                        max_retries = updated.max_retries,
                        reason = %failure,
                        "Delivery failed, will retry"
                    ),
                    Err(err) => warn!(
                        mutation_id = %mutation.id,
                        error = %err,
                        "Failed to record retry"
                    ),
                },
            }
        }

        info!(
            success_count = summary.success_count,
            failure_count = summary.failure_count,
            total = summary.total,
            "Sync cycle completed"
        );
        // No subscribers is fine.
        let _ = self.events.send(SyncMessage::SyncComplete(summary));
        Ok(summary)
    }

    async fn deliver(&self, mutation: &QueuedMutation) -> Result<DeliveryOutcome, GatewayError> {
        let attempt = self.gateway.replay(mutation);
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                GatewayError::Transport(format!("Delivery timed out after {:?}", limit))
            })?,
            None => attempt.await,
        }
    }

    fn remove(&self, mutation: &QueuedMutation) {
        if let Err(err) = self.queue.remove_by_id(&mutation.id) {
            warn!(mutation_id = %mutation.id, error = %err, "Failed to remove mutation");
        }
    }

    /// Move the coordinator onto its own task.
    pub fn spawn(self) -> SyncHandle {
        let (wake_tx, mut wake_rx) = mpsc::channel(WAKE_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            debug!("Sync coordinator started");
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    signal = wake_rx.recv() => {
                        let Some(signal) = signal else { break };
                        debug!(?signal, "Sync wake");
                        // Listing failures are already logged; the next wake retries.
                        let _ = self.drain_once().await;
                    }
                }
            }
            debug!("Sync coordinator stopped");
        });

        SyncHandle {
            wake: wake_tx,
            events,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Foreground side of a spawned coordinator. Dropping it stops the coordinator.
pub struct SyncHandle {
    wake: mpsc::Sender<WakeSignal>,
    events: broadcast::Sender<SyncMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Sender for wake sources such as [`ConnectivityWatcher`] and [`spawn_periodic_wake`].
    pub fn waker(&self) -> mpsc::Sender<WakeSignal> {
        self.wake.clone()
    }

    /// Queue a wake. Returns false once the coordinator has stopped.
    pub async fn wake(&self, signal: WakeSignal) -> bool {
        self.wake.send(signal).await.is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.events.subscribe()
    }

    /// Stop after the drain in progress, if any.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!(error = %err, "Sync coordinator task failed");
        }
    }
}
