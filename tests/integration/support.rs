//! Shared fixtures: an in-process gateway and queue builders.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vigil::consent::ConsentUpdate;
use vigil::error::GatewayError;
use vigil::gateway::{DeliveryOutcome, RemoteGateway};
use vigil::monitor::Session;
use vigil::queue::{MemoryMutationStore, OfflineMutationQueue, QueuedMutation};
use vigil::threshold::{ThresholdConfig, UsageStats};

pub const SESSIONS_URL: &str = "http://fake/api/screen-time/sessions";

/// Gateway that records every call and answers from canned state.
#[derive(Default)]
pub struct FakeGateway {
    pub saved: Mutex<Vec<Session>>,
    pub consents: Mutex<Vec<ConsentUpdate>>,
    /// Mutation ids in the order they were replayed
    pub replayed: Mutex<Vec<String>>,
    pub thresholds: Mutex<Option<ThresholdConfig>>,
    pub stats: Mutex<UsageStats>,
    statuses: Mutex<HashMap<String, u16>>,
    fail_saves: AtomicBool,
    offline: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer replays to `url` with `status` instead of 200.
    pub fn respond_with(&self, url: &str, status: u16) {
        self.statuses.lock().insert(url.to_string(), status);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn save_session(&self, session: &Session) -> Result<(), GatewayError> {
        if self.fail_saves.load(Ordering::SeqCst) || self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        self.saved.lock().push(session.clone());
        Ok(())
    }

    async fn fetch_stats(&self, _owner_id: &str) -> Result<UsageStats, GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(self.stats.lock().clone())
    }

    async fn fetch_thresholds(
        &self,
        _owner_id: &str,
    ) -> Result<Option<ThresholdConfig>, GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(self.thresholds.lock().clone())
    }

    async fn set_thresholds(&self, config: &ThresholdConfig) -> Result<(), GatewayError> {
        *self.thresholds.lock() = Some(config.clone());
        Ok(())
    }

    async fn update_consent(&self, update: &ConsentUpdate) -> Result<(), GatewayError> {
        self.consents.lock().push(update.clone());
        Ok(())
    }

    async fn replay(&self, mutation: &QueuedMutation) -> Result<DeliveryOutcome, GatewayError> {
        self.replayed.lock().push(mutation.id.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        let status = self
            .statuses
            .lock()
            .get(&mutation.url)
            .copied()
            .unwrap_or(200);
        Ok(DeliveryOutcome { status })
    }

    fn sessions_url(&self) -> String {
        SESSIONS_URL.to_string()
    }
}

pub fn memory_queue() -> OfflineMutationQueue {
    OfflineMutationQueue::new(Arc::new(MemoryMutationStore::new()), None)
}

pub fn sled_queue(dir: &Path) -> OfflineMutationQueue {
    OfflineMutationQueue::open(dir.join("queue")).unwrap()
}
