//! Offline Mutation Queue
//!
//! Durable, priority-ordered store of state-changing requests that could not be
//! delivered immediately. Records survive process restarts and are drained by
//! the sync coordinator.

pub mod store;

pub use store::{MemoryMutationStore, MutationStore, SledMutationStore};

use crate::error::{ApiError, StorageError};
use crate::types::{new_mutation_id, now_millis};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP methods a queued mutation may replay with.
const REPLAYABLE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Delivery priority (higher drains first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ApiError::InvalidMutation(format!(
                "Unknown priority '{}' (expected high, medium or low)",
                other
            ))),
        }
    }
}

/// A request awaiting delivery to the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Generated on enqueue when empty
    #[serde(default)]
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub priority: Priority,
    /// Epoch milliseconds
    pub enqueued_at: u64,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    /// Insertion sequence assigned by the store
    #[serde(default)]
    pub seq: u64,
}

impl QueuedMutation {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(url: impl Into<String>, method: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: String::new(),
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            body: None,
            priority,
            enqueued_at: now_millis(),
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            seq: 0,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_enqueued_at(mut self, enqueued_at: u64) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    /// JSON POST of a serializable payload.
    pub fn json_post<T: Serialize>(
        url: impl Into<String>,
        payload: &T,
        priority: Priority,
    ) -> Result<Self, ApiError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| ApiError::InvalidMutation(format!("Failed to encode payload: {}", e)))?;
        Ok(Self::new(url, "POST", priority)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    /// Drain order key: priority descending, then oldest first, then insertion order.
    pub fn drain_key(&self) -> (Reverse<Priority>, u64, u64) {
        (Reverse(self.priority), self.enqueued_at, self.seq)
    }

    /// Whether one more failed attempt exhausts the retry budget.
    pub fn is_last_attempt(&self) -> bool {
        self.retry_count + 1 >= self.max_retries
    }

    fn validate(&mut self) -> Result<(), ApiError> {
        if self.url.trim().is_empty() {
            return Err(ApiError::InvalidMutation("url cannot be empty".to_string()));
        }
        let method = self.method.trim().to_ascii_uppercase();
        if !REPLAYABLE_METHODS.contains(&method.as_str()) {
            return Err(ApiError::InvalidMutation(format!(
                "Unsupported method '{}'",
                self.method
            )));
        }
        self.method = method;
        if self.retry_count > self.max_retries {
            return Err(ApiError::InvalidMutation(format!(
                "retry_count {} exceeds max_retries {}",
                self.retry_count, self.max_retries
            )));
        }
        Ok(())
    }
}

/// Sort mutations into drain order.
pub fn sort_for_drain(mutations: &mut [QueuedMutation]) {
    mutations.sort_by_key(QueuedMutation::drain_key);
}

/// Durable queue over a primary store with an optional fallback store.
#[derive(Clone)]
pub struct OfflineMutationQueue {
    primary: Arc<dyn MutationStore>,
    fallback: Option<Arc<dyn MutationStore>>,
    max_retries: u32,
}

impl OfflineMutationQueue {
    pub fn new(primary: Arc<dyn MutationStore>, fallback: Option<Arc<dyn MutationStore>>) -> Self {
        Self {
            primary,
            fallback,
            max_retries: QueuedMutation::DEFAULT_MAX_RETRIES,
        }
    }

    /// Retry budget given to mutations this crate creates itself.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Open the sled store at `path` with an in-memory fallback.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let primary = SledMutationStore::open(path)?;
        Ok(Self::new(
            Arc::new(primary),
            Some(Arc::new(MemoryMutationStore::new())),
        ))
    }

    /// Persist a mutation, assigning an id when absent. Returns the id.
    pub fn enqueue(&self, mut mutation: QueuedMutation) -> Result<String, ApiError> {
        mutation.validate()?;
        if mutation.id.is_empty() {
            mutation.id = new_mutation_id();
        }

        match self.put_into(self.primary.as_ref(), &mut mutation) {
            Ok(()) => {}
            Err(err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(err.into());
                };
                warn!(
                    mutation_id = %mutation.id,
                    store = self.primary.name(),
                    fallback = fallback.name(),
                    error = %err,
                    "Primary mutation store failed, using fallback"
                );
                self.put_into(fallback.as_ref(), &mut mutation)?;
            }
        }

        debug!(
            mutation_id = %mutation.id,
            method = %mutation.method,
            url = %mutation.url,
            priority = mutation.priority.as_str(),
            "Enqueued offline mutation"
        );
        Ok(mutation.id)
    }

    fn put_into(
        &self,
        store: &dyn MutationStore,
        mutation: &mut QueuedMutation,
    ) -> Result<(), StorageError> {
        mutation.seq = store.next_seq()?;
        store.put(mutation)?;
        store.flush()
    }

    /// All records in drain order. Fails when the primary store cannot be read.
    pub fn dequeue_all_ordered(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let mut all = self.primary.list()?;
        if let Some(fallback) = &self.fallback {
            match fallback.list() {
                Ok(extra) => {
                    let known: HashSet<String> = all.iter().map(|m| m.id.clone()).collect();
                    all.extend(extra.into_iter().filter(|m| !known.contains(&m.id)));
                }
                Err(err) => {
                    warn!(store = fallback.name(), error = %err, "Failed to list fallback store");
                }
            }
        }
        sort_for_drain(&mut all);
        Ok(all)
    }

    /// Delete a record. Returns whether any store held it.
    pub fn remove_by_id(&self, id: &str) -> Result<bool, StorageError> {
        let mut removed = self.primary.remove(id)?;
        if removed {
            self.primary.flush()?;
        }
        if let Some(fallback) = &self.fallback {
            removed |= fallback.remove(id)?;
        }
        Ok(removed)
    }

    /// Bump the retry count of a record; `NotFound` when it no longer exists.
    pub fn increment_retry(&self, id: &str) -> Result<QueuedMutation, StorageError> {
        match self.primary.increment_retry(id) {
            Ok(updated) => {
                self.primary.flush()?;
                Ok(updated)
            }
            Err(StorageError::NotFound(missing)) => match &self.fallback {
                Some(fallback) => fallback.increment_retry(id),
                None => Err(StorageError::NotFound(missing)),
            },
            Err(err) => Err(err),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<QueuedMutation>, StorageError> {
        if let Some(found) = self.primary.get(id)? {
            return Ok(Some(found));
        }
        match &self.fallback {
            Some(fallback) => fallback.get(id),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.dequeue_all_ordered()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
