//! Mutation stores: durable sled-backed store and an in-memory fallback.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sled::{Db, Tree};
use tracing::warn;

use crate::error::StorageError;
use crate::queue::QueuedMutation;

const TREE_MUTATIONS: &str = "offline_mutations";
/// Undecodable records are moved here so the rest of the queue keeps draining.
const TREE_QUARANTINE: &str = "offline_mutations_quarantine";

/// Record store for queued mutations.
///
/// Every method is a single atomic operation on one record; callers never rely
/// on cross-record transactions.
pub trait MutationStore: Send + Sync {
    fn put(&self, record: &QueuedMutation) -> Result<(), StorageError>;
    fn get(&self, id: &str) -> Result<Option<QueuedMutation>, StorageError>;
    /// Returns whether a record was removed.
    fn remove(&self, id: &str) -> Result<bool, StorageError>;
    fn list(&self) -> Result<Vec<QueuedMutation>, StorageError>;
    /// Atomically bump `retry_count` (saturating at `max_retries`) and return the new record.
    fn increment_retry(&self, id: &str) -> Result<QueuedMutation, StorageError>;
    /// Next insertion sequence number.
    fn next_seq(&self) -> Result<u64, StorageError>;
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
    fn name(&self) -> &'static str;
}

/// Sled-backed durable store.
#[derive(Clone)]
pub struct SledMutationStore {
    db: Db,
    mutations: Tree,
    quarantine: Tree,
}

impl SledMutationStore {
    /// Open (or create) the sled database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::Unavailable(format!("Failed to open sled database: {}", e))
        })?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let mutations = db.open_tree(TREE_MUTATIONS).map_err(to_storage_unavailable)?;
        let quarantine = db.open_tree(TREE_QUARANTINE).map_err(to_storage_unavailable)?;
        Ok(Self {
            db,
            mutations,
            quarantine,
        })
    }

    /// Number of records set aside because they could not be decoded.
    pub fn quarantined(&self) -> usize {
        self.quarantine.len()
    }

    fn quarantine_record(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.quarantine
            .insert(key, value)
            .map_err(to_storage_unavailable)?;
        self.mutations.remove(key).map_err(to_storage_unavailable)?;
        Ok(())
    }
}

impl MutationStore for SledMutationStore {
    fn put(&self, record: &QueuedMutation) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record).map_err(to_storage_corrupt)?;
        self.mutations
            .insert(record.id.as_bytes(), value)
            .map_err(to_storage_unavailable)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<QueuedMutation>, StorageError> {
        let Some(raw) = self
            .mutations
            .get(id.as_bytes())
            .map_err(to_storage_unavailable)?
        else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_corrupt)?;
        Ok(Some(parsed))
    }

    fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self
            .mutations
            .remove(id.as_bytes())
            .map_err(to_storage_unavailable)?;
        Ok(removed.is_some())
    }

    fn list(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let mut out = Vec::new();
        for result in self.mutations.iter() {
            let (key, value) = result.map_err(to_storage_unavailable)?;
            match serde_json::from_slice::<QueuedMutation>(&value) {
                Ok(record) => out.push(record),
                Err(err) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %err,
                        "Quarantining undecodable mutation record"
                    );
                    self.quarantine_record(&key, &value)?;
                }
            }
        }
        out.sort_by_key(|m| m.seq);
        Ok(out)
    }

    fn increment_retry(&self, id: &str) -> Result<QueuedMutation, StorageError> {
        let mut decode_error: Option<String> = None;
        let updated = self
            .mutations
            .update_and_fetch(id.as_bytes(), |old| {
                decode_error = None;
                let raw = old?;
                match serde_json::from_slice::<QueuedMutation>(raw) {
                    Ok(mut record) => {
                        record.retry_count = (record.retry_count + 1).min(record.max_retries);
                        match serde_json::to_vec(&record) {
                            Ok(encoded) => Some(encoded),
                            Err(err) => {
                                decode_error = Some(err.to_string());
                                Some(raw.to_vec())
                            }
                        }
                    }
                    Err(err) => {
                        decode_error = Some(err.to_string());
                        Some(raw.to_vec())
                    }
                }
            })
            .map_err(to_storage_unavailable)?;

        if let Some(err) = decode_error {
            return Err(StorageError::Corrupt(err));
        }
        let raw = updated.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_slice(&raw).map_err(to_storage_corrupt)
    }

    fn next_seq(&self) -> Result<u64, StorageError> {
        self.db.generate_id().map_err(to_storage_unavailable)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}

/// Process-local store used when the durable store cannot accept writes.
#[derive(Default)]
pub struct MemoryMutationStore {
    records: Mutex<BTreeMap<String, QueuedMutation>>,
    seq: AtomicU64,
}

impl MemoryMutationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MutationStore for MemoryMutationStore {
    fn put(&self, record: &QueuedMutation) -> Result<(), StorageError> {
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<QueuedMutation>, StorageError> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.records.lock().remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let mut out: Vec<QueuedMutation> = self.records.lock().values().cloned().collect();
        out.sort_by_key(|m| m.seq);
        Ok(out)
    }

    fn increment_retry(&self, id: &str) -> Result<QueuedMutation, StorageError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.retry_count = (record.retry_count + 1).min(record.max_retries);
        Ok(record.clone())
    }

    fn next_seq(&self) -> Result<u64, StorageError> {
        Ok(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn to_storage_unavailable(err: sled::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn to_storage_corrupt(err: serde_json::Error) -> StorageError {
    StorageError::Corrupt(err.to_string())
}
