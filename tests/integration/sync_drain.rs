//! Sync coordinator draining a real queue through a fake gateway.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil::error::StorageError;
use vigil::queue::{
    MemoryMutationStore, MutationStore, OfflineMutationQueue, Priority, QueuedMutation,
};
use vigil::sync::{
    ConnectivityWatcher, SyncConfig, SyncCoordinator, SyncMessage, SyncSummary, WakeSignal,
};

use crate::integration::support::{memory_queue, sled_queue, FakeGateway};

#[tokio::test]
async fn failing_record_is_dropped_on_third_cycle() {
    let dir = TempDir::new().unwrap();
    let queue = sled_queue(dir.path());
    let gateway = FakeGateway::new();
    gateway.respond_with("http://fake/api/broken", 500);

    let broken = queue
        .enqueue(QueuedMutation::new("http://fake/api/broken", "POST", Priority::High))
        .unwrap();
    let coordinator = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default());

    let first = coordinator.drain_once().await.unwrap();
    assert_eq!(
        first,
        SyncSummary {
            success_count: 0,
            failure_count: 0,
            total: 1
        }
    );
    assert_eq!(queue.get(&broken).unwrap().unwrap().retry_count, 1);

    coordinator.drain_once().await.unwrap();
    assert_eq!(queue.get(&broken).unwrap().unwrap().retry_count, 2);

    let third = coordinator.drain_once().await.unwrap();
    assert_eq!(third.failure_count, 1);
    assert!(queue.get(&broken).unwrap().is_none());

    let fourth = coordinator.drain_once().await.unwrap();
    assert_eq!(fourth, SyncSummary::default());
    assert_eq!(gateway.replayed.lock().len(), 3);
}

#[tokio::test]
async fn undecodable_record_does_not_block_valid_ones() {
    let dir = TempDir::new().unwrap();
    {
        let db = sled::open(dir.path().join("queue")).unwrap();
        db.open_tree("offline_mutations")
            .unwrap()
            .insert("junk", &b"not json"[..])
            .unwrap();
        db.flush().unwrap();
    }
    let queue = sled_queue(dir.path());
    let gateway = FakeGateway::new();
    let valid = queue
        .enqueue(QueuedMutation::new("http://fake/api/ok", "POST", Priority::High))
        .unwrap();

    let coordinator = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default());
    let summary = coordinator.drain_once().await.unwrap();

    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.total, 1);
    assert_eq!(*gateway.replayed.lock(), vec![valid]);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn mixed_outcomes_are_counted_and_ordered() {
    let queue = memory_queue();
    let gateway = FakeGateway::new();
    gateway.respond_with("http://fake/api/reject", 422);

    let low = queue
        .enqueue(QueuedMutation::new("http://fake/api/ok", "POST", Priority::Low).with_enqueued_at(1))
        .unwrap();
    let rejected = queue
        .enqueue(
            QueuedMutation::new("http://fake/api/reject", "PUT", Priority::Medium)
                .with_enqueued_at(2)
                .with_max_retries(1),
        )
        .unwrap();
    let high = queue
        .enqueue(QueuedMutation::new("http://fake/api/ok", "DELETE", Priority::High).with_enqueued_at(3))
        .unwrap();

    let coordinator = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default());
    let summary = coordinator.drain_once().await.unwrap();

    assert_eq!(
        summary,
        SyncSummary {
            success_count: 2,
            failure_count: 1,
            total: 3
        }
    );
    assert_eq!(*gateway.replayed.lock(), vec![high, rejected, low]);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn offline_cycle_keeps_everything_for_later() {
    let queue = memory_queue();
    let gateway = FakeGateway::new();
    gateway.set_offline(true);
    for _ in 0..3 {
        queue
            .enqueue(QueuedMutation::new("http://fake/api/ok", "POST", Priority::Medium))
            .unwrap();
    }

    let coordinator = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default());
    let summary = coordinator.drain_once().await.unwrap();
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failure_count, 0);
    assert_eq!(summary.total, 3);
    assert!(queue
        .dequeue_all_ordered()
        .unwrap()
        .iter()
        .all(|m| m.retry_count == 1));

    gateway.set_offline(false);
    let summary = coordinator.drain_once().await.unwrap();
    assert_eq!(summary.success_count, 3);
    assert!(queue.is_empty().unwrap());
}

/// Store that fails to list, as an unreadable database would.
struct UnreadableStore;

impl MutationStore for UnreadableStore {
    fn put(&self, _record: &QueuedMutation) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn get(&self, _id: &str) -> Result<Option<QueuedMutation>, StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn remove(&self, _id: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn list(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn increment_retry(&self, _id: &str) -> Result<QueuedMutation, StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn next_seq(&self) -> Result<u64, StorageError> {
        Err(StorageError::Unavailable("locked".to_string()))
    }
    fn name(&self) -> &'static str {
        "unreadable"
    }
}

#[tokio::test]
async fn unreadable_store_aborts_without_broadcast() {
    let queue = OfflineMutationQueue::new(
        Arc::new(UnreadableStore),
        Some(Arc::new(MemoryMutationStore::new())),
    );
    let gateway = FakeGateway::new();
    let coordinator = SyncCoordinator::new(queue, gateway.clone(), &SyncConfig::default());
    let mut summaries = coordinator.subscribe();

    assert!(coordinator.drain_once().await.is_err());
    assert!(summaries.try_recv().is_err());
    assert!(gateway.replayed.lock().is_empty());
}

#[tokio::test]
async fn reconnect_wakes_spawned_coordinator() {
    let queue = memory_queue();
    let gateway = FakeGateway::new();
    queue
        .enqueue(QueuedMutation::new("http://fake/api/ok", "POST", Priority::High))
        .unwrap();

    let handle = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default()).spawn();
    let mut summaries = handle.subscribe();
    let mut watcher = ConnectivityWatcher::new(handle.waker(), false);
    assert!(watcher.observe(true).await);

    let message = tokio::time::timeout(Duration::from_secs(5), summaries.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        message,
        SyncMessage::SyncComplete(SyncSummary {
            success_count: 1,
            failure_count: 0,
            total: 1
        })
    );
    assert!(queue.is_empty().unwrap());

    assert!(handle.wake(WakeSignal::Manual).await);
    handle.shutdown().await;
}

#[test]
fn summary_message_wire_format() {
    let message = SyncMessage::SyncComplete(SyncSummary {
        success_count: 4,
        failure_count: 1,
        total: 6,
    });
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "type": "SYNC_COMPLETE",
            "data": { "successCount": 4, "failureCount": 1, "total": 6 }
        })
    );
}
