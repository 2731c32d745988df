//! Property-based tests for drain ordering and retry accounting

use proptest::prelude::*;
use std::sync::Arc;
use vigil::queue::{
    sort_for_drain, MemoryMutationStore, OfflineMutationQueue, Priority, QueuedMutation,
};
use vigil::sync::{RetryDecision, RetryPolicy};

fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::High), Just(Priority::Medium), Just(Priority::Low)]
}

fn rank(priority: Priority) -> u8 {
    match priority {
        Priority::High => 0,
        Priority::Medium => 1,
        Priority::Low => 2,
    }
}

proptest! {
    /// Drained order is high before medium before low, then oldest first,
    /// then insertion order.
    #[test]
    fn dequeue_respects_priority_then_age(
        records in prop::collection::vec((priority(), 0u64..50), 0..40)
    ) {
        let queue = OfflineMutationQueue::new(Arc::new(MemoryMutationStore::new()), None);
        for (i, (priority, enqueued_at)) in records.iter().enumerate() {
            let mut m = QueuedMutation::new("http://x/api", "POST", *priority)
                .with_enqueued_at(*enqueued_at);
            m.id = format!("m{:03}", i);
            queue.enqueue(m).unwrap();
        }

        let drained = queue.dequeue_all_ordered().unwrap();
        prop_assert_eq!(drained.len(), records.len());
        for pair in drained.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let key_a = (rank(a.priority), a.enqueued_at, a.seq);
            let key_b = (rank(b.priority), b.enqueued_at, b.seq);
            prop_assert!(key_a < key_b, "{:?} drained before {:?}", key_a, key_b);
        }
    }

    /// Sorting is stable with respect to the drain key alone.
    #[test]
    fn sort_for_drain_is_idempotent(
        records in prop::collection::vec((priority(), 0u64..10, 0u64..10), 0..30)
    ) {
        let mut mutations: Vec<QueuedMutation> = records
            .iter()
            .map(|(priority, enqueued_at, seq)| {
                let mut m = QueuedMutation::new("http://x", "POST", *priority)
                    .with_enqueued_at(*enqueued_at);
                m.seq = *seq;
                m
            })
            .collect();
        sort_for_drain(&mut mutations);
        let once: Vec<_> = mutations.iter().map(QueuedMutation::drain_key).collect();
        sort_for_drain(&mut mutations);
        let twice: Vec<_> = mutations.iter().map(QueuedMutation::drain_key).collect();
        prop_assert_eq!(once, twice);
    }

    /// After N consecutive failures a record is either still queued with
    /// `min(N, max_retries - 1)` retries or was dropped on failure `max_retries`.
    #[test]
    fn retry_count_tracks_consecutive_failures(max_retries in 1u32..8, failures in 0u32..12) {
        let queue = OfflineMutationQueue::new(Arc::new(MemoryMutationStore::new()), None);
        let id = queue
            .enqueue(QueuedMutation::new("http://x", "POST", Priority::Low).with_max_retries(max_retries))
            .unwrap();
        let policy = RetryPolicy;

        let mut dropped_on = None;
        for attempt in 1..=failures {
            let record = queue.get(&id).unwrap().unwrap();
            match policy.on_failure(&record) {
                RetryDecision::Retry => {
                    queue.increment_retry(&id).unwrap();
                }
                RetryDecision::Drop => {
                    queue.remove_by_id(&id).unwrap();
                    dropped_on = Some(attempt);
                    break;
                }
            }
        }

        if failures >= max_retries {
            prop_assert_eq!(dropped_on, Some(max_retries));
            prop_assert!(queue.get(&id).unwrap().is_none());
        } else {
            prop_assert_eq!(dropped_on, None);
            let record = queue.get(&id).unwrap().unwrap();
            prop_assert_eq!(record.retry_count, failures.min(max_retries - 1));
        }
    }
}
