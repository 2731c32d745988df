//! Retry decisions for failed deliveries.

use crate::queue::QueuedMutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the record and bump its retry count
    Retry,
    /// Remove the record and count a permanent failure
    Drop,
}

/// The single place that decides what happens after a failed delivery.
///
/// Every failure counts, whether the remote answered with a non-2xx status or
/// could not be reached. A record is dropped on the failure that brings
/// `retry_count + 1` to `max_retries`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn on_failure(&self, mutation: &QueuedMutation) -> RetryDecision {
        if mutation.is_last_attempt() {
            RetryDecision::Drop
        } else {
            RetryDecision::Retry
        }
    }
}
