//! Shared helpers: timestamps, id generation, and the wall clock used by timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique id with the given prefix.
pub fn new_id(prefix: &str) -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{ts}-{pid}-{seq}")
}

/// Generate a unique session id.
pub fn new_session_id() -> String {
    new_id("sess")
}

/// Generate a unique queued mutation id.
pub fn new_mutation_id() -> String {
    new_id("mut")
}

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock anchored to the tokio monotonic clock.
///
/// Reads the system time once and advances with `tokio::time::Instant`, so a
/// runtime with paused time moves this clock together with its timers.
pub struct AnchoredClock {
    anchor_ms: u64,
    anchor: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new() -> Self {
        Self::starting_at(now_millis())
    }

    pub fn starting_at(anchor_ms: u64) -> Self {
        Self {
            anchor_ms,
            anchor: tokio::time::Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for AnchoredClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for AnchoredClock {
    fn now_ms(&self) -> u64 {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.anchor);
        self.anchor_ms + elapsed.as_millis() as u64
    }
}
