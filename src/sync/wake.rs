//! Wake sources feeding the sync coordinator.

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Why the coordinator should drain the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeSignal {
    /// The host went from offline to online
    ConnectivityRestored,
    /// A registered periodic wake fired
    Periodic { tag: String },
    /// Requested directly, e.g. from the CLI
    Manual,
}

/// Turns online/offline observations into wakes on offline to online edges.
pub struct ConnectivityWatcher {
    online: bool,
    wake: mpsc::Sender<WakeSignal>,
}

impl ConnectivityWatcher {
    pub fn new(wake: mpsc::Sender<WakeSignal>, initially_online: bool) -> Self {
        Self {
            online: initially_online,
            wake,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record an observation. Returns whether a wake was sent.
    pub async fn observe(&mut self, online: bool) -> bool {
        let restored = online && !self.online;
        if online != self.online {
            debug!(online, "Connectivity changed");
        }
        self.online = online;
        if !restored {
            return false;
        }
        info!("Connectivity restored, waking sync");
        if self.wake.send(WakeSignal::ConnectivityRestored).await.is_err() {
            debug!("Sync coordinator is gone, dropping connectivity wake");
            return false;
        }
        true
    }

    /// Follow a stream of observations until it ends.
    pub fn watch<S>(mut self, observations: S) -> JoinHandle<()>
    where
        S: Stream<Item = bool> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut observations = Box::pin(observations);
            while let Some(online) = observations.next().await {
                self.observe(online).await;
            }
        })
    }
}

/// Send `WakeSignal::Periodic { tag }` every `interval`, first after one interval.
///
/// The task stops when the receiving coordinator goes away.
pub fn spawn_periodic_wake(
    tag: impl Into<String>,
    interval: Duration,
    wake: mpsc::Sender<WakeSignal>,
) -> JoinHandle<()> {
    let tag = tag.into();
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!(tag = %tag, "Periodic sync wake");
            if wake
                .send(WakeSignal::Periodic { tag: tag.clone() })
                .await
                .is_err()
            {
                break;
            }
        }
    })
}
