//! Monitor lifecycle events and the listener table that dispatches them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::monitor::Session;
use crate::threshold::ThresholdBreach;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    Idle,
    Active,
    ThresholdReached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    SessionStarted(Session),
    SessionEnded(Session),
    Idle { session_id: String },
    Active { session_id: String },
    ThresholdReached {
        session_id: String,
        breach: ThresholdBreach,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::SessionStarted(_) => EventKind::SessionStarted,
            MonitorEvent::SessionEnded(_) => EventKind::SessionEnded,
            MonitorEvent::Idle { .. } => EventKind::Idle,
            MonitorEvent::Active { .. } => EventKind::Active,
            MonitorEvent::ThresholdReached { .. } => EventKind::ThresholdReached,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

#[derive(Default)]
pub struct ListenerTable {
    next_id: u64,
    entries: BTreeMap<ListenerId, (EventKind, Listener)>,
}

impl ListenerTable {
    pub fn insert(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.insert(id, (kind, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop every listener, returning how many were registered.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    /// Listeners registered for `kind`, in subscription order.
    pub fn matching(&self, kind: EventKind) -> Vec<Listener> {
        self.entries
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }
}
