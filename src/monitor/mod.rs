//! Activity Monitor
//!
//! Tracks one usage session per foreground context. The session moves between
//! `Active` and `Paused` as the host reports input, visibility and focus, and
//! is finalized and handed to persistence exactly once when it ends.
//!
//! Timers are spawned tasks holding a weak handle to the monitor. Each one
//! carries the session generation it was armed for and does nothing once that
//! generation has been replaced.

pub mod events;
pub mod session;

pub use events::{EventKind, Listener, ListenerId, ListenerTable, MonitorEvent};
pub use session::{DeviceClass, Session};

use crate::gateway::RemoteGateway;
use crate::queue::{OfflineMutationQueue, Priority, QueuedMutation};
use crate::threshold::ThresholdEvaluator;
use crate::types::{new_session_id, AnchoredClock, SharedClock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Monitor timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds without input before an active session pauses
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between duration refreshes and threshold checks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_tick_interval_secs() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be greater than zero".to_string());
        }
        if self.tick_interval_secs == 0 {
            return Err("tick_interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// What the host tells the monitor about where it runs.
pub struct HostContext {
    /// Location recorded on new sessions
    pub context: String,
    /// Agent string used for device classification
    pub agent_info: String,
    pub clock: SharedClock,
}

impl HostContext {
    pub fn new(context: impl Into<String>, agent_info: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            agent_info: agent_info.into(),
            clock: Arc::new(AnchoredClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// No input for the idle timeout
    Idle,
    /// The host context lost visibility or focus
    Hidden,
    /// Paused by the caller
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No session has started yet
    Idle,
    Active,
    Paused(PauseReason),
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Pointer,
    Keyboard,
    Touch,
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Activity(ActivityKind),
    VisibilityChanged { visible: bool },
    FocusChanged { focused: bool },
    Unload,
}

struct Inner {
    state: MonitorState,
    session: Option<Session>,
    generation: u64,
    idle_epoch: u64,
    idle_timer: Option<JoinHandle<()>>,
    tick_timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timers(&mut self) {
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.tick_timer.take() {
            handle.abort();
        }
    }
}

struct Shared {
    config: MonitorConfig,
    host: HostContext,
    gateway: Arc<dyn RemoteGateway>,
    queue: OfflineMutationQueue,
    evaluator: ThresholdEvaluator,
    inner: Mutex<Inner>,
    listeners: parking_lot::Mutex<ListenerTable>,
}

pub struct ActivityMonitor {
    shared: Arc<Shared>,
}

impl ActivityMonitor {
    pub fn init(
        config: MonitorConfig,
        host: HostContext,
        gateway: Arc<dyn RemoteGateway>,
        queue: OfflineMutationQueue,
    ) -> Self {
        debug!(
            idle_timeout_secs = config.idle_timeout_secs,
            tick_interval_secs = config.tick_interval_secs,
            context = %host.context,
            "Activity monitor initialized"
        );
        let evaluator = ThresholdEvaluator::new(Arc::clone(&gateway));
        Self {
            shared: Arc::new(Shared {
                config,
                host,
                gateway,
                queue,
                evaluator,
                inner: Mutex::new(Inner {
                    state: MonitorState::Idle,
                    session: None,
                    generation: 0,
                    idle_epoch: 0,
                    idle_timer: None,
                    tick_timer: None,
                }),
                listeners: parking_lot::Mutex::new(ListenerTable::default()),
            }),
        }
    }

    /// End the current session and drop every listener.
    pub async fn destroy(self) {
        self.end_session().await;
        let cleared = self.shared.listeners.lock().clear();
        debug!(listeners = cleared, "Activity monitor destroyed");
    }

    /// Start a fresh session, ending (and persisting) any session in progress.
    pub async fn start_session(&self, owner_id: &str) -> Session {
        let shared = &self.shared;
        let (previous, session) = {
            let mut inner = shared.inner.lock().await;
            let previous = shared.finalize_locked(&mut inner);

            let session = Session::begin(
                new_session_id(),
                owner_id,
                shared.host.clock.now_ms(),
                &shared.host.context,
                &shared.host.agent_info,
            );
            inner.generation += 1;
            inner.session = Some(session.clone());
            inner.state = MonitorState::Active;
            shared.arm_idle_timer(&mut inner);
            shared.arm_tick(&mut inner);
            (previous, session)
        };

        if let Some(previous) = previous {
            shared.dispatch(MonitorEvent::SessionEnded(previous.clone()));
            shared.persist(previous).await;
        }

        info!(
            session_id = %session.id,
            owner_id,
            device_class = session.device_class.as_str(),
            "Session started"
        );
        shared.dispatch(MonitorEvent::SessionStarted(session.clone()));
        session
    }

    /// Finalize the current session. `None` when no session is running.
    pub async fn end_session(&self) -> Option<Session> {
        let shared = &self.shared;
        let ended = {
            let mut inner = shared.inner.lock().await;
            shared.finalize_locked(&mut inner)
        }?;

        info!(
            session_id = %ended.id,
            duration_ms = ended.duration,
            "Session ended"
        );
        shared.dispatch(MonitorEvent::SessionEnded(ended.clone()));
        shared.persist(ended.clone()).await;
        Some(ended)
    }

    pub async fn pause_session(&self) {
        self.shared.pause(PauseReason::Manual).await;
    }

    pub async fn resume_session(&self) {
        self.shared.resume(|_| true).await;
    }

    /// Input from the user. Resets the idle timer and wakes an idle-paused session.
    pub async fn record_activity(&self) {
        let shared = &self.shared;
        let state = {
            let mut inner = shared.inner.lock().await;
            if inner.state == MonitorState::Active {
                shared.arm_idle_timer(&mut inner);
            }
            inner.state
        };
        if state == MonitorState::Paused(PauseReason::Idle) {
            shared
                .resume(|reason| reason == PauseReason::Idle)
                .await;
        }
    }

    pub async fn handle_signal(&self, signal: HostSignal) {
        match signal {
            HostSignal::Activity(_) => self.record_activity().await,
            HostSignal::VisibilityChanged { visible: false }
            | HostSignal::FocusChanged { focused: false } => {
                self.shared.pause(PauseReason::Hidden).await;
            }
            HostSignal::VisibilityChanged { visible: true }
            | HostSignal::FocusChanged { focused: true } => {
                self.shared.resume(|_| true).await;
            }
            HostSignal::Unload => {
                self.end_session().await;
            }
        }
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.shared.inner.lock().await.session.clone()
    }

    pub async fn state(&self) -> MonitorState {
        self.shared.inner.lock().await.state
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().insert(kind, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.lock().remove(id)
    }
}

impl Shared {
    /// Stamp and detach the running session, cancelling its timers.
    fn finalize_locked(&self, inner: &mut Inner) -> Option<Session> {
        inner.cancel_timers();
        let mut session = inner.session.take()?;
        session.finish(self.host.clock.now_ms());
        inner.generation += 1;
        inner.state = MonitorState::Ended;
        Some(session)
    }

    fn arm_idle_timer(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(handle) = inner.idle_timer.take() {
            handle.abort();
        }
        inner.idle_epoch += 1;
        let generation = inner.generation;
        let epoch = inner.idle_epoch;
        let timeout = self.config.idle_timeout();
        let weak: Weak<Shared> = Arc::downgrade(self);
        inner.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_idle(generation, epoch).await;
            }
        }));
    }

    fn arm_tick(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(handle) = inner.tick_timer.take() {
            handle.abort();
        }
        let generation = inner.generation;
        let period = self.config.tick_interval();
        let weak: Weak<Shared> = Arc::downgrade(self);
        inner.tick_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if !shared.on_tick(generation).await {
                    break;
                }
            }
        }));
    }

    async fn on_idle(&self, generation: u64, epoch: u64) {
        let session_id = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation
                || inner.idle_epoch != epoch
                || inner.state != MonitorState::Active
            {
                return;
            }
            // This task is the idle timer; detach rather than abort it.
            inner.idle_timer = None;
            match self.pause_locked(&mut inner, PauseReason::Idle) {
                Some(id) => id,
                None => return,
            }
        };
        debug!(session_id = %session_id, "Session idle");
        self.dispatch(MonitorEvent::Idle { session_id });
    }

    /// Refresh the estimate and run threshold checks. Returns false once the
    /// generation is stale.
    async fn on_tick(&self, generation: u64) -> bool {
        let (owner_id, session_id, duration) = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return false;
            }
            if inner.state != MonitorState::Active {
                return true;
            }
            let now = self.host.clock.now_ms();
            let Some(session) = inner.session.as_mut() else {
                return false;
            };
            session.refresh_estimate(now);
            (
                session.owner_id.clone(),
                session.id.clone(),
                session.duration,
            )
        };

        let breaches = self.evaluator.check(&owner_id, duration).await;
        if breaches.is_empty() {
            return true;
        }
        if self.inner.lock().await.generation != generation {
            return false;
        }
        for breach in breaches {
            info!(
                session_id = %session_id,
                category = breach.category.as_str(),
                observed_minutes = breach.observed_minutes,
                limit_minutes = breach.limit_minutes,
                "Usage threshold reached"
            );
            self.dispatch(MonitorEvent::ThresholdReached {
                session_id: session_id.clone(),
                breach,
            });
        }
        true
    }

    /// Move an active session to paused. Returns the session id when it did.
    fn pause_locked(&self, inner: &mut Inner, reason: PauseReason) -> Option<String> {
        if inner.state != MonitorState::Active {
            return None;
        }
        inner.cancel_timers();
        inner.state = MonitorState::Paused(reason);
        let session = inner.session.as_mut()?;
        session.is_active = false;
        Some(session.id.clone())
    }

    async fn pause(&self, reason: PauseReason) {
        let mut inner = self.inner.lock().await;
        if let Some(session_id) = self.pause_locked(&mut inner, reason) {
            debug!(session_id = %session_id, ?reason, "Session paused");
        }
    }

    async fn resume<P>(self: &Arc<Self>, allowed: P)
    where
        P: Fn(PauseReason) -> bool,
    {
        let session_id = {
            let mut inner = self.inner.lock().await;
            let MonitorState::Paused(reason) = inner.state else {
                return;
            };
            if !allowed(reason) {
                return;
            }
            let Some(session) = inner.session.as_mut() else {
                return;
            };
            session.is_active = true;
            let session_id = session.id.clone();
            inner.state = MonitorState::Active;
            self.arm_idle_timer(&mut inner);
            self.arm_tick(&mut inner);
            session_id
        };
        debug!(session_id = %session_id, "Session resumed");
        self.dispatch(MonitorEvent::Active { session_id });
    }

    fn dispatch(&self, event: MonitorEvent) {
        let listeners = self.listeners.lock().matching(event.kind());
        for listener in listeners {
            listener(&event);
        }
    }

    /// Save a finished session, queueing it for sync when the remote is unreachable.
    async fn persist(&self, session: Session) {
        let err = match self.gateway.save_session(&session).await {
            Ok(()) => return,
            Err(err) => err,
        };
        warn!(
            session_id = %session.id,
            error = %err,
            "Failed to save session, queueing for background sync"
        );

        let mutation = match QueuedMutation::json_post(
            self.gateway.sessions_url(),
            &session,
            Priority::Medium,
        ) {
            Ok(mutation) => mutation.with_max_retries(self.queue.max_retries()),
            Err(err) => {
                error!(session_id = %session.id, error = %err, "Failed to encode session");
                return;
            }
        };
        if let Err(err) = self.queue.enqueue(mutation) {
            error!(
                session_id = %session.id,
                error = %err,
                "Offline queue unavailable, session dropped"
            );
        }
    }
}
