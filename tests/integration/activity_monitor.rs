//! Activity monitor lifecycle against the fake gateway, with tokio time paused.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vigil::monitor::{
    ActivityKind, ActivityMonitor, EventKind, HostContext, HostSignal, MonitorConfig,
    MonitorEvent, MonitorState, PauseReason,
};
use vigil::queue::{OfflineMutationQueue, Priority};
use vigil::sync::{SyncConfig, SyncCoordinator};
use vigil::types::AnchoredClock;

use crate::integration::support::{memory_queue, FakeGateway, SESSIONS_URL};

const MINUTE: Duration = Duration::from_secs(60);
const EPSILON: Duration = Duration::from_millis(1);
const T0: u64 = 1_700_000_000_000;

fn monitor(
    gateway: Arc<FakeGateway>,
    config: MonitorConfig,
    agent: &str,
) -> (ActivityMonitor, OfflineMutationQueue) {
    let queue = memory_queue();
    let host = HostContext::new("app://home", agent)
        .with_clock(Arc::new(AnchoredClock::starting_at(T0)));
    (
        ActivityMonitor::init(config, host, gateway, queue.clone()),
        queue,
    )
}

fn long_idle() -> MonitorConfig {
    MonitorConfig {
        idle_timeout_secs: 3_600,
        ..MonitorConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn twenty_five_minute_session_with_ten_minute_pause() {
    let gateway = FakeGateway::new();
    let (monitor, _queue) = monitor(gateway.clone(), long_idle(), "Mozilla/5.0 (iPad; CPU OS 17_0)");

    let started = monitor.start_session("kid-1").await;
    assert_eq!(started.start_time, T0);

    // Land just after the 10-minute tick so its estimate is in.
    tokio::time::sleep(10 * MINUTE + EPSILON).await;
    monitor.pause_session().await;
    let frozen = monitor.current_session().await.unwrap().duration;
    assert_eq!(frozen, 10 * 60_000);

    tokio::time::sleep(10 * MINUTE - EPSILON).await;
    assert_eq!(monitor.current_session().await.unwrap().duration, frozen);
    monitor.resume_session().await;

    tokio::time::sleep(5 * MINUTE).await;
    let ended = monitor.end_session().await.unwrap();
    assert_eq!(ended.duration, 25 * 60_000);
    assert_eq!(ended.end_time, Some(T0 + 25 * 60_000));
    assert!(!ended.is_active);

    let saved = gateway.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, started.id);
    assert_eq!(saved[0].device_class.as_str(), "tablet");
}

#[tokio::test(start_paused = true)]
async fn idle_then_visibility_resume() {
    let gateway = FakeGateway::new();
    let (monitor, _queue) = monitor(gateway, MonitorConfig::default(), "Mozilla/5.0 (X11; Linux)");
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Idle, EventKind::Active] {
        let sink = Arc::clone(&events);
        monitor.subscribe(kind, move |event: &MonitorEvent| sink.lock().push(event.kind()));
    }

    monitor.start_session("kid-1").await;
    tokio::time::sleep(Duration::from_secs(299)).await;
    monitor
        .handle_signal(HostSignal::Activity(ActivityKind::Touch))
        .await;
    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(monitor.state().await, MonitorState::Active);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.state().await, MonitorState::Paused(PauseReason::Idle));

    monitor
        .handle_signal(HostSignal::VisibilityChanged { visible: true })
        .await;
    assert_eq!(monitor.state().await, MonitorState::Active);
    assert_eq!(*events.lock(), vec![EventKind::Idle, EventKind::Active]);
}

#[tokio::test(start_paused = true)]
async fn unload_while_offline_queues_session_for_sync() {
    let gateway = FakeGateway::new();
    gateway.set_offline(true);
    let (monitor, queue) = monitor(gateway.clone(), long_idle(), "Mozilla/5.0 (Linux; Android 14) Mobile");

    let session = monitor.start_session("kid-2").await;
    tokio::time::sleep(3 * MINUTE).await;
    monitor.handle_signal(HostSignal::Unload).await;
    assert_eq!(monitor.state().await, MonitorState::Ended);
    assert!(gateway.saved.lock().is_empty());

    let queued = queue.dequeue_all_ordered().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].url, SESSIONS_URL);
    assert_eq!(queued[0].priority, Priority::Medium);
    let body: serde_json::Value = serde_json::from_str(queued[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["id"], session.id.as_str());
    assert_eq!(body["duration"], 3 * 60_000);
    assert_eq!(body["deviceClass"], "mobile");

    gateway.set_offline(false);
    let coordinator = SyncCoordinator::new(queue.clone(), gateway.clone(), &SyncConfig::default());
    let summary = coordinator.drain_once().await.unwrap();
    assert_eq!(summary.success_count, 1);
    assert!(queue.is_empty().unwrap());
    assert_eq!(*gateway.replayed.lock(), vec![queued[0].id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn destroy_drops_listeners_and_persists() {
    let gateway = FakeGateway::new();
    let (monitor, _queue) = monitor(gateway.clone(), MonitorConfig::default(), "curl/8.0");
    let ended = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&ended);
    monitor.subscribe(EventKind::SessionEnded, move |_| *sink.lock() += 1);

    monitor.start_session("kid-3").await;
    tokio::time::sleep(MINUTE).await;
    monitor.destroy().await;

    assert_eq!(*ended.lock(), 1);
    assert_eq!(gateway.saved.lock().len(), 1);
    assert_eq!(gateway.saved.lock()[0].duration, 60_000);
}
