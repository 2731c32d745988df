//! Threshold evaluation through the gateway and from monitor ticks.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vigil::monitor::{ActivityMonitor, EventKind, HostContext, MonitorConfig, MonitorEvent};
use vigil::threshold::{ThresholdCategory, ThresholdConfig, ThresholdEvaluator, UsageStats};
use vigil::types::AnchoredClock;

use crate::integration::support::{memory_queue, FakeGateway};

const MINUTE_MS: u64 = 60_000;

fn stats(today_minutes: u64, weekly_minutes: u64) -> UsageStats {
    UsageStats {
        today_time: today_minutes * MINUTE_MS,
        weekly_time: weekly_minutes * MINUTE_MS,
        ..UsageStats::default()
    }
}

#[tokio::test]
async fn every_reached_limit_is_reported_in_order() {
    let gateway = FakeGateway::new();
    *gateway.thresholds.lock() = Some(ThresholdConfig::new("kid-1"));
    *gateway.stats.lock() = stats(120, 601);

    let evaluator = ThresholdEvaluator::new(gateway.clone());
    let breaches = evaluator.check("kid-1", 30 * MINUTE_MS).await;
    let categories: Vec<ThresholdCategory> = breaches.iter().map(|b| b.category).collect();
    assert_eq!(
        categories,
        vec![
            ThresholdCategory::Daily,
            ThresholdCategory::Weekly,
            ThresholdCategory::Break
        ]
    );
    assert_eq!(breaches[1].observed_minutes, 601.0);
    assert_eq!(breaches[1].limit_minutes, 600);
}

#[tokio::test]
async fn just_under_every_limit_reports_nothing() {
    let gateway = FakeGateway::new();
    *gateway.thresholds.lock() = Some(ThresholdConfig::new("kid-1"));
    *gateway.stats.lock() = UsageStats {
        today_time: 120 * MINUTE_MS - 1,
        weekly_time: 600 * MINUTE_MS - 1,
        ..UsageStats::default()
    };

    let evaluator = ThresholdEvaluator::new(gateway);
    assert!(evaluator.check("kid-1", 30 * MINUTE_MS - 1).await.is_empty());
}

#[tokio::test]
async fn disabled_missing_or_unreachable_config_is_quiet() {
    let gateway = FakeGateway::new();
    *gateway.stats.lock() = stats(500, 5_000);
    let evaluator = ThresholdEvaluator::new(gateway.clone());

    assert!(evaluator.check("kid-1", 90 * MINUTE_MS).await.is_empty());

    *gateway.thresholds.lock() = Some(ThresholdConfig {
        enabled: false,
        ..ThresholdConfig::new("kid-1")
    });
    assert!(evaluator.check("kid-1", 90 * MINUTE_MS).await.is_empty());

    *gateway.thresholds.lock() = Some(ThresholdConfig::new("kid-1"));
    gateway.set_offline(true);
    assert!(evaluator.check("kid-1", 90 * MINUTE_MS).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn monitor_tick_raises_daily_limit_event() {
    let gateway = FakeGateway::new();
    *gateway.thresholds.lock() = Some(ThresholdConfig::new("kid-1"));
    *gateway.stats.lock() = stats(125, 0);

    let host = HostContext::new("app://home", "Mozilla/5.0 (X11; Linux)")
        .with_clock(Arc::new(AnchoredClock::starting_at(0)));
    let monitor = ActivityMonitor::init(MonitorConfig::default(), host, gateway, memory_queue());
    let reached = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reached);
    monitor.subscribe(EventKind::ThresholdReached, move |event: &MonitorEvent| {
        if let MonitorEvent::ThresholdReached { breach, .. } = event {
            sink.lock().push(breach.category);
        }
    });

    let session = monitor.start_session("kid-1").await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(*reached.lock(), vec![ThresholdCategory::Daily]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(reached.lock().len(), 2);

    let ended = monitor.end_session().await.unwrap();
    assert_eq!(ended.id, session.id);
}
