//! Integration tests for huemon-core
//!
//! These tests wire the stream client, aggregator and policy engine together
//! against a [`MockBridge`] and a [`ManualClock`], so midnight and quiet
//! periods can be crossed deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use huemon_core::mock::update_record;
use huemon_core::{
    Aggregator, Bridge, Clock, ConnectionEnd, DEFAULT_PRODUCT_NAME, Discovery, EnabledState,
    ManualClock, MockBridge, MonitorEvent, PolicyConfig, PolicyEngine, PolicySettings,
    PolicySource, RecordingExport, RecordingNotifier, RetryConfig, ScriptedConnection,
    ServiceKind, StreamClient, StreamConfig,
};

fn local(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn utc(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, h, m, s).unwrap()
}

fn motion(owner: &str, value: bool, at: DateTime<Utc>) -> String {
    update_record(
        owner,
        ServiceKind::Motion,
        &MockBridge::service_id(owner, ServiceKind::Motion),
        json!(value),
        Some(at),
    )
}

struct Harness {
    api: Arc<MockBridge>,
    clock: Arc<ManualClock>,
    export: Arc<RecordingExport>,
    notifier: Arc<RecordingNotifier>,
    aggregator: Arc<Aggregator>,
    stream: StreamClient,
    policy: PolicyEngine,
}

async fn harness(api: MockBridge, now: NaiveDateTime) -> Harness {
    let api = Arc::new(api);
    let clock = Arc::new(ManualClock::new(now));
    let export = Arc::new(RecordingExport::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let policies: Arc<dyn PolicySource> = Arc::new(HashMap::from([(
        "Hall".to_string(),
        PolicySettings {
            notify: true,
            suspend: true,
            quiet_times: Some("22:00-23:00".into()),
            ..Default::default()
        },
    )]));
    let bridge = Bridge::discover(
        api.as_ref(),
        clock.as_ref(),
        DEFAULT_PRODUCT_NAME,
        policies.as_ref(),
    )
    .await
    .unwrap();

    let aggregator = Arc::new(
        Aggregator::new(bridge, clock.clone(), export.clone()).with_discovery(Discovery {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            policies,
        }),
    );
    let stream = StreamClient::new(api.clone(), aggregator.clone(), notifier.clone()).with_config(
        StreamConfig {
            idle_timeout: Duration::from_secs(60),
            reconnect: RetryConfig::for_reconnect().jitter(false),
            notify_timeout: Duration::from_secs(1),
        },
    );
    let policy = PolicyEngine::new(api.clone(), aggregator.clone()).with_config(PolicyConfig {
        tick_interval: Duration::from_secs(60),
        call_timeout: Duration::from_secs(3),
    });

    Harness {
        api,
        clock,
        export,
        notifier,
        aggregator,
        stream,
        policy,
    }
}

fn motion_samples(bridge: &Bridge, sensor: &str) -> usize {
    bridge
        .sensor(sensor)
        .and_then(|s| s.service(ServiceKind::Motion))
        .map(|s| s.samples().iter().filter(|x| !x.value.is_null()).count())
        .unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn test_stream_and_policy_run_concurrently() {
    let api = MockBridge::new()
        .with_motion_sensor("d1", "Hall")
        .with_connection(
            ScriptedConnection::new(ConnectionEnd::Idle)
                .chunk(motion("d1", true, utc(18, 21, 55, 0)))
                .chunk(motion("d1", true, utc(18, 22, 10, 0))),
        )
        .with_connection(ScriptedConnection::new(ConnectionEnd::Idle));
    let h = harness(api, local(18, 22, 30, 0)).await;

    let cancel = CancellationToken::new();
    let stream = Arc::new(h.stream);
    let policy = Arc::new(h.policy);
    let stream_task = {
        let (stream, cancel) = (stream.clone(), cancel.clone());
        tokio::spawn(async move { stream.run(cancel).await })
    };
    let policy_task = {
        let (policy, cancel) = (policy.clone(), cancel.clone());
        tokio::spawn(async move { policy.run(cancel).await })
    };

    // long enough for one idle reconnect and a couple of ticks
    tokio::time::sleep(Duration::from_secs(90)).await;
    cancel.cancel();
    assert!(stream_task.await.unwrap().is_ok());
    policy_task.await.unwrap();

    assert_eq!(h.aggregator.read(|b| motion_samples(b, "d1")).await, 2);
    assert_eq!(h.api.connect_count(), 2);

    // only the sample before the quiet period alerted
    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].timestamp, local(18, 21, 55, 0));

    // quiet period active: all three suspendable services disabled exactly once
    let calls = h.api.enabled_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, _, enabled)| !enabled));
    h.aggregator
        .read(|b| {
            let hall = b.sensor("d1").unwrap();
            for service in hall.services() {
                let expected = if service.kind() == ServiceKind::Power {
                    EnabledState::NotApplicable
                } else {
                    EnabledState::Disabled
                };
                assert_eq!(service.enabled(), expected);
            }
        })
        .await;

    h.aggregator.flush().await.unwrap();
    assert_eq!(h.export.snapshots().len(), 1);
}

#[tokio::test]
async fn test_rollover_runs_once_across_both_triggers() {
    let api = MockBridge::new()
        .with_motion_sensor("d1", "Hall")
        .with_motion_sensor("d2", "Attic");
    let h = harness(api, local(18, 23, 59, 0)).await;
    let mut events = h.aggregator.events().subscribe();

    h.stream
        .handle_line(motion("d1", true, utc(18, 23, 59, 30)).trim())
        .await;

    h.clock.advance(TimeDelta::minutes(2));
    assert!(h.policy.tick().await.rolled_over);

    // first post-midnight event must not roll over again
    h.stream
        .handle_line(motion("d1", true, utc(19, 0, 0, 30)).trim())
        .await;
    assert!(!h.policy.tick().await.rolled_over);

    let snapshots = h.export.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].day, NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
    assert!(snapshots[0].profile.is_occupied(95));
    assert_eq!(h.aggregator.stats().rollovers, 1);
    assert_eq!(h.aggregator.day().await, h.clock.today());

    h.aggregator
        .read(|b| {
            let hall = b.sensor("d1").unwrap();
            // only the post-midnight sample survives the clear
            let motion = hall.service(ServiceKind::Motion).unwrap();
            assert_eq!(motion.samples().len(), 1);
            assert_eq!(motion.samples()[0].timestamp, local(19, 0, 0, 30));
            // daily battery check appended a reading to the new day
            assert_eq!(hall.service(ServiceKind::Power).unwrap().samples().len(), 1);
        })
        .await;

    let rolled = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, MonitorEvent::RolledOver { .. }))
        .count();
    assert_eq!(rolled, 1);
}

#[tokio::test]
async fn test_resync_drops_removed_sensors() {
    let api = MockBridge::new()
        .with_motion_sensor("d1", "Hall")
        .with_motion_sensor("d2", "Attic");
    let h = harness(api, local(18, 23, 59, 0)).await;
    assert_eq!(h.aggregator.read(|b| b.len()).await, 2);

    h.api.remove_device("d2");
    h.clock.advance(TimeDelta::minutes(2));
    assert!(h.policy.tick().await.rolled_over);
    assert_eq!(h.aggregator.read(|b| b.len()).await, 1);

    // events for the removed sensor are skipped, not fatal
    let skipped = h.aggregator.stats().skipped;
    h.stream
        .handle_line(motion("d2", true, utc(19, 0, 5, 0)).trim())
        .await;
    assert_eq!(h.aggregator.stats().skipped, skipped + 1);
    assert_eq!(h.aggregator.read(|b| motion_samples(b, "d2")).await, 0);
}

#[tokio::test]
async fn test_quiet_period_end_resumes_services() {
    let api = MockBridge::new().with_motion_sensor("d1", "Hall");
    let h = harness(api, local(18, 22, 30, 0)).await;

    assert_eq!(h.policy.tick().await.suspended, 3);
    h.clock.set(local(18, 23, 30, 0));
    assert_eq!(h.policy.tick().await.resumed, 3);
    assert_eq!(h.policy.tick().await.resumed, 0);

    let calls = h.api.enabled_calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls.iter().filter(|(_, _, enabled)| *enabled).count(), 3);
}
