//! Integration test: guardian heartbeats to network readiness.
//!
//! Exercises the monitoring path end to end:
//! 1. Guardians sign heartbeats and publish them to relays
//! 2. The monitor polls every relay for every guardian
//! 3. Dead, slow and lying relays only remove evidence
//! 4. Per-guardian health aggregates into a k-of-n verdict
//! 5. A cached snapshot re-ages without touching relays

use std::sync::Arc;
use std::time::Duration;

use deadhand_crypto::ed25519::SigningKey;
use deadhand_guardian::heartbeat::publish_heartbeat;
use deadhand_guardian::monitor::{HealthMonitor, MonitorConfig};
use deadhand_guardian::network::{aggregate, responsive_guardians};
use deadhand_guardian::source::StaticHeartbeatSource;
use deadhand_types::health::{HealthStatus, RecoveryClassification};
use deadhand_types::GuardianId;

const NOW: u64 = 1_800_000_000;
const HOUR: u64 = 3600;
const RELAY_A: &str = "wss://relay-a.test";
const RELAY_B: &str = "wss://relay-b.test";
const RELAY_DEAD: &str = "wss://relay-dead.test";

fn guardian_keys(n: usize) -> Vec<SigningKey> {
    (0..n).map(|_| SigningKey::generate()).collect()
}

fn id_of(key: &SigningKey) -> GuardianId {
    GuardianId(key.verifying_key().to_bytes())
}

#[tokio::test]
async fn degraded_network_still_recovers() {
    // 2 healthy, 2 warning, 1 silent; k = 3.
    let keys = guardian_keys(5);
    let ages = [Some(2 * HOUR), Some(10 * HOUR), Some(30 * HOUR), Some(50 * HOUR), None];

    let mut source = StaticHeartbeatSource::new().with_failing_relay(RELAY_DEAD);
    for (key, age) in keys.iter().zip(ages) {
        if let Some(age) = age {
            source = source.with_record(RELAY_A, publish_heartbeat(key, NOW - age));
        }
    }

    let monitor = HealthMonitor::new(
        Arc::new(source),
        MonitorConfig::new(vec![RELAY_A.into(), RELAY_DEAD.into()]),
    )
    .expect("monitor");
    let ids: Vec<GuardianId> = keys.iter().map(id_of).collect();
    let snapshot = monitor.poll(&ids, NOW).await;

    assert_eq!(snapshot.relay_failures.len(), 5, "one failure per guardian on the dead relay");
    assert!(snapshot.relay_failures.iter().all(|f| f.relay == RELAY_DEAD));

    let statuses: Vec<HealthStatus> = ids.iter().map(|id| snapshot.guardians[id].status).collect();
    assert_eq!(
        statuses,
        vec![
            HealthStatus::Healthy,
            HealthStatus::Healthy,
            HealthStatus::Warning,
            HealthStatus::Warning,
            HealthStatus::Unknown,
        ]
    );

    let network = aggregate(&snapshot.guardians, 3);
    assert_eq!(network.classification, RecoveryClassification::Degraded);
    assert!(network.can_recover);
    assert_eq!(network.counts.responsive(), 4);
    assert_eq!(responsive_guardians(&snapshot.guardians).len(), 4);

    let strict = aggregate(&snapshot.guardians, 5);
    assert_eq!(strict.classification, RecoveryClassification::Critical);
    assert!(!strict.can_recover);
}

#[tokio::test]
async fn forged_heartbeat_is_not_evidence() {
    let keys = guardian_keys(2);
    let victim = id_of(&keys[0]);

    // Signed by the second guardian, relabelled as the first.
    let mut forged = publish_heartbeat(&keys[1], NOW - HOUR);
    forged.guardian = victim;

    let source = StaticHeartbeatSource::new().with_record(RELAY_A, forged);
    let monitor =
        HealthMonitor::new(Arc::new(source), MonitorConfig::new(vec![RELAY_A.into()])).expect("monitor");
    let snapshot = monitor.poll(&[victim], NOW).await;

    let health = &snapshot.guardians[&victim];
    assert_eq!(health.status, HealthStatus::Unknown);
    assert_eq!(health.last_heartbeat_at, None);
}

#[tokio::test]
async fn heartbeat_from_the_future_is_ignored() {
    let keys = guardian_keys(1);
    let id = id_of(&keys[0]);

    let source = StaticHeartbeatSource::new()
        .with_record(RELAY_A, publish_heartbeat(&keys[0], NOW + 2 * HOUR))
        .with_record(RELAY_A, publish_heartbeat(&keys[0], NOW - 30 * HOUR));
    let monitor =
        HealthMonitor::new(Arc::new(source), MonitorConfig::new(vec![RELAY_A.into()])).expect("monitor");
    let snapshot = monitor.poll(&[id], NOW).await;

    let health = &snapshot.guardians[&id];
    assert_eq!(health.status, HealthStatus::Warning);
    assert_eq!(health.last_heartbeat_at, Some(NOW - 30 * HOUR));
}

#[tokio::test]
async fn same_heartbeat_on_two_relays_is_merged() {
    let keys = guardian_keys(1);
    let id = id_of(&keys[0]);
    let record = publish_heartbeat(&keys[0], NOW - HOUR);

    let source = StaticHeartbeatSource::new()
        .with_record(RELAY_A, record.clone())
        .with_record(RELAY_B, record);
    let monitor = HealthMonitor::new(
        Arc::new(source),
        MonitorConfig::new(vec![RELAY_A.into(), RELAY_B.into()]),
    )
    .expect("monitor");
    let snapshot = monitor.poll(&[id], NOW).await;

    let health = &snapshot.guardians[&id];
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(
        health.relays_seen.iter().map(String::as_str).collect::<Vec<_>>(),
        vec![RELAY_A, RELAY_B]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_relay_times_out_without_blocking_the_poll() {
    let keys = guardian_keys(1);
    let id = id_of(&keys[0]);

    let source = StaticHeartbeatSource::new()
        .with_record(RELAY_A, publish_heartbeat(&keys[0], NOW - HOUR))
        .with_delay(RELAY_B, Duration::from_secs(3600));
    let mut config = MonitorConfig::new(vec![RELAY_A.into(), RELAY_B.into()]);
    config.relay_timeout = Duration::from_secs(5);
    let monitor = HealthMonitor::new(Arc::new(source), config).expect("monitor");

    let snapshot = monitor.poll(&[id], NOW).await;
    assert_eq!(snapshot.guardians[&id].status, HealthStatus::Healthy);
    assert_eq!(snapshot.relay_failures.len(), 1);
    assert_eq!(snapshot.relay_failures[0].relay, RELAY_B);
}

#[tokio::test]
async fn cached_snapshot_reages_without_polling() {
    let keys = guardian_keys(3);
    let mut source = StaticHeartbeatSource::new();
    for key in &keys {
        source = source.with_record(RELAY_A, publish_heartbeat(key, NOW - HOUR));
    }
    let source = Arc::new(source);
    let monitor = HealthMonitor::new(source.clone(), MonitorConfig::new(vec![RELAY_A.into()]))
        .expect("monitor");
    let ids: Vec<GuardianId> = keys.iter().map(id_of).collect();
    monitor.poll(&ids, NOW).await;
    let calls = source.call_count();

    let cached = monitor.cached().await;
    let later = cached.reclassify(&ids, NOW + 30 * HOUR, monitor.thresholds());
    assert!(later.guardians.values().all(|h| h.status == HealthStatus::Warning));
    assert_eq!(aggregate(&later.guardians, 2).classification, RecoveryClassification::Degraded);

    let much_later = cached.reclassify(&ids, NOW + 200 * HOUR, monitor.thresholds());
    assert!(much_later.guardians.values().all(|h| h.status == HealthStatus::Critical));
    assert!(much_later.guardians.values().all(|h| h.long_silent));
    assert_eq!(source.call_count(), calls);
}
