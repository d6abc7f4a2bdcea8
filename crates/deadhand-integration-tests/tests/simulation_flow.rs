//! Integration test: dry-run simulation against a monitored switch.
//!
//! Exercises the readiness report end to end:
//! 1. Arm a switch and distribute sealed shares to guardians
//! 2. Guardians publish heartbeats; the monitor polls
//! 3. The simulation walks its five steps and reports progress
//! 4. Stored ciphertext, guardian loss and cancellation change the verdict
//! 5. A simulation never touches the switch or its ciphertext

use std::sync::{Arc, Mutex};

use deadhand_crypto::aead::{encrypt, DataKey};
use deadhand_crypto::ed25519::SigningKey;
use deadhand_crypto::x25519::X25519StaticSecret;
use deadhand_guardian::distribution::{distribute_shares, MemoryShareSink};
use deadhand_guardian::heartbeat::publish_heartbeat;
use deadhand_guardian::monitor::{HealthMonitor, MonitorConfig};
use deadhand_guardian::source::StaticHeartbeatSource;
use deadhand_guardian::task::{CancellationSource, CancellationToken};
use deadhand_sim::engine::{SimulationConfig, SimulationEngine};
use deadhand_sim::step::{NoProgress, SimulationStep, StepId, StepStatus, STEP_ORDER};
use deadhand_sim::SimulationError;
use deadhand_switch::blob::MemoryBlobStore;
use deadhand_switch::builder::SwitchBuilder;
use deadhand_switch::lifecycle::{Recipient, Switch};
use deadhand_types::guardian::{Guardian, GuardianKind};
use deadhand_types::health::RecoveryClassification;
use deadhand_types::GuardianId;

const NOW: u64 = 1_800_000_000;
const HOUR: u64 = 3600;
const RELAY: &str = "wss://relay.test";
const BLOB_LOCATION: &str = "vault/message.bin";

struct Fixture {
    switch: Switch,
    source: StaticHeartbeatSource,
    blobs: Arc<MemoryBlobStore>,
}

/// Armed switch whose guardians last checked in `ages` hours ago.
async fn fixture(ages: &[Option<u64>], needed: u8) -> Fixture {
    let mut source = StaticHeartbeatSource::new();
    let mut guardians = Vec::new();
    for (i, age) in ages.iter().enumerate() {
        let signing = SigningKey::generate();
        if let Some(age) = age {
            source = source.with_record(RELAY, publish_heartbeat(&signing, NOW - age * HOUR));
        }
        guardians.push(Guardian::new(
            GuardianId(signing.verifying_key().to_bytes()),
            format!("guardian-{}", i + 1),
            GuardianKind::Personal,
            X25519StaticSecret::random().public_key().to_bytes(),
        ));
    }

    let dek = DataKey::generate();
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs
        .put(BLOB_LOCATION, encrypt(b"instructions for my family", &dek).expect("encrypt"))
        .await;

    let (mut switch, shares) = SwitchBuilder::new("sw-sim", 168.0, needed)
        .guardians(guardians)
        .recipient(Recipient::new("Alice", "alice@example.com"))
        .ciphertext_location(BLOB_LOCATION)
        .build(&dek, NOW - 24 * HOUR)
        .expect("build");
    let sink = MemoryShareSink::new();
    let report = distribute_shares(&shares, &mut switch.guardians, &sink)
        .await
        .expect("distribute");
    assert!(report.is_complete());

    Fixture { switch, source, blobs }
}

async fn engine(fixture: Fixture, live: bool) -> (Switch, SimulationEngine, Arc<MemoryBlobStore>) {
    let monitor = Arc::new(
        HealthMonitor::new(Arc::new(fixture.source), MonitorConfig::new(vec![RELAY.into()]))
            .expect("monitor"),
    );
    if !live {
        let ids: Vec<GuardianId> = fixture.switch.guardians.iter().map(|g| g.identity).collect();
        monitor.poll(&ids, NOW).await;
    }
    let engine = SimulationEngine::new(
        monitor,
        SimulationConfig {
            query_live_guardians: live,
            ..SimulationConfig::default()
        },
    )
    .with_blob_locator(fixture.blobs.clone());
    (fixture.switch, engine, fixture.blobs)
}

#[tokio::test]
async fn healthy_switch_simulates_cleanly() {
    let fixture = fixture(&[Some(1), Some(2), Some(3), Some(4), Some(5)], 3).await;
    let (switch, engine, _blobs) = engine(fixture, true).await;
    let before = switch.clone();

    let seen = Mutex::new(Vec::<SimulationStep>::new());
    let progress = |step: &SimulationStep| {
        if let Ok(mut seen) = seen.lock() {
            seen.push(step.clone());
        }
    };
    let result = engine
        .run(&switch, NOW, &progress, &CancellationToken::never())
        .await
        .expect("run");

    assert_eq!(result.overall, StepStatus::Success);
    assert_eq!(result.confidence, 100);
    assert!(result.threshold_met);
    assert_eq!(result.guardians_responded, 5);
    assert_eq!(result.estimated_recovery_hours, Some(1.5));
    assert_eq!(
        result.network.as_ref().map(|n| n.classification),
        Some(RecoveryClassification::Healthy)
    );
    assert_eq!(result.steps.iter().map(|s| s.id).collect::<Vec<_>>(), STEP_ORDER.to_vec());

    let seen = seen.into_inner().expect("progress log");
    assert_eq!(seen.len(), 15);
    for id in STEP_ORDER {
        let statuses: Vec<StepStatus> = seen.iter().filter(|s| s.id == id).map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Pending, StepStatus::Running, StepStatus::Success]);
    }

    assert_eq!(switch, before);
}

#[tokio::test]
async fn missing_ciphertext_fails_validation() {
    let fixture = fixture(&[Some(1), Some(1), Some(1)], 2).await;
    let (switch, engine, blobs) = engine(fixture, false).await;
    blobs.remove(BLOB_LOCATION).await;

    let result = engine
        .run(&switch, NOW, &NoProgress, &CancellationToken::never())
        .await
        .expect("run");

    let validation = result.step(StepId::ConfigValidation).expect("step");
    assert_eq!(validation.status, StepStatus::Error);
    assert_eq!(result.overall, StepStatus::Error);
    assert_eq!(result.confidence, 0);
}

#[tokio::test]
async fn losing_guardians_lowers_the_verdict() {
    // k = 3 of 5. Two healthy, one warning, two silent for days.
    let fixture = fixture(&[Some(1), Some(1), Some(40), Some(100), None], 3).await;
    let (switch, engine, _blobs) = engine(fixture, false).await;

    let result = engine
        .run(&switch, NOW, &NoProgress, &CancellationToken::never())
        .await
        .expect("run");

    assert_eq!(
        result.network.as_ref().map(|n| n.classification),
        Some(RecoveryClassification::Degraded)
    );
    assert!(result.threshold_met);
    assert_eq!(result.guardians_responded, 3);
    assert_eq!(result.overall, StepStatus::Warning);
    assert!(result.confidence >= 50 && result.confidence < 100);
    // The third share comes from the guardian in warning.
    assert_eq!(result.estimated_recovery_hours, Some(12.5));

    // A day later the warning guardian is critical too.
    let later = engine
        .run(&switch, NOW + 40 * HOUR, &NoProgress, &CancellationToken::never())
        .await
        .expect("run");
    assert!(!later.threshold_met);
    assert_eq!(later.overall, StepStatus::Error);
    assert_eq!(later.estimated_recovery_hours, None);
}

#[tokio::test]
async fn cancelled_before_start_emits_nothing() {
    let fixture = fixture(&[Some(1), Some(1), Some(1)], 2).await;
    let (switch, engine, _blobs) = engine(fixture, false).await;

    let source = CancellationSource::new();
    source.cancel();
    let calls = Mutex::new(0usize);
    let progress = |_: &SimulationStep| {
        if let Ok(mut calls) = calls.lock() {
            *calls += 1;
        }
    };

    let err = engine
        .run(&switch, NOW, &progress, &source.token())
        .await
        .expect_err("cancelled");
    assert_eq!(err, SimulationError::Cancelled);
    assert_eq!(calls.into_inner().expect("calls"), 0);
}
