//! Signed guardian heartbeats.
//!
//! Guardians periodically publish a heartbeat to one or more relays. The
//! heartbeat proves the guardian is still reachable and able to release its
//! share when the switch fires.
//!
//! ## Signed Message
//!
//! ```text
//! msg = BLAKE3::derive_key(
//!     "Deadhand v1 guardian-heartbeat",
//!     LE32(32) || guardian_pk || LE32(8) || timestamp_le
//! )
//! signature = Ed25519_Sign(guardian_sk, msg)
//! ```
//!
//! ## Health Status
//!
//! With `age = now - latest_valid_heartbeat`:
//!
//! - **Healthy**: `age < healthy_hours`
//! - **Warning**: `healthy_hours <= age < warning_hours`
//! - **Critical**: `age >= warning_hours`
//! - **Unknown**: no valid heartbeat from any relay

use std::collections::{BTreeMap, BTreeSet};

use deadhand_crypto::blake3::{self, contexts};
use deadhand_crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use deadhand_types::config::HealthThresholds;
use deadhand_types::health::{GuardianHealth, HealthStatus};
use deadhand_types::{GuardianId, RelayUrl, SECS_PER_HOUR};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Heartbeats stamped further than this into the future are discarded.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

/// A heartbeat record as returned by a relay.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// The guardian's Ed25519 identity.
    pub guardian: GuardianId,
    /// Unix timestamp the guardian signed.
    pub timestamp: u64,
    /// Ed25519 signature over [`heartbeat_message`].
    #[serde_as(as = "serde_with::hex::Hex")]
    pub signature: [u8; 64],
    /// Relays this copy was fetched from. Filled in by the monitor, not signed.
    #[serde(default)]
    pub origin_relays: BTreeSet<RelayUrl>,
}

/// Why a record was not trusted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecordRejection {
    #[error("record is for guardian {actual}, expected {expected}")]
    WrongGuardian {
        expected: GuardianId,
        actual: GuardianId,
    },
    #[error("guardian identity is not a valid Ed25519 key")]
    InvalidIdentity,
    #[error("signature does not verify")]
    BadSignature,
    #[error("timestamp {timestamp} is ahead of now ({now})")]
    FromTheFuture { timestamp: u64, now: u64 },
}

/// The digest a guardian signs for a heartbeat at `timestamp`.
pub fn heartbeat_message(guardian: &GuardianId, timestamp: u64) -> [u8; 32] {
    let ts = timestamp.to_le_bytes();
    let input = blake3::encode_multi_field(&[&guardian.as_bytes()[..], &ts[..]]);
    blake3::derive_key(contexts::GUARDIAN_HEARTBEAT, &input)
}

/// Sign a heartbeat for the guardian owning `signing_key`.
pub fn publish_heartbeat(signing_key: &SigningKey, timestamp: u64) -> HeartbeatRecord {
    let guardian = GuardianId(signing_key.verifying_key().to_bytes());
    let signature = signing_key.sign(&heartbeat_message(&guardian, timestamp));

    tracing::debug!(guardian = %guardian.short(), timestamp, "guardian heartbeat signed");

    HeartbeatRecord {
        guardian,
        timestamp,
        signature: signature.to_bytes(),
        origin_relays: BTreeSet::new(),
    }
}

/// Check that a record is authentic, addressed to `expected` and not from
/// the future.
pub fn verify_record(
    record: &HeartbeatRecord,
    expected: &GuardianId,
    now: u64,
) -> Result<(), RecordRejection> {
    if record.guardian != *expected {
        return Err(RecordRejection::WrongGuardian {
            expected: *expected,
            actual: record.guardian,
        });
    }
    if record.timestamp > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
        return Err(RecordRejection::FromTheFuture {
            timestamp: record.timestamp,
            now,
        });
    }
    let key =
        VerifyingKey::from_bytes(record.guardian.as_bytes()).map_err(|_| RecordRejection::InvalidIdentity)?;
    key.verify(
        &heartbeat_message(&record.guardian, record.timestamp),
        &Signature::from_bytes(&record.signature),
    )
    .map_err(|_| RecordRejection::BadSignature)
}

/// Hours elapsed between `timestamp` and `now`; zero for timestamps ahead of now.
pub fn hours_since(timestamp: u64, now: u64) -> f64 {
    now.saturating_sub(timestamp) as f64 / SECS_PER_HOUR as f64
}

/// Classify a heartbeat age.
///
/// Boundaries are half-open: an age of exactly `healthy_hours` is already
/// a warning, and exactly `warning_hours` is critical.
pub fn classify(hours_since_heartbeat: Option<f64>, thresholds: &HealthThresholds) -> HealthStatus {
    match hours_since_heartbeat {
        None => HealthStatus::Unknown,
        Some(hours) if hours < thresholds.healthy_hours => HealthStatus::Healthy,
        Some(hours) if hours < thresholds.warning_hours => HealthStatus::Warning,
        Some(_) => HealthStatus::Critical,
    }
}

/// Health for a guardian whose latest valid heartbeat was at `last_heartbeat_at`.
pub fn health_at(
    guardian: GuardianId,
    last_heartbeat_at: Option<u64>,
    relays_seen: BTreeSet<RelayUrl>,
    now: u64,
    thresholds: &HealthThresholds,
) -> GuardianHealth {
    let Some(ts) = last_heartbeat_at else {
        return GuardianHealth::unknown(guardian);
    };
    let hours = hours_since(ts, now);
    let status = classify(Some(hours), thresholds);
    GuardianHealth {
        guardian,
        status,
        hours_since_heartbeat: Some(hours),
        last_heartbeat_at: Some(ts),
        relays_seen,
        long_silent: status == HealthStatus::Critical && hours >= thresholds.critical_display_hours,
    }
}

/// Reduce every record gathered for one guardian into its health.
///
/// Records that fail [`verify_record`] are ignored. Identical copies served
/// by several relays are verified once and their relay sets merged.
pub fn evaluate_guardian<'a>(
    guardian: GuardianId,
    records: impl IntoIterator<Item = &'a HeartbeatRecord>,
    now: u64,
    thresholds: &HealthThresholds,
) -> GuardianHealth {
    let mut copies: BTreeMap<(u64, [u8; 64]), (&'a HeartbeatRecord, BTreeSet<RelayUrl>)> =
        BTreeMap::new();
    for record in records {
        let entry = copies
            .entry((record.timestamp, record.signature))
            .or_insert_with(|| (record, BTreeSet::new()));
        entry.1.extend(record.origin_relays.iter().cloned());
    }

    let mut latest: Option<u64> = None;
    let mut relays_seen = BTreeSet::new();
    for ((timestamp, _), (record, relays)) in copies.into_iter().rev() {
        if latest.is_some_and(|ts| timestamp < ts) {
            break;
        }
        match verify_record(record, &guardian, now) {
            Ok(()) => {
                latest = Some(timestamp);
                relays_seen.extend(relays);
            }
            Err(reason) => {
                tracing::debug!(
                    guardian = %guardian.short(),
                    timestamp,
                    %reason,
                    "heartbeat record rejected"
                );
            }
        }
    }

    health_at(guardian, latest, relays_seen, now, thresholds)
}
