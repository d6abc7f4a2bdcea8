//! Guardian health monitor.
//!
//! A poll queries every relay for every guardian concurrently, bounded by a
//! semaphore, with an independent timeout per query. Results are gathered,
//! reduced per guardian, and published as an immutable [`HealthSnapshot`]
//! that readers share through an `Arc`.
//!
//! A failed or slow relay only removes that relay's evidence; it never
//! fails the poll.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use deadhand_types::config::HealthThresholds;
use deadhand_types::health::GuardianHealth;
use deadhand_types::{ConfigError, GuardianId, RelayUrl};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::heartbeat::{evaluate_guardian, health_at, verify_record, HeartbeatRecord};
use crate::source::{FetchError, HeartbeatSource};

/// Default per-relay query timeout.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on in-flight relay queries.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 16;

/// Verified records kept per relay answer; the newest win.
pub const MAX_RECORDS_PER_RELAY: usize = 256;

/// Monitor settings.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub relays: Vec<RelayUrl>,
    pub relay_timeout: Duration,
    pub max_concurrent_queries: usize,
    pub thresholds: HealthThresholds,
}

impl MonitorConfig {
    pub fn new(relays: Vec<RelayUrl>) -> Self {
        Self {
            relays,
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_queries must be at least 1".into(),
            ));
        }
        if self.relay_timeout.is_zero() {
            return Err(ConfigError::Invalid("relay_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// A relay query that contributed no evidence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFailure {
    pub guardian: GuardianId,
    pub relay: RelayUrl,
    pub error: String,
}

/// Health of every polled guardian at one instant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub taken_at: u64,
    pub guardians: BTreeMap<GuardianId, GuardianHealth>,
    #[serde(default)]
    pub relay_failures: Vec<RelayFailure>,
}

impl HealthSnapshot {
    /// Re-age this snapshot to `now` for the given guardians.
    ///
    /// Guardians absent from the snapshot come back unknown. No relay is
    /// contacted.
    pub fn reclassify(
        &self,
        guardians: &[GuardianId],
        now: u64,
        thresholds: &HealthThresholds,
    ) -> HealthSnapshot {
        let reclassified = guardians
            .iter()
            .map(|id| {
                let health = match self.guardians.get(id) {
                    Some(known) => health_at(
                        *id,
                        known.last_heartbeat_at,
                        known.relays_seen.clone(),
                        now,
                        thresholds,
                    ),
                    None => GuardianHealth::unknown(*id),
                };
                (*id, health)
            })
            .collect();
        HealthSnapshot {
            taken_at: now,
            guardians: reclassified,
            relay_failures: Vec::new(),
        }
    }
}

/// Polls relays and caches the latest guardian health.
pub struct HealthMonitor {
    source: Arc<dyn HeartbeatSource>,
    config: MonitorConfig,
    latest: RwLock<Arc<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(source: Arc<dyn HeartbeatSource>, config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            latest: RwLock::new(Arc::new(HealthSnapshot::default())),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.config.thresholds
    }

    /// The most recent snapshot. Empty until the first poll completes.
    pub async fn cached(&self) -> Arc<HealthSnapshot> {
        Arc::clone(&*self.latest.read().await)
    }

    /// Replace the cached snapshot, e.g. with one restored from disk.
    pub async fn restore(&self, snapshot: HealthSnapshot) {
        *self.latest.write().await = Arc::new(snapshot);
    }

    /// Query every relay for every guardian and publish a fresh snapshot.
    ///
    /// Dropping the returned future aborts all in-flight queries.
    pub async fn poll(&self, guardians: &[GuardianId], now: u64) -> Arc<HealthSnapshot> {
        let snapshot = Arc::new(self.sample(guardians, now).await);
        *self.latest.write().await = Arc::clone(&snapshot);
        snapshot
    }

    /// Like [`poll`](Self::poll), but the result is returned only. The
    /// cached snapshot is left as it was.
    pub async fn sample(&self, guardians: &[GuardianId], now: u64) -> HealthSnapshot {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries));
        let timeout = self.config.relay_timeout;
        let mut queries = JoinSet::new();

        for guardian in guardians {
            for relay in &self.config.relays {
                let source = Arc::clone(&self.source);
                let semaphore = Arc::clone(&semaphore);
                let guardian = *guardian;
                let relay = relay.clone();
                queries.spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            match tokio::time::timeout(timeout, source.fetch_heartbeats(&guardian, &relay))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(FetchError::Timeout {
                                    relay: relay.clone(),
                                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                                }),
                            }
                        }
                        Err(_) => Err(FetchError::Unreachable {
                            relay: relay.clone(),
                            reason: "query pool closed".into(),
                        }),
                    };
                    (guardian, relay, outcome)
                });
            }
        }

        let mut evidence: BTreeMap<GuardianId, Vec<HeartbeatRecord>> = BTreeMap::new();
        let mut relay_failures = Vec::new();
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((guardian, relay, Ok(records))) => {
                    evidence
                        .entry(guardian)
                        .or_default()
                        .extend(admit_records(records, &guardian, &relay, now));
                }
                Ok((guardian, relay, Err(e))) => {
                    tracing::warn!(guardian = %guardian.short(), %relay, error = %e, "relay query failed");
                    relay_failures.push(RelayFailure {
                        guardian,
                        relay,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "relay query task aborted");
                }
            }
        }

        let health: BTreeMap<GuardianId, GuardianHealth> = guardians
            .iter()
            .map(|id| {
                let records = evidence.get(id).map(Vec::as_slice).unwrap_or_default();
                (*id, evaluate_guardian(*id, records, now, &self.config.thresholds))
            })
            .collect();

        tracing::info!(
            guardians = health.len(),
            relays = self.config.relays.len(),
            failures = relay_failures.len(),
            "health poll complete"
        );

        HealthSnapshot {
            taken_at: now,
            guardians: health,
            relay_failures,
        }
    }
}

/// Drop records that fail verification, keep the newest survivors and stamp
/// each with the relay that served it.
///
/// Verification runs before the cap so unsigned filler cannot push a valid
/// heartbeat out of the answer.
fn admit_records(
    records: Vec<HeartbeatRecord>,
    guardian: &GuardianId,
    relay: &str,
    now: u64,
) -> Vec<HeartbeatRecord> {
    let served = records.len();
    let mut records: Vec<HeartbeatRecord> = records
        .into_iter()
        .filter(|record| verify_record(record, guardian, now).is_ok())
        .collect();
    if records.len() < served {
        tracing::debug!(
            guardian = %guardian.short(),
            relay,
            rejected = served - records.len(),
            "relay served unverifiable heartbeats"
        );
    }
    if records.len() > MAX_RECORDS_PER_RELAY {
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(MAX_RECORDS_PER_RELAY);
    }
    for record in &mut records {
        record.origin_relays = BTreeSet::from([relay.to_string()]);
    }
    records
}
