//! Where heartbeat records come from.
//!
//! A [`HeartbeatSource`] answers one question: which heartbeat records does
//! `relay` currently hold for `guardian`? The monitor fans out one query per
//! (guardian, relay) pair and treats every failure as "no evidence from this
//! relay".

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadhand_types::{GuardianId, RelayUrl};

use crate::heartbeat::HeartbeatRecord;

/// A relay query that produced no usable answer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The relay refused or dropped the connection.
    #[error("relay {relay} unreachable: {reason}")]
    Unreachable { relay: RelayUrl, reason: String },

    /// The relay did not answer within the per-query timeout.
    #[error("relay {relay} timed out after {timeout_ms}ms")]
    Timeout { relay: RelayUrl, timeout_ms: u64 },

    /// The relay answered with something that is not a list of records.
    #[error("relay {relay} returned malformed data: {reason}")]
    Malformed { relay: RelayUrl, reason: String },
}

impl FetchError {
    /// The relay this error concerns.
    pub fn relay(&self) -> &str {
        match self {
            Self::Unreachable { relay, .. }
            | Self::Timeout { relay, .. }
            | Self::Malformed { relay, .. } => relay,
        }
    }
}

/// Query interface to the relay network.
#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    /// Fetch every heartbeat record `relay` holds for `guardian`.
    ///
    /// Records are returned unverified; signature checks happen later.
    async fn fetch_heartbeats(
        &self,
        guardian: &GuardianId,
        relay: &str,
    ) -> Result<Vec<HeartbeatRecord>, FetchError>;
}

/// In-memory relay network for tests and dry runs.
///
/// Relays can be told to fail or to stall, which is how slow or dead relays
/// are exercised without a network.
#[derive(Debug, Default)]
pub struct StaticHeartbeatSource {
    records: HashMap<RelayUrl, Vec<HeartbeatRecord>>,
    failing: HashSet<RelayUrl>,
    delays: HashMap<RelayUrl, Duration>,
    calls: AtomicUsize,
}

impl StaticHeartbeatSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `relay` serve `record`.
    pub fn with_record(mut self, relay: impl Into<RelayUrl>, record: HeartbeatRecord) -> Self {
        self.records.entry(relay.into()).or_default().push(record);
        self
    }

    /// Make every query to `relay` fail.
    pub fn with_failing_relay(mut self, relay: impl Into<RelayUrl>) -> Self {
        self.failing.insert(relay.into());
        self
    }

    /// Make every query to `relay` stall for `delay` before answering.
    pub fn with_delay(mut self, relay: impl Into<RelayUrl>, delay: Duration) -> Self {
        self.delays.insert(relay.into(), delay);
        self
    }

    /// Number of queries answered or attempted so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HeartbeatSource for StaticHeartbeatSource {
    async fn fetch_heartbeats(
        &self,
        guardian: &GuardianId,
        relay: &str,
    ) -> Result<Vec<HeartbeatRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(relay) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(relay) {
            return Err(FetchError::Unreachable {
                relay: relay.to_string(),
                reason: "connection refused".into(),
            });
        }

        Ok(self
            .records
            .get(relay)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.guardian == *guardian)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
