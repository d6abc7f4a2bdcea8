//! Guardian and network health structures.
//!
//! These are derived values. Nothing here is stored as ground truth; the
//! monitor recomputes them from heartbeat records on every poll.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{GuardianId, RelayUrl};

/// Health of a single guardian, ordered worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No valid heartbeat has ever been observed.
    Unknown,
    /// Last heartbeat at or past the warning boundary.
    Critical,
    /// Last heartbeat between the healthy and warning boundaries.
    Warning,
    /// Last heartbeat younger than the healthy boundary.
    Healthy,
}

impl HealthStatus {
    /// Whether a guardian in this state is assumed able to supply its share.
    pub fn can_supply_share(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Warning)
    }
}

/// Derived health of one guardian.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardianHealth {
    pub guardian: GuardianId,
    pub status: HealthStatus,
    /// Age of the latest valid heartbeat; `None` when status is unknown.
    pub hours_since_heartbeat: Option<f64>,
    /// Timestamp of the latest valid heartbeat.
    pub last_heartbeat_at: Option<u64>,
    /// Relays that returned the latest valid heartbeat.
    pub relays_seen: BTreeSet<RelayUrl>,
    /// Critical for longer than the display boundary.
    #[serde(default)]
    pub long_silent: bool,
}

impl GuardianHealth {
    /// Health for a guardian with no evidence at all.
    pub fn unknown(guardian: GuardianId) -> Self {
        Self {
            guardian,
            status: HealthStatus::Unknown,
            hours_since_heartbeat: None,
            last_heartbeat_at: None,
            relays_seen: BTreeSet::new(),
            long_silent: false,
        }
    }
}

/// Tally of guardian statuses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl HealthCounts {
    /// Guardians assumed able to supply their share.
    pub fn responsive(&self) -> usize {
        self.healthy + self.warning
    }

    /// All guardians counted.
    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical + self.unknown
    }
}

/// Network-wide recovery verdict, ordered worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryClassification {
    /// Threshold cannot be met.
    Critical,
    /// Threshold met only by counting warning guardians.
    Degraded,
    /// Threshold met by healthy guardians alone.
    Healthy,
}

/// Aggregated recovery readiness for one switch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkHealth {
    pub counts: HealthCounts,
    pub can_recover: bool,
    /// Shares needed (k).
    pub threshold: u8,
    pub classification: RecoveryClassification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_worst_to_best() {
        assert!(HealthStatus::Unknown < HealthStatus::Critical);
        assert!(HealthStatus::Critical < HealthStatus::Warning);
        assert!(HealthStatus::Warning < HealthStatus::Healthy);
    }

    #[test]
    fn test_can_supply_share() {
        assert!(HealthStatus::Healthy.can_supply_share());
        assert!(HealthStatus::Warning.can_supply_share());
        assert!(!HealthStatus::Critical.can_supply_share());
        assert!(!HealthStatus::Unknown.can_supply_share());
    }

    #[test]
    fn test_classification_ordering() {
        assert!(RecoveryClassification::Critical < RecoveryClassification::Degraded);
        assert!(RecoveryClassification::Degraded < RecoveryClassification::Healthy);
        let json = serde_json::to_string(&RecoveryClassification::Degraded).expect("serialize");
        assert_eq!(json, "\"DEGRADED\"");
    }

    #[test]
    fn test_counts() {
        let counts = HealthCounts {
            healthy: 3,
            warning: 1,
            critical: 1,
            unknown: 0,
        };
        assert_eq!(counts.responsive(), 4);
        assert_eq!(counts.total(), 5);
    }
}
