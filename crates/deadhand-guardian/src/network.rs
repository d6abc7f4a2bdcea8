//! Network health aggregation.
//!
//! Reduces per-guardian health into one verdict for a k-of-n switch:
//!
//! - **HEALTHY**: at least k guardians are healthy
//! - **DEGRADED**: fewer than k healthy, but healthy + warning reaches k
//! - **CRITICAL**: healthy + warning is below k
//!
//! Improving any single guardian's status never lowers the verdict.

use std::collections::BTreeMap;

use deadhand_types::health::{
    GuardianHealth, HealthCounts, HealthStatus, NetworkHealth, RecoveryClassification,
};
use deadhand_types::GuardianId;

/// Aggregate a switch's guardian health against its threshold `needed`.
pub fn aggregate(health: &BTreeMap<GuardianId, GuardianHealth>, needed: u8) -> NetworkHealth {
    aggregate_statuses(health.values().map(|h| h.status), needed)
}

/// Aggregate bare statuses.
pub fn aggregate_statuses(
    statuses: impl IntoIterator<Item = HealthStatus>,
    needed: u8,
) -> NetworkHealth {
    let mut counts = HealthCounts::default();
    for status in statuses {
        match status {
            HealthStatus::Healthy => counts.healthy += 1,
            HealthStatus::Warning => counts.warning += 1,
            HealthStatus::Critical => counts.critical += 1,
            HealthStatus::Unknown => counts.unknown += 1,
        }
    }

    let needed_count = usize::from(needed);
    let can_recover = counts.responsive() >= needed_count;
    let classification = if counts.healthy >= needed_count {
        RecoveryClassification::Healthy
    } else if can_recover {
        RecoveryClassification::Degraded
    } else {
        RecoveryClassification::Critical
    };

    NetworkHealth {
        counts,
        can_recover,
        threshold: needed,
        classification,
    }
}

/// Guardians presumed able to hand over their share right now.
pub fn responsive_guardians(health: &BTreeMap<GuardianId, GuardianHealth>) -> Vec<GuardianId> {
    health
        .values()
        .filter(|h| h.status.can_supply_share())
        .map(|h| h.guardian)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [HealthStatus; 4] = [
        HealthStatus::Unknown,
        HealthStatus::Critical,
        HealthStatus::Warning,
        HealthStatus::Healthy,
    ];

    #[test]
    fn test_three_of_five_scenarios() {
        use HealthStatus::*;

        let h = aggregate_statuses([Healthy, Healthy, Healthy, Unknown, Critical], 3);
        assert_eq!(h.classification, RecoveryClassification::Healthy);
        assert!(h.can_recover);

        let h = aggregate_statuses([Healthy, Healthy, Warning, Critical, Critical], 3);
        assert_eq!(h.classification, RecoveryClassification::Degraded);
        assert!(h.can_recover);
        assert_eq!(h.counts.responsive(), 3);

        let h = aggregate_statuses([Healthy, Warning, Critical, Critical, Unknown], 3);
        assert_eq!(h.classification, RecoveryClassification::Critical);
        assert!(!h.can_recover);
        assert_eq!(h.counts.total(), 5);
        assert_eq!(h.threshold, 3);
    }

    #[test]
    fn test_improving_one_guardian_never_lowers_verdict() {
        // Every assignment of statuses to 4 guardians, each single-guardian
        // upgrade, for every threshold 2..=4.
        for needed in 2u8..=4 {
            for code in 0..4usize.pow(4) {
                let statuses: Vec<HealthStatus> =
                    (0..4).map(|i| ALL[(code / 4usize.pow(i)) % 4]).collect();
                let before = aggregate_statuses(statuses.iter().copied(), needed);

                for i in 0..statuses.len() {
                    for better in ALL.iter().filter(|s| **s > statuses[i]) {
                        let mut improved = statuses.clone();
                        improved[i] = *better;
                        let after = aggregate_statuses(improved, needed);
                        assert!(after.classification >= before.classification);
                        assert!(after.can_recover >= before.can_recover);
                    }
                }
            }
        }
    }

    #[test]
    fn test_responsive_guardians() {
        let mut map = BTreeMap::new();
        for (byte, status) in [(1u8, HealthStatus::Healthy), (2, HealthStatus::Warning), (3, HealthStatus::Critical)] {
            let id = GuardianId([byte; 32]);
            let mut health = GuardianHealth::unknown(id);
            health.status = status;
            map.insert(id, health);
        }
        assert_eq!(
            responsive_guardians(&map),
            vec![GuardianId([1u8; 32]), GuardianId([2u8; 32])]
        );
        assert_eq!(aggregate(&map, 2).classification, RecoveryClassification::Degraded);
    }
}
