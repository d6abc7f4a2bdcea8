//! Confidence score and recovery-time estimate.

use deadhand_types::health::{GuardianHealth, HealthStatus};
use serde::{Deserialize, Serialize};

use crate::step::StepStatus;

/// Response-time assumptions behind [`estimate_recovery_hours`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseAssumptions {
    /// Expected hours for a healthy guardian to hand in its share.
    pub healthy_response_hours: f64,
    /// Expected hours for a guardian in warning.
    pub warning_response_hours: f64,
    /// Hours of release processing once the threshold is reached.
    pub release_processing_hours: f64,
}

impl Default for ResponseAssumptions {
    fn default() -> Self {
        Self {
            healthy_response_hours: 1.0,
            warning_response_hours: 12.0,
            release_processing_hours: 0.5,
        }
    }
}

/// Worst status among finished steps.
pub fn overall_status(steps: impl IntoIterator<Item = StepStatus>) -> StepStatus {
    let mut overall = StepStatus::Success;
    for status in steps {
        match status {
            StepStatus::Error => return StepStatus::Error,
            StepStatus::Warning => overall = StepStatus::Warning,
            _ => {}
        }
    }
    overall
}

/// `0` on error, `max(50, 100 - 15 * warnings)` on warning, else `100`.
pub fn confidence_score(overall: StepStatus, warnings: usize) -> u8 {
    match overall {
        StepStatus::Error => 0,
        StepStatus::Warning => {
            let penalty = warnings.saturating_mul(15).min(100);
            u8::try_from(100 - penalty).unwrap_or(0).max(50)
        }
        _ => 100,
    }
}

/// Hours until `needed` guardians are expected to have answered, plus
/// processing. The k-th fastest responsive guardian sets the pace.
pub fn estimate_recovery_hours<'a>(
    health: impl IntoIterator<Item = &'a GuardianHealth>,
    needed: u8,
    assumptions: &ResponseAssumptions,
) -> Option<f64> {
    let mut latencies: Vec<f64> = health
        .into_iter()
        .filter_map(|h| match h.status {
            HealthStatus::Healthy => Some(assumptions.healthy_response_hours),
            HealthStatus::Warning => Some(assumptions.warning_response_hours),
            HealthStatus::Critical | HealthStatus::Unknown => None,
        })
        .collect();
    latencies.sort_by(f64::total_cmp);

    let kth = usize::from(needed).checked_sub(1)?;
    latencies
        .get(kth)
        .map(|hours| hours + assumptions.release_processing_hours)
}
