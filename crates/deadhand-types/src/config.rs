//! Validated configuration inputs.
//!
//! Every constructor here rejects bad values with a [`ConfigError`] so that
//! a switch can never be armed with an unusable threshold or health policy.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, MAX_SHARES, MIN_THRESHOLD};

/// Default hours under which a guardian is healthy.
pub const DEFAULT_HEALTHY_HOURS: f64 = 24.0;

/// Default hours under which a guardian is in warning.
pub const DEFAULT_WARNING_HOURS: f64 = 72.0;

/// Default display boundary inside the critical tier (7 days).
pub const DEFAULT_CRITICAL_DISPLAY_HOURS: f64 = 168.0;

/// A k-of-n threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    /// Shares needed to reconstruct (k).
    pub needed: u8,
    /// Shares issued (n).
    pub total: u8,
}

impl Threshold {
    /// Build a threshold, enforcing `2 <= k <= n <= 255`.
    pub fn new(needed: u8, total: u8) -> Result<Self, ConfigError> {
        let threshold = Self { needed, total };
        threshold.validate()?;
        Ok(threshold)
    }

    /// Re-check an already deserialized threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.needed < MIN_THRESHOLD || self.needed > self.total || self.total > MAX_SHARES {
            return Err(ConfigError::InvalidThreshold {
                needed: self.needed,
                total: self.total,
            });
        }
        Ok(())
    }
}

/// Hour boundaries for guardian health classification.
///
/// `critical_display_hours` does not introduce a fourth state. It marks
/// guardians that have been critical long enough to be flagged in reports.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Below this age a guardian is healthy.
    pub healthy_hours: f64,
    /// Below this age (and at or above `healthy_hours`) a guardian is in warning.
    pub warning_hours: f64,
    /// Display-only boundary within the critical tier.
    pub critical_display_hours: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            healthy_hours: DEFAULT_HEALTHY_HOURS,
            warning_hours: DEFAULT_WARNING_HOURS,
            critical_display_hours: DEFAULT_CRITICAL_DISPLAY_HOURS,
        }
    }
}

impl HealthThresholds {
    /// Build thresholds, enforcing `0 < healthy < warning <= critical_display`.
    pub fn new(
        healthy_hours: f64,
        warning_hours: f64,
        critical_display_hours: f64,
    ) -> Result<Self, ConfigError> {
        let thresholds = Self {
            healthy_hours,
            warning_hours,
            critical_display_hours,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Re-check an already deserialized policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all_finite = self.healthy_hours.is_finite()
            && self.warning_hours.is_finite()
            && self.critical_display_hours.is_finite();
        if !all_finite
            || self.healthy_hours <= 0.0
            || self.healthy_hours >= self.warning_hours
            || self.warning_hours > self.critical_display_hours
        {
            return Err(ConfigError::NonMonotonicThresholds {
                healthy: self.healthy_hours,
                warning: self.warning_hours,
                critical: self.critical_display_hours,
            });
        }
        Ok(())
    }
}

/// Validate a check-in interval in hours.
pub fn validate_interval(hours: f64) -> Result<(), ConfigError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ConfigError::InvalidInterval(hours));
    }
    Ok(())
}

/// Convert a positive hour count into whole seconds, rounding up.
pub fn hours_to_secs(hours: f64) -> u64 {
    (hours * crate::SECS_PER_HOUR as f64).ceil() as u64
}
