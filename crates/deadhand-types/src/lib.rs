//! # deadhand-types
//!
//! Shared domain types used across the Deadhand workspace: guardians,
//! health classifications, thresholds and the validated configuration
//! inputs every other crate consumes.

pub mod config;
pub mod guardian;
pub mod health;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Seconds per hour, used to convert heartbeat ages.
pub const SECS_PER_HOUR: u64 = 3600;

/// Smallest meaningful threshold. A 1-of-n split hands the secret to every guardian.
pub const MIN_THRESHOLD: u8 = 2;

/// Largest share count supported by the GF(256) scheme.
pub const MAX_SHARES: u8 = 255;

/// Relay URL as configured by the user.
pub type RelayUrl = String;

/// A guardian's identity: its Ed25519 public key.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuardianId(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 32]);

impl GuardianId {
    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for GuardianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for GuardianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardianId({})", self.short())
    }
}

impl From<[u8; 32]> for GuardianId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Configuration errors. Always fatal at setup time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Threshold outside `2 <= k <= n <= 255`.
    #[error("invalid threshold {needed}-of-{total}: need 2 <= k <= n <= 255")]
    InvalidThreshold {
        /// Shares needed (k).
        needed: u8,
        /// Total shares (n).
        total: u8,
    },

    /// Check-in interval must be a positive, finite number of hours.
    #[error("invalid check-in interval: {0} hours")]
    InvalidInterval(f64),

    /// Health thresholds must strictly increase.
    #[error("health thresholds not increasing: healthy={healthy}h warning={warning}h critical={critical}h")]
    NonMonotonicThresholds {
        /// Healthy boundary in hours.
        healthy: f64,
        /// Warning boundary in hours.
        warning: f64,
        /// Critical display boundary in hours.
        critical: f64,
    },

    /// Guardian count does not match the share total.
    #[error("guardian count {guardians} does not match share total {total}")]
    GuardianCountMismatch {
        /// Guardians configured.
        guardians: usize,
        /// Shares to distribute.
        total: u8,
    },

    /// Two guardians share an identity.
    #[error("duplicate guardian identity: {0}")]
    DuplicateGuardian(String),

    /// Share indices must be exactly `1..=n`.
    #[error("invalid share index assignment: {0}")]
    InvalidShareIndex(String),

    /// Any other rejected field.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
