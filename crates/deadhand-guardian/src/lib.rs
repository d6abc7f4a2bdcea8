//! # deadhand-guardian
//!
//! Guardian side of the release-readiness core.
//!
//! Guardians each hold one threshold share of a switch's data-encryption
//! key. They prove liveness by publishing signed heartbeats to relays; the
//! monitor gathers those heartbeats, ages them into a per-guardian health
//! status, and the aggregator reduces the statuses into a recovery verdict.
//!
//! ## Modules
//!
//! - [`heartbeat`] - Signed heartbeat records and health classification
//! - [`source`] - Relay query contract (`HeartbeatSource`)
//! - [`monitor`] - Concurrent scatter/gather health polling
//! - [`network`] - Network health aggregation
//! - [`distribution`] - Sealing and delivering shares to guardians
//! - [`replacement`] - Guardian replacement
//! - [`task`] - Cooperative cancellation and periodic jobs

pub mod distribution;
pub mod heartbeat;
pub mod monitor;
pub mod network;
pub mod replacement;
pub mod source;
pub mod task;

use deadhand_crypto::CryptoError;

/// Error types for guardian operations.
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// Guardian already enrolled.
    #[error("guardian already enrolled: {0}")]
    AlreadyEnrolled(String),

    /// Guardian not found.
    #[error("guardian not found: {0}")]
    NotFound(String),

    /// The share set has no share for a guardian's assigned index.
    #[error("no share with index {index} for guardian {guardian}")]
    MissingShare {
        /// Guardian lacking a share.
        guardian: String,
        /// Index it was assigned.
        index: u8,
    },

    /// An opened share does not carry the index it was sealed under.
    #[error("share index mismatch: sealed as {expected}, opened {actual}")]
    ShareIndexMismatch {
        /// Index recorded on the envelope.
        expected: u8,
        /// Index found inside.
        actual: u8,
    },

    /// Underlying cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Convenience result type for guardian operations.
pub type Result<T> = std::result::Result<T, GuardianError>;
