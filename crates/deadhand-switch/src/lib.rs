//! # deadhand-switch
//!
//! The switch envelope: lifecycle state, setup, and the two external
//! checks it depends on (ciphertext presence and an optional timelock
//! commitment).
//!
//! ## Modules
//!
//! - [`lifecycle`] - `Switch` and its transition table
//! - [`builder`] - Validated switch setup and key splitting
//! - [`commitment`] - External commitment verification contract
//! - [`blob`] - Ciphertext location contract
//! - [`release`] - Share collection once a switch has triggered

pub mod blob;
pub mod builder;
pub mod commitment;
pub mod lifecycle;
pub mod release;

use deadhand_crypto::CryptoError;
use deadhand_types::ConfigError;

use crate::lifecycle::{Action, SwitchStatus};

/// Error types for switch operations.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// The transition is not permitted from the current state.
    #[error("cannot {action} a switch that is {status}")]
    InvalidState {
        action: Action,
        status: SwitchStatus,
    },

    /// Shares can only be combined once the switch has triggered.
    #[error("cannot release a switch that is {status}; it must be TRIGGERED")]
    NotTriggered { status: SwitchStatus },

    /// Check-in arrived after the deadline; the switch must be evaluated.
    #[error("check-in deadline passed at {expired_at}")]
    Overdue { expired_at: u64 },

    /// Vacation end is not in the future.
    #[error("vacation must end after now ({now}), got {until}")]
    InvalidVacation { until: u64, now: u64 },

    /// A share was offered by someone who is not a guardian of this switch.
    #[error("not a guardian of this switch: {0}")]
    UnknownGuardian(String),

    /// A guardian offered a share under someone else's index.
    #[error("guardian {guardian} holds index {expected}, offered {actual}")]
    ShareIndexMismatch {
        guardian: String,
        expected: u8,
        actual: u8,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Convenience result type for switch operations.
pub type Result<T> = std::result::Result<T, SwitchError>;
