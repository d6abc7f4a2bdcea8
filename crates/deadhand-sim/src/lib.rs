//! # deadhand-sim
//!
//! Dry-run simulation of a release.
//!
//! The engine walks a switch through the checks a real release would depend
//! on and reports how confident it is that the release would succeed. It
//! holds no key material and no share sink, so a run cannot release
//! anything.
//!
//! ## Modules
//!
//! - [`step`] - Step identifiers, statuses and the result report
//! - [`engine`] - The sequential step pipeline
//! - [`estimate`] - Confidence score and recovery-time heuristic

pub mod engine;
pub mod estimate;
pub mod step;

/// Error types for simulation runs.
///
/// Failing checks are not errors; they are reported as step statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// The caller cancelled the run.
    #[error("simulation cancelled")]
    Cancelled,
}

/// Convenience result type for simulation runs.
pub type Result<T> = std::result::Result<T, SimulationError>;
