//! Simulation steps and the final report.

use std::fmt;

use deadhand_types::health::NetworkHealth;
use serde::{Deserialize, Serialize};

/// Pipeline steps, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    ConfigValidation,
    GuardianHealth,
    ShareGeneration,
    KeyReconstruction,
    RecipientPreview,
}

/// The fixed step order.
pub const STEP_ORDER: [StepId; 5] = [
    StepId::ConfigValidation,
    StepId::GuardianHealth,
    StepId::ShareGeneration,
    StepId::KeyReconstruction,
    StepId::RecipientPreview,
];

impl StepId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigValidation => "config-validation",
            Self::GuardianHealth => "guardian-health",
            Self::ShareGeneration => "share-generation",
            Self::KeyReconstruction => "key-reconstruction",
            Self::RecipientPreview => "recipient-preview",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step status. A step only ever moves forward:
/// `pending → running → (success | warning | error)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Warning,
    Error,
}

impl StepStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Warning | Self::Error)
    }
}

/// One step's state, as emitted to progress observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStep {
    pub id: StepId,
    pub status: StepStatus,
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl SimulationStep {
    pub fn pending(id: StepId) -> Self {
        Self {
            id,
            status: StepStatus::Pending,
            message: String::new(),
            details: Vec::new(),
        }
    }
}

/// What a finished step concluded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub message: String,
    pub details: Vec<String>,
}

impl StepOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self::with(StepStatus::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with(StepStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with(StepStatus::Error, message)
    }

    fn with(status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Receives a snapshot at every step transition.
pub trait ProgressSink: Send + Sync {
    fn on_step(&self, step: &SimulationStep);
}

impl<F> ProgressSink for F
where
    F: Fn(&SimulationStep) + Send + Sync,
{
    fn on_step(&self, step: &SimulationStep) {
        self(step)
    }
}

/// Sink that ignores progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_step(&self, _step: &SimulationStep) {}
}

/// Report of a finished run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub switch_id: String,
    pub overall: StepStatus,
    pub steps: Vec<SimulationStep>,
    /// 0 to 100.
    pub confidence: u8,
    pub threshold_met: bool,
    pub guardians_responded: usize,
    pub threshold_needed: u8,
    pub network: Option<NetworkHealth>,
    /// Heuristic, not a guarantee. `None` when recovery is not possible.
    pub estimated_recovery_hours: Option<f64>,
    /// The instant the run evaluated against.
    pub evaluated_at: u64,
}

impl SimulationResult {
    pub fn step(&self, id: StepId) -> Option<&SimulationStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}
