//! Request options and results for step and bulk generation.

use crate::error::{ConsumptionError, GenerationError};
use crate::step::StepId;
use serde::Serialize;

/// How a single `generate_step` call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Ask for confirmation and generate missing prerequisites first
    pub auto_resolve_deps: bool,
    /// Suppress user-facing error notices
    pub silent: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::interactive()
    }
}

impl GenerateOptions {
    pub fn interactive() -> Self {
        Self {
            auto_resolve_deps: true,
            silent: false,
        }
    }

    /// Fail with `UnsatisfiedDependencies` instead of resolving.
    pub fn strict() -> Self {
        Self {
            auto_resolve_deps: false,
            silent: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            auto_resolve_deps: false,
            silent: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsumptionStatus {
    Recorded,
    /// Content is kept; the credit balance may be out of sync
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedStep {
    pub step: StepId,
    /// Prerequisites generated by this call, in generation order
    pub dependencies: Vec<StepId>,
    pub credits: u64,
    pub consumption: ConsumptionStatus,
}

impl GeneratedStep {
    pub fn consumption_error(&self) -> Option<ConsumptionError> {
        match &self.consumption {
            ConsumptionStatus::Recorded => None,
            ConsumptionStatus::Failed { reason } => Some(ConsumptionError {
                step: self.step,
                reason: reason.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Generated(GeneratedStep),
    /// Another attempt for this step was already running; no new call was made
    AlreadyInFlight { step: StepId },
}

impl StepOutcome {
    pub fn step(&self) -> StepId {
        match self {
            StepOutcome::Generated(generated) => generated.step,
            StepOutcome::AlreadyInFlight { step } => *step,
        }
    }

    pub fn generated(&self) -> Option<&GeneratedStep> {
        match self {
            StepOutcome::Generated(generated) => Some(generated),
            StepOutcome::AlreadyInFlight { .. } => None,
        }
    }

    pub(crate) fn with_dependencies(self, dependencies: Vec<StepId>) -> Self {
        match self {
            StepOutcome::Generated(mut generated) => {
                generated.dependencies = dependencies;
                StepOutcome::Generated(generated)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: StepId,
    pub code: String,
    pub message: String,
}

impl StepFailure {
    pub fn from_error(step: StepId, err: &GenerationError) -> Self {
        Self {
            step,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of one `generate_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    /// Steps that lacked content when the pass started
    pub pending: Vec<StepId>,
    /// Steps that already held content; never sent to the generator
    pub already_satisfied: Vec<StepId>,
    pub generated: Vec<StepId>,
    /// Pending steps another request filled while the pass was running
    pub satisfied_elsewhere: Vec<StepId>,
    pub failed: Vec<StepFailure>,
    /// Not attempted because a prerequisite failed or was blocked
    pub blocked: Vec<StepId>,
    /// Skipped because another attempt was already running
    pub in_flight: Vec<StepId>,
    pub consumption_errors: Vec<ConsumptionError>,
}

impl BulkSummary {
    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }

    /// Anything failed, blocked or skipped.
    pub fn has_problems(&self) -> bool {
        !self.failed.is_empty() || !self.blocked.is_empty() || !self.in_flight.is_empty()
    }

    /// Every pending step ended the pass with content.
    pub fn is_complete(&self) -> bool {
        self.generated.len() + self.satisfied_elsewhere.len() == self.pending.len()
    }

    pub fn message(&self) -> String {
        let headline = format!(
            "{} of {} steps generated",
            self.generated.len(),
            self.pending.len()
        );
        if self.satisfied_elsewhere.is_empty() {
            headline
        } else {
            format!(
                "{}, {} filled by another request",
                headline,
                self.satisfied_elsewhere.len()
            )
        }
    }
}
