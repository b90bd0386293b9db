//! Staged generation orchestration.
//!
//! [`GenerationOrchestrator`] drives one project's steps: single-step requests with
//! optional dependency resolution, and bulk passes over everything still missing.

mod outcome;
mod session;
mod state;

pub use outcome::{
    BulkSummary, ConsumptionStatus, GenerateOptions, GeneratedStep, StepFailure, StepOutcome,
};
pub use session::{GenerationOrchestrator, OrchestratorBuilder, OrchestratorSettings};
pub use state::{GenerationState, InFlightGuard, StepStateTracker};
