//! Error types for the staged generation orchestrator.

use crate::content::ContentError;
use crate::step::{RegistryError, StepId};
use serde::Serialize;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0}")]
    ProjectExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Reasons the admission controller refuses a generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionDenial {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u64, available: u64 },

    /// The balance could not be read; distinct from an empty balance
    #[error("Credit balance unavailable: {0}")]
    Unavailable(String),
}

/// Content was generated but the credit consumption could not be recorded.
///
/// Never rolls back content; reported separately from generation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("Content for step {step} was generated but credits may be out of sync: {reason}")]
pub struct ConsumptionError {
    pub step: StepId,
    pub reason: String,
}

/// Failures reported by a step generator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid generator output: {0}")]
    InvalidOutput(String),
}

impl From<ContentError> for GeneratorError {
    fn from(err: ContentError) -> Self {
        GeneratorError::InvalidOutput(err.to_string())
    }
}

/// Outcomes of `generate_step` / `generate_all` that are not successes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Project brief is empty; describe the project before generating")]
    EmptyInput,

    #[error("Unknown step: {0}")]
    UnknownStep(StepId),

    #[error("Step {step} requires content for steps {missing:?}")]
    UnsatisfiedDependencies { step: StepId, missing: Vec<StepId> },

    #[error("Generation of step {step} was declined")]
    UserDeclined { step: StepId },

    #[error("Step {step} aborted: dependency {dependency} failed: {cause}")]
    DependencyGenerationFailed {
        step: StepId,
        dependency: StepId,
        cause: Box<GenerationError>,
    },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u64, available: u64 },

    #[error("Credit balance unavailable: {reason}")]
    AdmissionUnavailable { reason: String },

    #[error("Generation of step {step} failed: {source}")]
    GenerationFailed {
        step: StepId,
        #[source]
        source: GeneratorError,
    },
}

impl From<AdmissionDenial> for GenerationError {
    fn from(denial: AdmissionDenial) -> Self {
        match denial {
            AdmissionDenial::NotAuthenticated => GenerationError::NotAuthenticated,
            AdmissionDenial::InsufficientCredits {
                required,
                available,
            } => GenerationError::InsufficientCredits {
                required,
                available,
            },
            AdmissionDenial::Unavailable(reason) => {
                GenerationError::AdmissionUnavailable { reason }
            }
        }
    }
}

impl GenerationError {
    /// Stable machine-readable code for bookkeeping and event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::EmptyInput => "empty_input",
            GenerationError::UnknownStep(_) => "unknown_step",
            GenerationError::UnsatisfiedDependencies { .. } => "unsatisfied_dependencies",
            GenerationError::UserDeclined { .. } => "user_declined",
            GenerationError::DependencyGenerationFailed { .. } => "dependency_generation_failed",
            GenerationError::NotAuthenticated => "not_authenticated",
            GenerationError::InsufficientCredits { .. } => "insufficient_credits",
            GenerationError::AdmissionUnavailable { .. } => "admission_unavailable",
            GenerationError::GenerationFailed { .. } => "generation_failed",
        }
    }
}

/// Top-level errors for configuration, storage and the command line.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Step registry error: {0}")]
    RegistryError(#[from] RegistryError),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Unknown step: {0}")]
    UnknownStep(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
