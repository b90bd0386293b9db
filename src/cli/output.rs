//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, GenerationError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Generation(GenerationError::UnsatisfiedDependencies { step, missing }) => {
            let missing: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
            format!(
                "Step {} needs content for steps {} first. Run without --no-resolve to generate them.",
                step,
                missing.join(", ")
            )
        }
        ApiError::Generation(GenerationError::NotAuthenticated) => {
            "Not authenticated. Set admission.account_id in the configuration.".to_string()
        }
        ApiError::Generation(GenerationError::InsufficientCredits { required, available }) => {
            format!(
                "Not enough credits: {} required, {} available. Use 'brandstage credits --grant N'.",
                required, available
            )
        }
        ApiError::Generation(GenerationError::AdmissionUnavailable { reason }) => {
            format!(
                "Credit balance could not be read ({}). Check storage.store_path and retry.",
                reason
            )
        }
        other => other.to_string(),
    }
}
