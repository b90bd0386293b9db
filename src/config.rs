//! Configuration System
//!
//! Layered configuration: built-in defaults, the user's XDG config file, workspace
//! config files, then `BRANDSTAGE__SECTION__KEY` environment variables. Validation
//! reports every problem at once.

use crate::logging::LoggingConfig;
use crate::step::StepRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;
mod storage;

pub use facade::ConfigLoader;
pub use storage::StorageConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandstageConfig {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub credits: CreditsConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generation timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Pause after each prerequisite generated on the interactive path
    #[serde(default = "default_dependency_delay_ms")]
    pub dependency_delay_ms: u64,

    /// Timeout for a single generator call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_dependency_delay_ms() -> u64 {
    750
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            dependency_delay_ms: default_dependency_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Credit cost per generated step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsConfig {
    #[serde(default = "default_cost")]
    pub default_cost: u64,

    /// Cost overrides keyed by step key (or numeric id)
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

fn default_cost() -> u64 {
    1
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            default_cost: default_cost(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Signed-in account; without one every generation is denied
    #[serde(default)]
    pub account_id: Option<String>,

    /// Balance seeded the first time an account is seen
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u64,

    /// Developer bypass; only honored together with `BRANDSTAGE_ADMISSION_BYPASS=1`
    #[serde(default)]
    pub bypass: bool,
}

fn default_initial_balance() -> u64 {
    25
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            initial_balance: default_initial_balance(),
            bypass: false,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Generation(String),
    Credits(String),
    Admission(String),
    Provider(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Generation(msg) => write!(f, "generation: {}", msg),
            ValidationError::Credits(msg) => write!(f, "credits: {}", msg),
            ValidationError::Admission(msg) => write!(f, "admission: {}", msg),
            ValidationError::Provider(msg) => write!(f, "provider: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl BrandstageConfig {
    /// Validate against the built-in branding registry.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        match StepRegistry::branding() {
            Ok(registry) => self.validate_against(&registry),
            Err(err) => Err(vec![ValidationError::Credits(format!(
                "step registry is invalid: {}",
                err
            ))]),
        }
    }

    pub fn validate_against(&self, registry: &StepRegistry) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.generation.timeout_secs == 0 {
            errors.push(ValidationError::Generation(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        let mut unknown: Vec<&String> = self
            .credits
            .overrides
            .keys()
            .filter(|key| registry.resolve(key).is_none())
            .collect();
        unknown.sort();
        for key in unknown {
            errors.push(ValidationError::Credits(format!(
                "override for unknown step '{}'",
                key
            )));
        }

        if let Some(account) = &self.admission.account_id {
            if account.trim().is_empty() {
                errors.push(ValidationError::Admission(
                    "account_id cannot be blank".to_string(),
                ));
            }
        }

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render as TOML for `config show`.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
