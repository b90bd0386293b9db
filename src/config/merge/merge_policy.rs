//! Merge rules: built-in defaults applied beneath every file and env source.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("generation.dependency_delay_ms", 750)?
        .set_default("generation.timeout_secs", 120)?
        .set_default("credits.default_cost", 1)?
        .set_default("admission.initial_balance", 25)?
        .set_default("admission.bypass", false)?
        .set_default("provider.provider_type", "ollama")?
        .set_default("provider.model", "llama3.1")
}
