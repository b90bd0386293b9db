//! Config loading entry point: assembles sources in precedence order.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::BrandstageConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest first): defaults, XDG config file, `config/config.toml`,
    /// `config/{BRANDSTAGE_ENV}.toml`, `BRANDSTAGE__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<BrandstageConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(environment()).build()?;
        let loaded: BrandstageConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(loaded)
    }

    /// Load from one explicit file (plus defaults and environment), skipping the XDG
    /// and workspace files.
    pub fn load_from_file(path: &Path) -> Result<BrandstageConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Path of the user-level config file, whether or not it exists.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("BRANDSTAGE")
        .separator("__")
        .try_parsing(true)
}
