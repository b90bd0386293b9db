//! Storage location for projects and the local credit ledger.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory; relative paths resolve against the workspace root.
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.store_path {
            if path.as_os_str().is_empty() {
                return Err("store_path cannot be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn resolve_store_path(&self, workspace_root: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workspace_root.join(path),
            None => default_store_path()
                .unwrap_or_else(|| workspace_root.join(".brandstage").join("store")),
        }
    }
}

fn default_store_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "brandstage").map(|dirs| dirs.data_dir().join("store"))
}
