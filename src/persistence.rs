//! Project persistence
//!
//! Saving project state after each successful content write is delegated to a
//! [`ProjectPersistence`] collaborator; the orchestrator never writes storage itself.

use crate::content::ProjectState;
use crate::error::StorageError;
use sled::{Db, Tree};
use std::path::Path;

const TREE_PROJECTS: &str = "projects";

/// Durable save hook invoked after every successful content write.
pub trait ProjectPersistence: Send + Sync {
    fn save(&self, state: &ProjectState) -> Result<(), StorageError>;
}

/// Sled-backed project store; values are JSON-encoded [`ProjectState`]s.
#[derive(Clone)]
pub struct SledProjectStore {
    db: Db,
    projects: Tree,
}

impl SledProjectStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let projects = db.open_tree(TREE_PROJECTS)?;
        Ok(Self { db, projects })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn create(&self, state: &ProjectState) -> Result<(), StorageError> {
        let value = serde_json::to_vec(state)?;
        let swapped = self.projects.compare_and_swap(
            state.project_id.as_bytes(),
            None as Option<&[u8]>,
            Some(value),
        )?;
        if swapped.is_err() {
            return Err(StorageError::ProjectExists(state.project_id.clone()));
        }
        self.projects.flush()?;
        Ok(())
    }

    pub fn load(&self, project_id: &str) -> Result<ProjectState, StorageError> {
        let raw = self
            .projects
            .get(project_id.as_bytes())?
            .ok_or_else(|| StorageError::ProjectNotFound(project_id.to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn list(&self) -> Result<Vec<ProjectState>, StorageError> {
        let mut out = Vec::new();
        for item in self.projects.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice::<ProjectState>(&value)?);
        }
        out.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        Ok(out)
    }

    pub fn delete(&self, project_id: &str) -> Result<bool, StorageError> {
        let removed = self.projects.remove(project_id.as_bytes())?.is_some();
        self.projects.flush()?;
        Ok(removed)
    }
}

impl ProjectPersistence for SledProjectStore {
    fn save(&self, state: &ProjectState) -> Result<(), StorageError> {
        let value = serde_json::to_vec(state)?;
        self.projects.insert(state.project_id.as_bytes(), value)?;
        self.projects.flush()?;
        Ok(())
    }
}
