//! Local persistence of the project list.
//!
//! `BlobStore` is a minimal key-value store: each slot is one file in the data
//! directory. The project collection is serialized as JSON under the `projects` slot.
//! Process states and logs are never persisted.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::project::{sample_projects, Project};

pub const PROJECTS_SLOT: &str = "projects";

/// Directory-backed key-value blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }

    /// Reads a slot. A missing slot is `Ok(None)`.
    pub fn get(&self, slot: &str) -> Result<Option<String>> {
        let path = self.slot_path(slot);
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Writes a slot, creating the data directory if needed.
    pub fn set(&self, slot: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.slot_path(slot);
        fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Removes a slot. Returns whether it existed.
    pub fn remove(&self, slot: &str) -> Result<bool> {
        let path = self.slot_path(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

/// The persisted project collection.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    blobs: BlobStore,
}

impl ProjectStore {
    pub fn new(blobs: BlobStore) -> Self {
        Self { blobs }
    }

    /// Loads the saved projects, or the built-in samples when nothing usable is saved.
    pub fn load(&self) -> Result<Vec<Project>> {
        let Some(raw) = self.blobs.get(PROJECTS_SLOT)? else {
            info!("no saved projects, using samples");
            return Ok(sample_projects());
        };
        match serde_json::from_str(&raw) {
            Ok(projects) => Ok(projects),
            Err(err) => {
                warn!(error = %err, "saved projects are unreadable, using samples");
                Ok(sample_projects())
            }
        }
    }

    pub fn save(&self, projects: &[Project]) -> Result<()> {
        let raw = serde_json::to_string_pretty(projects).context("failed to serialize projects")?;
        self.blobs.set(PROJECTS_SLOT, &raw)?;
        info!(count = projects.len(), "projects saved");
        Ok(())
    }

    /// Forgets the saved projects so the next load falls back to samples.
    pub fn reset(&self) -> Result<bool> {
        self.blobs.remove(PROJECTS_SLOT)
    }
}

/// Default data directory: `$XDG_DATA_HOME/devrack` or the platform equivalent.
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .map(|dir| dir.join("devrack"))
        .unwrap_or_else(|| PathBuf::from(".devrack"))
}
