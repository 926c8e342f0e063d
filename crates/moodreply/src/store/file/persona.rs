//! File-based persona storage (`config.json`).

use std::path::{Path, PathBuf};

use moodreply_protocol::PersonaDocument;
use tracing::{debug, info, warn};

use super::{atomic_write_file, read_file};
use crate::store::error::StorageResult;

/// Reads and writes the persona document read by the worker.
#[derive(Debug, Clone)]
pub struct FilePersonaStore {
    path: PathBuf,
}

impl FilePersonaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persona, falling back to defaults for anything unusable.
    pub async fn load(&self) -> PersonaDocument {
        match read_file(&self.path).await {
            Ok(Some(bytes)) => PersonaDocument::from_slice(&bytes),
            Ok(None) => {
                debug!(path = %self.path.display(), "No persona file, using defaults");
                PersonaDocument::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persona file, using defaults");
                PersonaDocument::default()
            }
        }
    }

    /// Load the persona and write the defaults out if no file exists yet.
    pub async fn load_or_init(&self) -> PersonaDocument {
        match read_file(&self.path).await {
            Ok(Some(bytes)) => return PersonaDocument::from_slice(&bytes),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read persona file, using defaults");
                return PersonaDocument::default();
            }
        }

        let doc = PersonaDocument::default();
        match self.save(&doc).await {
            Ok(()) => info!(path = %self.path.display(), "Created persona file with defaults"),
            Err(e) => warn!(error = %e, "Failed to create persona file"),
        }
        doc
    }

    /// Persist the persona with sorted keys.
    pub async fn save(&self, doc: &PersonaDocument) -> StorageResult<()> {
        let bytes = doc.to_json_pretty()?;
        atomic_write_file(&self.path, &bytes).await?;
        debug!(path = %self.path.display(), "Wrote persona file");
        Ok(())
    }
}
