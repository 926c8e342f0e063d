//! File-based exchange storage (`replies.json`).
//!
//! No coordination happens here: [`crate::sync::ExchangeChannel`] wraps this
//! store and pauses the poller around writes.

use std::path::{Path, PathBuf};

use moodreply_protocol::{ExchangeDocument, to_sorted_json};
use serde_json::{Map, Value};
use tracing::debug;

use super::{atomic_write_file, read_file};
use crate::store::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct FileExchangeStore {
    path: PathBuf,
}

impl FileExchangeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the current document. `Ok(None)` if the file does not exist.
    ///
    /// Bytes that are not JSON at all (a torn write by another process) are an
    /// error; anything that parses is decoded tolerantly.
    pub async fn read(&self) -> StorageResult<Option<ExchangeDocument>> {
        let Some(bytes) = read_file(&self.path).await? else {
            return Ok(None);
        };
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::malformed(&self.path, e))?;
        Ok(Some(ExchangeDocument::from_value(&value)))
    }

    /// Read the raw top-level object, keeping keys this crate does not know.
    ///
    /// A missing file or a non-object top level starts from an empty object.
    pub async fn read_object(&self) -> StorageResult<Map<String, Value>> {
        let Some(bytes) = read_file(&self.path).await? else {
            return Ok(Map::new());
        };
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::malformed(&self.path, e))?;
        Ok(match value {
            Value::Object(object) => object,
            _ => Map::new(),
        })
    }

    pub async fn write_object(&self, object: &Map<String, Value>) -> StorageResult<()> {
        let bytes = to_sorted_json(object)?;
        atomic_write_file(&self.path, &bytes).await
    }

    /// Read-modify-write. Returns the object as written.
    ///
    /// Malformed JSON aborts the update so a half-written file from the worker
    /// is never replaced by a document built from nothing.
    pub async fn update<F>(&self, edit: F) -> StorageResult<Map<String, Value>>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut object = self.read_object().await?;
        edit(&mut object);
        self.write_object(&object).await?;
        debug!(path = %self.path.display(), keys = object.len(), "Wrote exchange file");
        Ok(object)
    }
}
