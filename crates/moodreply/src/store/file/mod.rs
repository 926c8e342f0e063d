//! File-based storage.
//!
//! Both documents are plain JSON files in the installation root. Every write
//! goes through [`atomic_write_file`] (temp file + rename) so a reader in
//! another process sees either the old or the new file, never a prefix.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::{StorageError, StorageResult};

mod exchange;
mod persona;

pub use exchange::FileExchangeStore;
pub use persona::FilePersonaStore;

/// Create `dir` and its parents. Succeeds if it already exists.
pub async fn ensure_dir(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::file_io(dir, e))
}

/// Write data to a temp file, fsync it, then atomically rename to the final path.
///
/// The temp file lives in the destination directory (rename must not cross
/// filesystems) and is named with a ULID so concurrent writers never share one.
/// On failure the temp file is removed and the destination keeps its previous
/// content.
pub async fn atomic_write_file(final_path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let temp_path = final_path.with_file_name(format!(".{}.{}.tmp", file_name, ulid::Ulid::new()));

    let result = write_and_rename(&temp_path, final_path, data).await;
    if result.is_err() && fs::remove_file(&temp_path).await.is_ok() {
        debug!(path = %temp_path.display(), "Removed abandoned temp file");
    }
    result
}

async fn write_and_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    drop(file);
    fs::rename(temp_path, final_path)
        .await
        .map_err(|e| StorageError::file_io(final_path, e))?;
    Ok(())
}

/// Read a whole file. A missing file is `Ok(None)`, not an error.
pub async fn read_file(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::file_io(path, e)),
    }
}
