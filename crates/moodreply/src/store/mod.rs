//! Persistence for the two JSON documents in the installation root.

pub mod error;
pub mod file;

pub use error::{StorageError, StorageResult};
pub use file::{FileExchangeStore, FilePersonaStore, atomic_write_file, ensure_dir, read_file};
