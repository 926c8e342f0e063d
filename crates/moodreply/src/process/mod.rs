//! Reply worker process management.
//!
//! The worker is an opaque script that reads `config.json` and reads/writes
//! `replies.json` on its own schedule. This module only launches it, streams
//! its output into the log, and restarts it while the keep-running flag is
//! set. It never touches either JSON file.

use std::path::PathBuf;

use thiserror::Error;

pub mod launch;
pub mod supervisor;

pub use launch::LaunchSpec;
pub use supervisor::SupervisorHandle;

/// Lifecycle of the supervised worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkerState {
    #[default]
    Stopped,
    Starting,
    Running { pid: Option<u32> },
    /// Exited and waiting out the restart cool-down.
    Exited { code: Option<i32> },
}

/// Snapshot published by the supervisor after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub keep_running: bool,
    /// Processes successfully spawned since startup.
    pub spawn_count: u64,
    /// Process exits observed since startup.
    pub exit_count: u64,
    /// `None` when the last exit was caused by a signal.
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("worker script not found: {0}")]
    ScriptMissing(PathBuf),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}
