use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

/// Name of the installation root inside the user's home directory.
pub const ROOT_DIR_NAME: &str = "iMessageAI";
pub const PERSONA_FILE: &str = "config.json";
pub const EXCHANGE_FILE: &str = "replies.json";
pub const CONFIG_FILE: &str = "moodreply.yaml";

// ============================================================================
// InstallPaths
// ============================================================================

/// Fixed locations inside the per-user installation root.
#[derive(Debug, Clone)]
pub struct InstallPaths {
    pub home: PathBuf,
    pub root: PathBuf,
    pub persona: PathBuf,
    pub exchange: PathBuf,
    pub config: PathBuf,
}

impl InstallPaths {
    /// `~/iMessageAI` for the current user.
    pub fn for_current_user() -> Result<Self, ConfigError> {
        let dirs = directories::BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
        let home = dirs.home_dir().to_path_buf();
        Ok(Self::new(home.join(ROOT_DIR_NAME), home))
    }

    pub fn new(root: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            home: home.into(),
            persona: root.join(PERSONA_FILE),
            exchange: root.join(EXCHANGE_FILE),
            config: root.join(CONFIG_FILE),
            root,
        }
    }

    /// Resolve a configured path: `~` expands to home, relative paths are
    /// taken relative to the installation root.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = expand_home(raw, &self.home);
        if expanded.is_absolute() {
            expanded
        } else {
            self.root.join(expanded)
        }
    }
}

/// Expand a leading `~` or `~/` against `home`.
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// PollConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// How long polling stays paused after the application writes the
    /// exchange file.
    #[serde(default = "default_write_grace")]
    pub write_grace_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            write_grace_ms: default_write_grace(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn write_grace(&self) -> Duration {
        Duration::from_millis(self.write_grace_ms)
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_write_grace() -> u64 {
    300
}

// ============================================================================
// WorkerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry script, relative to the installation root unless absolute.
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown_ms: u64,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    /// Probed in order; the first existing executable wins.
    #[serde(default = "default_interpreter_candidates")]
    pub interpreter_candidates: Vec<String>,
    #[serde(default = "default_fallback_interpreter")]
    pub fallback_interpreter: String,
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,
    /// Prepended to `PATH` in order, skipping entries already present.
    #[serde(default = "default_extra_path_dirs")]
    pub extra_path_dirs: Vec<String>,
    #[serde(default = "default_worker_env")]
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script: default_script(),
            restart_cooldown_ms: default_restart_cooldown(),
            shell: default_shell(),
            shell_args: default_shell_args(),
            interpreter_candidates: default_interpreter_candidates(),
            fallback_interpreter: default_fallback_interpreter(),
            interpreter_args: default_interpreter_args(),
            extra_path_dirs: default_extra_path_dirs(),
            env: default_worker_env(),
        }
    }
}

impl WorkerConfig {
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_script() -> String {
    "model.py".to_string()
}

fn default_restart_cooldown() -> u64 {
    1000
}

fn default_shell() -> String {
    if cfg!(target_os = "macos") {
        "/bin/zsh".to_string()
    } else {
        "/bin/sh".to_string()
    }
}

fn default_shell_args() -> Vec<String> {
    // A login shell picks up the user's profile (conda, homebrew).
    if cfg!(target_os = "macos") {
        vec!["-lc".to_string()]
    } else {
        vec!["-c".to_string()]
    }
}

fn default_interpreter_candidates() -> Vec<String> {
    [
        "~/miniconda3/bin/python",
        "~/miniconda3/bin/python3",
        "/usr/local/bin/python",
        "/usr/local/bin/python3",
        "/usr/bin/python",
        "/usr/bin/python3",
        "/opt/homebrew/bin/python",
        "/opt/homebrew/bin/python3",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fallback_interpreter() -> String {
    "/usr/bin/python3".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".to_string()]
}

fn default_extra_path_dirs() -> Vec<String> {
    vec!["/opt/homebrew/bin".to_string(), "~/miniconda3/bin".to_string()]
}

fn default_worker_env() -> BTreeMap<String, String> {
    BTreeMap::from([("PYTHONUNBUFFERED".to_string(), "1".to_string())])
}

// ============================================================================
// NotificationConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: NotifierBackend,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: NotifierBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierBackend {
    /// Write notifications to the log.
    #[default]
    Log,
    /// Hand notifications to the desktop (`osascript` / `notify-send`).
    Command,
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("could not determine the home directory")]
    NoHomeDir,
}

// ============================================================================
// Tests
// ============================================================================
