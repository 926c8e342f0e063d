//! Building the worker command line and environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::LaunchError;
use crate::config::{InstallPaths, WorkerConfig};

/// Used when the parent environment has no `PATH`.
const DEFAULT_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Everything needed to start the worker, with paths already resolved.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub shell: PathBuf,
    pub shell_args: Vec<String>,
    pub interpreter_candidates: Vec<PathBuf>,
    pub fallback_interpreter: PathBuf,
    pub interpreter_args: Vec<String>,
    pub script: PathBuf,
    pub extra_path_dirs: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn from_config(config: &WorkerConfig, paths: &InstallPaths) -> Self {
        let resolve_all =
            |raw: &[String]| -> Vec<PathBuf> { raw.iter().map(|p| paths.resolve(p)).collect() };

        Self {
            shell: paths.resolve(&config.shell),
            shell_args: config.shell_args.clone(),
            interpreter_candidates: resolve_all(&config.interpreter_candidates),
            fallback_interpreter: paths.resolve(&config.fallback_interpreter),
            interpreter_args: config.interpreter_args.clone(),
            script: paths.resolve(&config.script),
            extra_path_dirs: resolve_all(&config.extra_path_dirs),
            env: config.env.clone(),
        }
    }

    /// First candidate that exists and is executable, else the fallback.
    pub fn resolve_interpreter(&self) -> PathBuf {
        self.interpreter_candidates
            .iter()
            .find(|candidate| is_executable(candidate))
            .cloned()
            .unwrap_or_else(|| self.fallback_interpreter.clone())
    }

    /// The worker runs from the directory holding its entry script.
    pub fn working_dir(&self) -> PathBuf {
        self.script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Command string handed to the shell: `'<interpreter>' <args> '<script>'`.
    pub fn shell_command(&self, interpreter: &Path) -> String {
        let mut parts = vec![shell_quote(&interpreter.to_string_lossy())];
        parts.extend(self.interpreter_args.iter().map(|a| shell_quote(a)));
        parts.push(shell_quote(&self.script.to_string_lossy()));
        parts.join(" ")
    }

    /// Build the command with piped output, augmented `PATH`, and the
    /// script's directory as working directory.
    pub fn build_command(&self) -> Result<Command, LaunchError> {
        if !self.script.is_file() {
            return Err(LaunchError::ScriptMissing(self.script.clone()));
        }

        let interpreter = self.resolve_interpreter();
        let command_line = self.shell_command(&interpreter);
        let path = augment_path(std::env::var("PATH").ok().as_deref(), &self.extra_path_dirs);
        debug!(
            shell = %self.shell.display(),
            command = %command_line,
            "Prepared worker command"
        );

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(command_line)
            .current_dir(self.working_dir())
            .env("PATH", path)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // SAFETY: pre_exec runs in the forked child before exec. PR_SET_PDEATHSIG
        // asks the kernel to send SIGTERM to the worker if we die first. Only
        // async-signal-safe calls are made here.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        Ok(cmd)
    }
}

/// Prepend `extra` directories to a `PATH` value, skipping ones already present.
///
/// Directories are prepended in order, so the last entry of `extra` ends up first.
pub fn augment_path(current: Option<&str>, extra: &[PathBuf]) -> String {
    let mut parts: Vec<String> = current
        .unwrap_or(DEFAULT_PATH)
        .split(':')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    for dir in extra {
        let dir = dir.to_string_lossy().to_string();
        if !parts.contains(&dir) {
            parts.insert(0, dir);
        }
    }
    parts.join(":")
}

/// Whether `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Single-quote for POSIX shells.
fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(script: PathBuf) -> LaunchSpec {
        LaunchSpec {
            shell: PathBuf::from("/bin/sh"),
            shell_args: vec!["-c".to_string()],
            interpreter_candidates: vec![],
            fallback_interpreter: PathBuf::from("/usr/bin/python3"),
            interpreter_args: vec!["-u".to_string()],
            script,
            extra_path_dirs: vec![],
            env: BTreeMap::new(),
        }
    }

    #[cfg(unix)]
    fn make_file(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn resolve_interpreter_picks_first_executable_candidate() {
        let tmp = TempDir::new().unwrap();
        let not_exec = tmp.path().join("python-noexec");
        let first = tmp.path().join("python-a");
        let second = tmp.path().join("python-b");
        make_file(&not_exec, 0o644);
        make_file(&first, 0o755);
        make_file(&second, 0o755);

        let mut spec = spec(tmp.path().join("model.py"));
        spec.interpreter_candidates = vec![
            tmp.path().join("missing"),
            not_exec,
            tmp.path().to_path_buf(),
            first.clone(),
            second,
        ];

        assert_eq!(spec.resolve_interpreter(), first);
    }

    #[test]
    fn resolve_interpreter_falls_back_when_nothing_matches() {
        let tmp = TempDir::new().unwrap();
        let mut spec = spec(tmp.path().join("model.py"));
        spec.interpreter_candidates = vec![tmp.path().join("nope")];

        assert_eq!(spec.resolve_interpreter(), PathBuf::from("/usr/bin/python3"));
    }

    #[test]
    fn augment_path_prepends_without_duplicates() {
        let extra = vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/home/u/miniconda3/bin"),
        ];
        assert_eq!(
            augment_path(Some("/usr/bin:/bin"), &extra),
            "/home/u/miniconda3/bin:/opt/homebrew/bin:/usr/bin:/bin"
        );
        assert_eq!(
            augment_path(Some("/usr/bin:/opt/homebrew/bin"), &extra),
            "/home/u/miniconda3/bin:/usr/bin:/opt/homebrew/bin"
        );
    }

    #[test]
    fn augment_path_uses_default_when_unset() {
        assert_eq!(
            augment_path(None, &[PathBuf::from("/extra")]),
            "/extra:/usr/bin:/bin:/usr/sbin:/sbin"
        );
    }

    #[test]
    fn shell_command_quotes_every_part() {
        let spec = spec(PathBuf::from("/home/u/it's here/model.py"));
        assert_eq!(
            spec.shell_command(Path::new("/usr/bin/python3")),
            r#"'/usr/bin/python3' '-u' '/home/u/it'\''s here/model.py'"#
        );
    }

    #[test]
    fn working_dir_is_script_parent() {
        let nested = spec(PathBuf::from("/home/u/iMessageAI/model.py"));
        assert_eq!(nested.working_dir(), PathBuf::from("/home/u/iMessageAI"));
        let bare = spec(PathBuf::from("model.py"));
        assert_eq!(bare.working_dir(), PathBuf::from("."));
    }

    #[test]
    fn build_command_requires_the_script() {
        let tmp = TempDir::new().unwrap();
        let spec = spec(tmp.path().join("model.py"));
        assert!(matches!(
            spec.build_command(),
            Err(LaunchError::ScriptMissing(_))
        ));

        std::fs::write(tmp.path().join("model.py"), "print('hi')\n").unwrap();
        assert!(spec.build_command().is_ok());
    }

    #[test]
    fn from_config_resolves_home_and_root() {
        let paths = InstallPaths::new("/home/u/iMessageAI", "/home/u");
        let spec = LaunchSpec::from_config(&WorkerConfig::default(), &paths);
        assert_eq!(spec.script, PathBuf::from("/home/u/iMessageAI/model.py"));
        assert_eq!(
            spec.interpreter_candidates[0],
            PathBuf::from("/home/u/miniconda3/bin/python")
        );
        assert_eq!(
            spec.extra_path_dirs,
            vec![
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/home/u/miniconda3/bin"),
            ]
        );
    }
}
