//! Process launching: command resolution and subprocess spawning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::config::SessionConfig;
use crate::error::SpawnError;

/// File name of the bundled analysis server, without platform suffix.
pub const SERVER_BINARY: &str = "calcagebra-ls";

/// Host platform family, as far as executable naming cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    fn executable_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Unix => "",
        }
    }
}

/// The resolved command used to launch the analysis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableSpec {
    command: PathBuf,
}

impl ExecutableSpec {
    #[must_use]
    pub fn command(&self) -> &Path {
        &self.command
    }
}

impl fmt::Display for ExecutableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command.display())
    }
}

/// Decide which executable to launch.
///
/// A non-empty explicit `server.path` wins verbatim. No existence check
/// happens here; a bad path surfaces later as a spawn error.
#[must_use]
pub fn resolve_command(
    config: &SessionConfig,
    platform: Platform,
    bundled_dir: &Path,
) -> ExecutableSpec {
    let command = match config.server_path() {
        Some(path) => PathBuf::from(path),
        None => bundled_dir.join(format!("{SERVER_BINARY}{}", platform.executable_suffix())),
    };
    ExecutableSpec { command }
}

/// A spawned (or externally supplied) server transport.
///
/// `child` is `None` when the transport was not spawned by us; the session
/// then has no process to terminate.
pub struct ServerHandle {
    pub child: Option<Child>,
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
}

/// Spawning seam. [`ProcessLauncher`] is the production implementation;
/// tests substitute fakes to observe (or suppress) the spawn decision.
pub trait Launcher {
    fn spawn(&mut self, spec: &ExecutableSpec) -> Result<ServerHandle, SpawnError>;
}

/// Launches the analysis server as a managed subprocess with stdin/stdout as
/// the duplex message channel.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn spawn(&mut self, spec: &ExecutableSpec) -> Result<ServerHandle, SpawnError> {
        let mut cmd = Command::new(spec.command());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
            command: spec.command().to_path_buf(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| SpawnError::MissingPipe {
            command: spec.command().to_path_buf(),
            stream: "stdin",
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SpawnError::MissingPipe {
            command: spec.command().to_path_buf(),
            stream: "stdout",
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Ok(ServerHandle {
            child: Some(child),
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
        })
    }
}

/// Forward server stderr to the log, line by line. Never parsed.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "calcagebra_ls_stderr", "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config_with_path(path: Option<&str>) -> SessionConfig {
        let mut reader: HashMap<String, serde_json::Value> = HashMap::new();
        reader.insert("server.enable".to_string(), json!(true));
        if let Some(path) = path {
            reader.insert("server.path".to_string(), json!(path));
        }
        crate::config::resolve(&reader).unwrap()
    }

    #[test]
    fn explicit_override_is_used_verbatim() {
        let config = config_with_path(Some("/custom/bin"));
        let spec = resolve_command(&config, Platform::Unix, Path::new("/bundle"));
        assert_eq!(spec.command(), Path::new("/custom/bin"));

        // Platform suffix never applies to overrides.
        let spec = resolve_command(&config, Platform::Windows, Path::new("/bundle"));
        assert_eq!(spec.command(), Path::new("/custom/bin"));
    }

    #[test]
    fn bundled_binary_on_unix_has_no_suffix() {
        let config = config_with_path(None);
        let spec = resolve_command(&config, Platform::Unix, Path::new("/bundle/out"));
        assert_eq!(spec.command(), Path::new("/bundle/out/calcagebra-ls"));
    }

    #[test]
    fn bundled_binary_on_windows_gets_exe_suffix() {
        let config = config_with_path(None);
        let spec = resolve_command(&config, Platform::Windows, Path::new("/bundle/out"));
        assert!(spec.command().to_string_lossy().ends_with("calcagebra-ls.exe"));
    }

    #[test]
    fn empty_override_falls_back_to_bundled() {
        let config = config_with_path(Some(""));
        let spec = resolve_command(&config, Platform::Unix, Path::new("/bundle"));
        assert_eq!(spec.command(), Path::new("/bundle/calcagebra-ls"));
    }

    #[tokio::test]
    async fn spawn_failure_names_the_command() {
        let config = config_with_path(Some("/definitely/not/a/binary"));
        let spec = resolve_command(&config, Platform::current(), Path::new("/bundle"));
        let Err(err) = ProcessLauncher.spawn(&spec) else {
            panic!("spawn of a nonexistent binary must fail");
        };
        assert!(err.to_string().contains("/definitely/not/a/binary"));
    }
}
