//! Launches the editor in embedded mode and owns the child process.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::error::StartupError;

/// Flags that make the editor speak MessagePack-RPC on stdio without a TUI.
pub const EMBED_ARGS: &[&str] = &["--embed", "--headless"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnConfig {
    pub program: String,
    pub extra_args: Vec<String>,
}

impl SpawnConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        EMBED_ARGS
            .iter()
            .copied()
            .chain(self.extra_args.iter().map(String::as_str))
    }
}

impl From<&EditorConfig> for SpawnConfig {
    fn from(config: &EditorConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
        }
    }
}

/// The child's RPC pipes.
pub struct ProcessPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// A running editor child. Dropping it kills the child.
pub struct EditorProcess {
    program: String,
    child: Child,
    pid: Option<u32>,
    stderr_task: Option<JoinHandle<()>>,
}

impl EditorProcess {
    /// Spawns the editor and starts forwarding its stderr to the log.
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: &SpawnConfig) -> Result<(Self, ProcessPipes), StartupError> {
        let mut command = Command::new(&config.program);
        command.args(config.args());
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        info!(
            target: "editor::process",
            program = %config.program,
            args = ?config.args().collect::<Vec<_>>(),
            "launching editor"
        );

        let mut child = command
            .spawn()
            .map_err(|err| StartupError::new(&config.program, err))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StartupError::missing_pipe(&config.program, "stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StartupError::missing_pipe(&config.program, "stdout"))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr)));
        let pid = child.id();
        debug!(target: "editor::process", ?pid, "editor started");

        Ok((
            Self {
                program: config.program.clone(),
                child,
                pid,
                stderr_task,
            },
            ProcessPipes { stdin, stdout },
        ))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(err) => {
                warn!(target: "editor::process", error = %err, "failed to poll editor");
                false
            }
        }
    }

    /// Waits up to `timeout` for a natural exit. `None` means it is still running.
    pub async fn wait_for_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(target: "editor::process", %status, "editor exited");
                Some(status)
            }
            Ok(Err(err)) => {
                warn!(target: "editor::process", error = %err, "failed to await editor");
                None
            }
            Err(_) => None,
        }
    }

    /// Force-kills the editor together with any children it started.
    pub async fn kill_tree(&mut self) {
        warn!(target: "editor::process", pid = ?self.pid, "editor did not exit; killing process tree");
        if let Some(pid) = self.pid {
            kill_process_group(pid).await;
        }
        if let Err(err) = self.child.start_kill() {
            debug!(target: "editor::process", error = %err, "kill after group kill");
        }
        if let Err(err) = self.child.wait().await {
            warn!(target: "editor::process", error = %err, "failed to reap editor");
        }
    }

    /// Stops stderr forwarding and reaps the child if it already exited.
    pub async fn dispose(mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
            let _ = task.await;
        }
        let _ = self.child.try_wait();
    }
}

impl Drop for EditorProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // The child leads its own group, see `process_group(0)` in `spawn`.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            target: "editor::process",
            pid,
            error = %std::io::Error::last_os_error(),
            "killpg failed"
        );
    }
}

#[cfg(windows)]
async fn kill_process_group(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(err) = status {
        debug!(target: "editor::process", pid, error = %err, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_group(_pid: u32) {}

async fn forward_stderr(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if !trimmed.is_empty() {
                    warn!(target: "editor::process", stream = "stderr", message = trimmed);
                }
            }
            Err(err) => {
                warn!(target: "editor::process", error = %err, "failed to read editor stderr");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn embed_flags_come_first() {
        let config = SpawnConfig {
            program: "nvim".into(),
            extra_args: vec!["--clean".into(), "-n".into()],
        };
        let args: Vec<&str> = config.args().collect();
        assert_eq!(args, vec!["--embed", "--headless", "--clean", "-n"]);
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_program_is_a_startup_error() {
        let config = SpawnConfig::new("beach-editor-no-such-binary");
        let err = match EditorProcess::spawn(&config) {
            Ok(_) => panic!("spawn should fail"),
            Err(err) => err,
        };
        assert_eq!(err.program, "beach-editor-no-such-binary");
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test_timeout::tokio_timeout_test]
    async fn stubborn_child_is_killed_after_timeout() {
        let Some(mut process) = spawn_sleeper() else {
            return;
        };
        assert!(process.is_running());
        assert!(process.wait_for_exit(Duration::from_millis(50)).await.is_none());
        process.kill_tree().await;
        assert!(!process.is_running());
        process.dispose().await;
    }

    /// `sleep` would reject the embed flags, so it is spawned directly.
    #[cfg(unix)]
    fn spawn_sleeper() -> Option<EditorProcess> {
        let mut command = Command::new("sleep");
        command.arg("30");
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command.process_group(0);
        let mut child = command.spawn().ok()?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr)));
        Some(EditorProcess {
            program: "sleep".into(),
            pid: child.id(),
            child,
            stderr_task,
        })
    }
}
