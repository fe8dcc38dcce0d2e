// ABOUTME: Runs external commands and captures exit status, stdout and stderr
// ABOUTME: CommandRunner trait plus the tokio::process backed ProcessRunner

use crate::config::ScanConfig;
use crate::error::RunError;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code, or `127 + signal` when killed by a signal
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one shell command line, optionally feeding it stdin.
///
/// Resolves once the process has exited *and* both output streams are
/// drained. A non-zero exit is `Ok`; only failing to run the command at
/// all is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput, RunError>;
}

/// Runs commands as `<shell> -c <command>` child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
    timeout: Option<Duration>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl ProcessRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.timeout(),
        }
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput, RunError> {
        tracing::debug!(shell = %self.shell, command = %command, has_stdin = stdin.is_some(), "Spawning command");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let Some(timeout) = self.timeout else {
            return collect(&mut child, command, stdin).await;
        };

        let outcome = tokio::time::timeout(timeout, collect(&mut child, command, stdin)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(command = %command, timeout_secs = timeout.as_secs(), "Command timed out");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill timed-out command");
                }
                Err(RunError::Timeout {
                    command: command.to_string(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }
}

/// Feed stdin, drain stdout and stderr, and wait for exit, all at once.
async fn collect(
    child: &mut Child,
    command: &str,
    input: Option<&[u8]>,
) -> Result<CommandOutput, RunError> {
    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let write_stdin = async move {
        if let (Some(mut pipe), Some(data)) = (stdin_pipe, input) {
            match pipe.write_all(data).await {
                // Child exited without reading everything; not our failure
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
            // Dropping the pipe closes it, signalling EOF
            drop(pipe);
        }
        Ok::<(), std::io::Error>(())
    };

    let (_, stdout, stderr, status) = tokio::try_join!(
        write_stdin,
        read_all(stdout_pipe),
        read_all(stderr_pipe),
        child.wait()
    )
    .map_err(|source| RunError::Io {
        command: command.to_string(),
        source,
    })?;

    Ok(CommandOutput {
        exit_code: exit_code(status),
        stdout,
        stderr,
    })
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Map an exit status into one integer space: the process's own code, or
/// `127 + signal` for signal termination.
pub fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 127 + signal;
        }
    }
    status.code().unwrap_or(-1)
}
