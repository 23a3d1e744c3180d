use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};

/// A fully built command line, ready to hand to a [`ProcessExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment applied to the child, sorted by key.
    pub env: Vec<(String, String)>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Per-invocation timing budget for one child process. This is distinct from
/// the job-completion budget in `PollingPolicy`: it bounds how long a single
/// relay command may take, not how long the remote job may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecLimits {
    /// Delay between completion polls. Zero means no artificial delay.
    pub poll_delay: Duration,
    /// Maximum time the child may take. Zero means an infinite wait.
    pub timeout: Duration,
}

/// Captured output of a completed child process.
#[derive(Debug, Clone)]
pub struct ExecCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecCapture {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, ThisError)]
pub enum ExecError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' did not complete within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Runs a command line as a child process with null stdin and captured
/// stdout/stderr. Injected into every component so tests can script the
/// transcripts instead of spawning real processes.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, command: &CommandLine, limits: &ExecLimits)
    -> Result<ExecCapture, ExecError>;
}

/// Production executor backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &CommandLine,
        limits: &ExecLimits,
    ) -> Result<ExecCapture, ExecError> {
        log::debug!("executing '{command}'");
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;

        // Drain both pipes concurrently; a full pipe would otherwise stall
        // the child before it can exit.
        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let status = wait_within(&mut child, command, limits).await?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ExecCapture {
            stdout,
            stderr,
            // no exit code means the child died on a signal
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

async fn wait_within(
    child: &mut Child,
    command: &CommandLine,
    limits: &ExecLimits,
) -> Result<std::process::ExitStatus, ExecError> {
    let wait_err = |source| ExecError::Wait {
        command: command.to_string(),
        source,
    };

    if limits.poll_delay.is_zero() {
        if limits.timeout.is_zero() {
            return child.wait().await.map_err(wait_err);
        }
        match timeout(limits.timeout, child.wait()).await {
            Ok(status) => status.map_err(wait_err),
            Err(_) => {
                let _ = child.kill().await;
                Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout: limits.timeout,
                })
            }
        }
    } else {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if !limits.timeout.is_zero() && started.elapsed() > limits.timeout {
                let _ = child.kill().await;
                return Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout: limits.timeout,
                });
            }
            sleep(limits.poll_delay).await;
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}
