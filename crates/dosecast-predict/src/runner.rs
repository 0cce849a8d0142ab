//! External process invocation.
//!
//! # Design
//! - `PredictionRunner` is the seam between the service and the OS so tests
//!   can substitute an in-memory runner.
//! - `CommandRunner` starts the child as the leader of a new process group.
//!   A timeout or a fired cancellation token kills the whole group and reaps
//!   the child before the run returns, so helpers the command started cannot
//!   outlive the run permit. Stragglers left behind after a normal exit are
//!   killed the same way.
//! - Judging success is separate from running: `ProcessReport::judge` applies
//!   the configured stderr policy.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dosecast_config::{PredictionPolicy, StderrPolicy};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PredictionError, PredictionResult};

/// Fully resolved command line for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to spawn.
    pub program: String,
    /// Leading arguments before the directories.
    pub args: Vec<String>,
    /// Patient input directory, passed as the first positional argument.
    pub input_dir: PathBuf,
    /// Patient output directory, passed as the second positional argument.
    pub output_dir: PathBuf,
    /// Kill the process once this elapses.
    pub timeout: Duration,
}

impl Invocation {
    /// Build an invocation from the configured policy and patient directories.
    #[must_use]
    pub fn from_policy(policy: &PredictionPolicy, input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            program: policy.program.clone(),
            args: policy.args.clone(),
            input_dir,
            output_dir,
            timeout: policy.timeout,
        }
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the exit status reported success.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock time between spawn and exit.
    pub elapsed: Duration,
}

impl ProcessReport {
    /// Decide whether the run succeeded under `policy`.
    ///
    /// A failing exit status always fails. Non-empty stderr fails only under
    /// [`StderrPolicy::Fail`]; otherwise it is logged and the run succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::ProcessFailed`] carrying the raw stderr, or a
    /// synthesized message naming the exit status when stderr is empty.
    pub fn judge(self, policy: StderrPolicy) -> PredictionResult<Self> {
        let has_stderr = !self.stderr.trim().is_empty();
        if !self.success {
            let stderr = if has_stderr {
                self.stderr
            } else {
                self.exit_code.map_or_else(
                    || "prediction process terminated by signal".to_string(),
                    |code| format!("prediction process exited with code {code}"),
                )
            };
            return Err(PredictionError::ProcessFailed {
                exit_code: self.exit_code,
                stderr,
            });
        }
        if has_stderr {
            match policy {
                StderrPolicy::Fail => {
                    return Err(PredictionError::ProcessFailed {
                        exit_code: self.exit_code,
                        stderr: self.stderr,
                    });
                }
                StderrPolicy::Ignore => {
                    warn!(
                        stderr = %self.stderr.trim(),
                        "prediction process wrote to stderr but exited successfully"
                    );
                }
            }
        }
        Ok(self)
    }
}

/// Executes one prediction.
#[async_trait]
pub trait PredictionRunner: Send + Sync {
    /// Run the invocation to completion, honouring its timeout and `cancel`.
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> PredictionResult<ProcessReport>;
}

/// Runner that spawns a real child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

#[async_trait]
impl PredictionRunner for CommandRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> PredictionResult<ProcessReport> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .arg(&invocation.input_dir)
            .arg(&invocation.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| PredictionError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let group = child.id();
        debug!(
            program = %invocation.program,
            pid = group.unwrap_or_default(),
            "prediction process spawned"
        );

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            () = tokio::time::sleep(invocation.timeout) => Ending::TimedOut,
            () = cancel.cancelled() => Ending::Cancelled,
        };

        let status = match ending {
            Ending::Exited(status) => {
                kill_group(group);
                status.map_err(|source| {
                    PredictionError::io("process.wait", &invocation.output_dir, source)
                })?
            }
            Ending::TimedOut => {
                warn!(
                    timeout_secs = invocation.timeout.as_secs(),
                    "prediction process timed out; killing process group"
                );
                terminate(&mut child, group).await;
                return Err(PredictionError::TimedOut {
                    after: invocation.timeout,
                });
            }
            Ending::Cancelled => {
                warn!("prediction process cancelled; killing process group");
                terminate(&mut child, group).await;
                return Err(PredictionError::Cancelled);
            }
        };

        Ok(ProcessReport {
            exit_code: status.code(),
            success: status.success(),
            stdout: collect(stdout, "process.stdout", invocation).await?,
            stderr: collect(stderr, "process.stderr", invocation).await?,
            elapsed: started.elapsed(),
        })
    }
}

enum Ending {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    pipe.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

async fn collect(
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    operation: &'static str,
    invocation: &Invocation,
) -> PredictionResult<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let bytes = reader
        .await
        .map_err(|source| PredictionError::Join { operation, source })?
        .map_err(|source| PredictionError::io(operation, &invocation.output_dir, source))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Kill the group and wait for the leader so no process from the run survives it.
async fn terminate(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "prediction process already exited");
    }
    if let Err(err) = child.wait().await {
        warn!(error = %err, "failed to reap prediction process");
    }
}

#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(pgid, error = %err, "failed to kill prediction process group"),
    }
}

#[cfg(not(unix))]
const fn kill_group(_group: Option<u32>) {}
