use crate::error::{ExecError, ExecResult};
use crate::git::capture::{BoundedOutput, read_bounded};
use crate::git::locks::PathLocks;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info, warn};

/// Exit code reported when the deadline killed the process
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long output pipes may stay open after git itself has exited
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Inherited variables that would point git somewhere other than the
/// resolved working directory
const SCRUBBED_ENV: &[&str] = &[
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_OBJECT_DIRECTORY",
    "GIT_CONFIG_PARAMETERS",
    "GIT_CONFIG_COUNT",
    "GIT_EXEC_PATH",
];

/// One fully-authorized git call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInvocation {
    pub subcommand: String,
    pub args: Vec<String>,
    /// Canonical directory approved by the Path Guard
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl GitInvocation {
    /// `subcommand args...` as one line, for logs and replies
    pub fn command_line(&self) -> String {
        std::iter::once(self.subcommand.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of running git to completion or to its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Either stream hit the output bound
    pub truncated: bool,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ExecutionResult {
    fn completed(exit_code: i32, stdout: BoundedOutput, stderr: BoundedOutput, duration: Duration) -> Self {
        Self {
            exit_code,
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            timed_out: false,
            duration,
        }
    }

    fn deadline_exceeded(duration: Duration) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
            timed_out: true,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Seam between the dispatcher and process creation
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, invocation: &GitInvocation) -> ExecResult<ExecutionResult>;
}

/// Runs the git binary directly, never through a shell
///
/// Each run holds the per-path lock for the whole life of the subprocess,
/// so two commands against the same repository never overlap.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    git_binary: PathBuf,
    locks: PathLocks,
}

impl GitExecutor {
    pub fn new<P: AsRef<Path>>(git_binary: P) -> Self {
        Self {
            git_binary: git_binary.as_ref().to_path_buf(),
            locks: PathLocks::new(),
        }
    }

    pub fn git_binary(&self) -> &Path {
        &self.git_binary
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Run `git <subcommand> <args...>` in `resolved_path`
    pub async fn execute(
        &self,
        subcommand: &str,
        sanitized_args: Vec<String>,
        resolved_path: &Path,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> ExecResult<ExecutionResult> {
        let invocation = GitInvocation {
            subcommand: subcommand.to_string(),
            args: sanitized_args,
            working_dir: resolved_path.to_path_buf(),
            timeout,
            max_output_bytes,
        };
        self.run(&invocation).await
    }

    fn command(&self, invocation: &GitInvocation) -> Command {
        let mut command = Command::new(&self.git_binary);
        command
            .arg(&invocation.subcommand)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for var in SCRUBBED_ENV {
            command.env_remove(var);
        }

        // Own process group, so a timeout can take down helpers git spawned
        // (ssh, credential helpers, hooks) along with git itself.
        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl GitRunner for GitExecutor {
    async fn run(&self, invocation: &GitInvocation) -> ExecResult<ExecutionResult> {
        let _lock = self.locks.acquire(&invocation.working_dir).await;
        let start = Instant::now();

        info!(
            command = %invocation.command_line(),
            path = %invocation.working_dir.display(),
            "running git"
        );

        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(|source| ExecError::SpawnFailed {
                binary: self.git_binary.display().to_string(),
                source,
            })?;

        // With process_group(0) git's pid is also the group id. Kept past
        // reaping, because helpers git started stay in the group.
        let group = child.id();
        let limit = invocation.max_output_bytes;
        let deadline = time::Instant::now() + invocation.timeout;

        let streams = capture_both(child.stdout.take(), child.stderr.take(), limit);
        tokio::pin!(streams);
        let expiry = time::sleep_until(deadline);
        tokio::pin!(expiry);

        // Drain output while waiting, so git never blocks on a full pipe.
        let mut output = None;
        let status = loop {
            tokio::select! {
                status = child.wait() => break Some(status),
                captured = &mut streams, if output.is_none() => output = Some(captured),
                _ = &mut expiry => break None,
            }
        };

        let status = match status {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                kill_process_group(group);
                return Err(ExecError::IoError(e));
            }
            None => {
                kill_process_group(group);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "child already gone");
                }
                warn!(
                    command = %invocation.command_line(),
                    timeout = ?invocation.timeout,
                    "git timed out and was killed"
                );
                return Ok(ExecutionResult::deadline_exceeded(start.elapsed()));
            }
        };

        let (stdout, stderr) = match output {
            Some(captured) => captured,
            None => {
                // git has exited; anything still holding the pipes is a
                // helper it left behind.
                let grace = time::sleep_until(deadline.min(time::Instant::now() + PIPE_GRACE));
                tokio::select! {
                    captured = &mut streams => captured,
                    _ = grace => {
                        warn!(
                            command = %invocation.command_line(),
                            "git exited but left processes holding its output; killing its process group"
                        );
                        kill_process_group(group);
                        time::timeout(PIPE_GRACE, &mut streams).await.map_err(|_| {
                            ExecError::OutputCapture(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "output pipes still open after killing the process group",
                            ))
                        })?
                    }
                }
            }
        };

        let result = ExecutionResult::completed(
            status.code().unwrap_or(-1),
            stdout.map_err(ExecError::OutputCapture)?,
            stderr.map_err(ExecError::OutputCapture)?,
            start.elapsed(),
        );

        if result.truncated {
            warn!(limit, "git output truncated");
        }
        debug!(exit_code = result.exit_code, elapsed = ?result.duration, "git finished");
        Ok(result)
    }
}

async fn capture_both<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    limit: usize,
) -> (std::io::Result<BoundedOutput>, std::io::Result<BoundedOutput>)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    tokio::join!(capture(stdout, limit), capture(stderr, limit))
}

async fn capture<R>(stream: Option<R>, limit: usize) -> std::io::Result<BoundedOutput>
where
    R: AsyncRead + Unpin,
{
    match stream {
        Some(stream) => read_bounded(stream, limit).await,
        None => Ok(BoundedOutput::default()),
    }
}

/// SIGKILL every process left in git's process group
fn kill_process_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        // SAFETY: killpg has no memory-safety preconditions. The group was
        // created by process_group(0) at spawn and is only signalled while
        // the request still holds it: either git itself is unreaped, or its
        // leftover helpers keep the group alive.
        let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(pgid, error = %std::io::Error::last_os_error(), "process group already gone");
        }
    }

    #[cfg(not(unix))]
    let _ = group;
}
