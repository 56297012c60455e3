use crate::config::UserId;
use crate::error::RejectionKind;
use crate::git::{ExecutionResult, GitInvocation};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Append-only record of every execution and rejection
///
/// Concurrent dispatches share one logger; writes are serialized so entries
/// never interleave and rotation never races an append.
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create an AuditLogger writing to `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Log a git run that reached the execution engine
    pub fn log_execution(
        &self,
        requester: &UserId,
        invocation: &GitInvocation,
        result: &ExecutionResult,
    ) -> std::io::Result<()> {
        let status = if result.timed_out {
            "timeout".to_string()
        } else {
            format!("exit:{}", result.exit_code)
        };
        let truncated = if result.truncated { " [truncated]" } else { "" };

        self.append(&format!(
            "[{}] [user:{}] [{}] [{}]{} git {}\n",
            Utc::now().to_rfc3339(),
            requester,
            invocation.working_dir.display(),
            status,
            truncated,
            invocation.command_line()
        ))
    }

    /// Log a request refused before execution
    ///
    /// Records the raw, unresolved request so probing attempts are visible.
    pub fn log_rejection(
        &self,
        requester: &UserId,
        machine: &str,
        raw_path: &str,
        subcommand: &str,
        kind: RejectionKind,
        detail: &str,
    ) -> std::io::Result<()> {
        self.append(&format!(
            "[{}] [user:{}] [machine:{}] [REJECTED:{}] path=\"{}\" command=\"{}\" reason=\"{}\"\n",
            Utc::now().to_rfc3339(),
            requester,
            machine.escape_debug(),
            kind,
            raw_path.escape_debug(),
            subcommand.escape_debug(),
            detail.escape_debug()
        ))
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        let _serialized = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        // Check and rotate log if needed
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: audit.log -> audit.log.1
            let backup_path = self.log_path.with_extension("log.1");
            fs::rename(&self.log_path, backup_path)?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
