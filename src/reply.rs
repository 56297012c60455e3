use crate::dispatch::Request;
use crate::error::{DispatchError, ExecError, RejectionKind};
use crate::git::ExecutionResult;
use std::path::Path;

const TRUNCATION_NOTICE: &str = "... (output truncated)";

/// Requester-facing text for one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub headline: String,
    pub body: Option<String>,
}

impl Reply {
    /// Render as plain text
    pub fn to_text(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n{}", self.headline, body),
            None => self.headline.clone(),
        }
    }
}

pub struct ReplyFormatter;

impl ReplyFormatter {
    /// Reply for a completed or timed-out git run
    pub fn execution(machine: &str, request: &Request, result: &ExecutionResult) -> Reply {
        let project = Path::new(request.target_path.trim())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.target_path.clone());
        let command = Self::command_line(request);

        if result.timed_out {
            return Reply {
                headline: format!(
                    "[timeout] {} / {}: git {} was stopped after {}s",
                    machine,
                    project,
                    command,
                    result.duration.as_secs()
                ),
                body: None,
            };
        }

        let headline = if result.success() {
            format!("[ok] {} / {}: git {}", machine, project, command)
        } else {
            format!(
                "[exit: {}] {} / {}: git {}",
                result.exit_code, machine, project, command
            )
        };

        Reply {
            headline,
            body: Some(Self::output_body(result)),
        }
    }

    fn command_line(request: &Request) -> String {
        std::iter::once(request.subcommand.as_str())
            .chain(request.extra_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Reply for a failed dispatch; `None` means stay silent
    ///
    /// Rejections are deliberately coarse: they never echo the allowlists,
    /// and an unauthorized requester gets the same text whatever else was
    /// wrong with the request.
    pub fn failure(error: &DispatchError) -> Option<Reply> {
        let headline = match error {
            DispatchError::Rejected(rejection) => match rejection.kind() {
                RejectionKind::WrongMachine => return None,
                RejectionKind::UnauthorizedUser => "Access denied.".to_string(),
                RejectionKind::PathNotAllowed => {
                    "That path does not exist or is not allowed.".to_string()
                }
                RejectionKind::NotARepository => "That path is not a git repository.".to_string(),
                RejectionKind::CommandNotAllowed => {
                    "That git command is not allowed on this machine.".to_string()
                }
                RejectionKind::InvalidArgument => {
                    "One of the arguments was rejected for safety reasons.".to_string()
                }
            },
            DispatchError::Execution(ExecError::SpawnFailed { .. }) => {
                "git could not be started on this machine.".to_string()
            }
            DispatchError::Execution(_) => "git failed unexpectedly.".to_string(),
        };

        Some(Reply {
            headline,
            body: None,
        })
    }

    /// stdout, or stderr when stdout is empty, plus a truncation notice
    fn output_body(result: &ExecutionResult) -> String {
        let stdout = result.stdout_lossy();
        let stderr = result.stderr_lossy();

        let mut body = if !stdout.trim().is_empty() {
            stdout.trim_end().to_string()
        } else if !stderr.trim().is_empty() {
            stderr.trim_end().to_string()
        } else {
            "(no output)".to_string()
        };

        if result.truncated {
            body.push('\n');
            body.push_str(TRUNCATION_NOTICE);
        }

        body
    }
}
