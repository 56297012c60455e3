use std::io;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::settings::ConfigError;

/// Payload-free tag for why a request was refused before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    PathNotAllowed,
    WrongMachine,
    UnauthorizedUser,
    CommandNotAllowed,
    InvalidArgument,
    NotARepository,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::PathNotAllowed => "path-not-allowed",
            RejectionKind::WrongMachine => "wrong-machine",
            RejectionKind::UnauthorizedUser => "unauthorized-user",
            RejectionKind::CommandNotAllowed => "command-not-allowed",
            RejectionKind::InvalidArgument => "invalid-argument",
            RejectionKind::NotARepository => "not-a-repository",
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authorization-stage refusal
///
/// The payloads are meant for audit logs and tests. Requester-facing text is
/// produced by [`crate::reply`], which deliberately drops most of this detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("Request addressed to machine '{0}'")]
    WrongMachine(String),

    #[error("Requester '{0}' is not authorized")]
    UnauthorizedUser(String),

    #[error("Git subcommand not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Argument '{token}' rejected: {reason}")]
    InvalidArgument { token: String, reason: String },

    #[error("Not a git repository: {0}")]
    NotARepository(String),
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::PathNotAllowed(_) => RejectionKind::PathNotAllowed,
            Rejection::WrongMachine(_) => RejectionKind::WrongMachine,
            Rejection::UnauthorizedUser(_) => RejectionKind::UnauthorizedUser,
            Rejection::CommandNotAllowed(_) => RejectionKind::CommandNotAllowed,
            Rejection::InvalidArgument { .. } => RejectionKind::InvalidArgument,
            Rejection::NotARepository(_) => RejectionKind::NotARepository,
        }
    }

    pub(crate) fn invalid_argument(token: &str, reason: impl Into<String>) -> Self {
        Rejection::InvalidArgument {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while running git, as opposed to git itself failing
///
/// A non-zero git exit code is not an error; it is reported through
/// [`crate::git::ExecutionResult`].
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn '{binary}': {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read git output: {0}")]
    OutputCapture(io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Outcome of a dispatch that did not produce an execution result
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecError),
}

impl DispatchError {
    /// The rejection kind, when this is an authorization-stage refusal
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            DispatchError::Rejected(rejection) => Some(rejection.kind()),
            DispatchError::Execution(_) => None,
        }
    }
}

/// Top-level application error that wraps all module-specific errors
///
/// All module errors convert to AppError via the `From` trait, so the binary
/// can use a single error type end to end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for execution-engine operations
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
