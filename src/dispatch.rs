use crate::audit::AuditLogger;
use crate::config::{Config, UserId};
use crate::error::{DispatchError, Rejection, RejectionKind};
use crate::git::{ExecutionResult, GitInvocation, GitRunner, is_git_repo};
use crate::security::{ArgumentSanitizer, CommandAuthorizer, PathGuard};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A parsed request from the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub requester_id: UserId,
    pub machine: String,
    /// As typed by the requester; resolved by the Path Guard
    pub target_path: String,
    pub subcommand: String,
    pub extra_args: Vec<String>,
}

impl Request {
    pub fn new(
        requester_id: impl Into<UserId>,
        machine: &str,
        target_path: &str,
        subcommand: &str,
        extra_args: &[&str],
    ) -> Self {
        Self {
            requester_id: requester_id.into(),
            machine: machine.to_string(),
            target_path: target_path.to_string(),
            subcommand: subcommand.to_string(),
            extra_args: extra_args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Whether a request would be executed, computed fresh for every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: Option<RejectionKind>,
    pub resolved_path: Option<PathBuf>,
}

/// The single entry point the transport layer calls
///
/// Stage order: identity and subcommand checks, Path Guard, repository
/// check, Argument Sanitizer, then execution. The first rejection wins and
/// nothing is spawned before every stage has approved. Identity goes first
/// so an unknown requester learns nothing about the filesystem.
pub struct Dispatcher {
    runner: Arc<dyn GitRunner>,
    audit: Option<Arc<AuditLogger>>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self {
            runner,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run every authorization stage and build the invocation to execute
    pub fn authorize(&self, config: &Config, request: &Request) -> Result<GitInvocation, Rejection> {
        CommandAuthorizer::new(config).authorize(
            &request.requester_id,
            &request.machine,
            &request.subcommand,
        )?;
        debug!(requester = %request.requester_id, "identity and subcommand approved");

        let guard = PathGuard::new(&config.allowed_paths);
        let resolved = guard.resolve(&request.target_path)?;
        debug!(path = %resolved.display(), "path approved");

        if !is_git_repo(&resolved) {
            return Err(Rejection::NotARepository(resolved.display().to_string()));
        }

        let args = ArgumentSanitizer::new(&request.subcommand, &resolved, &guard)
            .sanitize(&request.extra_args)?;

        Ok(GitInvocation {
            subcommand: request.subcommand.clone(),
            args,
            working_dir: resolved,
            timeout: config.command_timeout(),
            max_output_bytes: config.max_output_bytes,
        })
    }

    /// Authorization outcome without executing anything
    pub fn decide(&self, config: &Config, request: &Request) -> AuthorizationDecision {
        match self.authorize(config, request) {
            Ok(invocation) => AuthorizationDecision {
                allowed: true,
                reason: None,
                resolved_path: Some(invocation.working_dir),
            },
            Err(rejection) => AuthorizationDecision {
                allowed: false,
                reason: Some(rejection.kind()),
                resolved_path: None,
            },
        }
    }

    /// Authorize and, if every stage approves, execute
    pub async fn dispatch(
        &self,
        config: &Config,
        request: &Request,
    ) -> Result<ExecutionResult, DispatchError> {
        let invocation = match self.authorize(config, request) {
            Ok(invocation) => invocation,
            Err(rejection) => {
                self.record_rejection(request, &rejection);
                return Err(rejection.into());
            }
        };

        info!(
            requester = %request.requester_id,
            command = %invocation.command_line(),
            path = %invocation.working_dir.display(),
            "dispatching"
        );

        let result = self.runner.run(&invocation).await?;

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_execution(&request.requester_id, &invocation, &result) {
                warn!(error = %e, "failed to write audit log");
            }
        }

        Ok(result)
    }

    fn record_rejection(&self, request: &Request, rejection: &Rejection) {
        let kind = rejection.kind();

        // Requests for other instances are routine when several share a chat.
        if kind == RejectionKind::WrongMachine {
            debug!(machine = %request.machine, "ignoring request for another machine");
            return;
        }

        warn!(
            requester = %request.requester_id,
            kind = %kind,
            detail = %rejection,
            "request rejected"
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_rejection(
                &request.requester_id,
                &request.machine,
                &request.target_path,
                &request.subcommand,
                kind,
                &rejection.to_string(),
            ) {
                warn!(error = %e, "failed to write audit log");
            }
        }
    }
}
