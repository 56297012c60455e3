use crate::config::{Config, UserId};
use crate::error::Rejection;

/// Identity and subcommand checks against the config allowlists
///
/// Uniform policy: there is no identity that skips any of these checks, and
/// an empty allowlist matches nothing.
pub struct CommandAuthorizer<'a> {
    config: &'a Config,
}

impl<'a> CommandAuthorizer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Run all checks, returning the first failure
    pub fn authorize(
        &self,
        requester_id: &UserId,
        target_machine: &str,
        subcommand: &str,
    ) -> Result<(), Rejection> {
        self.check_machine(target_machine)?;
        self.check_requester(requester_id)?;
        self.check_subcommand(subcommand)?;
        Ok(())
    }

    /// Each instance only answers to its own name
    pub fn check_machine(&self, target_machine: &str) -> Result<(), Rejection> {
        if target_machine
            .trim()
            .eq_ignore_ascii_case(self.config.machine_name.trim())
        {
            Ok(())
        } else {
            Err(Rejection::WrongMachine(target_machine.to_string()))
        }
    }

    pub fn check_requester(&self, requester_id: &UserId) -> Result<(), Rejection> {
        if self.config.allowed_user_ids.contains(requester_id) {
            Ok(())
        } else {
            Err(Rejection::UnauthorizedUser(requester_id.to_string()))
        }
    }

    /// Exact, case-sensitive match; git itself treats `Status` as unknown
    pub fn check_subcommand(&self, subcommand: &str) -> Result<(), Rejection> {
        if self.config.allowed_git_commands.contains(subcommand) {
            Ok(())
        } else {
            Err(Rejection::CommandNotAllowed(subcommand.to_string()))
        }
    }
}
