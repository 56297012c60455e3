//! Validation of the free-form arguments that follow a git subcommand.
//!
//! Policy is a hybrid: the subcommand is allowlisted by the authorizer, while
//! the arguments are checked against a denylist of dangerous *shapes*. Flags
//! that match no rule pass through untouched, so this module is the main
//! residual risk surface and every rule here has adversarial tests in
//! `tests/security_integration.rs`.

use crate::error::Rejection;
use crate::security::path_guard::PathGuard;
use crate::security::{
    DANGEROUS_LONG_OPTIONS, DANGEROUS_POSITIONALS, DANGEROUS_SHORT_OPTIONS, EXACT_LONG_OPTIONS,
    EXEC_CONFIG_KEYS, EXEC_CONFIG_KEY_PREFIXES, EXEC_CONFIG_KEY_SUFFIXES, MAX_EXTRA_ARGS,
    SHELL_METACHARACTERS,
};
use std::path::{Component, Path};

pub struct ArgumentSanitizer<'a> {
    subcommand: &'a str,
    target: &'a Path,
    guard: &'a PathGuard,
}

impl<'a> ArgumentSanitizer<'a> {
    /// `target` must be the canonical directory the Path Guard already
    /// approved; path-shaped arguments are confined to it.
    pub fn new(subcommand: &'a str, target: &'a Path, guard: &'a PathGuard) -> Self {
        Self {
            subcommand,
            target,
            guard,
        }
    }

    /// Validate each token on its own and return them unchanged
    pub fn sanitize<S: AsRef<str>>(&self, extra_args: &[S]) -> Result<Vec<String>, Rejection> {
        if extra_args.len() > MAX_EXTRA_ARGS {
            return Err(Rejection::invalid_argument(
                &format!("({} arguments)", extra_args.len()),
                format!("at most {} arguments are accepted", MAX_EXTRA_ARGS),
            ));
        }

        let mut after_separator = false;
        let mut sanitized = Vec::with_capacity(extra_args.len());

        for token in extra_args {
            let token = token.as_ref();
            self.check_metacharacters(token)?;

            if after_separator {
                self.check_positional(token)?;
            } else if token == "--" {
                after_separator = true;
            } else if let Some(body) = token.strip_prefix("--") {
                self.check_long_option(token, body)?;
            } else if token.len() > 1 && token.starts_with('-') {
                self.check_short_option(token)?;
            } else {
                self.check_positional(token)?;
            }

            sanitized.push(token.to_string());
        }

        Ok(sanitized)
    }

    fn check_metacharacters(&self, token: &str) -> Result<(), Rejection> {
        match SHELL_METACHARACTERS.iter().find(|meta| token.contains(*meta)) {
            Some(meta) => Err(Rejection::invalid_argument(
                token,
                format!("shell metacharacter {:?}", meta),
            )),
            None => Ok(()),
        }
    }

    fn check_long_option(&self, token: &str, body: &str) -> Result<(), Rejection> {
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };

        if name.is_empty() {
            return Err(Rejection::invalid_argument(token, "malformed option"));
        }

        if let Some(dangerous) = DANGEROUS_LONG_OPTIONS
            .iter()
            .filter(|_| !EXACT_LONG_OPTIONS.contains(&name))
            .find(|dangerous| dangerous.starts_with(name))
        {
            return Err(Rejection::invalid_argument(
                token,
                format!("option --{} is not permitted", dangerous),
            ));
        }

        if name.ends_with("-cmd") || name.ends_with("-command") {
            return Err(Rejection::invalid_argument(
                token,
                format!("option --{} runs a command", name),
            ));
        }

        if self.subcommand == "filter-branch" && (name.ends_with("-filter") || name == "setup") {
            return Err(Rejection::invalid_argument(
                token,
                "filter-branch filters run shell commands",
            ));
        }

        match value {
            Some(value) => self.check_value(token, value),
            None => Ok(()),
        }
    }

    fn check_short_option(&self, token: &str) -> Result<(), Rejection> {
        let flags = &token[1..];

        // `-c` sets config for the invocation in the top-level position, so
        // neither the bare flag nor an attached `-ckey=value` is accepted.
        if flags == "c" || (flags.starts_with('c') && flags.contains('=')) {
            return Err(Rejection::invalid_argument(token, "config override"));
        }

        for (subcommand, letter) in DANGEROUS_SHORT_OPTIONS {
            if *subcommand == self.subcommand && flags.contains(*letter) {
                return Err(Rejection::invalid_argument(
                    token,
                    format!("-{} runs a program for git {}", letter, subcommand),
                ));
            }
        }

        // Attached values (`-S/etc/passwd`) get the same path check as
        // `--opt=value`.
        let mut letters = flags.chars();
        letters.next();
        self.check_value(token, letters.as_str())
    }

    fn check_positional(&self, token: &str) -> Result<(), Rejection> {
        for (subcommand, word) in DANGEROUS_POSITIONALS {
            if *subcommand == self.subcommand && token == *word {
                return Err(Rejection::invalid_argument(
                    token,
                    format!("git {} {} runs arbitrary programs", subcommand, word),
                ));
            }
        }

        if is_config_assignment(token) {
            return Err(Rejection::invalid_argument(token, "config assignment"));
        }

        if is_exec_config_key(token) {
            return Err(Rejection::invalid_argument(token, "executable config key"));
        }

        self.check_value(token, token)
    }

    /// Path-shaped values are re-run through the Path Guard, anchored at the
    /// resolved target directory.
    fn check_value(&self, token: &str, value: &str) -> Result<(), Rejection> {
        if !looks_like_path(value) {
            return Ok(());
        }

        self.guard
            .resolve_within(value, self.target)
            .map(|_| ())
            .map_err(|_| Rejection::invalid_argument(token, "path outside the target repository"))
    }
}

/// Absolute, home-relative, or climbing out with `..`
///
/// Revision ranges such as `HEAD~3..HEAD` do not count: `..` has to be a
/// whole path component.
fn looks_like_path(value: &str) -> bool {
    if value.starts_with('/') || value.starts_with('~') {
        return true;
    }

    Path::new(value)
        .components()
        .any(|component| matches!(component, Component::ParentDir))
}

/// `section.key=value` or `section.sub.key=value`
fn is_config_assignment(token: &str) -> bool {
    let Some((key, _)) = token.split_once('=') else {
        return false;
    };

    let mut parts = key.split('.');
    let section = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    !section.is_empty()
        && section
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !rest.is_empty()
        && rest.iter().all(|part| !part.is_empty())
}

fn is_exec_config_key(token: &str) -> bool {
    let key = token.to_ascii_lowercase();
    EXEC_CONFIG_KEYS.contains(&key.as_str())
        || EXEC_CONFIG_KEY_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix) && key.len() > prefix.len())
        || (key.contains('.')
            && EXEC_CONFIG_KEY_SUFFIXES
                .iter()
                .any(|suffix| key.ends_with(suffix)))
}
