pub mod authorizer;
pub mod path_guard;
pub mod sanitizer;

pub use authorizer::CommandAuthorizer;
pub use path_guard::{PathGuard, expand_home, home_dir};
pub use sanitizer::ArgumentSanitizer;

/// Substrings that chain or substitute commands in a shell
///
/// Nothing here ever reaches a shell, but a token carrying one of these is
/// never a legitimate git argument for this tool either.
pub const SHELL_METACHARACTERS: &[&str] = &[
    ";", "|", "&", "`", "$(", "${", ">", "<", "\n", "\r", "\0",
];

/// Long options that run a program, rewrite config, or move git's notion of
/// where the repository is
///
/// Matched by prefix as well, because git accepts any unambiguous
/// abbreviation of a long option (`--upload-p=...`).
pub const DANGEROUS_LONG_OPTIONS: &[&str] = &[
    "upload-pack",
    "receive-pack",
    "exec",
    "exec-path",
    "extcmd",
    "config",
    "config-env",
    "git-dir",
    "work-tree",
    "namespace",
    "output",
    "template",
    "open-files-in-pager",
    "separate-git-dir",
    "httpd",
    "browser",
    "to-cmd",
    "cc-cmd",
    "header-cmd",
    "sendmail-cmd",
    "smtp-server",
];

/// Real options that are also prefixes of a dangerous one
///
/// An exact match wins over abbreviation, so these stay usable
/// (`log --cc`, `format-patch --to=...`).
pub const EXACT_LONG_OPTIONS: &[&str] = &["to", "cc"];

/// Short options that take a program to run, per subcommand
pub const DANGEROUS_SHORT_OPTIONS: &[(&str, char)] = &[
    ("rebase", 'x'),
    ("difftool", 'x'),
    ("clone", 'u'),
    ("ls-remote", 'u'),
    ("grep", 'O'),
];

/// Positional tokens that turn a subcommand into "run this program"
pub const DANGEROUS_POSITIONALS: &[(&str, &str)] = &[
    ("bisect", "run"),
    ("submodule", "foreach"),
];

/// Config keys (lowercase) whose values are executed by git
pub const EXEC_CONFIG_KEYS: &[&str] = &[
    "core.sshcommand",
    "core.pager",
    "core.editor",
    "core.fsmonitor",
    "core.hookspath",
    "core.gitproxy",
    "core.askpass",
    "credential.helper",
    "diff.external",
    "sequence.editor",
    "gpg.program",
];

/// Config key prefixes and suffixes (lowercase) whose values are executed
pub const EXEC_CONFIG_KEY_PREFIXES: &[&str] = &["alias.", "pager.", "credential."];
pub const EXEC_CONFIG_KEY_SUFFIXES: &[&str] = &[
    ".command", ".textconv", ".helper", ".cmd", ".driver", ".clean", ".smudge", ".process",
    ".program", ".sshcommand",
];

/// Upper bound on extra arguments per request
pub const MAX_EXTRA_ARGS: usize = 64;
