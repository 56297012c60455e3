pub mod capture;
pub mod executor;
pub mod locks;

// Re-export commonly used types
pub use capture::{BoundedOutput, read_bounded};
pub use executor::{ExecutionResult, GitExecutor, GitInvocation, GitRunner, TIMEOUT_EXIT_CODE};
pub use locks::{PathLockGuard, PathLocks};

use std::path::Path;

/// Whether `path` is the top of a git work tree
///
/// Linked worktrees and submodules use a `.git` file instead of a directory;
/// both count.
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}
