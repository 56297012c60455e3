pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod git;
pub mod reply;
pub mod security;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigStore, UserId};
pub use dispatch::{AuthorizationDecision, Dispatcher, Request};
pub use error::{AppError, DispatchError, ExecError, Rejection, RejectionKind};
pub use git::{ExecutionResult, GitExecutor, GitRunner};
pub use reply::{Reply, ReplyFormatter};
