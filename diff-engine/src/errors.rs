//! Crate-wide error hierarchy for diff-engine.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Git failures carry the command and stderr for diagnosis.
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type DiffResult<T> = Result<T, Error>;

/// Root error type for the diff-engine crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Git subprocess related failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Input validation errors (empty diff, unknown mode combinations).
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem failure outside the tolerant read paths.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detailed git-subprocess error.
#[derive(Debug, Error)]
pub enum GitError {
    /// The working directory is not inside a git repository.
    #[error("not a git repository: {0}")]
    NotARepository(String),

    /// The git executable could not be spawned.
    #[error("failed to launch git: {0}")]
    Launch(#[source] std::io::Error),

    /// Non-zero exit status.
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Subprocess exceeded the command deadline.
    #[error("git {command} timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// Ref or path rejected by the whitelist (possible injection/traversal).
    #[error("unsafe git argument rejected: {0}")]
    UnsafeArgument(String),

    /// Unable to resolve a base branch for PR mode.
    #[error("unable to detect base branch (main/master not found)")]
    NoBaseBranch,

    /// No changes found for the requested diff mode.
    #[error("no changes detected for mode {0}")]
    NoChanges(String),
}
