//! Error types for the prconflict core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Errors
//! that cross a subsystem boundary are wrapped with `#[from]` into the
//! caller's enum (see [`RunError`]).
//!
//! A merge that ends with conflicts is *not* an error anywhere in this
//! module; it is reported as [`crate::git::MergeOutcome::Conflicted`].

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Infrastructure failures of the merge oracle (`git`).
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git command failed (exit {exit_code}): `{command}`: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A `git` command did not finish within the configured timeout.
    #[error("git command timed out after {}s: `{command}`", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// A merge exited non-zero without leaving a merge in progress, so it
    /// never got as far as producing conflicts.
    #[error("git merge of '{reference}' failed without entering a merge: {stderr}")]
    MergeFailed { reference: String, stderr: String },

    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// The repository URL could not be understood.
    #[error("invalid repository URL '{0}': expected https://host/owner/repo, git@host:owner/repo or owner/repo")]
    InvalidRepositoryUrl(String),

    /// No access token was supplied.
    #[error("no access token: pass --token or set the '{var}' environment variable")]
    MissingToken { var: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Materialization errors
// ---------------------------------------------------------------------------

/// A candidate's branch could not be brought into the working repository.
#[derive(Debug, Error)]
#[error("cannot fetch branch '{branch}' of PR #{candidate} from {remote}: {source}")]
pub struct MaterializeError {
    pub candidate: u64,
    pub remote: String,
    pub branch: String,
    #[source]
    pub source: GitError,
}

// ---------------------------------------------------------------------------
// Run errors
// ---------------------------------------------------------------------------

/// Errors that abort a conflict-matrix run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A candidate no longer merges cleanly onto the base on its own.
    #[error("PR #{candidate} no longer merges cleanly into '{base}'; its upstream mergeability is stale")]
    StaleCandidate { candidate: u64, base: String },

    /// The base branch does not exist in the working repository.
    #[error("base branch '{0}' not found in the working repository")]
    BaseNotFound(String),

    /// A parallel worker terminated abnormally.
    #[error("trial worker {0} panicked")]
    WorkerPanicked(usize),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

// ---------------------------------------------------------------------------
// Render errors
// ---------------------------------------------------------------------------

/// Errors writing output artifacts.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize matrix: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::Timeout {
            command: "git merge --no-edit prconflict/pr/7".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "git command timed out after 30s: `git merge --no-edit prconflict/pr/7`"
        );

        let err = ConfigError::MissingToken {
            var: "GITHUB_TOKEN".into(),
        };
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let err = RunError::StaleCandidate {
            candidate: 12,
            base: "main".into(),
        };
        assert!(err.to_string().contains("#12"));

        let err = GitHubError::RateLimited {
            reset_at: "1700000000".into(),
        };
        assert!(err.to_string().contains("rate limit"));
    }

    #[test]
    fn test_run_error_wraps_git_error() {
        let run_err: RunError = GitError::BinaryNotFound("git".into()).into();
        assert!(matches!(run_err, RunError::Git(GitError::BinaryNotFound(_))));
    }

    #[test]
    fn test_materialize_error_keeps_source() {
        let err = MaterializeError {
            candidate: 4,
            remote: "https://github.com/fork/repo.git".into(),
            branch: "feature".into(),
            source: GitError::CommandFailed {
                command: "git fetch".into(),
                exit_code: 128,
                stderr: "couldn't find remote ref".into(),
            },
        };
        assert!(err.to_string().contains("PR #4"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
