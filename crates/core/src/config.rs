//! TOML-based configuration for prconflict.
//!
//! Every section is optional; a missing file is the same as an empty one.
//! The access token is never stored in the file: `github.token_env` names
//! the environment variable holding it, resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Merge oracle settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Run behaviour.
    #[serde(default)]
    pub run: RunConfig,

    /// Output artifacts.
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Environment variable holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars` or the CLI).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_token_env(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Merge oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Path or name of the `git` executable.
    #[serde(default = "default_git_binary")]
    pub binary: String,

    /// Per-invocation timeout in seconds; 0 disables it.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Identity recorded on throwaway merge commits.
    #[serde(default = "default_committer_name")]
    pub committer_name: String,

    #[serde(default = "default_committer_email")]
    pub committer_email: String,

    /// Namespace for local candidate and trial branches.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_git_binary() -> String {
    "git".into()
}
fn default_command_timeout() -> u64 {
    300
}
fn default_committer_name() -> String {
    "prconflict".into()
}
fn default_committer_email() -> String {
    "prconflict@localhost".into()
}
fn default_branch_prefix() -> String {
    "prconflict".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            command_timeout_secs: default_command_timeout(),
            committer_name: default_committer_name(),
            committer_email: default_committer_email(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

impl GitConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// What to do when a single candidate cannot be fetched or applied.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the whole run.
    #[default]
    Abort,
    /// Drop the candidate (fetch failure) or mark its row unknown (stale
    /// mergeability) and keep going.
    Degrade,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "degrade" => Ok(Self::Degrade),
            other => Err(ConfigError::InvalidValue {
                field: "run.on_failure".into(),
                detail: format!("'{}' is not one of: abort, degrade", other),
            }),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Degrade => write!(f, "degrade"),
        }
    }
}

/// Run behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of trial workers. 1 runs every trial in the clone itself;
    /// more adds one worktree per worker.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Failure policy for per-candidate problems.
    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Keep the clone here between runs instead of a temporary directory.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_jobs() -> usize {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            on_failure: FailurePolicy::default(),
            workdir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Output artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the artifacts.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Write `conflict_matrix.json`.
    #[serde(default = "default_true")]
    pub json: bool,

    /// Write `conflict_matrix.svg`.
    #[serde(default = "default_true")]
    pub svg: bool,

    /// Operation log path; relative paths are resolved against `dir`.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_true() -> bool {
    true
}
fn default_log_file() -> PathBuf {
    PathBuf::from("prconflict-git.log")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            json: true,
            svg: true,
            log_file: default_log_file(),
        }
    }
}

impl OutputConfig {
    pub fn log_path(&self) -> PathBuf {
        if self.log_file.is_absolute() {
            self.log_file.clone()
        } else {
            self.dir.join(&self.log_file)
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the token from the environment unless one is already set.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.github.token.is_none() {
            self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        }
        Ok(())
    }

    /// The resolved token, or the configuration error to report.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.github
            .token
            .as_deref()
            .ok_or_else(|| ConfigError::MissingToken {
                var: self.github.token_env.clone(),
            })
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if self.git.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.binary".into(),
                detail: "git binary must not be empty".into(),
            });
        }
        let prefix = self.git.branch_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains(char::is_whitespace) || prefix.contains("..") {
            return Err(ConfigError::InvalidValue {
                field: "git.branch_prefix".into(),
                detail: "prefix must be a non-empty ref component without spaces or '..'".into(),
            });
        }
        if self.git.committer_email.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.committer_email".into(),
                detail: "committer email must not be empty".into(),
            });
        }
        if self.run.jobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.jobs".into(),
                detail: "jobs must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
            None
        }
    }
}

/// Contents written by `pr-conflicts init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# prconflict configuration
# Every value below is the built-in default.

[github]
api_url = "https://api.github.com"
token_env = "GITHUB_TOKEN"

[git]
binary = "git"
command_timeout_secs = 300
committer_name = "prconflict"
committer_email = "prconflict@localhost"
branch_prefix = "prconflict"

[run]
jobs = 1
on_failure = "abort"
# workdir = "/var/tmp/prconflict/clone"

[output]
dir = "."
json = true
svg = true
log_file = "prconflict-git.log"
"#;
