//! Blocking `git` CLI runner with captured output, timeouts and an
//! operation log.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::Utc;
use tracing::{debug, warn};

use crate::errors::GitError;
use crate::oplog::{ExitStatus, OperationLog, OperationRecord};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of one `git` invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            ExitStatus::Exited(code) => code,
            _ => -1,
        }
    }

    fn into_error(self) -> GitError {
        GitError::CommandFailed {
            exit_code: self.exit_code(),
            command: self.command,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Runs `git` subcommands and records each one in the injected log.
#[derive(Clone)]
pub struct GitRunner {
    binary: String,
    timeout: Option<Duration>,
    config_args: Vec<String>,
    secret_env: Vec<(String, String)>,
    log: Arc<dyn OperationLog>,
}

impl GitRunner {
    pub fn new(binary: impl Into<String>, log: Arc<dyn OperationLog>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            config_args: Vec::new(),
            secret_env: Vec::new(),
            log,
        }
    }

    /// Kill any invocation running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a `-c key=value` override to every invocation. These appear in the
    /// logged command line, so never pass secrets here.
    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.config_args.push("-c".into());
        self.config_args.push(format!("{}={}", key, value));
        self
    }

    /// Authenticate HTTPS remotes with an access token.
    ///
    /// The header travels through `GIT_CONFIG_*` environment variables so it
    /// stays out of the command line and the operation log.
    pub fn with_token(mut self, token: &str) -> Self {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("x-access-token:{}", token));
        let index = self.secret_env.len() / 2;
        self.secret_env.push((
            format!("GIT_CONFIG_KEY_{}", index),
            "http.extraHeader".into(),
        ));
        self.secret_env.push((
            format!("GIT_CONFIG_VALUE_{}", index),
            format!("Authorization: Basic {}", basic),
        ));
        self
    }

    /// Run `git <args>` in `dir` and return its output whatever the exit code.
    ///
    /// Only a failure to start the process or a timeout is an `Err`.
    pub fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let command = self.render(args);
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(dir)
            .args(&self.config_args)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !self.secret_env.is_empty() {
            cmd.env("GIT_CONFIG_COUNT", (self.secret_env.len() / 2).to_string());
            cmd.envs(self.secret_env.iter().map(|(k, v)| (k, v)));
        }

        debug!(cmd = %command, dir = %dir.display(), "running git command");
        let started = Instant::now();
        let result = match self.timeout {
            Some(timeout) => run_with_timeout(&mut cmd, timeout),
            None => cmd.output().map(|out| Captured {
                status: exit_status(out.status),
                stdout: out.stdout,
                stderr: out.stderr,
            }),
        };
        let elapsed = started.elapsed();

        let captured = match result {
            Ok(captured) => captured,
            Err(e) => {
                self.log.record(&OperationRecord {
                    timestamp: Utc::now(),
                    workdir: dir.to_path_buf(),
                    command: command.clone(),
                    status: ExitStatus::SpawnFailed,
                    elapsed,
                    stdout: String::new(),
                    stderr: e.to_string(),
                });
                return Err(if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::BinaryNotFound(self.binary.clone())
                } else {
                    GitError::IoError(e)
                });
            }
        };

        let output = CommandOutput {
            command,
            status: captured.status,
            stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
        };
        self.log.record(&OperationRecord {
            timestamp: Utc::now(),
            workdir: dir.to_path_buf(),
            command: output.command.clone(),
            status: output.status.clone(),
            elapsed,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        });

        if output.status == ExitStatus::TimedOut {
            warn!(cmd = %output.command, "git command timed out");
            return Err(GitError::Timeout {
                command: output.command,
                timeout: self.timeout.unwrap_or_default(),
            });
        }
        Ok(output)
    }

    /// Like [`run`](Self::run), but a non-zero exit is a
    /// [`GitError::CommandFailed`].
    pub fn run_checked(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = self.run(dir, args)?;
        if !output.success() {
            warn!(cmd = %output.command, exit_code = output.exit_code(), stderr = %output.stderr.trim(), "git command failed");
            return Err(output.into_error());
        }
        Ok(output)
    }

    pub(crate) fn render(&self, args: &[&str]) -> String {
        let mut parts = Vec::with_capacity(1 + self.config_args.len() + args.len());
        parts.push(self.binary.as_str());
        parts.extend(self.config_args.iter().map(String::as_str));
        parts.extend(args.iter().copied());
        parts
            .into_iter()
            .map(|p| {
                if p.is_empty() || p.contains(char::is_whitespace) {
                    format!("'{}'", p)
                } else {
                    p.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    match status.code() {
        Some(code) => ExitStatus::Exited(code),
        None => ExitStatus::Signalled,
    }
}

/// Spawn, drain both pipes on helper threads, and poll for exit until
/// `timeout` elapses; on expiry the child is killed and reaped.
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::io::Result<Captured> {
    let started = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_end(&mut buf);
        }
        buf
    });
    let err_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf);
        }
        buf
    });

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            timed_out = true;
            let _ = child.kill();
            break child.wait()?;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();

    Ok(Captured {
        status: if timed_out {
            ExitStatus::TimedOut
        } else {
            exit_status(status)
        },
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::MemoryOperationLog;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_render_quotes_whitespace() {
        let runner = GitRunner::new("git", Arc::new(MemoryOperationLog::new()))
            .with_config("user.name", "PR Conflict Bot");
        assert_eq!(
            runner.render(&["merge", "--no-edit", "x"]),
            "git -c 'user.name=PR Conflict Bot' merge --no-edit x"
        );
    }

    #[test]
    fn test_token_stays_out_of_command_line() {
        let log = Arc::new(MemoryOperationLog::new());
        let runner = GitRunner::new("git", log).with_token("ghp_secret");
        assert_eq!(runner.secret_env.len(), 2);
        assert!(!runner.render(&["fetch", "origin"]).contains("ghp_secret"));
        assert!(runner.secret_env[1].1.starts_with("Authorization: Basic "));
    }

    #[test]
    fn test_missing_binary_is_reported_and_logged() {
        let log = Arc::new(MemoryOperationLog::new());
        let runner = GitRunner::new("definitely-not-a-git-binary", log.clone());
        let dir = tempfile::tempdir().unwrap();
        let err = runner.run(dir.path(), &["status"]).unwrap_err();
        assert!(matches!(err, GitError::BinaryNotFound(_)));
        assert_eq!(log.entries()[0].status, ExitStatus::SpawnFailed);
    }

    #[test]
    fn test_run_captures_non_zero_exit() {
        if !git_available() {
            eprintln!("SKIP: git not installed");
            return;
        }
        let log = Arc::new(MemoryOperationLog::new());
        let runner = GitRunner::new("git", log.clone());
        let dir = tempfile::tempdir().unwrap();
        // Not a repository: git exits 128.
        let out = runner.run(dir.path(), &["rev-parse", "HEAD"]).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code(), 128);
        assert!(!out.stderr.is_empty());

        let err = runner.run_checked(dir.path(), &["rev-parse", "HEAD"]).unwrap_err();
        assert!(matches!(err, GitError::CommandFailed { exit_code: 128, .. }));
        assert_eq!(log.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_is_distinct_error() {
        let log = Arc::new(MemoryOperationLog::new());
        // `sleep` stands in for a hung git process.
        let runner = GitRunner::new("sleep", log.clone()).with_timeout(Some(Duration::from_millis(100)));
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = runner.run(dir.path(), &["5"]).unwrap_err();
        assert!(matches!(err, GitError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(log.entries()[0].status, ExitStatus::TimedOut);
    }
}
