//! The working repository: a local clone driven through `git` and used as the
//! merge oracle.
//!
//! Every mutating operation goes through [`GitRunner`], so each one is logged
//! with its literal command, exit status and captured output. Read-only
//! inspection uses `git2` directly.

use std::path::{Path, PathBuf};

use git2::{BranchType, Repository, RepositoryState};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::command::GitRunner;
use crate::errors::GitError;

/// Result of a merge attempt. A conflict is a measurement, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean,
    /// The merge stopped with unresolved conflicts and is still in progress.
    Conflicted,
}

/// What HEAD points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum HeadState {
    Branch(String),
    Detached(String),
    Unborn,
}

/// Read-only snapshot of the working repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoSnapshot {
    pub head: HeadState,
    pub local_branches: Vec<String>,
    pub merge_in_progress: bool,
}

/// A single working tree of the clone, exclusively owned by whoever holds it.
pub struct MergeOracle {
    runner: GitRunner,
    dir: PathBuf,
}

impl MergeOracle {
    /// Open an existing clone at `dir`.
    pub fn open<P: AsRef<Path>>(runner: GitRunner, dir: P) -> Result<Self, GitError> {
        let dir = dir.as_ref();
        Repository::open(dir).map_err(|_| GitError::RepositoryNotFound(dir.display().to_string()))?;
        info!(path = %dir.display(), "opened working repository");
        Ok(Self {
            runner,
            dir: dir.to_path_buf(),
        })
    }

    /// Clone `remote_url` into `target_dir`, which must be absent or empty.
    #[instrument(skip(runner), fields(path = %target_dir.display()))]
    pub fn clone(runner: GitRunner, remote_url: &str, target_dir: &Path) -> Result<Self, GitError> {
        let parent = match target_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&parent)?;
        let target = target_dir.to_string_lossy().to_string();

        info!("cloning repository");
        runner.run_checked(&parent, &["clone", remote_url, &target])?;
        info!("clone completed");
        Ok(Self {
            runner,
            dir: target_dir.to_path_buf(),
        })
    }

    /// Reuse a clone left by an earlier run, refreshing `origin`, or clone
    /// fresh when `dir` holds no repository.
    pub fn open_or_clone(runner: GitRunner, remote_url: &str, dir: &Path) -> Result<Self, GitError> {
        if dir.join(".git").exists() {
            let oracle = Self::open(runner, dir)?;
            oracle.refresh_origin()?;
            Ok(oracle)
        } else {
            Self::clone(runner, remote_url, dir)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn runner(&self) -> &GitRunner {
        &self.runner
    }

    /// Fetch `origin` and re-resolve its default branch.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn refresh_origin(&self) -> Result<(), GitError> {
        self.git(&["fetch", "--prune", "origin"])?;
        self.git(&["remote", "set-head", "origin", "--auto"])?;
        Ok(())
    }

    /// Fetch `remote_branch` from `remote` (a remote name or URL) into the
    /// local branch `local_name`, force-updating it if it already exists.
    #[instrument(skip(self))]
    pub fn fetch_ref(&self, remote: &str, remote_branch: &str, local_name: &str) -> Result<(), GitError> {
        let refspec = format!("+refs/heads/{}:refs/heads/{}", remote_branch, local_name);
        self.git(&["fetch", "--no-tags", remote, &refspec])?;
        debug!(local_name, "fetched ref");
        Ok(())
    }

    /// Create branch `name` pointing at `base_ref` without checking it out.
    #[instrument(skip(self))]
    pub fn create_branch_from(&self, name: &str, base_ref: &str) -> Result<(), GitError> {
        self.git(&["branch", "--no-track", name, base_ref])?;
        Ok(())
    }

    /// Check out a branch, discarding any local modifications.
    #[instrument(skip(self))]
    pub fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.git(&["checkout", "--force", reference])?;
        Ok(())
    }

    /// Check out `reference` with a detached HEAD.
    #[instrument(skip(self))]
    pub fn checkout_detached(&self, reference: &str) -> Result<(), GitError> {
        self.git(&["checkout", "--force", "--detach", reference])?;
        Ok(())
    }

    /// Merge `reference` into the current branch.
    ///
    /// A non-zero exit that leaves `MERGE_HEAD` behind is a conflict. A
    /// non-zero exit without one means git never got to merge (unknown ref,
    /// dirty tree, missing identity) and is an error.
    #[instrument(skip(self))]
    pub fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError> {
        let output = self.runner.run(&self.dir, &["merge", "--no-edit", reference])?;
        if output.success() {
            return Ok(MergeOutcome::Clean);
        }
        if self.merge_in_progress()? {
            debug!(reference, "merge stopped with conflicts");
            return Ok(MergeOutcome::Conflicted);
        }
        warn!(reference, exit_code = output.exit_code(), "merge failed without entering a merge");
        Err(GitError::MergeFailed {
            reference: reference.to_string(),
            stderr: output.stderr.trim().to_string(),
        })
    }

    pub fn merge_in_progress(&self) -> Result<bool, GitError> {
        let output = self
            .runner
            .run(&self.dir, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])?;
        Ok(output.success())
    }

    /// Abort a merge if one is in progress. Returns whether one was.
    pub fn abort_merge_if_in_progress(&self) -> Result<bool, GitError> {
        if !self.merge_in_progress()? {
            return Ok(false);
        }
        self.git(&["merge", "--abort"])?;
        debug!("aborted in-progress merge");
        Ok(true)
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let full = format!("refs/heads/{}", name);
        let output = self
            .runner
            .run(&self.dir, &["show-ref", "--verify", "--quiet", &full])?;
        Ok(output.success())
    }

    /// Delete a local branch. Returns `false` if it did not exist.
    #[instrument(skip(self))]
    pub fn delete_branch(&self, name: &str) -> Result<bool, GitError> {
        if !self.branch_exists(name)? {
            return Ok(false);
        }
        self.git(&["branch", "-D", name])?;
        Ok(true)
    }

    /// Local branch names matching a `git branch --list` pattern.
    pub fn list_branches(&self, pattern: &str) -> Result<Vec<String>, GitError> {
        let output = self.git(&["branch", "--list", "--format=%(refname:short)", pattern])?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// The remote's default branch, as recorded in `refs/remotes/origin/HEAD`.
    pub fn current_default_branch(&self) -> Result<String, GitError> {
        let output = self
            .runner
            .run(&self.dir, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])?;
        if !output.success() {
            return Err(GitError::RefNotFound("refs/remotes/origin/HEAD".into()));
        }
        let short = output.stdout.trim();
        let branch = short.strip_prefix("origin/").unwrap_or(short);
        Ok(branch.to_string())
    }

    /// Check out `name` as a local branch positioned on `origin/<name>`,
    /// creating or resetting it as needed. Falls back to an existing local
    /// branch when the remote has no such ref.
    #[instrument(skip(self))]
    pub fn checkout_tracking(&self, name: &str) -> Result<(), GitError> {
        let remote_ref = format!("refs/remotes/origin/{}", name);
        let output = self
            .runner
            .run(&self.dir, &["show-ref", "--verify", "--quiet", &remote_ref])?;
        if output.success() {
            let upstream = format!("origin/{}", name);
            self.git(&["checkout", "--force", "-B", name, &upstream])?;
            return Ok(());
        }
        if self.branch_exists(name)? {
            return self.checkout(name);
        }
        Err(GitError::RefNotFound(name.to_string()))
    }

    /// Paths of every linked worktree, excluding the main one.
    pub fn linked_worktrees(&self) -> Result<Vec<PathBuf>, GitError> {
        let output = self.git(&["worktree", "list", "--porcelain"])?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|l| l.strip_prefix("worktree "))
            .skip(1)
            .map(PathBuf::from)
            .collect())
    }

    /// Add a detached worktree at `path` positioned on `commitish`.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn add_worktree(&self, path: &Path, commitish: &str) -> Result<MergeOracle, GitError> {
        let target = path.to_string_lossy().to_string();
        self.git(&["worktree", "add", "--detach", &target, commitish])?;
        Ok(MergeOracle {
            runner: self.runner.clone(),
            dir: path.to_path_buf(),
        })
    }

    /// Remove a worktree added with [`add_worktree`](Self::add_worktree).
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let target = path.to_string_lossy().to_string();
        self.git(&["worktree", "remove", "--force", &target])?;
        Ok(())
    }

    /// Drop administrative data of worktrees whose directories are gone.
    pub fn prune_worktrees(&self) -> Result<(), GitError> {
        self.git(&["worktree", "prune"])?;
        Ok(())
    }

    /// Read-only view of HEAD, local branches and merge state.
    pub fn inspect(&self) -> Result<RepoSnapshot, GitError> {
        let repo = Repository::open(&self.dir)?;
        let head = match repo.head() {
            Ok(head) if repo.head_detached()? => HeadState::Detached(
                head.target().map(|oid| oid.to_string()).unwrap_or_default(),
            ),
            Ok(head) => HeadState::Branch(head.shorthand().unwrap_or("HEAD").to_string()),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => HeadState::Unborn,
            Err(e) => return Err(e.into()),
        };

        let mut local_branches = Vec::new();
        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                local_branches.push(name.to_string());
            }
        }
        local_branches.sort();

        Ok(RepoSnapshot {
            head,
            local_branches,
            merge_in_progress: repo.state() == RepositoryState::Merge,
        })
    }

    fn git(&self, args: &[&str]) -> Result<super::command::CommandOutput, GitError> {
        self.runner.run_checked(&self.dir, args)
    }
}
