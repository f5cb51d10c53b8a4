//! One conflict-detection run: prepare the working repository, materialize
//! candidates, build the matrix.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, instrument};

use crate::config::{AppConfig, GitConfig, RunConfig};
use crate::conflict::{sweep_leftovers, HomeRef, MatrixBuilder, WorktreePool};
use crate::eligibility::Excluded;
use crate::errors::{GitError, RunError};
use crate::git::{GitRunner, MergeOracle};
use crate::materialize::BranchMaterializer;
use crate::matrix::ConflictMatrix;
use crate::models::{BranchNaming, Candidate};
use crate::oplog::OperationLog;
use crate::progress::{Phase, Progress};

/// What to run against.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub clone_url: String,
    /// Base branch; `None` uses the clone's default branch.
    pub base: Option<String>,
    /// Eligible candidates, in enumeration order.
    pub candidates: Vec<Candidate>,
}

/// A completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub base: String,
    pub candidates: Vec<Candidate>,
    pub matrix: ConflictMatrix,
    pub excluded: Vec<Excluded>,
    /// Candidates whose rows are unknown because they no longer apply to
    /// the base on their own.
    pub stale: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Fewer than two candidates were left; no matrix was built.
    TooFewCandidates {
        eligible: usize,
        excluded: Vec<Excluded>,
    },
    Completed(RunReport),
}

/// Flushes the operation log when the run ends, however it ends.
struct CloseLog<'a>(&'a dyn OperationLog);

impl Drop for CloseLog<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Drives a run with fixed settings.
pub struct ConflictRun {
    git: GitConfig,
    run: RunConfig,
    token: Option<String>,
    log: Arc<dyn OperationLog>,
}

impl ConflictRun {
    pub fn new(config: &AppConfig, log: Arc<dyn OperationLog>) -> Self {
        Self {
            git: config.git.clone(),
            run: config.run.clone(),
            token: config.github.token.clone(),
            log,
        }
    }

    /// A runner carrying the trial identity, timeout and credentials.
    pub fn runner(&self) -> GitRunner {
        let runner = GitRunner::new(self.git.binary.clone(), self.log.clone())
            .with_timeout(self.git.command_timeout())
            .with_config("user.name", &self.git.committer_name)
            .with_config("user.email", &self.git.committer_email)
            .with_config("commit.gpgsign", "false")
            .with_config("core.packedRefsTimeout", "10000");
        match &self.token {
            Some(token) => runner.with_token(token),
            None => runner,
        }
    }

    #[instrument(skip_all, fields(url = %request.clone_url, candidates = request.candidates.len()))]
    pub fn execute(&self, request: RunRequest, progress: &dyn Progress) -> Result<RunOutcome, RunError> {
        let _close = CloseLog(self.log.as_ref());

        if request.candidates.len() < 2 {
            info!("fewer than two candidates, nothing to compare");
            return Ok(RunOutcome::TooFewCandidates {
                eligible: request.candidates.len(),
                excluded: Vec::new(),
            });
        }

        progress.phase_started(Phase::Prepare, 1);
        // Keeps a temporary clone alive until the run is over.
        let mut _scratch: Option<TempDir> = None;
        let dir: PathBuf = match &self.run.workdir {
            Some(dir) => dir.clone(),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("prconflict-")
                    .tempdir()
                    .map_err(GitError::from)?;
                let dir = scratch.path().join("repo");
                _scratch = Some(scratch);
                dir
            }
        };

        let oracle = MergeOracle::open_or_clone(self.runner(), &request.clone_url, &dir)?;
        let base = match request.base {
            Some(base) => base,
            None => oracle.current_default_branch()?,
        };
        // A merge left behind by a killed run would block the checkout.
        oracle.abort_merge_if_in_progress()?;
        oracle.checkout_tracking(&base).map_err(|e| match e {
            GitError::RefNotFound(_) => RunError::BaseNotFound(base.clone()),
            other => other.into(),
        })?;

        let naming = BranchNaming::with_fresh_run_id(&self.git.branch_prefix);
        let home = HomeRef::Branch(base.clone());
        sweep_leftovers(&oracle, &naming, &home)?;
        progress.phase_finished(Phase::Prepare);

        let materialized = BranchMaterializer::new(&oracle, &naming, self.run.on_failure)
            .materialize(&request.candidates, progress)?;
        if materialized.candidates.len() < 2 {
            info!(
                remaining = materialized.candidates.len(),
                "fewer than two candidates left after materialization"
            );
            return Ok(RunOutcome::TooFewCandidates {
                eligible: materialized.candidates.len(),
                excluded: materialized.excluded,
            });
        }

        let builder = MatrixBuilder::new(&base, &naming, self.run.on_failure);
        let n = materialized.candidates.len();
        let jobs = self.run.jobs.clamp(1, n * (n - 1));
        let built = if jobs > 1 {
            let pool = WorktreePool::create(&oracle, &base, jobs)?;
            builder.build_parallel(&pool, &materialized.candidates, progress)?
        } else {
            builder.build(&oracle, &home, &materialized.candidates, progress)?
        };

        info!(
            run_id = naming.run_id(),
            conflicts = built.matrix.conflicting_pairs().len(),
            "run completed"
        );
        Ok(RunOutcome::Completed(RunReport {
            run_id: naming.run_id().to_string(),
            base,
            candidates: materialized
                .candidates
                .into_iter()
                .map(|m| m.candidate)
                .collect(),
            matrix: built.matrix,
            excluded: materialized.excluded,
            stale: built.stale,
        }))
    }
}
