//! Recovery from runs that were interrupted mid-trial.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::HomeRef;
use crate::errors::GitError;
use crate::git::MergeOracle;
use crate::models::BranchNaming;

/// What a sweep had to clean up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub aborted_merge: bool,
    pub removed_worktrees: usize,
    pub deleted_branches: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        !self.aborted_merge && self.removed_worktrees == 0 && self.deleted_branches.is_empty()
    }
}

/// Return a reused clone to a known state before any trial runs: abort a
/// dangling merge, detach stale worktrees, go home, and delete trial
/// branches of any run under `naming`'s prefix.
#[instrument(skip_all, fields(path = %oracle.dir().display()))]
pub fn sweep_leftovers(
    oracle: &MergeOracle,
    naming: &BranchNaming,
    home: &HomeRef,
) -> Result<SweepReport, GitError> {
    let mut report = SweepReport {
        aborted_merge: oracle.abort_merge_if_in_progress()?,
        ..Default::default()
    };

    // A killed parallel run leaves worktrees holding trial branches checked
    // out, which would block their deletion.
    for path in oracle.linked_worktrees()? {
        match oracle.remove_worktree(&path) {
            Ok(()) => report.removed_worktrees += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale worktree"),
        }
    }
    oracle.prune_worktrees()?;

    home.restore(oracle)?;

    for branch in oracle.list_branches(&naming.trial_glob())? {
        if oracle.delete_branch(&branch)? {
            report.deleted_branches.push(branch);
        }
    }

    if report.is_clean() {
        info!("working repository is clean");
    } else {
        info!(
            aborted_merge = report.aborted_merge,
            worktrees = report.removed_worktrees,
            branches = report.deleted_branches.len(),
            "swept leftovers of an earlier run"
        );
    }
    Ok(report)
}
