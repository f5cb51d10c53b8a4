//! One ordered trial and the guard that undoes it.

use tracing::{debug, warn};

use super::{HomeRef, TrialWorkspace};
use crate::errors::GitError;
use crate::git::MergeOutcome;
use crate::matrix::Verdict;

/// What an ordered trial `(first, second)` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrialResult {
    /// `first` applied cleanly; the verdict is the outcome of `second`.
    Decided(Verdict),
    /// `first` did not apply to the base on its own.
    FirstDidNotApply,
}

/// Owns a temporary trial branch for its lifetime.
///
/// Cleanup (abort any merge, return HEAD home, delete the branch) runs
/// through [`finish`](Self::finish) on the normal path, and best-effort on
/// drop for every other path, so no trial leaves state behind for the next.
pub(crate) struct TrialGuard<'a, W: TrialWorkspace + ?Sized> {
    workspace: &'a W,
    home: &'a HomeRef,
    branch: String,
    armed: bool,
}

impl<'a, W: TrialWorkspace + ?Sized> TrialGuard<'a, W> {
    /// Create `branch` from `base` and check it out.
    pub(crate) fn begin(
        workspace: &'a W,
        home: &'a HomeRef,
        base: &str,
        branch: String,
    ) -> Result<Self, GitError> {
        workspace.abort_merge_if_in_progress()?;
        workspace.create_branch_from(&branch, base)?;
        let guard = Self {
            workspace,
            home,
            branch,
            armed: true,
        };
        guard.workspace.checkout(&guard.branch)?;
        Ok(guard)
    }

    pub(crate) fn finish(mut self) -> Result<(), GitError> {
        self.armed = false;
        self.cleanup()
    }

    fn cleanup(&self) -> Result<(), GitError> {
        self.workspace.abort_merge_if_in_progress()?;
        self.home.restore(self.workspace)?;
        self.workspace.delete_branch(&self.branch)?;
        Ok(())
    }
}

impl<W: TrialWorkspace + ?Sized> Drop for TrialGuard<'_, W> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.cleanup() {
            warn!(branch = %self.branch, error = %e, "trial cleanup failed");
        }
    }
}

/// Run one ordered trial on a fresh branch from `base`.
pub(crate) fn run_trial<W: TrialWorkspace + ?Sized>(
    workspace: &W,
    home: &HomeRef,
    base: &str,
    branch: String,
    first: &str,
    second: &str,
) -> Result<TrialResult, GitError> {
    let guard = TrialGuard::begin(workspace, home, base, branch)?;

    if workspace.merge(first)? == MergeOutcome::Conflicted {
        guard.finish()?;
        return Ok(TrialResult::FirstDidNotApply);
    }

    let verdict = match workspace.merge(second)? {
        MergeOutcome::Clean => Verdict::Clean,
        MergeOutcome::Conflicted => Verdict::Conflict,
    };
    guard.finish()?;
    debug!(first, second, %verdict, "trial finished");
    Ok(TrialResult::Decided(verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::scripted::ScriptedWorkspace;

    fn home() -> HomeRef {
        HomeRef::Branch("main".into())
    }

    #[test]
    fn test_clean_trial_leaves_no_branch() {
        let ws = ScriptedWorkspace::new("main");
        let result = run_trial(&ws, &home(), "main", "t/1-2".into(), "pr/1", "pr/2").unwrap();
        assert_eq!(result, TrialResult::Decided(Verdict::Clean));
        assert_eq!(ws.head(), "main");
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    #[test]
    fn test_conflict_is_aborted_and_cleaned() {
        let ws = ScriptedWorkspace::new("main").conflict_after("pr/1", "pr/2");
        let result = run_trial(&ws, &home(), "main", "t/1-2".into(), "pr/1", "pr/2").unwrap();
        assert_eq!(result, TrialResult::Decided(Verdict::Conflict));
        assert!(!ws.merging());
        assert_eq!(ws.head(), "main");
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    #[test]
    fn test_first_merge_conflict_is_reported() {
        let ws = ScriptedWorkspace::new("main").conflict_on_base("pr/1");
        let result = run_trial(&ws, &home(), "main", "t/1-2".into(), "pr/1", "pr/2").unwrap();
        assert_eq!(result, TrialResult::FirstDidNotApply);
        assert!(!ws.calls().contains(&"merge pr/2".to_string()));
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    #[test]
    fn test_error_path_still_cleans_up() {
        let ws = ScriptedWorkspace::new("main").failing_merge("pr/2");
        let err = run_trial(&ws, &home(), "main", "t/1-2".into(), "pr/1", "pr/2").unwrap_err();
        assert!(matches!(err, GitError::MergeFailed { .. }));
        assert_eq!(ws.head(), "main");
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    #[test]
    fn test_detached_home_is_restored() {
        let ws = ScriptedWorkspace::new("main");
        let home = HomeRef::Detached("main".into());
        run_trial(&ws, &home, "main", "t/1-2".into(), "pr/1", "pr/2").unwrap();
        assert_eq!(ws.head(), "detached:main");
    }
}
