//! Serial matrix construction.

use tracing::{info, instrument, warn};

use super::trial::{run_trial, TrialResult};
use super::{HomeRef, TrialWorkspace};
use crate::config::FailurePolicy;
use crate::errors::RunError;
use crate::materialize::MaterializedCandidate;
use crate::matrix::{ConflictMatrix, Verdict};
use crate::models::BranchNaming;
use crate::progress::{Phase, Progress};

/// Result of the detection phase.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub matrix: ConflictMatrix,
    /// Candidates that did not apply to the base on their own. Their rows
    /// are `Unknown`. Only populated under [`FailurePolicy::Degrade`].
    pub stale: Vec<u64>,
}

/// Runs the ordered trials for every pair of candidates.
pub struct MatrixBuilder<'a> {
    base: &'a str,
    naming: &'a BranchNaming,
    policy: FailurePolicy,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(base: &'a str, naming: &'a BranchNaming, policy: FailurePolicy) -> Self {
        Self {
            base,
            naming,
            policy,
        }
    }

    pub fn base(&self) -> &str {
        self.base
    }

    /// Evaluate all `n * (n - 1)` ordered pairs in one workspace, row by row.
    #[instrument(skip_all, fields(base = self.base, count = candidates.len()))]
    pub fn build<W: TrialWorkspace + ?Sized>(
        &self,
        workspace: &W,
        home: &HomeRef,
        candidates: &[MaterializedCandidate],
        progress: &dyn Progress,
    ) -> Result<BuildOutcome, RunError> {
        let n = candidates.len();
        progress.phase_started(Phase::Detect, n * n.saturating_sub(1));

        let mut cells = vec![vec![Verdict::Clean; n]; n];
        let mut stale = vec![false; n];
        for i in 0..n {
            for j in 0..n {
                if i == j || stale[i] {
                    continue;
                }
                match self.evaluate(workspace, home, candidates, i, j)? {
                    Some(verdict) => {
                        cells[i][j] = verdict;
                        progress.trial_finished(candidates[i].candidate.number, candidates[j].candidate.number, verdict);
                    }
                    None => stale[i] = true,
                }
            }
        }

        progress.phase_finished(Phase::Detect);
        Ok(self.assemble(candidates, cells, &stale))
    }

    /// Run the trial for ordered pair `(i, j)`.
    ///
    /// `Ok(None)` means candidate `i` did not apply on its own and the
    /// policy asked to degrade: the whole row is unknown.
    pub(crate) fn evaluate<W: TrialWorkspace + ?Sized>(
        &self,
        workspace: &W,
        home: &HomeRef,
        candidates: &[MaterializedCandidate],
        i: usize,
        j: usize,
    ) -> Result<Option<Verdict>, RunError> {
        let first = &candidates[i];
        let second = &candidates[j];
        let branch = self
            .naming
            .trial(first.candidate.number, second.candidate.number);

        match run_trial(
            workspace,
            home,
            self.base,
            branch,
            &first.branch.name,
            &second.branch.name,
        )? {
            TrialResult::Decided(verdict) => Ok(Some(verdict)),
            TrialResult::FirstDidNotApply => match self.policy {
                FailurePolicy::Abort => Err(RunError::StaleCandidate {
                    candidate: first.candidate.number,
                    base: self.base.to_string(),
                }),
                FailurePolicy::Degrade => {
                    warn!(
                        number = first.candidate.number,
                        "candidate no longer merges into base, marking its row unknown"
                    );
                    Ok(None)
                }
            },
        }
    }

    pub(crate) fn assemble(
        &self,
        candidates: &[MaterializedCandidate],
        cells: Vec<Vec<Verdict>>,
        stale: &[bool],
    ) -> BuildOutcome {
        let ids = candidates.iter().map(|c| c.candidate.number).collect();
        let matrix = ConflictMatrix::from_fn(ids, |i, j| {
            if stale[i] {
                Verdict::Unknown
            } else {
                cells[i][j]
            }
        });
        let stale: Vec<u64> = candidates
            .iter()
            .zip(stale)
            .filter(|(_, s)| **s)
            .map(|(c, _)| c.candidate.number)
            .collect();

        info!(
            candidates = matrix.len(),
            conflicting_pairs = matrix.conflicting_pairs().len(),
            stale = stale.len(),
            "conflict matrix built"
        );
        BuildOutcome { matrix, stale }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conflict::scripted::ScriptedWorkspace;
    use crate::models::{Candidate, CandidateSource, Mergeability};
    use crate::progress::NoProgress;
    use Verdict::{Clean as F, Conflict as T};

    pub(crate) fn materialized(naming: &BranchNaming, numbers: &[u64]) -> Vec<MaterializedCandidate> {
        numbers
            .iter()
            .map(|&number| MaterializedCandidate {
                candidate: Candidate {
                    number,
                    title: format!("PR {}", number),
                    source: CandidateSource::SameRepository {
                        branch: format!("feature-{}", number),
                    },
                    base_ref: "main".into(),
                    draft: false,
                    mergeability: Mergeability::Mergeable,
                },
                branch: naming.handle(number),
            })
            .collect()
    }

    fn naming() -> BranchNaming {
        BranchNaming::new("prc", "run1")
    }

    fn home() -> HomeRef {
        HomeRef::Branch("main".into())
    }

    #[test]
    fn test_two_pairs_touching_the_same_line() {
        let naming = naming();
        let candidates = materialized(&naming, &[10, 11, 12]);
        let ws = ScriptedWorkspace::new("main")
            .conflict_after("prc/pr/10", "prc/pr/11")
            .conflict_after("prc/pr/11", "prc/pr/10");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Abort);
        let out = builder.build(&ws, &home(), &candidates, &NoProgress).unwrap();

        assert_eq!(
            out.matrix.rows(),
            &[vec![F, T, F], vec![T, F, F], vec![F, F, F]]
        );
        assert!(out.stale.is_empty());
        assert_eq!(ws.head(), "main");
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    /// Scripted on purpose: two branches off one base merge the same way in
    /// either order under git's default `ort` strategy, so a real repository
    /// yields no asymmetric pair to test against. The builder still must not
    /// mirror one direction into the other.
    #[test]
    fn test_matrix_is_not_symmetrized() {
        let naming = naming();
        let candidates = materialized(&naming, &[1, 2]);
        let ws = ScriptedWorkspace::new("main").conflict_after("prc/pr/1", "prc/pr/2");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Abort);
        let out = builder.build(&ws, &home(), &candidates, &NoProgress).unwrap();

        assert!(out.matrix.conflicts(0, 1));
        assert!(!out.matrix.conflicts(1, 0));
    }

    #[test]
    fn test_every_ordered_pair_is_tried_once() {
        let naming = naming();
        let candidates = materialized(&naming, &[1, 2, 3, 4]);
        let ws = ScriptedWorkspace::new("main");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Abort);
        builder.build(&ws, &home(), &candidates, &NoProgress).unwrap();

        let trials = ws.calls().iter().filter(|c| c.starts_with("branch ")).count();
        assert_eq!(trials, 12);
        assert!(ws.calls().contains(&"branch prc/trial/run1/4-3".to_string()));
        assert!(!ws.calls().iter().any(|c| c.ends_with("/1-1")));
    }

    #[test]
    fn test_stale_candidate_aborts_by_default() {
        let naming = naming();
        let candidates = materialized(&naming, &[1, 2, 3]);
        let ws = ScriptedWorkspace::new("main").conflict_on_base("prc/pr/2");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Abort);
        let err = builder.build(&ws, &home(), &candidates, &NoProgress).unwrap_err();

        assert!(matches!(err, RunError::StaleCandidate { candidate: 2, .. }));
        assert!(!ws.merging());
        assert_eq!(ws.branches(), vec!["main".to_string()]);
    }

    #[test]
    fn test_stale_candidate_row_is_unknown_when_degrading() {
        let naming = naming();
        let candidates = materialized(&naming, &[1, 2, 3]);
        let ws = ScriptedWorkspace::new("main").conflict_on_base("prc/pr/2");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Degrade);
        let out = builder.build(&ws, &home(), &candidates, &NoProgress).unwrap();

        assert_eq!(out.stale, vec![2]);
        assert_eq!(out.matrix.get(1, 0), Verdict::Unknown);
        assert_eq!(out.matrix.get(1, 2), Verdict::Unknown);
        assert_eq!(out.matrix.get(1, 1), Verdict::Clean);
        // Candidate 2 as the second merge still conflicts on a fresh base.
        assert_eq!(out.matrix.get(0, 1), Verdict::Conflict);
        // Only the first trial of the stale row ran.
        assert!(!ws.calls().contains(&"branch prc/trial/run1/2-3".to_string()));
    }

    #[test]
    fn test_infrastructure_error_propagates() {
        let naming = naming();
        let candidates = materialized(&naming, &[1, 2]);
        let ws = ScriptedWorkspace::new("main").failing_merge("prc/pr/2");

        let builder = MatrixBuilder::new("main", &naming, FailurePolicy::Degrade);
        let err = builder.build(&ws, &home(), &candidates, &NoProgress).unwrap_err();
        assert!(matches!(err, RunError::Git(_)));
        assert_eq!(ws.head(), "main");
    }
}
