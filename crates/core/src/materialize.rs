//! Branch materializer: brings every candidate's head into the working
//! repository under its canonical local name.

use tracing::{info, instrument, warn};

use crate::config::FailurePolicy;
use crate::eligibility::{Excluded, Exclusion};
use crate::errors::{GitError, MaterializeError};
use crate::git::MergeOracle;
use crate::models::{BranchNaming, Candidate, CandidateSource, LocalBranch};
use crate::progress::{Phase, Progress};

/// A candidate whose head now lives in a local branch.
#[derive(Debug, Clone)]
pub struct MaterializedCandidate {
    pub candidate: Candidate,
    pub branch: LocalBranch,
}

/// Result of the materialization pass.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub candidates: Vec<MaterializedCandidate>,
    /// Candidates dropped under [`FailurePolicy::Degrade`].
    pub excluded: Vec<Excluded>,
}

pub struct BranchMaterializer<'a> {
    oracle: &'a MergeOracle,
    naming: &'a BranchNaming,
    policy: FailurePolicy,
}

impl<'a> BranchMaterializer<'a> {
    pub fn new(oracle: &'a MergeOracle, naming: &'a BranchNaming, policy: FailurePolicy) -> Self {
        Self {
            oracle,
            naming,
            policy,
        }
    }

    /// Fetch every candidate, in order.
    ///
    /// Fork candidates are fetched from their own clone URL; asking `origin`
    /// for a fork's branch name would fetch nothing or the wrong ref. Existing
    /// handles are force-updated to the candidate's current head.
    #[instrument(skip_all, fields(count = candidates.len(), policy = %self.policy))]
    pub fn materialize(
        &self,
        candidates: &[Candidate],
        progress: &dyn Progress,
    ) -> Result<Materialized, MaterializeError> {
        progress.phase_started(Phase::Materialize, candidates.len());
        let mut out = Materialized::default();

        for candidate in candidates {
            let branch = self.naming.handle(candidate.number);
            match self.fetch(candidate, &branch) {
                Ok(()) => {
                    progress.candidate_fetched(candidate.number);
                    out.candidates.push(MaterializedCandidate {
                        candidate: candidate.clone(),
                        branch,
                    });
                }
                // Only a refused fetch is per-candidate; timeouts and a
                // missing binary mean the oracle itself is unusable.
                Err(e)
                    if self.policy == FailurePolicy::Degrade
                        && matches!(e.source, GitError::CommandFailed { .. }) =>
                {
                    warn!(number = candidate.number, error = %e, "excluding candidate that could not be fetched");
                    out.excluded.push(Excluded {
                        number: candidate.number,
                        reason: Exclusion::FetchFailed {
                            detail: e.source.to_string(),
                        },
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            fetched = out.candidates.len(),
            excluded = out.excluded.len(),
            "materialized candidate branches"
        );
        progress.phase_finished(Phase::Materialize);
        Ok(out)
    }

    fn fetch(&self, candidate: &Candidate, branch: &LocalBranch) -> Result<(), MaterializeError> {
        let (remote, remote_branch) = match &candidate.source {
            CandidateSource::SameRepository { branch } => ("origin", branch.as_str()),
            CandidateSource::Fork {
                clone_url, branch, ..
            } => (clone_url.as_str(), branch.as_str()),
        };
        self.oracle
            .fetch_ref(remote, remote_branch, &branch.name)
            .map_err(|source| MaterializeError {
                candidate: candidate.number,
                remote: remote.to_string(),
                branch: remote_branch.to_string(),
                source,
            })
    }
}
