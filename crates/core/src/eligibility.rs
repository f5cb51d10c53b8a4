//! Which open pull requests take part in the matrix.

use serde::Serialize;
use tracing::debug;

use crate::models::{Candidate, Mergeability};

/// Why a pull request was left out of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    Draft,
    OtherBase { base_ref: String },
    /// The host already reports a conflict against the base.
    ConflictsWithBase,
    /// The branch could not be fetched (degrade policy only).
    FetchFailed { detail: String },
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::OtherBase { base_ref } => write!(f, "targets '{}'", base_ref),
            Self::ConflictsWithBase => write!(f, "conflicts with base"),
            Self::FetchFailed { detail } => write!(f, "fetch failed: {}", detail),
        }
    }
}

/// A candidate that was dropped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Excluded {
    pub number: u64,
    #[serde(flatten)]
    pub reason: Exclusion,
}

/// Outcome of filtering the open pull requests.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub eligible: Vec<Candidate>,
    pub excluded: Vec<Excluded>,
}

/// Keep non-draft candidates that target `base` and are not already known
/// to conflict with it. Unknown mergeability is kept. Order is by PR number
/// so the matrix layout is stable across runs.
pub fn select_candidates(candidates: Vec<Candidate>, base: &str) -> Selection {
    let mut selection = Selection::default();
    for candidate in candidates {
        let reason = if candidate.draft {
            Some(Exclusion::Draft)
        } else if candidate.base_ref != base {
            Some(Exclusion::OtherBase {
                base_ref: candidate.base_ref.clone(),
            })
        } else if candidate.mergeability == Mergeability::Conflicting {
            Some(Exclusion::ConflictsWithBase)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(number = candidate.number, %reason, "excluding candidate");
                selection.excluded.push(Excluded {
                    number: candidate.number,
                    reason,
                });
            }
            None => selection.eligible.push(candidate),
        }
    }
    selection.eligible.sort_by_key(|c| c.number);
    selection.eligible.dedup_by_key(|c| c.number);
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateSource;

    fn candidate(number: u64, base: &str, draft: bool, mergeability: Mergeability) -> Candidate {
        Candidate {
            number,
            title: format!("PR {}", number),
            source: CandidateSource::SameRepository {
                branch: format!("b{}", number),
            },
            base_ref: base.into(),
            draft,
            mergeability,
        }
    }

    #[test]
    fn test_select_filters_and_orders() {
        let selection = select_candidates(
            vec![
                candidate(12, "main", false, Mergeability::Unknown),
                candidate(10, "main", false, Mergeability::Mergeable),
                candidate(11, "main", true, Mergeability::Mergeable),
                candidate(13, "develop", false, Mergeability::Mergeable),
                candidate(14, "main", false, Mergeability::Conflicting),
            ],
            "main",
        );

        let numbers: Vec<u64> = selection.eligible.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![10, 12]);
        assert_eq!(
            selection.excluded,
            vec![
                Excluded { number: 11, reason: Exclusion::Draft },
                Excluded {
                    number: 13,
                    reason: Exclusion::OtherBase { base_ref: "develop".into() }
                },
                Excluded { number: 14, reason: Exclusion::ConflictsWithBase },
            ]
        );
    }

    #[test]
    fn test_unknown_mergeability_is_kept() {
        let selection = select_candidates(vec![candidate(1, "main", false, Mergeability::Unknown)], "main");
        assert_eq!(selection.eligible.len(), 1);
        assert!(selection.excluded.is_empty());
    }
}
