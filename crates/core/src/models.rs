//! Domain model types used throughout prconflict.
//!
//! Candidates are immutable snapshots of open pull requests, fetched once per
//! run. Nothing in the conflict engine mutates them.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// A repository identity in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// GitHub treats owner and repository names case-insensitively.
    pub fn same_as(&self, other: &RepoSlug) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Upstream mergeability reported by the hosting service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mergeability {
    Mergeable,
    Conflicting,
    /// Not yet computed by the host (or never requested).
    #[default]
    Unknown,
}

impl From<Option<bool>> for Mergeability {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Mergeable,
            Some(false) => Self::Conflicting,
            None => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Mergeability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mergeable => write!(f, "mergeable"),
            Self::Conflicting => write!(f, "conflicting"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Where a candidate's head branch lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    /// A branch of the base repository itself, reachable through `origin`.
    SameRepository { branch: String },
    /// A branch of another repository, fetched by URL.
    Fork {
        repository: RepoSlug,
        clone_url: String,
        branch: String,
    },
}

impl CandidateSource {
    /// Classify a head branch by comparing its repository with the base.
    ///
    /// A head repository that has been deleted (`None`) is treated as a
    /// same-repository branch; fetching it will then fail loudly.
    pub fn classify(
        base: &RepoSlug,
        head_repo: Option<(RepoSlug, String)>,
        branch: impl Into<String>,
    ) -> Self {
        let branch = branch.into();
        match head_repo {
            Some((repository, clone_url)) if !repository.same_as(base) => Self::Fork {
                repository,
                clone_url,
                branch,
            },
            _ => Self::SameRepository { branch },
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            Self::SameRepository { branch } | Self::Fork { branch, .. } => branch,
        }
    }

    pub fn is_fork(&self) -> bool {
        matches!(self, Self::Fork { .. })
    }
}

/// One open pull request considered for the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub number: u64,
    pub title: String,
    pub source: CandidateSource,
    pub base_ref: String,
    pub draft: bool,
    pub mergeability: Mergeability,
}

impl Candidate {
    /// Display label used on both axes of the matrix.
    pub fn label(&self) -> String {
        format!("#{}", self.number)
    }
}

// ---------------------------------------------------------------------------
// Local branch naming
// ---------------------------------------------------------------------------

/// Canonical local branch holding a candidate's head inside the working clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalBranch {
    pub candidate: u64,
    pub name: String,
}

/// Naming scheme for candidate handles and temporary integration branches.
///
/// Handles live under `<prefix>/pr/` and trial branches under
/// `<prefix>/trial/<run-id>/`, so the two namespaces never alias.
#[derive(Debug, Clone)]
pub struct BranchNaming {
    prefix: String,
    run_id: String,
}

impl BranchNaming {
    pub fn new(prefix: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_matches('/').to_string(),
            run_id: run_id.into(),
        }
    }

    /// Naming with a fresh random run id.
    pub fn with_fresh_run_id(prefix: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(prefix, &id[..12])
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn handle(&self, candidate: u64) -> LocalBranch {
        LocalBranch {
            candidate,
            name: format!("{}/pr/{}", self.prefix, candidate),
        }
    }

    /// Temporary integration branch for trial (`first`, `second`).
    pub fn trial(&self, first: u64, second: u64) -> String {
        format!("{}/trial/{}/{}-{}", self.prefix, self.run_id, first, second)
    }

    /// Pattern matching every trial branch of every run, for `git branch --list`.
    pub fn trial_glob(&self) -> String {
        format!("{}/trial/*", self.prefix)
    }
}
