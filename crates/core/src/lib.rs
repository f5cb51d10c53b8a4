//! prconflict core library.
//!
//! Builds a pairwise conflict matrix for the open pull requests of a
//! repository, using `git` itself as the merge oracle: for every ordered
//! pair, merge the first candidate onto a fresh base, then the second, and
//! record whether the second merge conflicts.

pub mod config;
pub mod conflict;
pub mod eligibility;
pub mod errors;
pub mod git;
pub mod materialize;
pub mod matrix;
pub mod models;
pub mod oplog;
pub mod progress;
pub mod render;
pub mod run;

// Re-exports for convenience.
pub use config::{AppConfig, FailurePolicy};
pub use matrix::{ConflictMatrix, Verdict};
pub use models::{Candidate, CandidateSource, RepoSlug};
pub use run::{ConflictRun, RunOutcome, RunReport, RunRequest};
