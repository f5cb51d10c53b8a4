//! Per-phase progress reporting hooks.

use crate::matrix::Verdict;

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Materialize,
    Detect,
    Render,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Materialize => write!(f, "materialize"),
            Self::Detect => write!(f, "detect"),
            Self::Render => write!(f, "render"),
        }
    }
}

/// Observer for run progress. Trial callbacks may arrive from several
/// worker threads at once.
pub trait Progress: Sync {
    fn phase_started(&self, _phase: Phase, _total: usize) {}

    fn candidate_fetched(&self, _number: u64) {}

    fn trial_finished(&self, _first: u64, _second: u64, _verdict: Verdict) {}

    fn phase_finished(&self, _phase: Phase) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}
