//! Pairwise conflict detection.
//!
//! Every ordered pair of materialized candidates gets a trial on a throwaway
//! branch: start from the base, merge the first candidate, then the second.
//! The second merge's outcome is the matrix entry.
//!
//! The trial logic only needs a handful of repository operations, captured
//! by [`TrialWorkspace`]. [`MergeOracle`] is the production implementation.

mod builder;
mod parallel;
mod recovery;
mod trial;

pub use builder::{BuildOutcome, MatrixBuilder};
pub use parallel::WorktreePool;
pub use recovery::{sweep_leftovers, SweepReport};

use crate::errors::GitError;
use crate::git::{MergeOracle, MergeOutcome};

/// Repository operations a trial is made of.
pub trait TrialWorkspace {
    fn abort_merge_if_in_progress(&self) -> Result<bool, GitError>;

    fn create_branch_from(&self, name: &str, base_ref: &str) -> Result<(), GitError>;

    fn checkout(&self, reference: &str) -> Result<(), GitError>;

    fn checkout_detached(&self, reference: &str) -> Result<(), GitError>;

    fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError>;

    fn delete_branch(&self, name: &str) -> Result<bool, GitError>;
}

impl TrialWorkspace for MergeOracle {
    fn abort_merge_if_in_progress(&self) -> Result<bool, GitError> {
        MergeOracle::abort_merge_if_in_progress(self)
    }

    fn create_branch_from(&self, name: &str, base_ref: &str) -> Result<(), GitError> {
        MergeOracle::create_branch_from(self, name, base_ref)
    }

    fn checkout(&self, reference: &str) -> Result<(), GitError> {
        MergeOracle::checkout(self, reference)
    }

    fn checkout_detached(&self, reference: &str) -> Result<(), GitError> {
        MergeOracle::checkout_detached(self, reference)
    }

    fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError> {
        MergeOracle::merge(self, reference)
    }

    fn delete_branch(&self, name: &str) -> Result<bool, GitError> {
        MergeOracle::delete_branch(self, name)
    }
}

/// Where a workspace's HEAD returns to between trials.
///
/// The primary clone rests on the base branch itself. Linked worktrees rest
/// detached at the base, since git refuses to check out one branch in two
/// worktrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeRef {
    Branch(String),
    Detached(String),
}

impl HomeRef {
    pub fn restore<W: TrialWorkspace + ?Sized>(&self, workspace: &W) -> Result<(), GitError> {
        match self {
            Self::Branch(name) => workspace.checkout(name),
            Self::Detached(reference) => workspace.checkout_detached(reference),
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! An in-memory workspace whose merge outcomes are scripted per
    //! `(branch, merged ref)` pair, for exercising trial bookkeeping without
    //! a real repository.

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::TrialWorkspace;
    use crate::errors::GitError;
    use crate::git::MergeOutcome;

    #[derive(Default)]
    struct State {
        head: String,
        branches: HashSet<String>,
        /// Refs merged into each branch so far.
        merged: HashMap<String, Vec<String>>,
        merging: bool,
        calls: Vec<String>,
    }

    /// Scripted rule: when `reference` is merged on top of a branch that
    /// already holds `after`, the merge conflicts.
    pub struct Rule {
        pub after: Option<String>,
        pub reference: String,
    }

    #[derive(Default)]
    pub struct ScriptedWorkspace {
        state: Mutex<State>,
        rules: Vec<Rule>,
        fail_merge_of: Option<String>,
    }

    impl ScriptedWorkspace {
        pub fn new(home: &str) -> Self {
            let ws = Self::default();
            {
                let mut s = ws.state.lock().unwrap();
                s.head = home.to_string();
                s.branches.insert(home.to_string());
            }
            ws
        }

        /// `second` conflicts when merged after `first`.
        pub fn conflict_after(mut self, first: &str, second: &str) -> Self {
            self.rules.push(Rule {
                after: Some(first.to_string()),
                reference: second.to_string(),
            });
            self
        }

        /// `reference` conflicts even on a fresh base.
        pub fn conflict_on_base(mut self, reference: &str) -> Self {
            self.rules.push(Rule {
                after: None,
                reference: reference.to_string(),
            });
            self
        }

        /// Merging `reference` fails outright, without entering a merge.
        pub fn failing_merge(mut self, reference: &str) -> Self {
            self.fail_merge_of = Some(reference.to_string());
            self
        }

        pub fn head(&self) -> String {
            self.state.lock().unwrap().head.clone()
        }

        pub fn branches(&self) -> Vec<String> {
            let mut b: Vec<_> = self.state.lock().unwrap().branches.iter().cloned().collect();
            b.sort();
            b
        }

        pub fn merging(&self) -> bool {
            self.state.lock().unwrap().merging
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    impl TrialWorkspace for ScriptedWorkspace {
        fn abort_merge_if_in_progress(&self) -> Result<bool, GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push("abort".into());
            Ok(std::mem::take(&mut s.merging))
        }

        fn create_branch_from(&self, name: &str, _base_ref: &str) -> Result<(), GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("branch {}", name));
            s.branches.insert(name.to_string());
            s.merged.insert(name.to_string(), Vec::new());
            Ok(())
        }

        fn checkout(&self, reference: &str) -> Result<(), GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("checkout {}", reference));
            if !s.branches.contains(reference) {
                return Err(GitError::RefNotFound(reference.to_string()));
            }
            s.head = reference.to_string();
            Ok(())
        }

        fn checkout_detached(&self, reference: &str) -> Result<(), GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("detach {}", reference));
            s.head = format!("detached:{}", reference);
            Ok(())
        }

        fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("merge {}", reference));
            if self.fail_merge_of.as_deref() == Some(reference) {
                return Err(GitError::MergeFailed {
                    reference: reference.to_string(),
                    stderr: "scripted failure".into(),
                });
            }
            let head = s.head.clone();
            let already = s.merged.get(&head).cloned().unwrap_or_default();
            let conflicts = self.rules.iter().any(|r| {
                r.reference == reference
                    && match &r.after {
                        None => true,
                        Some(first) => already.contains(first),
                    }
            });
            if conflicts {
                s.merging = true;
                return Ok(MergeOutcome::Conflicted);
            }
            s.merged.entry(head).or_default().push(reference.to_string());
            Ok(MergeOutcome::Clean)
        }

        fn delete_branch(&self, name: &str) -> Result<bool, GitError> {
            let mut s = self.state.lock().unwrap();
            s.calls.push(format!("delete {}", name));
            if s.head == name {
                return Err(GitError::CommandFailed {
                    command: format!("git branch -D {}", name),
                    exit_code: 1,
                    stderr: "cannot delete the checked out branch".into(),
                });
            }
            Ok(s.branches.remove(name))
        }
    }
}
