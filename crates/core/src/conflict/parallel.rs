//! Parallel matrix construction over a pool of linked worktrees.
//!
//! Each worker owns one detached worktree of the primary clone, so merges in
//! flight never share a working tree or index. Refs are shared, which is
//! what lets every worker see the candidate handles.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tempfile::TempDir;
use tracing::{debug, info, info_span, instrument, warn};

use super::builder::{BuildOutcome, MatrixBuilder};
use super::HomeRef;
use crate::errors::{GitError, RunError};
use crate::git::MergeOracle;
use crate::materialize::MaterializedCandidate;
use crate::matrix::Verdict;
use crate::progress::{Phase, Progress};

/// Worktrees attached to the primary clone for the duration of a run.
/// Dropping the pool removes them again.
pub struct WorktreePool<'a> {
    primary: &'a MergeOracle,
    workers: Vec<MergeOracle>,
    paths: Vec<PathBuf>,
    root: TempDir,
}

impl<'a> WorktreePool<'a> {
    /// Attach `size` worktrees, each detached at `base`.
    #[instrument(skip(primary))]
    pub fn create(primary: &'a MergeOracle, base: &str, size: usize) -> Result<Self, GitError> {
        let root = tempfile::Builder::new().prefix("prconflict-worktrees-").tempdir()?;
        let mut pool = Self {
            primary,
            workers: Vec::with_capacity(size),
            paths: Vec::with_capacity(size),
            root,
        };
        for k in 0..size {
            let path = pool.root.path().join(format!("worker-{}", k));
            let worker = pool.primary.add_worktree(&path, base)?;
            pool.paths.push(path);
            pool.workers.push(worker);
        }
        info!(workers = size, root = %pool.root.path().display(), "worktree pool ready");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[MergeOracle] {
        &self.workers
    }
}

impl Drop for WorktreePool<'_> {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = self.primary.remove_worktree(path) {
                warn!(path = %path.display(), error = %e, "failed to remove worktree");
            }
        }
        if let Err(e) = self.primary.prune_worktrees() {
            warn!(error = %e, "failed to prune worktrees");
        }
        debug!("worktree pool removed");
    }
}

/// State shared by all workers of one build.
struct Shared {
    pairs: Vec<(usize, usize)>,
    next: AtomicUsize,
    cancelled: AtomicBool,
    cells: Mutex<Vec<Vec<Verdict>>>,
    stale: Mutex<Vec<bool>>,
    failure: Mutex<Option<RunError>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn new(n: usize) -> Self {
        let pairs = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .collect();
        Self {
            pairs,
            next: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            cells: Mutex::new(vec![vec![Verdict::Clean; n]; n]),
            stale: Mutex::new(vec![false; n]),
            failure: Mutex::new(None),
        }
    }

    fn claim(&self) -> Option<(usize, usize)> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        let k = self.next.fetch_add(1, Ordering::SeqCst);
        self.pairs.get(k).copied()
    }

    /// Keep the first failure and stop everyone else from claiming work.
    fn fail(&self, error: RunError) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(error);
        }
    }
}

impl MatrixBuilder<'_> {
    /// Evaluate all ordered pairs across the pool's worktrees.
    ///
    /// Produces the same matrix as [`build`](Self::build): every trial
    /// starts from the base regardless of which worker runs it. The first
    /// fatal error cancels the remaining pairs and is returned once every
    /// worker has cleaned up.
    #[instrument(skip_all, fields(base = self.base(), count = candidates.len(), workers = pool.len()))]
    pub fn build_parallel(
        &self,
        pool: &WorktreePool<'_>,
        candidates: &[MaterializedCandidate],
        progress: &dyn Progress,
    ) -> Result<BuildOutcome, RunError> {
        let n = candidates.len();
        let shared = Shared::new(n);
        let home = HomeRef::Detached(self.base().to_string());
        progress.phase_started(Phase::Detect, shared.pairs.len());

        std::thread::scope(|scope| {
            let handles: Vec<_> = pool
                .workers()
                .iter()
                .enumerate()
                .map(|(k, worker)| {
                    let (shared, home) = (&shared, &home);
                    scope.spawn(move || {
                        let _span = info_span!("worker", id = k).entered();
                        self.work(worker, home, candidates, shared, progress)
                    })
                })
                .collect();
            for (k, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    shared.fail(RunError::WorkerPanicked(k));
                }
            }
        });

        if let Some(error) = lock(&shared.failure).take() {
            return Err(error);
        }
        progress.phase_finished(Phase::Detect);

        let cells = std::mem::take(&mut *lock(&shared.cells));
        let stale = std::mem::take(&mut *lock(&shared.stale));
        Ok(self.assemble(candidates, cells, &stale))
    }

    fn work(
        &self,
        worker: &MergeOracle,
        home: &HomeRef,
        candidates: &[MaterializedCandidate],
        shared: &Shared,
        progress: &dyn Progress,
    ) {
        let mut done = 0usize;
        while let Some((i, j)) = shared.claim() {
            if lock(&shared.stale)[i] {
                continue;
            }
            match self.evaluate(worker, home, candidates, i, j) {
                Ok(Some(verdict)) => {
                    lock(&shared.cells)[i][j] = verdict;
                    progress.trial_finished(candidates[i].candidate.number, candidates[j].candidate.number, verdict);
                    done += 1;
                }
                Ok(None) => lock(&shared.stale)[i] = true,
                Err(e) => {
                    shared.fail(e);
                    break;
                }
            }
        }
        debug!(trials = done, "worker finished");
    }
}
