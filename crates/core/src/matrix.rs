//! The pairwise conflict matrix.
//!
//! Entry `[i][j]` answers: starting from a fresh base, merge candidate `i`,
//! then candidate `j`; did the second merge fail? Rows are the base-applied
//! candidate, columns the target-applied one. The matrix is deliberately not
//! forced symmetric.

use serde::{Deserialize, Serialize};

/// Result of one ordered trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Clean,
    Conflict,
    /// The row candidate could not be applied to the base on its own.
    Unknown,
}

impl Verdict {
    pub fn is_conflict(self) -> bool {
        self == Self::Conflict
    }

    /// OR-combination used for the symmetric view; `Conflict` dominates.
    fn either(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Self::Conflict, _) | (_, Self::Conflict) => Self::Conflict,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            _ => Self::Clean,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Conflict => write!(f, "conflict"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Square verdict grid keyed by candidate numbers in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictMatrix {
    ids: Vec<u64>,
    cells: Vec<Vec<Verdict>>,
}

impl ConflictMatrix {
    /// Assemble a matrix from a cell function. The diagonal is always
    /// `Clean`; `cell` is never asked about it.
    pub fn from_fn<F>(ids: Vec<u64>, mut cell: F) -> Self
    where
        F: FnMut(usize, usize) -> Verdict,
    {
        let n = ids.len();
        let cells = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { Verdict::Clean } else { cell(i, j) })
                    .collect()
            })
            .collect();
        Self { ids, cells }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn rows(&self) -> &[Vec<Verdict>] {
        &self.cells
    }

    pub fn get(&self, i: usize, j: usize) -> Verdict {
        self.cells[i][j]
    }

    pub fn conflicts(&self, i: usize, j: usize) -> bool {
        self.get(i, j).is_conflict()
    }

    /// Position of a candidate number in the enumeration.
    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.ids.iter().position(|&x| x == id)
    }

    /// Verdict for the ordered pair of candidate numbers.
    pub fn verdict_for(&self, first: u64, second: u64) -> Option<Verdict> {
        Some(self.get(self.index_of(first)?, self.index_of(second)?))
    }

    pub fn has_unknown(&self) -> bool {
        self.cells.iter().flatten().any(|v| *v == Verdict::Unknown)
    }

    /// Plain boolean grid; `None` if any entry is `Unknown`.
    pub fn to_bool_rows(&self) -> Option<Vec<Vec<bool>>> {
        if self.has_unknown() {
            return None;
        }
        Some(
            self.cells
                .iter()
                .map(|row| row.iter().map(|v| v.is_conflict()).collect())
                .collect(),
        )
    }

    /// `[i][j] OR [j][i]`: do the two conflict in either order.
    pub fn symmetric(&self) -> ConflictMatrix {
        Self::from_fn(self.ids.clone(), |i, j| self.get(i, j).either(self.get(j, i)))
    }

    /// Unordered pairs `(a, b)` of candidate numbers that conflict in at
    /// least one order, with `a` before `b` in enumeration order.
    pub fn conflicting_pairs(&self) -> Vec<(u64, u64)> {
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                if self.conflicts(i, j) || self.conflicts(j, i) {
                    pairs.push((self.ids[i], self.ids[j]));
                }
            }
        }
        pairs
    }

    /// Ordered pairs whose two directions disagree.
    pub fn asymmetric_pairs(&self) -> Vec<(u64, u64)> {
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                if self.get(i, j) != self.get(j, i) {
                    pairs.push((self.ids[i], self.ids[j]));
                }
            }
        }
        pairs
    }
}
