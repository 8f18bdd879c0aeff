//! Random-effects term descriptors.
//!
//! A term pairs a grouping factor (one integer level code per
//! observation, encoded by the caller) with the raw regressors that
//! load on it. A term with no regressors is a random intercept.

use std::collections::HashSet;

use mixedlm_linalg::DenseMatrix;

use crate::error::ConstructionError;

/// One random-effects term, e.g. `(1 | subject)` or `(1 + days | subject)`.
#[derive(Debug, Clone)]
pub struct ReTerm {
    levels: Vec<usize>,
    nlevels: usize,
    /// n x k raw regressors; `None` means a single intercept column.
    regressors: Option<DenseMatrix>,
}

impl ReTerm {
    /// Random intercept for the grouping codes `levels`.
    ///
    /// The level count is taken as `max(levels) + 1`.
    pub fn intercept(levels: Vec<usize>) -> Self {
        let nlevels = levels.iter().max().map_or(0, |&m| m + 1);
        Self {
            levels,
            nlevels,
            regressors: None,
        }
    }

    /// Term whose per-observation regressors (n x k) load on the grouping codes.
    ///
    /// A single regressor column still yields a simple term.
    pub fn with_regressors(levels: Vec<usize>, regressors: DenseMatrix) -> Self {
        let nlevels = levels.iter().max().map_or(0, |&m| m + 1);
        Self {
            levels,
            nlevels,
            regressors: Some(regressors),
        }
    }

    /// Declare the number of grouping levels explicitly (levels may be unobserved).
    pub fn with_nlevels(mut self, nlevels: usize) -> Self {
        self.nlevels = nlevels;
        self
    }

    /// Grouping code per observation.
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    /// Declared number of grouping levels.
    pub fn nlevels(&self) -> usize {
        self.nlevels
    }

    /// Number of observations covered by the term.
    pub fn nobs(&self) -> usize {
        self.levels.len()
    }

    /// Number of random-effects columns per level.
    pub fn ncols(&self) -> usize {
        self.regressors.as_ref().map_or(1, |z| z.ncols())
    }

    /// A simple term contributes one scalar variance component per level.
    pub fn is_simple(&self) -> bool {
        self.ncols() == 1
    }

    /// Raw regressors, if any were supplied.
    pub fn regressors(&self) -> Option<&DenseMatrix> {
        self.regressors.as_ref()
    }

    /// Regressor value for observation `i`, column `c`.
    pub fn regressor(&self, i: usize, c: usize) -> f64 {
        match &self.regressors {
            Some(z) => z.get(i, c),
            None => 1.0,
        }
    }

    /// Number of distinct grouping codes actually referenced.
    pub fn distinct_levels(&self) -> usize {
        self.levels.iter().collect::<HashSet<_>>().len()
    }

    /// Number of rows this term occupies in `Zt`.
    pub fn nrows_zt(&self) -> usize {
        self.nlevels * self.ncols()
    }

    pub(crate) fn validate(&self, term: usize, n: usize) -> Result<(), ConstructionError> {
        if self.levels.len() != n {
            return Err(ConstructionError::LengthMismatch {
                what: "term level codes",
                expected: n,
                got: self.levels.len(),
            });
        }
        if let Some(&level) = self.levels.iter().find(|&&l| l >= self.nlevels) {
            return Err(ConstructionError::LevelOutOfRange {
                term,
                level,
                nlevels: self.nlevels,
            });
        }
        if let Some(z) = &self.regressors {
            if z.nrows() != n {
                return Err(ConstructionError::LengthMismatch {
                    what: "term regressors",
                    expected: n,
                    got: z.nrows(),
                });
            }
            if z.ncols() == 0 {
                return Err(ConstructionError::LengthMismatch {
                    what: "term regressor columns",
                    expected: 1,
                    got: 0,
                });
            }
            if !z.is_finite() {
                return Err(ConstructionError::NonFinite {
                    what: "term regressors",
                });
            }
        }
        Ok(())
    }

    /// COO triplets of this term's block of `Zt`, rows shifted by `row_offset`.
    ///
    /// Rows are level-major: level j, column c sits at `row_offset + j*k + c`.
    pub(crate) fn zt_triplets(&self, row_offset: usize) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let k = self.ncols();
        let cap = self.levels.len() * k;
        let mut rows = Vec::with_capacity(cap);
        let mut cols = Vec::with_capacity(cap);
        let mut vals = Vec::with_capacity(cap);
        for (i, &level) in self.levels.iter().enumerate() {
            for c in 0..k {
                rows.push(row_offset + level * k + c);
                cols.push(i);
                vals.push(self.regressor(i, c));
            }
        }
        (rows, cols, vals)
    }
}
