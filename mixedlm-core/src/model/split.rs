#![allow(clippy::needless_range_loop)]
//! Several simple random-effects terms: `Λ = diag(θ_t)` blockwise per term.
//!
//! Crossed or nested grouping factors make `Z'WZ` fill in between terms,
//! so `L` is kept dense.

use mixedlm_linalg::{CholeskyDecomp, DenseMatrix};

use super::factor::ReFactor;
use super::inputs::ModelInputs;
use super::pls::{self, PlsSolution, ReStructure};
use super::state::FitState;
use super::LinearMixedModel;
use crate::error::{ConstructionError, LmmError};
use crate::terms::ReTerm;

#[derive(Debug, Clone)]
pub(crate) struct SplitStructure {
    /// Dense `Z'WZ`, q x q.
    ztz: DenseMatrix,
    /// Term index of each `Zt` row.
    term_of_row: Vec<usize>,
}

impl SplitStructure {
    fn new(inputs: &ModelInputs) -> Self {
        let ztz = inputs.zt.weighted_gram(&inputs.rsq);
        let mut term_of_row = Vec::with_capacity(inputs.nrandom());
        for (t, w) in inputs.term_offsets.windows(2).enumerate() {
            term_of_row.extend(std::iter::repeat(t).take(w[1] - w[0]));
        }
        Self { ztz, term_of_row }
    }
}

impl ReStructure for SplitStructure {
    fn factorize(&self, theta: &[f64]) -> Result<ReFactor, LmmError> {
        let q = self.term_of_row.len();
        let mut a = DenseMatrix::zeros(q, q);
        for i in 0..q {
            let ti = theta[self.term_of_row[i]];
            for j in 0..=i {
                let v = ti * self.ztz.get(i, j) * theta[self.term_of_row[j]];
                a.set(i, j, v);
                a.set(j, i, v);
            }
            a.set(i, i, a.get(i, i) + 1.0);
        }
        Ok(ReFactor::Dense(CholeskyDecomp::new(&a)?))
    }

    fn apply_lambda(&self, theta: &[f64], v: &mut [f64]) {
        for (x, &t) in v.iter_mut().zip(&self.term_of_row) {
            *x *= theta[t];
        }
    }

    fn apply_lambda_t(&self, theta: &[f64], v: &mut [f64]) {
        self.apply_lambda(theta, v);
    }
}

/// Model with one or more simple terms, e.g. `(1 | school) + (1 | class)`.
#[derive(Debug, Clone)]
pub struct SplitTermsLmm {
    inputs: ModelInputs,
    structure: SplitStructure,
    lower: Vec<f64>,
    state: FitState,
}

impl SplitTermsLmm {
    /// Build the model and evaluate it once at `theta = 1` for every term.
    pub fn new(
        y: Vec<f64>,
        x: DenseMatrix,
        terms: &[ReTerm],
        sqrtwts: Vec<f64>,
    ) -> Result<Self, LmmError> {
        if !terms.iter().all(ReTerm::is_simple) {
            return Err(ConstructionError::NonSimpleTerms.into());
        }
        let inputs = ModelInputs::new(y, x, terms, sqrtwts)?;
        let structure = SplitStructure::new(&inputs);
        let theta0 = vec![1.0; terms.len()];
        let sol = pls::solve(&inputs, &structure, &theta0)?;
        Ok(Self {
            inputs,
            structure,
            lower: vec![0.0; terms.len()],
            state: FitState::from_solution(sol),
        })
    }
}

impl LinearMixedModel for SplitTermsLmm {
    fn inputs(&self) -> &ModelInputs {
        &self.inputs
    }

    fn state(&self) -> &FitState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FitState {
        &mut self.state
    }

    fn lower(&self) -> &[f64] {
        &self.lower
    }

    fn solve(&self, theta: &[f64]) -> Result<PlsSolution, LmmError> {
        pls::solve(&self.inputs, &self.structure, theta)
    }

    fn scale_by_lambda(&self, v: &mut [f64]) {
        self.structure.apply_lambda(&self.state.theta, v);
    }
}
