//! Single simple random-effects term: `Λ = θI`.
//!
//! Each observation loads on exactly one level, so `Z'WZ` is diagonal and
//! so is `L`, with entries `sqrt(θ² d_j + 1)`.

use mixedlm_linalg::DenseMatrix;

use super::factor::ReFactor;
use super::inputs::ModelInputs;
use super::pls::{self, PlsSolution, ReStructure};
use super::state::FitState;
use super::LinearMixedModel;
use crate::error::{ConstructionError, LmmError};
use crate::terms::ReTerm;

#[derive(Debug, Clone)]
pub(crate) struct ScalarStructure {
    /// Diagonal of `Z'WZ`, one entry per level.
    ztz: Vec<f64>,
}

impl ScalarStructure {
    fn new(inputs: &ModelInputs, term: &ReTerm) -> Self {
        let mut ztz = vec![0.0; term.nlevels()];
        for (i, &level) in term.levels().iter().enumerate() {
            let z = term.regressor(i, 0);
            ztz[level] += inputs.rsq[i] * z * z;
        }
        Self { ztz }
    }
}

impl ReStructure for ScalarStructure {
    fn factorize(&self, theta: &[f64]) -> Result<ReFactor, LmmError> {
        let t2 = theta[0] * theta[0];
        Ok(ReFactor::Diagonal(
            self.ztz.iter().map(|d| (t2 * d + 1.0).sqrt()).collect(),
        ))
    }

    fn apply_lambda(&self, theta: &[f64], v: &mut [f64]) {
        for x in v.iter_mut() {
            *x *= theta[0];
        }
    }

    fn apply_lambda_t(&self, theta: &[f64], v: &mut [f64]) {
        self.apply_lambda(theta, v);
    }
}

/// Model with one scalar random-effects term, e.g. `(1 | g)`.
#[derive(Debug, Clone)]
pub struct ScalarTermLmm {
    inputs: ModelInputs,
    structure: ScalarStructure,
    lower: Vec<f64>,
    state: FitState,
}

impl ScalarTermLmm {
    /// Build the model and evaluate it once at `theta = 1`.
    pub fn new(
        y: Vec<f64>,
        x: DenseMatrix,
        term: ReTerm,
        sqrtwts: Vec<f64>,
    ) -> Result<Self, LmmError> {
        if !term.is_simple() {
            return Err(ConstructionError::NonSimpleTerms.into());
        }
        let inputs = ModelInputs::new(y, x, std::slice::from_ref(&term), sqrtwts)?;
        let structure = ScalarStructure::new(&inputs, &term);
        let sol = pls::solve(&inputs, &structure, &[1.0])?;
        Ok(Self {
            inputs,
            structure,
            lower: vec![0.0],
            state: FitState::from_solution(sol),
        })
    }
}

impl LinearMixedModel for ScalarTermLmm {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ScalarTermLmm {
        let y = vec![1.0, 2.0, 4.0, 5.0, 3.0, 6.0];
        let x = DenseMatrix::from_col_major(6, 1, vec![1.0; 6]);
        ScalarTermLmm::new(y, x, ReTerm::intercept(vec![0, 0, 1, 1, 2, 2]), Vec::new()).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let m = model();
        assert_eq!(m.theta(), &[1.0]);
        assert_eq!(m.lower(), &[0.0]);
        assert!(!m.is_fit());
        let size = m.size();
        assert_eq!((size.n, size.p, size.q, size.t), (6, 1, 3, 1));
        match m.cholesky_factor() {
            ReFactor::Diagonal(d) => {
                for v in d {
                    assert!((v - 3.0f64.sqrt()).abs() < 1e-12);
                }
            }
            other => panic!("unexpected factor {:?}", other),
        }
    }

    #[test]
    fn test_objective_matches_closed_form() {
        // balanced one-way layout: a = 3 groups of m = 2
        let mut m = model();
        let theta = 0.7f64;
        let value = m.objective(&[theta]).unwrap();
        let (a, mm, n) = (3.0, 2.0, 6.0);
        // group means 1.5, 4.5, 4.5; grand mean 3.5
        let ssw = 0.5 + 0.5 + 4.5;
        let ssb = mm * (4.0 + 1.0 + 1.0);
        let f = 1.0 + mm * theta * theta;
        let expected = n * (2.0 * std::f64::consts::PI * (ssw + ssb / f) / n).ln() + a * f.ln();
        assert!((value - expected).abs() < 1e-10, "{} vs {}", value, expected);
        assert!((m.pwrss() - (ssw + ssb / f)).abs() < 1e-10);
    }

    #[test]
    fn test_rejects_slope_term() {
        let z = DenseMatrix::from_row_major(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let x = DenseMatrix::from_col_major(3, 1, vec![1.0; 3]);
        let res = ScalarTermLmm::new(vec![1.0, 2.0, 3.0], x, ReTerm::with_regressors(vec![0, 0, 1], z), Vec::new());
        assert!(matches!(
            res,
            Err(LmmError::Construction(ConstructionError::NonSimpleTerms))
        ));
    }
}
