#![allow(clippy::needless_range_loop)]
//! Single vector-valued random-effects term: `Λ = I ⊗ T`.
//!
//! With k regressors per level (e.g. intercept and slope), `T` is a k x k
//! lower-triangular relative covariance factor filled from `theta` in
//! column-major order of its lower triangle. Levels do not interact, so
//! `Λ'Z'WZΛ + I` is block diagonal with blocks `T'B_jT + I`.

use mixedlm_linalg::{CholeskyDecomp, DenseMatrix};

use super::factor::ReFactor;
use super::inputs::ModelInputs;
use super::pls::{self, PlsSolution, ReStructure};
use super::state::FitState;
use super::LinearMixedModel;
use crate::error::{ConstructionError, LmmError};
use crate::terms::ReTerm;

/// Expand `theta` into the lower-triangular k x k factor `T`.
pub(crate) fn lambda_block(k: usize, theta: &[f64]) -> DenseMatrix {
    assert_eq!(theta.len(), k * (k + 1) / 2);
    let mut t = DenseMatrix::zeros(k, k);
    let mut idx = 0;
    for c in 0..k {
        for r in c..k {
            t.set(r, c, theta[idx]);
            idx += 1;
        }
    }
    t
}

#[derive(Debug, Clone)]
pub(crate) struct VectorStructure {
    k: usize,
    /// `B_j = Σ_{i in level j} r_i² z_i z_i'`, one per level.
    blocks: Vec<DenseMatrix>,
}

impl VectorStructure {
    fn new(inputs: &ModelInputs, term: &ReTerm) -> Self {
        let k = term.ncols();
        let mut blocks = vec![DenseMatrix::zeros(k, k); term.nlevels()];
        for (i, &level) in term.levels().iter().enumerate() {
            let w = inputs.rsq[i];
            let block = &mut blocks[level];
            for a in 0..k {
                let za = term.regressor(i, a);
                for b in 0..k {
                    block.set(a, b, block.get(a, b) + w * za * term.regressor(i, b));
                }
            }
        }
        Self { k, blocks }
    }
}

impl ReStructure for VectorStructure {
    fn factorize(&self, theta: &[f64]) -> Result<ReFactor, LmmError> {
        let t = lambda_block(self.k, theta);
        let tt = t.transpose();
        let mut factors = Vec::with_capacity(self.blocks.len());
        for b in &self.blocks {
            let mut a = tt.mat_mul(&b.mat_mul(&t));
            for d in 0..self.k {
                a.set(d, d, a.get(d, d) + 1.0);
            }
            factors.push(CholeskyDecomp::new(&a)?);
        }
        Ok(ReFactor::BlockDiagonal {
            block_size: self.k,
            blocks: factors,
        })
    }

    fn apply_lambda(&self, theta: &[f64], v: &mut [f64]) {
        let t = lambda_block(self.k, theta);
        for chunk in v.chunks_mut(self.k) {
            let scaled = t.mat_vec(chunk);
            chunk.copy_from_slice(&scaled);
        }
    }

    fn apply_lambda_t(&self, theta: &[f64], v: &mut [f64]) {
        let tt = lambda_block(self.k, theta).transpose();
        for chunk in v.chunks_mut(self.k) {
            let scaled = tt.mat_vec(chunk);
            chunk.copy_from_slice(&scaled);
        }
    }
}

/// Model with one correlated vector-valued term, e.g. `(1 + days | subject)`.
#[derive(Debug, Clone)]
pub struct VectorTermLmm {
    inputs: ModelInputs,
    structure: VectorStructure,
    lower: Vec<f64>,
    state: FitState,
}

impl VectorTermLmm {
    /// Build the model and evaluate it once with `T = I`.
    pub fn new(
        y: Vec<f64>,
        x: DenseMatrix,
        term: ReTerm,
        sqrtwts: Vec<f64>,
    ) -> Result<Self, LmmError> {
        if term.is_simple() {
            return Err(ConstructionError::SimpleTermForVectorModel.into());
        }
        let inputs = ModelInputs::new(y, x, std::slice::from_ref(&term), sqrtwts)?;
        let structure = VectorStructure::new(&inputs, &term);
        let k = structure.k;

        let mut lower = Vec::with_capacity(k * (k + 1) / 2);
        let mut theta0 = Vec::with_capacity(k * (k + 1) / 2);
        for c in 0..k {
            for r in c..k {
                let diagonal = r == c;
                lower.push(if diagonal { 0.0 } else { f64::NEG_INFINITY });
                theta0.push(if diagonal { 1.0 } else { 0.0 });
            }
        }

        let sol = pls::solve(&inputs, &structure, &theta0)?;
        Ok(Self {
            inputs,
            structure,
            lower,
            state: FitState::from_solution(sol),
        })
    }

    /// Regressors per grouping level.
    pub fn block_size(&self) -> usize {
        self.structure.k
    }

    /// Relative covariance factor `T` at the current theta.
    pub fn lambda(&self) -> DenseMatrix {
        lambda_block(self.structure.k, &self.state.theta)
    }
}

impl LinearMixedModel for VectorTermLmm {
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

    #[test]
    fn test_lambda_block_layout() {
        let t = lambda_block(3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.get(0, 0), 1.0);
        assert_eq!(t.get(1, 0), 2.0);
        assert_eq!(t.get(2, 0), 3.0);
        assert_eq!(t.get(1, 1), 4.0);
        assert_eq!(t.get(2, 1), 5.0);
        assert_eq!(t.get(2, 2), 6.0);
        assert_eq!(t.get(0, 2), 0.0);
    }

    fn slope_model() -> VectorTermLmm {
        let days = [0.0, 1.0, 2.0, 3.0];
        let mut y = Vec::new();
        let mut z = Vec::new();
        let mut levels = Vec::new();
        for g in 0..3 {
            for &d in &days {
                y.push(1.0 + 0.5 * d + g as f64 * (0.3 + 0.2 * d) + 0.1 * ((g * 7 + d as usize) % 3) as f64);
                z.extend_from_slice(&[1.0, d]);
                levels.push(g);
            }
        }
        let n = y.len();
        let mut x = DenseMatrix::zeros(n, 2);
        for i in 0..n {
            x.set(i, 0, 1.0);
            x.set(i, 1, z[2 * i + 1]);
        }
        let term = ReTerm::with_regressors(levels, DenseMatrix::from_row_major(n, 2, &z));
        VectorTermLmm::new(y, x, term, Vec::new()).unwrap()
    }

    #[test]
    fn test_initial_theta_and_bounds() {
        let m = slope_model();
        assert_eq!(m.theta(), &[1.0, 0.0, 1.0]);
        assert_eq!(m.lower()[0], 0.0);
        assert_eq!(m.lower()[1], f64::NEG_INFINITY);
        assert_eq!(m.lower()[2], 0.0);
        assert_eq!(m.block_size(), 2);
        match m.cholesky_factor() {
            ReFactor::BlockDiagonal { block_size, blocks } => {
                assert_eq!(*block_size, 2);
                assert_eq!(blocks.len(), 3);
            }
            other => panic!("unexpected factor {:?}", other),
        }
    }

    #[test]
    fn test_negative_off_diagonal_accepted() {
        let mut m = slope_model();
        let value = m.objective(&[0.8, -0.3, 0.2]).unwrap();
        assert!(value.is_finite());
        assert_eq!(m.theta(), &[0.8, -0.3, 0.2]);
        assert!(m.pwrss() >= m.wrss());
    }

    #[test]
    fn test_rejects_simple_term() {
        let x = DenseMatrix::from_col_major(4, 1, vec![1.0; 4]);
        let term = ReTerm::intercept(vec![0, 0, 1, 1]);
        let err = VectorTermLmm::new(vec![1.0, 2.0, 3.0, 4.0], x, term, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            LmmError::Construction(ConstructionError::SimpleTermForVectorModel)
        ));
    }

    #[test]
    fn test_ranef_is_lambda_u() {
        let mut m = slope_model();
        m.objective(&[0.5, 0.1, 0.3]).unwrap();
        m.set_fit();
        let b = m.ranef().unwrap();
        let u = m.u().to_vec();
        assert!((b[0] - 0.5 * u[0]).abs() < 1e-12);
        assert!((b[1] - (0.1 * u[0] + 0.3 * u[1])).abs() < 1e-12);
    }
}
