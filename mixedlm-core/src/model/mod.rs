//! Linear mixed models `y = Xβ + ZΛu + ε`, `u ~ N(0, σ²I)`, `ε ~ N(0, σ²W⁻¹)`.
//!
//! [`LinearMixedModel`] is the capability interface shared by the three
//! representations. Each representation supplies its data, its mutable
//! [`FitState`], the penalized least-squares solve and the `Λ` scaling;
//! everything else is provided here in terms of those.

pub mod factor;
pub mod inputs;
pub mod pls;
pub mod scalar;
pub mod split;
pub mod state;
pub mod vector;

use mixedlm_linalg::{DenseMatrix, SparseMatrix};

use crate::error::LmmError;
use crate::fit::FitOptions;

pub use factor::ReFactor;
pub use inputs::ModelInputs;
pub use pls::{profiled_criterion, PlsSolution};
pub use scalar::ScalarTermLmm;
pub use split::SplitTermsLmm;
pub use state::FitState;
pub use vector::VectorTermLmm;

/// Model dimensions, fixed for the lifetime of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSize {
    /// Observations.
    pub n: usize,
    /// Fixed-effects columns.
    pub p: usize,
    /// Spherical random effects.
    pub q: usize,
    /// Random-effects terms.
    pub t: usize,
}

/// Check a proposed `theta` against the length and lower bounds of a model.
pub fn check_theta(theta: &[f64], lower: &[f64]) -> Result<(), LmmError> {
    if theta.len() != lower.len() {
        return Err(LmmError::DimensionMismatch {
            expected: lower.len(),
            got: theta.len(),
        });
    }
    for (index, (&value, &lb)) in theta.iter().zip(lower).enumerate() {
        if !value.is_finite() || value < lb {
            return Err(LmmError::BoundsViolation {
                index,
                value,
                lower: lb,
            });
        }
    }
    Ok(())
}

pub trait LinearMixedModel {
    fn inputs(&self) -> &ModelInputs;

    fn state(&self) -> &FitState;

    fn state_mut(&mut self) -> &mut FitState;

    /// Elementwise lower bounds for theta.
    fn lower(&self) -> &[f64];

    /// Penalized least squares at `theta`, without validation or mutation.
    fn solve(&self, theta: &[f64]) -> Result<PlsSolution, LmmError>;

    /// v <- Λ(θ) v at the current theta.
    fn scale_by_lambda(&self, v: &mut [f64]);

    fn response(&self) -> &[f64] {
        self.inputs().response()
    }

    fn fitted(&self) -> &[f64] {
        &self.state().mu
    }

    /// Square-root case weights; empty when unweighted.
    fn sqrt_weights(&self) -> &[f64] {
        self.inputs().sqrt_weights()
    }

    /// Factor `L` of the penalized random-effects system at the current theta.
    fn cholesky_factor(&self) -> &ReFactor {
        &self.state().factor
    }

    /// Weighted residual sum of squares.
    fn wrss(&self) -> f64 {
        self.state().wrss
    }

    /// `wrss + |u|^2`.
    fn pwrss(&self) -> f64 {
        self.state().pwrss
    }

    fn zt(&self) -> &SparseMatrix {
        self.inputs().zt()
    }

    fn size(&self) -> ModelSize {
        let inputs = self.inputs();
        ModelSize {
            n: inputs.nobs(),
            p: inputs.nfixed(),
            q: inputs.nrandom(),
            t: inputs.nterms(),
        }
    }

    fn nobs(&self) -> usize {
        self.inputs().nobs()
    }

    fn design(&self) -> &DenseMatrix {
        self.inputs().design()
    }

    /// Lower Cholesky factor of the downdated `X'WX`.
    fn rx(&self) -> &DenseMatrix {
        &self.state().rx.l
    }

    fn is_fit(&self) -> bool {
        self.state().fit
    }

    fn theta(&self) -> &[f64] {
        &self.state().theta
    }

    /// Fixed-effects estimates; fits the model first if needed.
    fn fixef(&mut self) -> Result<&[f64], LmmError> {
        self.ensure_fit()?;
        Ok(&self.state().beta)
    }

    /// Conditional modes on the original scale, `b = Λu`; fits first if needed.
    fn ranef(&mut self) -> Result<Vec<f64>, LmmError> {
        self.ensure_fit()?;
        let mut b = self.state().u.clone();
        self.scale_by_lambda(&mut b);
        Ok(b)
    }

    fn set_fit(&mut self) {
        self.state_mut().fit = true;
    }

    /// Spherical random effects; never triggers a fit.
    fn u(&self) -> &[f64] {
        &self.state().u
    }

    /// Switch between REML and ML. Any previous fit is invalidated.
    fn set_reml(&mut self, reml: bool) {
        let state = self.state_mut();
        state.reml = reml;
        state.fit = false;
    }

    fn is_reml(&self) -> bool {
        self.state().reml
    }

    /// Evaluate the profiled criterion at `theta`, installing the solution.
    ///
    /// Validation happens before any mutation, so an error leaves the
    /// model as it was.
    fn objective(&mut self, theta: &[f64]) -> Result<f64, LmmError> {
        check_theta(theta, self.lower())?;
        let sol = self.solve(theta)?;
        self.state_mut().install(sol);
        Ok(self.criterion())
    }

    /// Move to `theta` outside the optimizer; clears the fit flag.
    fn set_theta(&mut self, theta: &[f64]) -> Result<f64, LmmError> {
        let value = self.objective(theta)?;
        self.state_mut().fit = false;
        Ok(value)
    }

    /// Criterion at the current state for the current REML/ML mode.
    fn criterion(&self) -> f64 {
        let size = self.size();
        let state = self.state();
        profiled_criterion(
            size.n,
            size.p,
            state.pwrss,
            state.logdet_l,
            state.logdet_rx,
            state.reml,
        )
    }

    /// Number of distinct grouping levels referenced by each term.
    fn grplevels(&self) -> Vec<usize> {
        self.inputs().grplevels.clone()
    }

    /// Residual variance `pwrss / (n - p)` under REML, `pwrss / n` under ML.
    fn sigma2(&self) -> f64 {
        let size = self.size();
        let dof = if self.is_reml() { size.n - size.p } else { size.n };
        self.pwrss() / dof as f64
    }

    /// Covariance of the fixed-effects estimates, `σ² (RX RX')^{-1}`.
    fn vcov(&mut self) -> Result<DenseMatrix, LmmError> {
        self.ensure_fit()?;
        Ok(self.state().rx.inverse().scale(self.sigma2()))
    }

    /// Standard errors of the fixed effects.
    fn stderr(&mut self) -> Result<Vec<f64>, LmmError> {
        Ok(self.vcov()?.diag().iter().map(|v| v.sqrt()).collect())
    }

    fn ensure_fit(&mut self) -> Result<(), LmmError> {
        if !self.is_fit() {
            crate::fit::fit(self, &FitOptions::default())?;
        }
        Ok(())
    }
}
