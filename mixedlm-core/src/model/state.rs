//! Mutable per-model record updated by the objective and the fit controller.

use mixedlm_linalg::{CholeskyDecomp, DenseMatrix};

use super::factor::ReFactor;
use super::pls::PlsSolution;

/// Current parameter values and factorizations of one model instance.
#[derive(Debug, Clone)]
pub struct FitState {
    pub(crate) theta: Vec<f64>,
    pub(crate) beta: Vec<f64>,
    pub(crate) u: Vec<f64>,
    pub(crate) mu: Vec<f64>,
    pub(crate) factor: ReFactor,
    pub(crate) rzx: DenseMatrix,
    pub(crate) rx: CholeskyDecomp,
    pub(crate) wrss: f64,
    pub(crate) pwrss: f64,
    pub(crate) logdet_l: f64,
    pub(crate) logdet_rx: f64,
    pub(crate) fit: bool,
    pub(crate) reml: bool,
}

impl FitState {
    pub(crate) fn from_solution(sol: PlsSolution) -> Self {
        let logdet_l = sol.factor.log_det();
        let logdet_rx = sol.rx.log_det();
        Self {
            theta: sol.theta,
            beta: sol.beta,
            u: sol.u,
            mu: sol.mu,
            factor: sol.factor,
            rzx: sol.rzx,
            rx: sol.rx,
            wrss: sol.wrss,
            pwrss: sol.pwrss,
            logdet_l,
            logdet_rx,
            fit: false,
            reml: false,
        }
    }

    /// Replace every evaluation-derived field; flags are left alone.
    pub(crate) fn install(&mut self, sol: PlsSolution) {
        let (fit, reml) = (self.fit, self.reml);
        *self = Self::from_solution(sol);
        self.fit = fit;
        self.reml = reml;
    }

    /// Fixed effects at the current theta, without triggering a fit.
    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    /// `RZX = L^{-1} Λ'Z'WX` at the current theta.
    pub fn rzx(&self) -> &DenseMatrix {
        &self.rzx
    }

    /// log|L| at the current theta.
    pub fn logdet_l(&self) -> f64 {
        self.logdet_l
    }

    /// log|RX| at the current theta.
    pub fn logdet_rx(&self) -> f64 {
        self.logdet_rx
    }
}
