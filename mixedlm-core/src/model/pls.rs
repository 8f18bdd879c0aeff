#![allow(clippy::needless_range_loop)]
//! Penalized least squares at a fixed `theta`.
//!
//! For relative covariance factor `Λ(θ)` the joint system for the
//! spherical random effects `u` and the fixed effects `β` is solved by
//! blocked Cholesky:
//!
//!   L L'     = Λ'Z'WZΛ + I
//!   RZX      = L^{-1} Λ'Z'WX
//!   RX RX'   = X'WX - RZX'RZX
//!   L cu     = Λ'Z'Wy
//!   RX RX' β = X'Wy - RZX'cu
//!   L' u     = cu - RZX β
//!
//! after which `mu = Xβ + ZΛu` and the profiled criterion follow from
//! `pwrss`, `log|L|` and `log|RX|`.

use std::f64::consts::PI;

use mixedlm_linalg::{CholeskyDecomp, DenseMatrix};

use super::factor::ReFactor;
use super::inputs::ModelInputs;
use crate::error::LmmError;

/// Variant-specific shape of `Λ` and of `Z'WZ`.
pub(crate) trait ReStructure {
    /// Factor `Λ'Z'WZΛ + I` at `theta`.
    fn factorize(&self, theta: &[f64]) -> Result<ReFactor, LmmError>;

    /// v <- Λ v
    fn apply_lambda(&self, theta: &[f64], v: &mut [f64]);

    /// v <- Λ' v
    fn apply_lambda_t(&self, theta: &[f64], v: &mut [f64]);
}

/// Everything one objective evaluation produces, committed atomically.
#[derive(Debug, Clone)]
pub struct PlsSolution {
    pub theta: Vec<f64>,
    pub beta: Vec<f64>,
    pub u: Vec<f64>,
    pub mu: Vec<f64>,
    pub factor: ReFactor,
    pub rzx: DenseMatrix,
    pub rx: CholeskyDecomp,
    pub wrss: f64,
    pub pwrss: f64,
}

/// Solve the penalized least-squares problem at `theta` without touching any model state.
pub(crate) fn solve<S: ReStructure + ?Sized>(
    inputs: &ModelInputs,
    structure: &S,
    theta: &[f64],
) -> Result<PlsSolution, LmmError> {
    let p = inputs.nfixed();
    let q = inputs.nrandom();

    let factor = structure.factorize(theta)?;

    let mut rzx = DenseMatrix::zeros(q, p);
    for j in 0..p {
        let mut col = inputs.ztx.col(j);
        structure.apply_lambda_t(theta, &mut col);
        factor.solve_lower_in_place(&mut col);
        rzx.set_col(j, &col);
    }

    let mut downdated = inputs.xtx.clone();
    for a in 0..p {
        for b in 0..=a {
            let mut s = 0.0;
            for r in 0..q {
                s += rzx.get(r, a) * rzx.get(r, b);
            }
            let v = inputs.xtx.get(a, b) - s;
            downdated.set(a, b, v);
            downdated.set(b, a, v);
        }
    }
    let rx = CholeskyDecomp::new(&downdated)?;

    let mut cu = inputs.zty.clone();
    structure.apply_lambda_t(theta, &mut cu);
    factor.solve_lower_in_place(&mut cu);

    let mut beta = inputs.xty.clone();
    for j in 0..p {
        let mut s = 0.0;
        for r in 0..q {
            s += rzx.get(r, j) * cu[r];
        }
        beta[j] -= s;
    }
    rx.solve_lower_in_place(&mut beta);
    rx.solve_upper_in_place(&mut beta);

    let rzx_beta = rzx.mat_vec(&beta);
    let mut u: Vec<f64> = cu.iter().zip(&rzx_beta).map(|(c, rb)| c - rb).collect();
    factor.solve_upper_in_place(&mut u);

    let mut b = u.clone();
    structure.apply_lambda(theta, &mut b);
    let zb = inputs.zt.transpose_mat_vec(&b);
    let mu: Vec<f64> = inputs
        .x
        .mat_vec(&beta)
        .iter()
        .zip(&zb)
        .map(|(xb, zb)| xb + zb)
        .collect();

    let wrss = inputs.wrss(&mu);
    let pwrss = wrss + u.iter().map(|v| v * v).sum::<f64>();

    Ok(PlsSolution {
        theta: theta.to_vec(),
        beta,
        u,
        mu,
        factor,
        rzx,
        rx,
        wrss,
        pwrss,
    })
}

/// Profiled deviance (ML) or REML criterion.
///
/// ML: `n log(2π pwrss / n) + 2 log|L|`.
/// REML: `(n-p) log(2π pwrss / (n-p)) + 2 log|L| + 2 log|RX|`.
pub fn profiled_criterion(
    n: usize,
    p: usize,
    pwrss: f64,
    logdet_l: f64,
    logdet_rx: f64,
    reml: bool,
) -> f64 {
    if reml {
        let nmp = (n - p) as f64;
        nmp * (2.0 * PI * pwrss / nmp).ln() + 2.0 * logdet_l + 2.0 * logdet_rx
    } else {
        let n = n as f64;
        n * (2.0 * PI * pwrss / n).ln() + 2.0 * logdet_l
    }
}
