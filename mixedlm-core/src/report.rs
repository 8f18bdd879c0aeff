//! Variance components and the fitted-model summary.
//!
//! Contains the quantities a report needs after a fit:
//! - criterion name and value, plus deviance, log-likelihood, AIC and BIC under ML
//! - variance components on the original scale
//! - grouping level counts, theta, fixed effects and their standard errors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dispatch::MixedModel;
use crate::error::LmmError;
use crate::fit::{self, FitOptions};
use crate::model::{LinearMixedModel, ScalarTermLmm, SplitTermsLmm, VectorTermLmm};

/// Variance components of models whose every term has a single scalar parameter.
pub trait ScalarVarianceComponents: LinearMixedModel {
    /// `[θ_1²σ², ..., θ_t²σ², σ²]`; fits the model first if needed.
    fn var_est(&mut self) -> Result<Vec<f64>, LmmError> {
        self.ensure_fit()?;
        let sigma2 = self.sigma2();
        let mut out: Vec<f64> = self.theta().iter().map(|t| t * t * sigma2).collect();
        out.push(sigma2);
        Ok(out)
    }
}

impl ScalarVarianceComponents for ScalarTermLmm {}
impl ScalarVarianceComponents for SplitTermsLmm {}

impl VectorTermLmm {
    /// Random-effects covariance `σ² T T'` (k x k) and the residual variance.
    pub fn re_covariance(&mut self) -> Result<(Vec<Vec<f64>>, f64), LmmError> {
        self.ensure_fit()?;
        let sigma2 = self.sigma2();
        let t = self.lambda();
        let cov = t.mat_mul(&t.transpose()).scale(sigma2);
        Ok((cov.to_rows(), sigma2))
    }
}

/// Which likelihood was optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    Reml,
    MaximumLikelihood,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Reml => write!(f, "REML"),
            Criterion::MaximumLikelihood => write!(f, "maximum likelihood"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarianceComponents {
    /// One variance per term, then the residual variance.
    Scalar(Vec<f64>),
    /// Covariance of a vector term (rows), and the residual variance.
    Vector {
        covariance: Vec<Vec<f64>>,
        residual: f64,
    },
}

/// A fitted model, reduced to what gets reported. Serialized to .lmm.fit files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    /// Version number for forward compatibility.
    pub version: u32,
    /// Representation the model was fit with.
    pub kind: String,
    pub criterion: Criterion,
    /// Optimized criterion value.
    pub objective: f64,
    /// -2 log-likelihood, ML only.
    pub deviance: Option<f64>,
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub theta: Vec<f64>,
    pub variance_components: VarianceComponents,
    /// Distinct grouping levels per term.
    pub grplevels: Vec<usize>,
    pub fixef: Vec<f64>,
    pub stderr: Vec<f64>,
    pub n: usize,
    pub p: usize,
    pub q: usize,
    pub t: usize,
}

impl FitSummary {
    /// Magic bytes: "LMMF" (Linear Mixed Model Fit).
    pub const MAGIC: [u8; 4] = [b'L', b'M', b'M', b'F'];
    /// Current summary version.
    pub const VERSION: u32 = 1;

    /// Number of estimated parameters: fixed effects, theta and the residual scale.
    pub fn dof(&self) -> usize {
        self.p + self.theta.len() + 1
    }
}

/// Fit `model` if needed and collect its summary.
pub fn summarize(model: &mut MixedModel, opts: &FitOptions) -> Result<FitSummary, LmmError> {
    fit::fit(model.as_lmm_mut(), opts)?;

    let variance_components = match model {
        MixedModel::ScalarTerm(m) => VarianceComponents::Scalar(m.var_est()?),
        MixedModel::SplitTerms(m) => VarianceComponents::Scalar(m.var_est()?),
        MixedModel::VectorTerm(m) => {
            let (covariance, residual) = m.re_covariance()?;
            VarianceComponents::Vector {
                covariance,
                residual,
            }
        }
    };
    let kind = model.kind().to_string();

    let lmm = model.as_lmm_mut();
    let size = lmm.size();
    let objective = lmm.criterion();
    let fixef = lmm.fixef()?.to_vec();
    let stderr = lmm.stderr()?;
    let theta = lmm.theta().to_vec();

    let (criterion, deviance, log_likelihood, aic, bic) = if lmm.is_reml() {
        (Criterion::Reml, None, None, None, None)
    } else {
        let n = size.n as f64;
        let deviance = objective + n;
        let dof = (size.p + theta.len() + 1) as f64;
        (
            Criterion::MaximumLikelihood,
            Some(deviance),
            Some(-deviance / 2.0),
            Some(deviance + 2.0 * dof),
            Some(deviance + dof * n.ln()),
        )
    };

    Ok(FitSummary {
        magic: FitSummary::MAGIC,
        version: FitSummary::VERSION,
        kind,
        criterion,
        objective,
        deviance,
        log_likelihood,
        aic,
        bic,
        theta,
        variance_components,
        grplevels: lmm.grplevels(),
        fixef,
        stderr,
        n: size.n,
        p: size.p,
        q: size.q,
        t: size.t,
    })
}
