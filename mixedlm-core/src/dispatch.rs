//! Selection of the model representation from the random-effects terms.

use mixedlm_linalg::DenseMatrix;
use tracing::debug;

use crate::error::{ConstructionError, LmmError};
use crate::fit::{self, FitOptions};
use crate::model::{LinearMixedModel, ScalarTermLmm, SplitTermsLmm, VectorTermLmm};
use crate::terms::ReTerm;

/// A linear mixed model in the representation its random effects require.
#[derive(Debug, Clone)]
pub enum MixedModel {
    ScalarTerm(ScalarTermLmm),
    VectorTerm(VectorTermLmm),
    SplitTerms(SplitTermsLmm),
}

impl MixedModel {
    /// Build a model from the response, the fixed-effects design and the terms.
    ///
    /// - one simple term: [`ScalarTermLmm`]
    /// - one term with several regressors per level: [`VectorTermLmm`]
    /// - several terms, all simple: [`SplitTermsLmm`]
    ///
    /// `sqrtwts` may be empty for an unweighted fit.
    pub fn new(
        y: Vec<f64>,
        x: DenseMatrix,
        mut terms: Vec<ReTerm>,
        sqrtwts: Vec<f64>,
    ) -> Result<Self, LmmError> {
        match terms.len() {
            0 => Err(ConstructionError::NoTerms.into()),
            1 => {
                let term = terms.remove(0);
                if term.is_simple() {
                    debug!("single scalar term with {} levels", term.nlevels());
                    Ok(MixedModel::ScalarTerm(ScalarTermLmm::new(y, x, term, sqrtwts)?))
                } else {
                    debug!(
                        "single vector term with {} levels x {} regressors",
                        term.nlevels(),
                        term.ncols()
                    );
                    Ok(MixedModel::VectorTerm(VectorTermLmm::new(y, x, term, sqrtwts)?))
                }
            }
            nterms => {
                if !terms.iter().all(ReTerm::is_simple) {
                    return Err(ConstructionError::NonSimpleTerms.into());
                }
                debug!("{} simple terms", nterms);
                Ok(MixedModel::SplitTerms(SplitTermsLmm::new(y, x, &terms, sqrtwts)?))
            }
        }
    }

    pub fn as_lmm(&self) -> &dyn LinearMixedModel {
        match self {
            MixedModel::ScalarTerm(m) => m,
            MixedModel::VectorTerm(m) => m,
            MixedModel::SplitTerms(m) => m,
        }
    }

    pub fn as_lmm_mut(&mut self) -> &mut dyn LinearMixedModel {
        match self {
            MixedModel::ScalarTerm(m) => m,
            MixedModel::VectorTerm(m) => m,
            MixedModel::SplitTerms(m) => m,
        }
    }

    /// Fit with the default optimizer; a no-op if already fit.
    pub fn fit(&mut self, opts: &FitOptions) -> Result<&mut Self, LmmError> {
        fit::fit(self.as_lmm_mut(), opts)?;
        Ok(self)
    }

    /// Short name of the representation.
    pub fn kind(&self) -> &'static str {
        match self {
            MixedModel::ScalarTerm(_) => "scalar-term",
            MixedModel::VectorTerm(_) => "vector-term",
            MixedModel::SplitTerms(_) => "split-terms",
        }
    }
}
