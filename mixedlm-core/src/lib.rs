//! mixedlm-core: linear mixed-effects models fit by profiled likelihood.
//!
//! Builds a model representation from the random-effects terms, evaluates
//! the profiled ML or REML criterion by penalized least squares, minimizes
//! it over the variance-component parameters with a derivative-free
//! bounded optimizer, and reports the fitted variance components.

pub mod dispatch;
pub mod error;
pub mod fit;
pub mod model;
pub mod optim;
pub mod report;
pub mod serialization;
pub mod terms;

pub use dispatch::MixedModel;
pub use error::{ConstructionError, LmmError};
pub use fit::{fit, fit_observed, fit_with, FitOptions};
pub use model::{LinearMixedModel, ModelSize};
pub use report::{summarize, FitSummary, ScalarVarianceComponents};
pub use terms::ReTerm;
