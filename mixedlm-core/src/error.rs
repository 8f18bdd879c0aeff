//! Error types for model construction, objective evaluation and fitting.

use mixedlm_linalg::LinalgError;
use thiserror::Error;

/// Reasons a model cannot be built from the supplied inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("no random-effects terms")]
    NoTerms,

    #[error("only simple random-effects terms allowed when more than one term is present")]
    NonSimpleTerms,

    #[error("a vector-valued term needs at least two regressors per level")]
    SimpleTermForVectorModel,

    #[error("{what} has length {got}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("term {term}: level code {level} is out of range for {nlevels} levels")]
    LevelOutOfRange {
        term: usize,
        level: usize,
        nlevels: usize,
    },

    #[error("square-root weights must be positive and finite")]
    InvalidWeights,

    #[error("{what} contains non-finite values")]
    NonFinite { what: &'static str },

    #[error("need more observations ({n}) than fixed-effects columns ({p})")]
    TooFewObservations { n: usize, p: usize },
}

#[derive(Error, Debug)]
pub enum LmmError {
    #[error("construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("theta has length {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("theta[{index}] = {value} is below its lower bound {lower}")]
    BoundsViolation { index: usize, value: f64, lower: f64 },

    #[error("gradient requested, but only derivative-free optimization is supported")]
    GradientUnsupported,

    #[error("optimizer terminated without convergence: {0}")]
    OptimizerFailure(String),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
