//! mixedlm-linalg: Linear algebra wrappers for mixedlm
//!
//! Provides the dense fixed-effects matrices, the sparse transposed
//! random-effects incidence matrix, and the Cholesky decomposition
//! used by the penalized least-squares solve.

pub mod dense;
pub mod sparse;
pub mod decomposition;

pub use decomposition::{CholeskyDecomp, LinalgError};
pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
