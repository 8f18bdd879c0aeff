#![allow(clippy::needless_range_loop)]
//! Cholesky decomposition and triangular solves.
//!
//! The penalized least-squares solve factors `Λ'Z'ZΛ + I` (or its
//! diagonal blocks) and the downdated fixed-effects cross-product, then
//! runs forward and backward substitution against the lower factor.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite (pivot {pivot}: {value:.3e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result of a Cholesky decomposition.
#[derive(Debug, Clone)]
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    ///
    /// Only the lower triangle of `a` is read.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if !diag.is_finite() || diag <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite {
                    pivot: j,
                    value: diag,
                });
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Order of the factored matrix.
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Forward substitution in place: b <- L^{-1} b.
    pub fn solve_lower_in_place(&self, b: &mut [f64]) {
        let n = self.dim();
        assert_eq!(b.len(), n);
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * b[j];
            }
            b[i] = (b[i] - sum) / self.l.get(i, i);
        }
    }

    /// Backward substitution in place: b <- L'^{-1} b.
    pub fn solve_upper_in_place(&self, b: &mut [f64]) {
        let n = self.dim();
        assert_eq!(b.len(), n);
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * b[j];
            }
            b[i] = (b[i] - sum) / self.l.get(i, i);
        }
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let mut x = b.to_vec();
        self.solve_lower_in_place(&mut x);
        self.solve_upper_in_place(&mut x);
        x
    }

    /// log|L| = sum of the logs of the diagonal of L.
    pub fn log_det(&self) -> f64 {
        self.l.diag().iter().map(|d| d.ln()).sum()
    }

    /// Compute the inverse of the original matrix A^{-1} = (L L')^{-1}.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.dim();
        let mut inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            let col = self.solve(&e);
            inv.set_col(j, &col);
        }
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cholesky() {
        // A = [[4, 2], [2, 3]]
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        // L should be [[2, 0], [1, sqrt(2)]]
        assert!((chol.l.get(0, 0) - 2.0).abs() < 1e-10);
        assert!((chol.l.get(1, 0) - 1.0).abs() < 1e-10);
        assert!((chol.l.get(1, 1) - 2.0f64.sqrt()).abs() < 1e-10);
        assert_eq!(chol.l.get(0, 1), 0.0);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = DenseMatrix::from_row_major(3, 3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0]);
        let b = vec![1.0, 2.0, 3.0];
        let chol = CholeskyDecomp::new(&a).unwrap();
        let x = chol.solve(&b);
        let ax = a.mat_vec(&x);
        for i in 0..3 {
            assert!(
                (ax[i] - b[i]).abs() < 1e-10,
                "ax[{}]={} != b[{}]={}",
                i,
                ax[i],
                i,
                b[i]
            );
        }
    }

    #[test]
    fn test_triangular_solves() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        let mut v = vec![2.0, 1.0 + 2.0f64.sqrt()];
        chol.solve_lower_in_place(&mut v);
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12);

        // L' = [[2, 1], [0, sqrt(2)]]; L' x = [3, sqrt(2)] -> x = [1, 1]
        let mut w = vec![3.0, 2.0f64.sqrt()];
        chol.solve_upper_in_place(&mut w);
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!((w[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_det() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        // det(A) = 8, so log|L| = log(8) / 2
        assert!((chol.log_det() - 8.0f64.ln() / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_not_pd() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 3.0, 3.0, 1.0]);
        assert!(matches!(
            CholeskyDecomp::new(&a),
            Err(LinalgError::NotPositiveDefinite { pivot: 1, .. })
        ));
    }

    #[test]
    fn test_cholesky_not_square() {
        let a = DenseMatrix::zeros(2, 3);
        assert!(matches!(
            CholeskyDecomp::new(&a),
            Err(LinalgError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_empty_matrix() {
        let chol = CholeskyDecomp::new(&DenseMatrix::zeros(0, 0)).unwrap();
        assert_eq!(chol.dim(), 0);
        assert_eq!(chol.log_det(), 0.0);
    }

    #[test]
    fn test_inverse() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let inv = CholeskyDecomp::new(&a).unwrap().inverse();
        let prod = a.mat_mul(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (prod.get(i, j) - expected).abs() < 1e-10,
                    "A*A^{{-1}}[{},{}] = {}, expected {}",
                    i,
                    j,
                    prod.get(i, j),
                    expected
                );
            }
        }
    }
}
