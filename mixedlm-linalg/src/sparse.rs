//! Sparse matrix operations backed by sprs.
//!
//! The transposed random-effects incidence matrix `Zt` (q x n) is stored
//! here. Each observation contributes one non-zero per random-effects
//! column it loads on, so products against `Zt` stay linear in n.

use sprs::{CsMatI, TriMat};

use crate::dense::DenseMatrix;

/// A sparse matrix wrapper around sprs, held in both CSR and CSC layout.
///
/// Row access (CSR) drives products with `Zt`; column access (CSC)
/// drives the weighted Gram product `Zt W Z`.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
    by_col: CsMatI<f64, usize>,
    nrows: usize,
    ncols: usize,
}

impl SparseMatrix {
    /// Create a sparse matrix from COO (coordinate) triplets.
    ///
    /// Duplicate coordinates are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMat::new((nrows, ncols));
        for ((&r, &c), &v) in rows.iter().zip(cols).zip(vals) {
            tri.add_triplet(r, c, v);
        }
        Self {
            inner: tri.to_csr(),
            by_col: tri.to_csc(),
            nrows,
            ncols,
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Get element at (row, col). Returns 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.inner.get(row, col) {
            Some(&v) => v,
            None => 0.0,
        }
    }

    /// Sparse matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols);
        let mut result = vec![0.0; self.nrows];
        for (i, row) in self.inner.outer_iterator().enumerate() {
            result[i] = row.iter().map(|(j, &a)| a * v[j]).sum();
        }
        result
    }

    /// Transposed product: self' * v.
    pub fn transpose_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.nrows);
        let mut result = vec![0.0; self.ncols];
        for (i, row) in self.inner.outer_iterator().enumerate() {
            let vi = v[i];
            if vi == 0.0 {
                continue;
            }
            for (j, &a) in row.iter() {
                result[j] += a * vi;
            }
        }
        result
    }

    /// Compute self * diag(w) * v.
    pub fn weighted_mat_vec(&self, w: &[f64], v: &[f64]) -> Vec<f64> {
        assert_eq!(w.len(), self.ncols);
        let wv: Vec<f64> = w.iter().zip(v).map(|(wi, vi)| wi * vi).collect();
        self.mat_vec(&wv)
    }

    /// Compute self * diag(w) * X for a dense X with `self.ncols()` rows.
    pub fn weighted_mul_dense(&self, w: &[f64], x: &DenseMatrix) -> DenseMatrix {
        assert_eq!(x.nrows(), self.ncols);
        let mut result = DenseMatrix::zeros(self.nrows, x.ncols());
        for j in 0..x.ncols() {
            let col = self.weighted_mat_vec(w, &x.col(j));
            result.set_col(j, &col);
        }
        result
    }

    /// Compute the weighted Gram matrix self * diag(w) * self' (dense, nrows x nrows).
    pub fn weighted_gram(&self, w: &[f64]) -> DenseMatrix {
        assert_eq!(w.len(), self.ncols);
        let mut gram = DenseMatrix::zeros(self.nrows, self.nrows);
        for (j, col) in self.by_col.outer_iterator().enumerate() {
            let wj = w[j];
            for (a, &va) in col.iter() {
                for (b, &vb) in col.iter() {
                    gram.set(a, b, gram.get(a, b) + va * vb * wj);
                }
            }
        }
        gram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incidence() -> SparseMatrix {
        // 2 levels x 4 observations: obs 0,1 -> level 0; obs 2,3 -> level 1
        SparseMatrix::from_triplets(2, 4, &[0, 0, 1, 1], &[0, 1, 2, 3], &[1.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_from_triplets() {
        let m = SparseMatrix::from_triplets(2, 2, &[0, 1], &[0, 1], &[3.0, 7.0]);
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.get(1, 1), 7.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn test_mat_vec() {
        let m =
            SparseMatrix::from_triplets(3, 3, &[0, 1, 2, 0], &[0, 1, 2, 2], &[1.0, 2.0, 3.0, 0.5]);
        let v = vec![1.0, 1.0, 1.0];
        let result = m.mat_vec(&v);
        assert!((result[0] - 1.5).abs() < 1e-10);
        assert!((result[1] - 2.0).abs() < 1e-10);
        assert!((result[2] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_transpose_mat_vec() {
        let zt = incidence();
        let zb = zt.transpose_mat_vec(&[2.0, -1.0]);
        assert_eq!(zb, vec![2.0, 2.0, -1.0, -1.0]);
    }

    #[test]
    fn test_weighted_products() {
        let zt = incidence();
        let w = vec![1.0, 2.0, 3.0, 4.0];
        let ztwy = zt.weighted_mat_vec(&w, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(ztwy, vec![3.0, 7.0]);

        let x = DenseMatrix::from_row_major(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let ztwx = zt.weighted_mul_dense(&w, &x);
        assert!((ztwx.get(0, 0) - 5.0).abs() < 1e-10);
        assert!((ztwx.get(1, 0) - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_weighted_gram_crossed() {
        // Two crossed factors stacked: rows 0-1 factor A, rows 2-3 factor B.
        let zt = SparseMatrix::from_triplets(
            4,
            3,
            &[0, 0, 1, 2, 3, 3],
            &[0, 1, 2, 0, 1, 2],
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        );
        let gram = zt.weighted_gram(&[1.0, 1.0, 1.0]);
        assert_eq!(gram.get(0, 0), 2.0);
        assert_eq!(gram.get(0, 2), 1.0);
        assert_eq!(gram.get(0, 3), 1.0);
        assert_eq!(gram.get(1, 2), 0.0);
        assert_eq!(gram.get(3, 3), 2.0);
        assert_eq!(gram.get(3, 0), gram.get(0, 3));
    }
}
