#![allow(clippy::needless_range_loop)]
//! Cholesky factor `L` of the penalized random-effects system `Λ'Z'WZΛ + I`.
//!
//! The sparsity of `Z'WZ` depends on the random-effects structure, so the
//! factor is stored in one of three shapes.

use mixedlm_linalg::{CholeskyDecomp, DenseMatrix};

/// Lower Cholesky factor of `Λ'Z'WZΛ + I`.
#[derive(Debug, Clone)]
pub enum ReFactor {
    /// Single scalar term: `L` is diagonal.
    Diagonal(Vec<f64>),
    /// Single vector term: one k x k factor per grouping level.
    BlockDiagonal {
        block_size: usize,
        blocks: Vec<CholeskyDecomp>,
    },
    /// Several scalar terms: `L` is dense q x q.
    Dense(CholeskyDecomp),
}

impl ReFactor {
    /// Order q of the factored system.
    pub fn dim(&self) -> usize {
        match self {
            ReFactor::Diagonal(d) => d.len(),
            ReFactor::BlockDiagonal { block_size, blocks } => block_size * blocks.len(),
            ReFactor::Dense(chol) => chol.dim(),
        }
    }

    /// log|L|, the sum of the logs of the diagonal of `L`.
    pub fn log_det(&self) -> f64 {
        match self {
            ReFactor::Diagonal(d) => d.iter().map(|v| v.ln()).sum(),
            ReFactor::BlockDiagonal { blocks, .. } => blocks.iter().map(|b| b.log_det()).sum(),
            ReFactor::Dense(chol) => chol.log_det(),
        }
    }

    /// b <- L^{-1} b
    pub fn solve_lower_in_place(&self, b: &mut [f64]) {
        assert_eq!(b.len(), self.dim());
        match self {
            ReFactor::Diagonal(d) => {
                for (bi, di) in b.iter_mut().zip(d) {
                    *bi /= di;
                }
            }
            ReFactor::BlockDiagonal { block_size, blocks } => {
                for (chunk, block) in b.chunks_mut(*block_size).zip(blocks) {
                    block.solve_lower_in_place(chunk);
                }
            }
            ReFactor::Dense(chol) => chol.solve_lower_in_place(b),
        }
    }

    /// b <- L'^{-1} b
    pub fn solve_upper_in_place(&self, b: &mut [f64]) {
        assert_eq!(b.len(), self.dim());
        match self {
            ReFactor::Diagonal(d) => {
                for (bi, di) in b.iter_mut().zip(d) {
                    *bi /= di;
                }
            }
            ReFactor::BlockDiagonal { block_size, blocks } => {
                for (chunk, block) in b.chunks_mut(*block_size).zip(blocks) {
                    block.solve_upper_in_place(chunk);
                }
            }
            ReFactor::Dense(chol) => chol.solve_upper_in_place(b),
        }
    }

    /// The matrix blocks making up `L`, in diagonal order.
    ///
    /// A diagonal factor yields q blocks of size 1 x 1.
    pub fn blocks(&self) -> Vec<DenseMatrix> {
        match self {
            ReFactor::Diagonal(d) => d.iter().map(|&v| DenseMatrix::from_diag(&[v])).collect(),
            ReFactor::BlockDiagonal { blocks, .. } => blocks.iter().map(|b| b.l.clone()).collect(),
            ReFactor::Dense(chol) => vec![chol.l.clone()],
        }
    }

    /// Diagonal entries of `L`.
    pub fn diag(&self) -> Vec<f64> {
        match self {
            ReFactor::Diagonal(d) => d.clone(),
            ReFactor::BlockDiagonal { blocks, .. } => blocks.iter().flat_map(|b| b.l.diag()).collect(),
            ReFactor::Dense(chol) => chol.l.diag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_factor() {
        let f = ReFactor::Diagonal(vec![2.0, 4.0]);
        let mut b = vec![2.0, 2.0];
        f.solve_lower_in_place(&mut b);
        assert_eq!(b, vec![1.0, 0.5]);
        assert!((f.log_det() - 8.0f64.ln()).abs() < 1e-12);
        let blocks = f.blocks();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.nrows() == 1 && b.ncols() == 1));
        assert_eq!(blocks[1].get(0, 0), 4.0);
        assert_eq!(f.diag(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_block_diagonal_matches_dense() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let block = CholeskyDecomp::new(&a).unwrap();
        let blocked = ReFactor::BlockDiagonal {
            block_size: 2,
            blocks: vec![block.clone(), block],
        };

        let mut full = DenseMatrix::zeros(4, 4);
        for off in [0, 2] {
            for i in 0..2 {
                for j in 0..2 {
                    full.set(off + i, off + j, a.get(i, j));
                }
            }
        }
        let dense = ReFactor::Dense(CholeskyDecomp::new(&full).unwrap());

        let rhs = vec![1.0, -2.0, 0.5, 3.0];
        let mut x1 = rhs.clone();
        let mut x2 = rhs.clone();
        blocked.solve_lower_in_place(&mut x1);
        blocked.solve_upper_in_place(&mut x1);
        dense.solve_lower_in_place(&mut x2);
        dense.solve_upper_in_place(&mut x2);
        for i in 0..4 {
            assert!((x1[i] - x2[i]).abs() < 1e-12, "x[{}]: {} vs {}", i, x1[i], x2[i]);
        }
        assert!((blocked.log_det() - dense.log_det()).abs() < 1e-12);
        assert_eq!(blocked.dim(), 4);
        assert_eq!(blocked.diag().len(), 4);
    }
}
