//! Immutable model data and the cross-products precomputed from it.

use mixedlm_linalg::{DenseMatrix, SparseMatrix};

use crate::error::ConstructionError;
use crate::terms::ReTerm;

/// Response, designs and weights of one model, validated at construction.
///
/// With square-root weights present every observation is scaled by
/// `r_i = 1 / sqrtwt_i`; the cross-products below are taken with
/// weight `r_i^2` so that the minimized `pwrss` matches `wrss`.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub(crate) y: Vec<f64>,
    pub(crate) x: DenseMatrix,
    pub(crate) zt: SparseMatrix,
    pub(crate) sqrtwts: Vec<f64>,
    /// `r_i^2` per observation (all ones when unweighted).
    pub(crate) rsq: Vec<f64>,
    pub(crate) xtx: DenseMatrix,
    pub(crate) xty: Vec<f64>,
    /// `Zt W X`, q x p.
    pub(crate) ztx: DenseMatrix,
    pub(crate) zty: Vec<f64>,
    pub(crate) grplevels: Vec<usize>,
    /// First `Zt` row of each term, plus q at the end.
    pub(crate) term_offsets: Vec<usize>,
}

impl ModelInputs {
    /// Validate the construction inputs and build `Zt`.
    pub fn new(
        y: Vec<f64>,
        x: DenseMatrix,
        terms: &[ReTerm],
        sqrtwts: Vec<f64>,
    ) -> Result<Self, ConstructionError> {
        if terms.is_empty() {
            return Err(ConstructionError::NoTerms);
        }
        let n = y.len();
        let p = x.ncols();
        if x.nrows() != n {
            return Err(ConstructionError::LengthMismatch {
                what: "fixed-effects design rows",
                expected: n,
                got: x.nrows(),
            });
        }
        if n <= p {
            return Err(ConstructionError::TooFewObservations { n, p });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ConstructionError::NonFinite { what: "response" });
        }
        if !x.is_finite() {
            return Err(ConstructionError::NonFinite {
                what: "fixed-effects design",
            });
        }
        if !sqrtwts.is_empty() {
            if sqrtwts.len() != n {
                return Err(ConstructionError::LengthMismatch {
                    what: "square-root weights",
                    expected: n,
                    got: sqrtwts.len(),
                });
            }
            if sqrtwts.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err(ConstructionError::InvalidWeights);
            }
        }
        for (t, term) in terms.iter().enumerate() {
            term.validate(t, n)?;
        }

        let mut term_offsets = Vec::with_capacity(terms.len() + 1);
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        let mut q = 0;
        for term in terms {
            term_offsets.push(q);
            let (r, c, v) = term.zt_triplets(q);
            rows.extend(r);
            cols.extend(c);
            vals.extend(v);
            q += term.nrows_zt();
        }
        term_offsets.push(q);
        let zt = SparseMatrix::from_triplets(q, n, &rows, &cols, &vals);

        let rsq: Vec<f64> = if sqrtwts.is_empty() {
            vec![1.0; n]
        } else {
            sqrtwts.iter().map(|w| 1.0 / (w * w)).collect()
        };

        let xtx = x.xtwx(&rsq);
        let xty = x.xtwv(&rsq, &y);
        let ztx = zt.weighted_mul_dense(&rsq, &x);
        let zty = zt.weighted_mat_vec(&rsq, &y);
        let grplevels = terms.iter().map(|t| t.distinct_levels()).collect();

        Ok(Self {
            y,
            x,
            zt,
            sqrtwts,
            rsq,
            xtx,
            xty,
            ztx,
            zty,
            grplevels,
            term_offsets,
        })
    }

    pub fn nobs(&self) -> usize {
        self.y.len()
    }

    /// Number of fixed-effects columns.
    pub fn nfixed(&self) -> usize {
        self.x.ncols()
    }

    /// Number of spherical random effects (rows of `Zt`).
    pub fn nrandom(&self) -> usize {
        self.zt.nrows()
    }

    pub fn nterms(&self) -> usize {
        self.grplevels.len()
    }

    pub fn response(&self) -> &[f64] {
        &self.y
    }

    pub fn design(&self) -> &DenseMatrix {
        &self.x
    }

    pub fn zt(&self) -> &SparseMatrix {
        &self.zt
    }

    pub fn sqrt_weights(&self) -> &[f64] {
        &self.sqrtwts
    }

    /// Weighted residual sum of squares for fitted values `mu`.
    pub(crate) fn wrss(&self, mu: &[f64]) -> f64 {
        self.y
            .iter()
            .zip(mu)
            .zip(&self.rsq)
            .map(|((yi, mi), ri)| (yi - mi) * (yi - mi) * ri)
            .sum()
    }
}
