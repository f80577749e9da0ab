//! Dense least squares with rank-deficiency handling.
//!
//! Aliased columns are found by an incremental Cholesky pivot test on the
//! Gram matrix and excluded from the solve. Everything reported per column
//! uses `NaN` for an aliased column, so an unidentified coefficient can never
//! masquerade as a zero effect.

use nalgebra::{DMatrix, DVector};

use crate::error::ModelError;

/// Relative pivot below which a column counts as a linear combination of the
/// columns before it.
const ALIAS_TOL: f64 = 1e-10;

/// Relative singular-value cutoff of [`pseudo_inverse`].
const PINV_RCOND: f64 = 1e-12;

/// Columns of `gram` that are linearly dependent on earlier columns.
///
/// Walks the columns left to right and extends a Cholesky factor of the kept
/// block; a column whose squared pivot falls below `ALIAS_TOL` times its own
/// diagonal (or is not positive) is marked aliased and skipped.
pub fn aliased_columns(gram: &DMatrix<f64>) -> Vec<bool> {
    let k = gram.ncols();
    let mut aliased = Vec::with_capacity(k);
    let mut kept: Vec<usize> = Vec::with_capacity(k);
    // rows of the lower-triangular factor of the kept block, diagonal last
    let mut factor: Vec<Vec<f64>> = Vec::with_capacity(k);

    for (j, col) in gram.column_iter().enumerate() {
        let diag = col.get(j).copied().unwrap_or(f64::NAN);
        if !(diag.is_finite() && diag > 0.0) {
            aliased.push(true);
            continue;
        }

        let mut z = Vec::with_capacity(kept.len() + 1);
        for (row, &kr) in factor.iter().zip(&kept) {
            let Some((pivot, lower)) = row.split_last() else {
                continue;
            };
            let dot: f64 = lower.iter().zip(&z).map(|(a, b)| a * b).sum();
            z.push((col.get(kr).copied().unwrap_or(f64::NAN) - dot) / pivot);
        }
        let pivot = diag - z.iter().map(|v| v * v).sum::<f64>();

        if pivot.is_nan() || pivot <= ALIAS_TOL * diag {
            aliased.push(true);
        } else {
            z.push(pivot.sqrt());
            factor.push(z);
            kept.push(j);
            aliased.push(false);
        }
    }
    aliased
}

/// Inverse of a symmetric positive semi-definite matrix: Cholesky when it
/// succeeds, SVD pseudo-inverse otherwise.
pub fn invert_symmetric(m: &DMatrix<f64>) -> DMatrix<f64> {
    match m.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => pseudo_inverse(m),
    }
}

/// Moore-Penrose pseudo-inverse. All-`NaN` for non-finite input or when the
/// decomposition fails.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> DMatrix<f64> {
    if !m.iter().all(|v| v.is_finite()) {
        return DMatrix::from_element(m.ncols(), m.nrows(), f64::NAN);
    }
    let svd = m.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    svd.pseudo_inverse(PINV_RCOND * max_sv.max(f64::MIN_POSITIVE))
        .unwrap_or_else(|_| DMatrix::from_element(m.ncols(), m.nrows(), f64::NAN))
}

/// `X' diag(w) X`.
pub fn weighted_gram(x: &DMatrix<f64>, weights: Option<&DVector<f64>>) -> DMatrix<f64> {
    match weights {
        Some(w) => {
            let mut xw = x.clone();
            for (mut row, wi) in xw.row_iter_mut().zip(w.iter()) {
                row *= *wi;
            }
            x.tr_mul(&xw)
        }
        None => x.tr_mul(x),
    }
}

/// Precomputed weighted least-squares projection for a fixed design.
///
/// Solving for several outcomes against the same regressors only costs a
/// matrix-vector product each, which the bootstrap relies on.
#[derive(Debug, Clone)]
pub struct Projector {
    x_kept: DMatrix<f64>,
    weights: Option<DVector<f64>>,
    bread: DMatrix<f64>,
    kept: Vec<usize>,
    n_cols: usize,
}

/// Coefficients and residuals of one solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Coefficients of the kept columns.
    pub beta: DVector<f64>,
    /// `y - X beta`.
    pub residuals: DVector<f64>,
}

impl Projector {
    /// Detects aliased columns and inverts the Gram block of the rest.
    pub fn new(x: &DMatrix<f64>, weights: Option<&DVector<f64>>) -> Result<Self, ModelError> {
        if x.ncols() == 0 {
            return Err(ModelError::EmptyDesign);
        }
        if x.nrows() == 0 {
            return Err(ModelError::NoObservations);
        }
        if let Some(w) = weights {
            if w.len() != x.nrows() {
                return Err(ModelError::DimensionMismatch(format!(
                    "{} weights for {} rows",
                    w.len(),
                    x.nrows()
                )));
            }
        }

        let gram = weighted_gram(x, weights);
        let kept: Vec<usize> = aliased_columns(&gram)
            .iter()
            .enumerate()
            .filter_map(|(j, a)| (!a).then_some(j))
            .collect();

        let x_kept = x.select_columns(kept.iter());
        let gram_kept = gram.select_rows(kept.iter()).select_columns(kept.iter());
        let bread = invert_symmetric(&gram_kept);

        Ok(Self {
            x_kept,
            weights: weights.cloned(),
            bread,
            kept,
            n_cols: x.ncols(),
        })
    }

    /// Weighted least squares of `y` on the kept columns.
    pub fn solve(&self, y: &DVector<f64>) -> Solution {
        let xty = match &self.weights {
            Some(w) => self.x_kept.tr_mul(&y.component_mul(w)),
            None => self.x_kept.tr_mul(y),
        };
        let beta = &self.bread * xty;
        let residuals = y - &self.x_kept * &beta;
        Solution { beta, residuals }
    }

    /// Design restricted to the kept columns.
    pub fn x(&self) -> &DMatrix<f64> {
        &self.x_kept
    }

    /// Observation weights, if any.
    pub fn weights(&self) -> Option<&DVector<f64>> {
        self.weights.as_ref()
    }

    /// `(X'WX)^-1` over the kept columns.
    pub fn bread(&self) -> &DMatrix<f64> {
        &self.bread
    }

    /// Original indices of the kept columns.
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// Column count of the full design.
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Position of original column `col` among the kept columns.
    pub fn position(&self, col: usize) -> Option<usize> {
        self.kept.iter().position(|&k| k == col)
    }

    /// Scatters a kept-column vector into full width, `NaN` elsewhere.
    pub fn expand_vector(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::from_element(self.n_cols, f64::NAN);
        for (&k, &value) in self.kept.iter().zip(v.iter()) {
            if let Some(slot) = out.get_mut(k) {
                *slot = value;
            }
        }
        out
    }

    /// Scatters a kept-block matrix into full size, `NaN` elsewhere.
    pub fn expand_matrix(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::from_element(self.n_cols, self.n_cols, f64::NAN);
        for (col, &kj) in m.column_iter().zip(&self.kept) {
            for (&value, &ki) in col.iter().zip(&self.kept) {
                if let Some(slot) = out.get_mut((ki, kj)) {
                    *slot = value;
                }
            }
        }
        out
    }
}
