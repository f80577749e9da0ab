use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::math::{aliased_columns, invert_symmetric, pseudo_inverse};
use crate::statistics::std_error;

/// `(Rβ)' (R V R')⁻¹ (Rβ)` for the null `Rβ = 0`.
///
/// `R V R'` is inverted by Cholesky when it has full rank and by the
/// pseudo-inverse otherwise. Callers pass the parameters and covariance of
/// identified coefficients only; any non-finite input gives `NaN`.
pub fn wald_statistic(params: &DVector<f64>, cov: &DMatrix<f64>, restriction: &DMatrix<f64>) -> f64 {
    let rb = restriction * params;
    let rvr = restriction * cov * restriction.transpose();
    if !(rb.iter().chain(rvr.iter()).all(|v| v.is_finite())) {
        return f64::NAN;
    }
    let inv = if aliased_columns(&rvr).contains(&true) {
        pseudo_inverse(&rvr)
    } else {
        invert_symmetric(&rvr)
    };
    rb.dot(&(inv * &rb))
}

/// Upper tail of `χ²(df)`; `NaN` for `df = 0` or a `NaN` statistic.
pub fn chi2_sf(statistic: f64, df: usize) -> f64 {
    if statistic.is_nan() {
        return f64::NAN;
    }
    ChiSquared::new(df as f64).map_or(f64::NAN, |d| d.sf(statistic.max(0.0)))
}

/// `Rβ` and `sqrt(R V R')` for a single restriction row. The standard error
/// is `NaN` when the variance is missing.
pub fn linear_combination(params: &DVector<f64>, cov: &DMatrix<f64>, row: &DVector<f64>) -> (f64, f64) {
    let value = row.dot(params);
    let var = row.dot(&(cov * row));
    (value, std_error(var))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn single_restriction_is_squared_t() {
        let params = DVector::from_vec(vec![1.0, 0.4]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.09]);
        let r = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let w = wald_statistic(&params, &cov, &r);
        let (diff, se) = linear_combination(&params, &cov, &DVector::from_vec(vec![1.0, -1.0]));
        assert_abs_diff_eq!(diff, 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(se, 0.11_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(w, (diff / se).powi(2), epsilon = 1e-10);
    }

    #[test]
    fn chi_square_tail() {
        assert_abs_diff_eq!(chi2_sf(3.841_459, 1), 0.05, epsilon = 1e-5);
        assert_abs_diff_eq!(chi2_sf(0.0, 3), 1.0, epsilon = 1e-12);
        assert!(chi2_sf(1.0, 0).is_nan());
    }

    #[test]
    fn singular_middle_uses_pseudo_inverse() {
        // two identical restrictions: R V R' has rank one
        let params = DVector::from_vec(vec![0.5, 0.2]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.01, 0.0, 0.0, 0.01]);
        let r = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 1.0, -1.0]);
        let w = wald_statistic(&params, &cov, &r);
        assert!(w.is_finite());
        assert_abs_diff_eq!(w, 0.09 / 0.02, epsilon = 1e-8);
    }

    #[test]
    fn missing_variance_is_not_zero() {
        let params = DVector::from_vec(vec![1.0, 0.4]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, f64::NAN, f64::NAN, f64::NAN]);
        let (_, se) = linear_combination(&params, &cov, &DVector::from_vec(vec![1.0, 0.0]));
        assert!(se.is_nan());
        let r = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        assert!(wald_statistic(&params, &cov, &r).is_nan());
    }
}
