//! Cluster-robust sandwich covariance.

use nalgebra::{DMatrix, DVector};

use crate::config::CovarianceCorrection;
use crate::error::ConfigError;
use crate::math::Projector;
use crate::stack::factorize;

/// Dense cluster assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clusters {
    codes: Vec<usize>,
    n_clusters: usize,
}

impl Clusters {
    /// Factorizes labels into codes `0..G`.
    pub fn from_labels<T: Ord>(labels: impl IntoIterator<Item = T>) -> Self {
        let codes = factorize(labels);
        let n_clusters = codes.iter().copied().max().map_or(0, |m| m + 1);
        Self { codes, n_clusters }
    }

    /// Fails with [`ConfigError::TooFewClusters`] unless `G >= 2`.
    pub fn require_clustered(&self) -> Result<(), ConfigError> {
        if self.n_clusters < 2 {
            Err(ConfigError::TooFewClusters { found: self.n_clusters })
        } else {
            Ok(())
        }
    }

    /// Code per row.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Number of distinct clusters `G`.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True without rows.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Finite-sample factor for `G` clusters, `n` rows and `k` estimated
/// coefficients.
pub fn correction_factor(correction: CovarianceCorrection, g: usize, n: usize, k: usize) -> f64 {
    let (g, n, k) = (g as f64, n as f64, k as f64);
    match correction {
        CovarianceCorrection::None => 1.0,
        CovarianceCorrection::ClusterOnly if g > 1.0 => g / (g - 1.0),
        CovarianceCorrection::Stata if g > 1.0 && n > k => (g / (g - 1.0)) * ((n - 1.0) / (n - k)),
        _ => 1.0,
    }
}

/// Sum over clusters of `s_g s_g'` with `s_g = Σ_{i∈g} w_i x_i e_i`.
pub fn cluster_meat(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    weights: Option<&DVector<f64>>,
    clusters: &Clusters,
) -> DMatrix<f64> {
    let mut scores = DMatrix::<f64>::zeros(clusters.n_clusters(), x.ncols());
    let rows = x.row_iter().zip(residuals.iter()).zip(clusters.codes());
    for (i, ((x_i, e), &g)) in rows.enumerate() {
        let w = weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0);
        let mut s_g = scores.row_mut(g);
        s_g += x_i * (w * e);
    }
    scores.tr_mul(&scores)
}

/// `(X'WX)^-1 M (X'WX)^-1` over the kept columns of `projector`, scaled by
/// the requested correction.
pub fn cluster_robust(
    projector: &Projector,
    residuals: &DVector<f64>,
    clusters: &Clusters,
    correction: CovarianceCorrection,
) -> DMatrix<f64> {
    let meat = cluster_meat(projector.x(), residuals, projector.weights(), clusters);
    let bread = projector.bread();
    let scale = correction_factor(correction, clusters.n_clusters(), clusters.len(), projector.kept().len());
    (bread * meat * bread) * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn clusters_from_labels() {
        let c = Clusters::from_labels(["DE", "AT", "DE", "FR"]);
        assert_eq!(c.codes(), &[1, 0, 1, 2]);
        assert_eq!(c.n_clusters(), 3);
        assert!(c.require_clustered().is_ok());
        let single = Clusters::from_labels(["AT", "AT"]);
        assert_eq!(single.require_clustered(), Err(ConfigError::TooFewClusters { found: 1 }));
    }

    #[test]
    fn correction_factors() {
        assert_eq!(correction_factor(CovarianceCorrection::None, 4, 100, 3), 1.0);
        assert_abs_diff_eq!(correction_factor(CovarianceCorrection::ClusterOnly, 4, 100, 3), 4.0 / 3.0);
        assert_abs_diff_eq!(
            correction_factor(CovarianceCorrection::Stata, 4, 100, 3),
            4.0 / 3.0 * 99.0 / 97.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn one_obs_per_cluster_is_white_hc0() {
        // y = b x with x = 1: each row its own cluster, so the sandwich is
        // Σ e_i² / n².
        let x = DMatrix::from_element(4, 1, 1.0);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 6.0]);
        let proj = Projector::new(&x, None).unwrap();
        let sol = proj.solve(&y);
        let clusters = Clusters::from_labels(0..4);
        let v = cluster_robust(&proj, &sol.residuals, &clusters, CovarianceCorrection::None);
        let ss: f64 = sol.residuals.iter().map(|e| e * e).sum();
        assert_abs_diff_eq!(v[(0, 0)], ss / 16.0, epsilon = 1e-12);
    }

    #[test]
    fn scores_cancel_within_cluster() {
        // residuals sum to zero inside each cluster, so the meat vanishes
        let x = DMatrix::from_element(4, 1, 1.0);
        let e = DVector::from_vec(vec![1.0, -1.0, 2.0, -2.0]);
        let meat = cluster_meat(&x, &e, None, &Clusters::from_labels([0, 0, 1, 1]));
        assert_abs_diff_eq!(meat[(0, 0)], 0.0);
    }
}
