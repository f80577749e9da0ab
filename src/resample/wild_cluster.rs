//! Wild cluster restricted bootstrap for a single coefficient.
//!
//! The null `β_k = 0` is imposed on the bootstrap data-generating process:
//! bootstrap outcomes are the restricted fitted values plus the restricted
//! residuals flipped by one weight per cluster. The regressors never change
//! between replications, so the unrestricted projection is factored once and
//! every replication is a matrix-vector solve.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{Re, WeightDist, WildWeights};
use crate::config::{BootstrapConfig, CiMethod, CovarianceCorrection};
use crate::error::{ConfigError, DataError, ModelError, Result};
use crate::math::Projector;
use crate::regression::{cluster_robust, correction_factor, Clusters};
use crate::statistics::{std_error, Interval, Mean, QuantileInterval, Skewness, Statistic, Variance, CDF};

/// Outcome of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapResult {
    /// Replications requested.
    pub n_bootstrap: usize,
    /// Replications with a finite statistic.
    pub n_valid: usize,
    /// Replications excluded from the distribution.
    pub n_dropped: usize,
    /// The drop rate is above the configured maximum.
    pub drop_rate_exceeded: bool,
    /// Unrestricted coefficient.
    pub estimate: f64,
    /// Cluster-robust standard error with the `G / (G - 1)` factor.
    pub se: f64,
    /// `estimate / se`.
    pub t_stat: f64,
    /// Share of `|t*| >= |t|`.
    pub p_value: f64,
    /// Bootstrap interval at `confidence_level`.
    pub ci: Interval<f64>,
    /// Interval construction used.
    pub ci_method: CiMethod,
    /// Interval level.
    pub confidence_level: f64,
    /// Weight distribution used.
    pub distribution: WeightDist,
    /// Distinct clusters `G`.
    pub n_clusters: usize,
    /// Factor applied to the restricted residuals.
    pub residual_scale: f64,
    /// Valid bootstrap t-statistics in replication order.
    pub t_distribution: Vec<f64>,
    /// Valid bootstrap coefficients in replication order.
    pub coef_distribution: Vec<f64>,
}

impl BootstrapResult {
    /// Share of replications dropped.
    pub fn drop_rate(&self) -> f64 {
        self.n_dropped as f64 / self.n_bootstrap as f64
    }

    /// Mean, standard deviation and skewness of the bootstrap t-statistics.
    pub fn t_moments(&self) -> (f64, f64, f64) {
        let (mean, var, skew) = (Mean, Variance::default(), Skewness::default()).compute(&self.t_distribution);
        (mean, var.sqrt(), skew)
    }
}

/// Lifecycle of a [`WildClusterBootstrap`].
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapState {
    /// Configured, nothing computed yet.
    Unfit,
    /// A fit is running.
    Fitting,
    /// Finished.
    Fitted(Box<BootstrapResult>),
    /// The last fit failed with this message.
    Failed(String),
}

/// Wild cluster bootstrap of one regression coefficient.
///
/// ```ignore
/// let mut boot = WildClusterBootstrap::new(BootstrapConfig::default());
/// let result = boot.fit(&y, &x, &Clusters::from_labels(&regions), 1)?;
/// println!("p = {:.4}", result.p_value);
/// ```
#[derive(Debug, Clone)]
pub struct WildClusterBootstrap {
    config: BootstrapConfig,
    weights: Option<DVector<f64>>,
    state: BootstrapState,
}

impl WildClusterBootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            weights: None,
            state: BootstrapState::Unfit,
        }
    }

    /// Observation weights for weighted least squares.
    #[must_use]
    pub fn with_weights(mut self, weights: DVector<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// Result of the last successful fit.
    ///
    /// # Errors
    /// [`ModelError::NotFitted`] unless the state is `Fitted`.
    pub fn summary(&self) -> std::result::Result<&BootstrapResult, ModelError> {
        match &self.state {
            BootstrapState::Fitted(result) => Ok(result),
            _ => Err(ModelError::NotFitted),
        }
    }

    /// Tests `β_param = 0` in `y = Xβ + ε` with clusters `clusters`. `x`
    /// should contain the constant.
    ///
    /// # Errors
    /// - [`ConfigError`] for an invalid configuration, fewer than two
    ///   clusters or `param` outside `x`.
    /// - [`DataError::LengthMismatch`] when `y`, `x`, the clusters or the
    ///   weights disagree in length.
    /// - [`ModelError::Unidentified`] when column `param` is aliased.
    pub fn fit(
        &mut self,
        y: &DVector<f64>,
        x: &DMatrix<f64>,
        clusters: &Clusters,
        param: usize,
    ) -> Result<&BootstrapResult> {
        self.state = BootstrapState::Fitting;
        match self.run(y, x, clusters, param) {
            Ok(result) => self.state = BootstrapState::Fitted(Box::new(result)),
            Err(e) => {
                self.state = BootstrapState::Failed(e.to_string());
                return Err(e);
            }
        }
        Ok(self.summary()?)
    }

    fn check_inputs(&self, y: &DVector<f64>, x: &DMatrix<f64>, clusters: &Clusters, param: usize) -> Result<()> {
        self.config.validate()?;
        let n = y.len();
        let lengths = [
            ("regressor rows", x.nrows()),
            ("cluster labels", clusters.len()),
            ("weights", self.weights.as_ref().map_or(n, DVector::len)),
        ];
        for (what, found) in lengths {
            if found != n {
                return Err(DataError::LengthMismatch { what, found, expected: n }.into());
            }
        }
        if param >= x.ncols() {
            return Err(ConfigError::ParamOutOfRange {
                index: param,
                n_params: x.ncols(),
            }
            .into());
        }
        clusters.require_clustered()?;
        Ok(())
    }

    fn run(&self, y: &DVector<f64>, x: &DMatrix<f64>, clusters: &Clusters, param: usize) -> Result<BootstrapResult> {
        self.check_inputs(y, x, clusters, param)?;
        let cfg = &self.config;
        let g = clusters.n_clusters();
        let weights = self.weights.as_ref();

        let full = Projector::new(x, weights)?;
        let pos = full.position(param).ok_or(ModelError::Unidentified { index: param })?;
        let observed = full.solve(y);
        let estimate = *observed.beta.get(pos).ok_or(ModelError::Unidentified { index: param })?;
        let cov = cluster_robust(&full, &observed.residuals, clusters, CovarianceCorrection::ClusterOnly);
        let se = cov.get((pos, pos)).copied().map_or(f64::NAN, std_error);
        let t_stat = estimate / se;

        // β_k = Σ a_i w_i y_i, which makes each replication's standard error
        // a single pass over the rows
        let lever: DVector<f64> = full.x() * full.bread().column(pos);
        let v_factor = correction_factor(CovarianceCorrection::ClusterOnly, g, clusters.len(), 0);

        let (fitted_r, resid_r) = restricted_fit(x, y, weights, param)?;
        let residual_scale = if cfg.small_cluster_correction {
            (g as f64 / (g as f64 - 1.0)).sqrt()
        } else {
            1.0
        };

        let draws: Vec<Vec<f64>> = WildWeights::new(cfg.distribution, cfg.seed)
            .re(clusters)
            .take(cfg.n_bootstrap)
            .collect();
        let codes = clusters.codes();

        let replicate = |wg: &Vec<f64>| -> Option<(f64, f64)> {
            let y_star = fitted_r
                .iter()
                .zip(resid_r.iter())
                .zip(codes)
                .map(|((f, e), &g)| Some(f + wg.get(g)? * residual_scale * e))
                .collect::<Option<Vec<f64>>>()?;
            let sol = full.solve(&DVector::from_vec(y_star));
            let b = *sol.beta.get(pos)?;
            let s = lever_se(&lever, &sol.residuals, weights, clusters, v_factor);
            let t = b / s;
            (b.is_finite() && t.is_finite()).then_some((b, t))
        };

        #[cfg(feature = "rayon")]
        let stats: Vec<Option<(f64, f64)>> = draws.par_iter().map(replicate).collect();
        #[cfg(not(feature = "rayon"))]
        let stats: Vec<Option<(f64, f64)>> = draws.iter().map(replicate).collect();

        let (coef_distribution, t_distribution): (Vec<f64>, Vec<f64>) = stats.into_iter().flatten().unzip();
        let n_valid = t_distribution.len();
        let n_dropped = cfg.n_bootstrap - n_valid;
        let drop_rate = n_dropped as f64 / cfg.n_bootstrap as f64;
        let drop_rate_exceeded = drop_rate > cfg.max_drop_rate;
        if drop_rate_exceeded {
            warn!(n_dropped, n_bootstrap = cfg.n_bootstrap, drop_rate, "bootstrap dropped too many replications");
        }

        let abs_t: Vec<f64> = t_distribution.iter().map(|t| t.abs()).collect();
        let p_value = if t_stat.is_finite() {
            CDF.compute(&abs_t).exceedance(t_stat.abs())
        } else {
            f64::NAN
        };

        let ci = if n_valid < 2 || !se.is_finite() {
            Interval::nan()
        } else {
            let quantiles = QuantileInterval::percentile(cfg.confidence_level);
            let (lower, upper) = match cfg.ci_method {
                CiMethod::Studentized => {
                    let (t_lo, t_hi) = quantiles.compute(&CDF.compute(&t_distribution));
                    (estimate - t_hi * se, estimate - t_lo * se)
                }
                CiMethod::Percentile => {
                    let (q_lo, q_hi) = quantiles.compute(&CDF.compute(&coef_distribution));
                    (estimate - q_hi, estimate - q_lo)
                }
            };
            Interval::new(lower, upper).estimate(estimate).confidence(cfg.confidence_level)
        };

        debug!(g, n_valid, n_dropped, estimate, t_stat, p_value, "wild cluster bootstrap finished");

        Ok(BootstrapResult {
            n_bootstrap: cfg.n_bootstrap,
            n_valid,
            n_dropped,
            drop_rate_exceeded,
            estimate,
            se,
            t_stat,
            p_value,
            ci,
            ci_method: cfg.ci_method,
            confidence_level: cfg.confidence_level,
            distribution: cfg.distribution,
            n_clusters: g,
            residual_scale,
            t_distribution,
            coef_distribution,
        })
    }
}

/// Fitted values and residuals with column `param` removed. Without any
/// column left the fit is zero.
fn restricted_fit(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: Option<&DVector<f64>>,
    param: usize,
) -> std::result::Result<(DVector<f64>, DVector<f64>), ModelError> {
    if x.ncols() == 1 {
        return Ok((DVector::zeros(y.len()), y.clone()));
    }
    let restricted = Projector::new(&x.clone().remove_column(param), weights)?;
    let sol = restricted.solve(y);
    Ok((y - &sol.residuals, sol.residuals))
}

/// `sqrt(factor · Σ_g (Σ_{i∈g} a_i w_i e_i)²)`.
fn lever_se(
    lever: &DVector<f64>,
    residuals: &DVector<f64>,
    weights: Option<&DVector<f64>>,
    clusters: &Clusters,
    factor: f64,
) -> f64 {
    let mut scores = vec![0.0; clusters.n_clusters()];
    let rows = lever.iter().zip(residuals.iter()).zip(clusters.codes());
    for (i, ((a, e), &g)) in rows.enumerate() {
        let w = weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0);
        if let Some(s) = scores.get_mut(g) {
            *s += a * w * e;
        }
    }
    (factor * scores.iter().map(|s| s * s).sum::<f64>()).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// `y = 1 + beta x + u_g + e` over `g` clusters of `m` rows.
    fn simulate(g: usize, m: usize, beta: f64, seed: u64) -> (DVector<f64>, DMatrix<f64>, Clusters) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let n = g * m;
        let mut x = DMatrix::from_element(n, 2, 1.0);
        let mut y = DVector::zeros(n);
        let mut labels = Vec::with_capacity(n);
        for c in 0..g {
            let u = rng.gen_range(-0.5..0.5);
            for j in 0..m {
                let i = c * m + j;
                let xi = rng.gen_range(-1.0..1.0);
                x[(i, 1)] = xi;
                y[i] = 1.0 + beta * xi + u + rng.gen_range(-0.5..0.5);
                labels.push(c);
            }
        }
        (y, x, Clusters::from_labels(labels))
    }

    fn config(n_bootstrap: usize, seed: u64) -> BootstrapConfig {
        BootstrapConfig {
            n_bootstrap,
            seed,
            ..BootstrapConfig::default()
        }
    }

    #[test]
    fn state_moves_from_unfit_to_fitted() {
        let (y, x, clusters) = simulate(12, 10, 0.5, 1);
        let mut boot = WildClusterBootstrap::new(config(199, 7));
        assert_eq!(boot.state(), &BootstrapState::Unfit);
        assert_eq!(boot.summary(), Err(ModelError::NotFitted));
        boot.fit(&y, &x, &clusters, 1).unwrap();
        assert!(matches!(boot.state(), BootstrapState::Fitted(_)));
        let r = boot.summary().unwrap();
        assert_eq!(r.n_bootstrap, 199);
        assert_eq!(r.n_valid + r.n_dropped, 199);
        assert!(!r.drop_rate_exceeded);
        assert_eq!(r.n_clusters, 12);
        assert_abs_diff_eq!(r.residual_scale, (12.0_f64 / 11.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn same_seed_same_answer() {
        let (y, x, clusters) = simulate(10, 8, 0.2, 2);
        let a = WildClusterBootstrap::new(config(299, 11)).fit(&y, &x, &clusters, 1).unwrap().clone();
        let b = WildClusterBootstrap::new(config(299, 11)).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert_eq!(a, b);
        let c = WildClusterBootstrap::new(config(299, 12)).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert_ne!(a.t_distribution, c.t_distribution);
        assert_eq!(a.estimate, c.estimate);
    }

    #[test]
    fn observed_se_matches_lever_formula() {
        let (y, x, clusters) = simulate(9, 6, 0.3, 3);
        let full = Projector::new(&x, None).unwrap();
        let sol = full.solve(&y);
        let lever: DVector<f64> = full.x() * full.bread().column(1);
        let factor = correction_factor(CovarianceCorrection::ClusterOnly, 9, y.len(), 0);
        let r = WildClusterBootstrap::new(config(9, 1)).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert_abs_diff_eq!(r.se, lever_se(&lever, &sol.residuals, None, &clusters, factor), epsilon = 1e-12);
        assert_abs_diff_eq!(r.estimate, sol.beta[1], epsilon = 1e-12);
    }

    #[test]
    fn strong_effect_is_detected() {
        let (y, x, clusters) = simulate(20, 10, 2.0, 4);
        let r = WildClusterBootstrap::new(config(499, 5)).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert!(r.p_value < 0.01, "p = {}", r.p_value);
        assert!(r.ci.contains(&r.estimate));
        assert!(r.ci.lower > 0.0);
    }

    #[test]
    fn percentile_interval_brackets_estimate() {
        let (y, x, clusters) = simulate(15, 10, 1.0, 6);
        let cfg = BootstrapConfig {
            ci_method: CiMethod::Percentile,
            ..config(499, 8)
        };
        let r = WildClusterBootstrap::new(cfg).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert!(r.ci.lower < r.estimate && r.estimate < r.ci.upper);
    }

    #[test]
    fn null_rejection_rate_is_near_nominal() {
        let sims = 60;
        let rejections = (0..sims)
            .filter(|&s| {
                let (y, x, clusters) = simulate(16, 8, 0.0, 100 + s);
                let cfg = BootstrapConfig {
                    distribution: WeightDist::Webb6,
                    ..config(199, s)
                };
                let r = WildClusterBootstrap::new(cfg).fit(&y, &x, &clusters, 1).unwrap().clone();
                r.p_value < 0.05
            })
            .count();
        // Binomial(60, 0.05) stays below 10 with overwhelming probability
        assert!(rejections < 10, "{rejections} rejections out of {sims}");
    }

    #[test]
    fn single_cluster_is_a_config_error() {
        let (y, x, _) = simulate(3, 4, 0.0, 9);
        let clusters = Clusters::from_labels(vec!["A"; y.len()]);
        let mut boot = WildClusterBootstrap::new(config(99, 1));
        let err = boot.fit(&y, &x, &clusters, 1).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::TooFewClusters { found: 1 })));
        assert!(matches!(boot.state(), BootstrapState::Failed(_)));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (y, x, clusters) = simulate(4, 4, 0.0, 9);
        let mut boot = WildClusterBootstrap::new(config(99, 1));
        assert!(matches!(
            boot.fit(&y, &x, &clusters, 2).unwrap_err(),
            Error::Config(ConfigError::ParamOutOfRange { index: 2, n_params: 2 })
        ));
        let short = Clusters::from_labels(0..3);
        assert!(matches!(
            boot.fit(&y, &x, &short, 1).unwrap_err(),
            Error::Data(DataError::LengthMismatch { what: "cluster labels", .. })
        ));
        let mut aliased = x.clone();
        aliased.column_mut(1).fill(1.0);
        assert!(matches!(
            boot.fit(&y, &aliased, &clusters, 1).unwrap_err(),
            Error::Model(ModelError::Unidentified { index: 1 })
        ));
        let mut zero = WildClusterBootstrap::new(config(0, 1));
        assert!(matches!(zero.fit(&y, &x, &clusters, 1).unwrap_err(), Error::Config(ConfigError::NoReplications)));
    }

    #[test]
    fn weighted_fit_runs() {
        let (y, x, clusters) = simulate(10, 6, 0.5, 10);
        let w = DVector::from_fn(y.len(), |i, _| 1.0 + (i % 3) as f64);
        let r = WildClusterBootstrap::new(config(99, 2))
            .with_weights(w)
            .fit(&y, &x, &clusters, 1)
            .unwrap()
            .clone();
        assert_eq!(r.n_valid, 99);
        assert!(r.se > 0.0);
    }

    #[test]
    fn degenerate_replications_flag_the_drop_rate() {
        // an all-zero outcome leaves every replication with zero residuals
        // and no finite t-statistic
        let (_, x, clusters) = simulate(6, 5, 0.0, 12);
        let y = DVector::zeros(x.nrows());
        let r = WildClusterBootstrap::new(config(49, 3)).fit(&y, &x, &clusters, 1).unwrap().clone();
        assert_eq!(r.n_valid, 0);
        assert_eq!(r.n_dropped, 49);
        assert!(r.drop_rate_exceeded);
        assert!(r.p_value.is_nan());
        assert!(r.ci.lower.is_nan());
    }
}
