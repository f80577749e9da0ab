//! Event-time regression with absorbed fixed effects and cluster-robust
//! covariance.

mod absorb;
mod covariance;
mod design;
mod fitted;
mod profile;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::config::{AbsorbKey, AbsorptionConfig, ClusterKey, CovarianceCorrection, EventStudyConfig};
use crate::error::{ModelError, Result};
use crate::math::Projector;
use crate::stack::{StackedPanel, TreatVar};

pub use absorb::FixedEffects;
pub use covariance::{cluster_meat, cluster_robust, correction_factor, Clusters};
pub use design::{ColumnIndex, DesignColumn, DesignMatrix};
pub use fitted::FittedModel;
pub use profile::{EventTimeProfile, ProfileRow};

/// Absorbing least squares on the stacked panel.
///
/// Rows with a missing or non-finite outcome, weight or design value are
/// dropped before fitting. The remaining outcome and design columns are
/// demeaned on the absorbed keys, solved by (weighted) least squares, and the
/// covariance is the cluster sandwich at the configured key.
#[derive(Debug, Clone)]
pub struct AbsorbingRegression {
    treat_vars: Vec<TreatVar>,
    absorb: Vec<AbsorbKey>,
    cluster: ClusterKey,
    weight_column: Option<String>,
    include_time_dummies: bool,
    covariance: CovarianceCorrection,
    confidence_level: f64,
    absorption: AbsorptionConfig,
}

impl AbsorbingRegression {
    /// Regression on `treat_vars` with the analysis options of `config`.
    pub fn new(treat_vars: &[TreatVar], config: &EventStudyConfig) -> Self {
        let a = &config.analysis;
        Self {
            treat_vars: treat_vars.to_vec(),
            absorb: a.absorb.clone(),
            cluster: a.cluster,
            weight_column: a.weight_column.clone(),
            include_time_dummies: a.include_time_dummies,
            covariance: a.covariance,
            confidence_level: a.confidence_level,
            absorption: config.absorption,
        }
    }

    /// Overrides the cluster key.
    #[must_use]
    pub fn cluster(mut self, cluster: ClusterKey) -> Self {
        self.cluster = cluster;
        self
    }

    /// Overrides the absorbed keys.
    #[must_use]
    pub fn absorb(mut self, absorb: Vec<AbsorbKey>) -> Self {
        self.absorb = absorb;
        self
    }

    /// Overrides the weight column.
    #[must_use]
    pub fn weight_column(mut self, column: Option<String>) -> Self {
        self.weight_column = column;
        self
    }

    /// Fits the model.
    ///
    /// # Errors
    /// - [`ModelError::NoObservations`] when nothing survives the row filter.
    /// - [`crate::error::ConfigError::UnknownColumn`] for an unknown weight column and
    ///   [`crate::error::ConfigError::TooFewClusters`] when fewer than two clusters remain.
    /// - [`crate::error::ConvergenceError`] when demeaning exceeds its bound.
    pub fn fit(&self, panel: &StackedPanel) -> Result<FittedModel> {
        if self.treat_vars.is_empty() {
            return Err(ModelError::EmptyDesign.into());
        }
        let design = DesignMatrix::event_time(panel, &self.treat_vars, self.include_time_dummies);
        let weights = match &self.weight_column {
            Some(column) => Some(panel.weights(column)?),
            None => None,
        };

        let outcomes = panel.outcomes();
        let usable_weight = |i: usize| {
            weights
                .as_ref()
                .is_none_or(|w| w.get(i).copied().flatten().is_some_and(|v| v.is_finite() && v >= 0.0))
        };
        let keep: Vec<usize> = outcomes
            .iter()
            .zip(design.x.row_iter())
            .enumerate()
            .filter(|(i, (y, x_i))| y.is_some_and(f64::is_finite) && usable_weight(*i) && x_i.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect();
        let dropped = panel.len() - keep.len();
        if keep.is_empty() {
            return Err(ModelError::NoObservations.into());
        }

        let mut y: Vec<f64> = kept(&outcomes, &keep).map(|v| v.unwrap_or(f64::NAN)).collect();
        let w: Option<Vec<f64>> = weights.map(|w| kept(&w, &keep).map(|v| v.unwrap_or(0.0)).collect());
        let mut x = design.x.select_rows(keep.iter());

        let labels = panel.cluster_labels(self.cluster);
        let clusters = Clusters::from_labels(kept(&labels, &keep).map(String::as_str));
        clusters.require_clustered()?;

        let mut iterations = 0;
        if !self.absorb.is_empty() {
            let groups: Vec<Vec<usize>> = self
                .absorb
                .iter()
                .map(|&key| {
                    let codes = panel.absorb_codes(key);
                    crate::stack::factorize(kept(&codes, &keep).copied())
                })
                .collect();
            let fe = FixedEffects::new(&groups, w.as_deref())?.with_config(&self.absorption);
            iterations = fe.partial_out(&mut y)?;
            for mut col in x.column_iter_mut() {
                let mut values: Vec<f64> = col.iter().copied().collect();
                fe.partial_out(&mut values)?;
                col.copy_from_slice(&values);
            }
            debug!(levels = ?fe.levels(), iterations, "fixed effects absorbed");
        }

        let y = DVector::from_vec(y);
        let w = w.map(DVector::from_vec);
        let projector = Projector::new(&x, w.as_ref())?;
        let solution = projector.solve(&y);
        let cov_kept = cluster_robust(&projector, &solution.residuals, &clusters, self.covariance);

        let aliased = projector.n_cols() - projector.kept().len();
        info!(
            nobs = keep.len(),
            dropped,
            params = projector.n_cols(),
            aliased,
            clusters = clusters.n_clusters(),
            "absorbing regression fitted"
        );

        Ok(FittedModel {
            params: projector.expand_vector(&solution.beta),
            cov: projector.expand_matrix(&cov_kept),
            columns: design.columns,
            index: design.index,
            clusters: clusters.codes().to_vec(),
            n_clusters: clusters.n_clusters(),
            nobs: keep.len(),
            dropped_rows: dropped,
            iterations,
            confidence_level: self.confidence_level,
            half_window: panel.half_window(),
            base_period: panel.base_period(),
        })
    }
}

/// Entries of `values` at the `keep` positions.
fn kept<'a, T>(values: &'a [T], keep: &'a [usize]) -> impl Iterator<Item = &'a T> + 'a {
    keep.iter().filter_map(|&i| values.get(i))
}

/// Outcome, design, cluster labels and optional weights of the rows that
/// survive the missing-value filter, without absorption. The design carries
/// a leading constant.
#[derive(Debug, Clone)]
pub(crate) struct CompleteCases {
    pub y: DVector<f64>,
    pub x: DMatrix<f64>,
    pub labels: Vec<String>,
    pub weights: Option<DVector<f64>>,
}

/// Collects [`CompleteCases`] on `columns`.
///
/// # Errors
/// [`crate::error::ConfigError::UnknownColumn`] for an unknown weight column.
pub(crate) fn complete_cases(
    panel: &StackedPanel,
    columns: &[TreatVar],
    cluster: ClusterKey,
    weight_column: Option<&str>,
) -> std::result::Result<CompleteCases, crate::error::ConfigError> {
    let labels = panel.cluster_labels(cluster);
    let weights = weight_column.map(|c| panel.weights(c)).transpose()?;
    let mut y = Vec::new();
    let mut w = Vec::new();
    let mut rows: Vec<f64> = Vec::new();
    let mut kept_labels = Vec::new();
    for (i, (row, label)) in panel.rows().iter().zip(labels).enumerate() {
        let Some(outcome) = row.outcome.filter(|v| v.is_finite()) else {
            continue;
        };
        if let Some(weights) = &weights {
            match weights.get(i).copied().flatten() {
                Some(v) if v.is_finite() && v >= 0.0 => w.push(v),
                _ => continue,
            }
        }
        y.push(outcome);
        rows.push(1.0);
        rows.extend(columns.iter().map(|v| v.value(row)));
        kept_labels.push(label);
    }
    let x = DMatrix::from_row_slice(y.len(), columns.len() + 1, &rows);
    Ok(CompleteCases {
        y: DVector::from_vec(y),
        x,
        labels: kept_labels,
        weights: weights.map(|_| DVector::from_vec(w)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventStudyConfig;
    use crate::error::{ConfigError, Error};
    use crate::stack::tests::row;
    use crate::stack::StackedRow;
    use approx::assert_abs_diff_eq;

    /// Six regions, H = 2, one event per treated region; the treated outcome
    /// gains `effect * shock` from offset 0 on.
    fn synthetic(effect: f64) -> StackedPanel {
        let mut rows: Vec<StackedRow> = Vec::new();
        let regions = ["A", "B", "C", "D", "E", "F"];
        for (event_id, event_region) in regions.iter().take(3).enumerate() {
            let shock = if event_id % 2 == 0 { 1.0 } else { -2.0 };
            for (ri, region) in regions.iter().enumerate() {
                for t in -2..=2 {
                    let treated = region == event_region;
                    let mut r = row(region, t, shock, treated);
                    r.event_id = event_id;
                    r.event_region = (*event_region).to_string();
                    let unit = ri as f64 * 0.3;
                    let noise = ((ri * 7 + (t + 2) as usize * 3 + event_id) % 5) as f64 * 0.005;
                    let treat = if treated && t >= 0 { effect * shock } else { 0.0 };
                    r.outcome = Some(unit + 0.2 * f64::from(t) + treat + noise);
                    rows.push(r);
                }
            }
        }
        StackedPanel::from_rows(rows, 2, -1)
    }

    fn config() -> EventStudyConfig {
        let mut cfg = EventStudyConfig::default();
        cfg.analysis.event_window = 2;
        cfg
    }

    #[test]
    fn recovers_treatment_effect_through_fixed_effects() {
        let panel = synthetic(0.8);
        let model = AbsorbingRegression::new(&[TreatVar::TreatShock], &config()).fit(&panel).unwrap();
        assert_eq!(model.nobs(), panel.len());
        assert_eq!(model.n_clusters(), 6);
        for t in 0..=2 {
            let i = model.column(t, TreatVar::TreatShock).unwrap();
            assert_abs_diff_eq!(model.params()[i], 0.8, epsilon = 0.05);
        }
        let i = model.column(-2, TreatVar::TreatShock).unwrap();
        assert_abs_diff_eq!(model.params()[i], 0.0, epsilon = 0.05);
        assert!(model.std_errors().iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn missing_outcomes_are_dropped_not_zeroed() {
        let mut panel_rows = synthetic(0.8).rows().to_vec();
        panel_rows[0].outcome = None;
        panel_rows[1].outcome = Some(f64::INFINITY);
        let panel = StackedPanel::from_rows(panel_rows, 2, -1);
        let model = AbsorbingRegression::new(&[TreatVar::TreatShock], &config()).fit(&panel).unwrap();
        assert_eq!(model.dropped_rows(), 2);
        assert_eq!(model.nobs(), panel.len() - 2);
    }

    #[test]
    fn collinear_columns_are_nan() {
        // TreatShock and ShockAbs coincide when every shock is positive
        let rows: Vec<StackedRow> = synthetic(0.5)
            .rows()
            .iter()
            .filter(|r| r.shock_size > 0.0)
            .cloned()
            .collect();
        let panel = StackedPanel::from_rows(rows, 2, -1);
        let model = AbsorbingRegression::new(&[TreatVar::TreatShock, TreatVar::ShockAbs], &config())
            .fit(&panel)
            .unwrap();
        let first = model.column(0, TreatVar::TreatShock).unwrap();
        let dup = model.column(0, TreatVar::ShockAbs).unwrap();
        assert!(model.params()[first].is_finite());
        assert!(model.params()[dup].is_nan());
        assert!(model.cov()[(dup, dup)].is_nan());
        let profile = EventTimeProfile::extract(&model, TreatVar::ShockAbs);
        assert!(profile.row(0).unwrap().coef.is_nan());
    }

    #[test]
    fn single_cluster_is_config_error() {
        let panel = synthetic(0.8);
        let err = AbsorbingRegression::new(&[TreatVar::TreatShock], &config())
            .cluster(ClusterKey::Region)
            .fit(&panel.filter(|r| r.region == "A"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::TooFewClusters { found: 1 })));
    }

    #[test]
    fn empty_panel_is_model_error() {
        let panel = StackedPanel::from_rows(Vec::new(), 2, -1);
        let err = AbsorbingRegression::new(&[TreatVar::TreatShock], &config()).fit(&panel).unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::NoObservations)));
    }

    #[test]
    fn weighted_fit_uses_named_column() {
        let panel = synthetic(0.8);
        let reg = AbsorbingRegression::new(&[TreatVar::TreatShock], &config());
        assert!(reg.clone().weight_column(Some("event_weight".into())).fit(&panel).is_ok());
        let err = reg.weight_column(Some("nope".into())).fit(&panel).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownColumn(_))));
    }

    #[test]
    fn complete_cases_prepends_constant() {
        let panel = synthetic(0.8).at_offset(0);
        let cases = complete_cases(&panel, &[TreatVar::Treated], ClusterKey::Region, None).unwrap();
        assert_eq!(cases.y.len(), 18);
        assert_eq!(cases.x.ncols(), 2);
        assert!(cases.x.column(0).iter().all(|v| *v == 1.0));
        assert_eq!(cases.x.column(1).sum(), 3.0);
        assert_eq!(cases.labels.len(), 18);
        assert!(cases.weights.is_none());

        let weighted = complete_cases(&panel, &[TreatVar::Treated], ClusterKey::Region, Some("weight")).unwrap();
        assert_eq!(weighted.weights.map(|w| w.len()), Some(18));
        assert!(complete_cases(&panel, &[TreatVar::Treated], ClusterKey::Region, Some("nope")).is_err());
    }
}
