use nalgebra::{DMatrix, DVector};

use super::design::{ColumnIndex, DesignColumn};
use crate::statistics::{critical_value, std_error, two_sided_p, Interval};
use crate::stack::TreatVar;

/// Result of one absorbing regression. Immutable once built.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub(super) params: DVector<f64>,
    pub(super) cov: DMatrix<f64>,
    pub(super) columns: Vec<DesignColumn>,
    pub(super) index: ColumnIndex,
    pub(super) clusters: Vec<usize>,
    pub(super) n_clusters: usize,
    pub(super) nobs: usize,
    pub(super) dropped_rows: usize,
    pub(super) iterations: usize,
    pub(super) confidence_level: f64,
    pub(super) half_window: i32,
    pub(super) base_period: i32,
}

impl FittedModel {
    /// Wraps estimates produced elsewhere. `params`, `cov` and `columns` must
    /// agree in size; cluster information is left empty.
    pub fn from_estimates(
        params: DVector<f64>,
        cov: DMatrix<f64>,
        columns: Vec<DesignColumn>,
        half_window: i32,
        base_period: i32,
    ) -> Self {
        debug_assert_eq!(params.len(), columns.len());
        debug_assert_eq!(cov.shape(), (params.len(), params.len()));
        let index = ColumnIndex::from_columns(&columns);
        Self {
            params,
            cov,
            columns,
            index,
            clusters: Vec::new(),
            n_clusters: 0,
            nobs: 0,
            dropped_rows: 0,
            iterations: 0,
            confidence_level: 0.95,
            half_window,
            base_period,
        }
    }

    /// Coefficients; `NaN` for unidentified columns.
    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    /// Cluster-robust covariance; `NaN` rows and columns for unidentified
    /// coefficients.
    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Column meaning, in parameter order.
    pub fn columns(&self) -> &[DesignColumn] {
        &self.columns
    }

    /// Typed `(offset, variable)` lookup.
    pub fn index(&self) -> &ColumnIndex {
        &self.index
    }

    /// Parameter index of `offset × var`.
    pub fn column(&self, offset: i32, var: TreatVar) -> Option<usize> {
        self.index.get(offset, var)
    }

    /// Cluster code per estimation row.
    pub fn clusters(&self) -> &[usize] {
        &self.clusters
    }

    /// Distinct clusters.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Rows used in the fit.
    pub fn nobs(&self) -> usize {
        self.nobs
    }

    /// Rows dropped for missing or non-finite values.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Demeaning sweeps spent on the outcome.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Level of [`FittedModel::conf_int`].
    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Half-window of the stacked panel.
    pub fn half_window(&self) -> i32 {
        self.half_window
    }

    /// Base offset of the stacked panel.
    pub fn base_period(&self) -> i32 {
        self.base_period
    }

    /// Square roots of the covariance diagonal.
    pub fn std_errors(&self) -> DVector<f64> {
        self.cov.diagonal().map(std_error)
    }

    /// `coef / se`.
    pub fn t_stats(&self) -> DVector<f64> {
        self.params.zip_map(&self.std_errors(), |b, se| b / se)
    }

    /// Normal two-sided p-values.
    pub fn p_values(&self) -> DVector<f64> {
        self.t_stats().map(two_sided_p)
    }

    /// Normal confidence intervals at the model's level.
    pub fn conf_int(&self) -> Vec<Interval<f64>> {
        let z = critical_value(self.confidence_level);
        self.params
            .iter()
            .zip(self.std_errors().iter())
            .map(|(&b, &se)| Interval::symmetric(b, z * se).confidence(self.confidence_level))
            .collect()
    }
}
