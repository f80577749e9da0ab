use serde::Serialize;
use tracing::{debug, info};

use super::{BootstrapResult, WildClusterBootstrap};
use crate::config::EventStudyConfig;
use crate::error::Result;
use crate::regression::{complete_cases, Clusters};
use crate::stack::{StackedPanel, TreatVar};

/// Bootstrap inference for one relative-time offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapRow {
    pub rel_time: i32,
    pub coef: f64,
    pub se: f64,
    pub t_stat: f64,
    /// Wild cluster bootstrap p-value.
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_clusters: usize,
    pub n_dropped: usize,
    /// More replications dropped than the configured maximum allows.
    pub drop_rate_exceeded: bool,
    /// Why the offset could not be bootstrapped.
    pub error: Option<String>,
}

impl BootstrapRow {
    fn pinned(rel_time: i32) -> Self {
        Self {
            rel_time,
            coef: 0.0,
            se: 0.0,
            t_stat: 0.0,
            p_value: 1.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
            n_clusters: 0,
            n_dropped: 0,
            drop_rate_exceeded: false,
            error: None,
        }
    }

    fn failed(rel_time: i32, error: String) -> Self {
        Self {
            rel_time,
            coef: f64::NAN,
            se: f64::NAN,
            t_stat: f64::NAN,
            p_value: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
            n_clusters: 0,
            n_dropped: 0,
            drop_rate_exceeded: false,
            error: Some(error),
        }
    }

    fn from_result(rel_time: i32, r: &BootstrapResult) -> Self {
        Self {
            rel_time,
            coef: r.estimate,
            se: r.se,
            t_stat: r.t_stat,
            p_value: r.p_value,
            ci_lower: r.ci.lower,
            ci_upper: r.ci.upper,
            n_clusters: r.n_clusters,
            n_dropped: r.n_dropped,
            drop_rate_exceeded: r.drop_rate_exceeded,
            error: None,
        }
    }
}

/// Per-offset bootstrap table, one row per offset in `-H..=H`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTimeBootstrap {
    pub treat_var: TreatVar,
    pub base_period: i32,
    pub rows: Vec<BootstrapRow>,
}

impl EventTimeBootstrap {
    pub fn row(&self, rel_time: i32) -> Option<&BootstrapRow> {
        self.rows.iter().find(|r| r.rel_time == rel_time)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Wild cluster bootstrap of the `treat_var` slope at every offset.
///
/// Each offset regresses the outcome on a constant and `treat_var` over the
/// stacked rows at that offset, clustered and weighted as configured. An
/// empty panel gives an empty table; offsets that fail keep their row with
/// the error message.
///
/// # Errors
/// Only an invalid bootstrap configuration is fatal.
pub fn bootstrap_event_time(
    panel: &StackedPanel,
    treat_var: TreatVar,
    config: &EventStudyConfig,
) -> Result<EventTimeBootstrap> {
    config.bootstrap.validate()?;
    let base_period = panel.base_period();
    if panel.is_empty() {
        return Ok(EventTimeBootstrap {
            treat_var,
            base_period,
            rows: Vec::new(),
        });
    }

    let rows: Vec<BootstrapRow> = panel
        .offsets()
        .map(|t| {
            if t == base_period {
                return BootstrapRow::pinned(t);
            }
            match bootstrap_offset(panel, t, treat_var, config) {
                Ok(row) => row,
                Err(e) => {
                    debug!(rel_time = t, error = %e, "offset not bootstrapped");
                    BootstrapRow::failed(t, e.to_string())
                }
            }
        })
        .collect();

    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    info!(%treat_var, offsets = rows.len(), failed, "event-time bootstrap finished");
    Ok(EventTimeBootstrap {
        treat_var,
        base_period,
        rows,
    })
}

fn bootstrap_offset(
    panel: &StackedPanel,
    rel_time: i32,
    treat_var: TreatVar,
    config: &EventStudyConfig,
) -> Result<BootstrapRow> {
    let slice = panel.at_offset(rel_time);
    let cases = complete_cases(
        &slice,
        &[treat_var],
        config.analysis.cluster,
        config.analysis.weight_column.as_deref(),
    )?;
    let clusters = Clusters::from_labels(cases.labels.iter().map(String::as_str));
    let mut boot = WildClusterBootstrap::new(config.bootstrap.clone());
    if let Some(w) = cases.weights {
        boot = boot.with_weights(w);
    }
    let result = boot.fit(&cases.y, &cases.x, &clusters, 1)?;
    Ok(BootstrapRow::from_result(rel_time, result))
}
