//! Explicit run configuration.
//!
//! Every component takes its options from these structs; nothing is read from
//! ambient state. All structs deserialize with `#[serde(default)]`, so a
//! partial document only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::resample::WeightDist;

/// Event detection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    /// Minimum absolute month-over-month wedge change that counts as an event.
    pub event_threshold: f64,
    /// Exclusion window (months) for the clean-event flag.
    pub clean_window_months: i32,
    /// Offset used as the normalization reference (and pinned coefficient).
    pub base_period: i32,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            event_threshold: 0.01,
            clean_window_months: 12,
            base_period: -1,
        }
    }
}

/// Cluster label used for robust covariance and the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKey {
    /// Country / region (the main specification).
    #[default]
    Region,
    /// Region × calendar year.
    RegionYear,
    /// Region × category.
    RegionCategory,
}

/// Categorical key absorbed as a fixed effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsorbKey {
    /// Region × category compound key.
    RegionCategory,
    /// Calendar month.
    CalendarMonth,
    /// Offset relative to the event.
    RelTime,
    /// Event identifier.
    Event,
}

/// Which base value normalizes each row of an event window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Every region uses the event region's base-period level.
    #[default]
    EventRegion,
    /// Every region uses its own base-period level; regions without one are
    /// left out of the window.
    OwnRegion,
}

/// Finite-sample scaling applied to the cluster-robust sandwich.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceCorrection {
    /// No scaling.
    None,
    /// `G / (G - 1)`.
    #[default]
    ClusterOnly,
    /// `G / (G - 1) * (N - 1) / (N - K)`.
    Stata,
}

/// Estimation options for the stacked regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Half-window `H`: offsets run over `-H..=H`.
    pub event_window: i32,
    /// Optional observation weight column of the stacked panel.
    pub weight_column: Option<String>,
    /// Cluster label.
    pub cluster: ClusterKey,
    /// Absorbed fixed effects.
    pub absorb: Vec<AbsorbKey>,
    /// Level for analytic confidence intervals.
    pub confidence_level: f64,
    /// Normalization reference.
    pub normalization: Normalization,
    /// Only stack events flagged clean.
    pub clean_only: bool,
    /// Add plain relative-time dummies to the design.
    pub include_time_dummies: bool,
    /// Sandwich scaling.
    pub covariance: CovarianceCorrection,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            event_window: 12,
            weight_column: None,
            cluster: ClusterKey::Region,
            absorb: vec![AbsorbKey::RegionCategory, AbsorbKey::CalendarMonth, AbsorbKey::RelTime],
            confidence_level: 0.95,
            normalization: Normalization::EventRegion,
            clean_only: true,
            include_time_dummies: false,
            covariance: CovarianceCorrection::ClusterOnly,
        }
    }
}

/// Bounds for the alternating-projections demeaning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsorptionConfig {
    /// Stop once every group mean is below this in absolute value.
    pub tolerance: f64,
    /// Hard iteration bound; exceeding it is a convergence failure.
    pub max_iter: usize,
}

impl Default for AbsorptionConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iter: 10_000,
        }
    }
}

/// How the bootstrap confidence interval is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiMethod {
    /// Bootstrap-t: invert the studentized bootstrap distribution.
    #[default]
    Studentized,
    /// Quantiles of the bootstrap coefficient distribution around the estimate.
    Percentile,
}

/// Wild cluster bootstrap options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Replications `B`.
    pub n_bootstrap: usize,
    /// Cluster weight distribution.
    pub distribution: WeightDist,
    /// Interval level.
    pub confidence_level: f64,
    /// Seed of the base generator.
    pub seed: u64,
    /// Scale restricted residuals by `sqrt(G / (G - 1))`.
    pub small_cluster_correction: bool,
    /// Interval construction.
    pub ci_method: CiMethod,
    /// Share of dropped replications above which a warning is raised.
    pub max_drop_rate: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_bootstrap: 9999,
            distribution: WeightDist::Rademacher,
            confidence_level: 0.95,
            seed: 42,
            small_cluster_correction: true,
            ci_method: CiMethod::Studentized,
            max_drop_rate: 0.05,
        }
    }
}

impl BootstrapConfig {
    /// Checks ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_bootstrap == 0 {
            return Err(ConfigError::NoReplications);
        }
        check_level(self.confidence_level)?;
        if !(0.0..=1.0).contains(&self.max_drop_rate) {
            return Err(ConfigError::InvalidOption {
                name: "max_drop_rate",
                reason: format!("must lie in [0, 1], got {}", self.max_drop_rate),
            });
        }
        Ok(())
    }
}

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStudyConfig {
    /// Event detection.
    pub identification: IdentificationConfig,
    /// Regression specification.
    pub analysis: AnalysisConfig,
    /// Demeaning bounds.
    pub absorption: AbsorptionConfig,
    /// Bootstrap inference.
    pub bootstrap: BootstrapConfig,
}

impl EventStudyConfig {
    /// Checks every option against its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = &self.identification;
        if !(id.event_threshold.is_finite() && id.event_threshold > 0.0) {
            return Err(ConfigError::InvalidOption {
                name: "event_threshold",
                reason: format!("must be positive, got {}", id.event_threshold),
            });
        }
        if id.clean_window_months < 0 {
            return Err(ConfigError::InvalidOption {
                name: "clean_window_months",
                reason: format!("must be non-negative, got {}", id.clean_window_months),
            });
        }
        let h = self.analysis.event_window;
        if h < 1 {
            return Err(ConfigError::InvalidOption {
                name: "event_window",
                reason: format!("must be at least 1, got {h}"),
            });
        }
        if id.base_period.abs() > h {
            return Err(ConfigError::BaseOutsideWindow {
                base_period: id.base_period,
                half_window: h,
            });
        }
        check_level(self.analysis.confidence_level)?;
        if !(self.absorption.tolerance > 0.0) || self.absorption.max_iter == 0 {
            return Err(ConfigError::InvalidOption {
                name: "absorption",
                reason: "tolerance and max_iter must be positive".to_string(),
            });
        }
        self.bootstrap.validate()
    }
}

fn check_level(level: f64) -> Result<(), ConfigError> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidConfidence(level))
    }
}
