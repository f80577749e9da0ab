//! Error taxonomy.
//!
//! Four classes, each with its own recovery rule:
//! - [`DataError`]: a problem with one slice of the input. Stacking logs it and
//!   moves on to the next event.
//! - [`ModelError`]: the regression cannot be set up at all (no rows, shape
//!   mismatch). Rank deficiency is *not* an error: it falls back to a
//!   pseudo-inverse and reports unidentified coefficients as `NaN`.
//! - [`ConfigError`]: no statistically valid answer exists for the requested
//!   configuration. Always fatal.
//! - [`ConvergenceError`]: one fit did not converge. Inside the bootstrap the
//!   replication is dropped and counted.
//!
//! [`TestError`] is separate: hypothesis tests hand it back as a value.

use thiserror::Error;

use crate::panel::Month;

/// Problems with the supplied panel or event tables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The same (region, category, time) key appears twice.
    #[error("duplicate observation for {region}/{category} at {time}")]
    DuplicateObservation {
        /// Region code.
        region: String,
        /// Category code.
        category: String,
        /// Month of the repeated reading.
        time: Month,
    },

    /// A month label could not be parsed.
    #[error("invalid month label `{0}`")]
    InvalidMonth(String),

    /// An event-type label other than `hike` or `cut`.
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),

    /// An input table had no usable rows.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// The event's series has no valid reading at the base offset.
    #[error("event {event_id}: no valid base-period observation at offset {base_period}")]
    MissingBasePeriod {
        /// Position of the event in the stacking input.
        event_id: usize,
        /// Configured base offset.
        base_period: i32,
    },

    /// The event's (region, category) pair does not occur in the panel.
    #[error("event {event_id}: series {region}/{category} not found in panel")]
    SeriesNotFound {
        /// Position of the event in the stacking input.
        event_id: usize,
        /// Region code.
        region: String,
        /// Category code.
        category: String,
    },

    /// Parallel columns disagree in length.
    #[error("length mismatch: {what} has {found} entries, expected {expected}")]
    LengthMismatch {
        /// Which column.
        what: &'static str,
        /// Observed length.
        found: usize,
        /// Required length.
        expected: usize,
    },
}

/// Regression set-up failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Nothing left to fit after dropping incomplete rows.
    #[error("no complete observations left to fit")]
    NoObservations,

    /// The design has no columns.
    #[error("design matrix has no columns")]
    EmptyDesign,

    /// The tested coefficient is aliased with other regressors.
    #[error("coefficient {index} is not identified")]
    Unidentified {
        /// Column of the tested coefficient.
        index: usize,
    },

    /// Results were requested before a successful fit.
    #[error("model has not been fitted")]
    NotFitted,

    /// Matrix/vector shapes disagree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Invalid configuration. Never recovered from.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Clustered inference needs at least two clusters.
    #[error("clustered inference requires at least 2 clusters, found {found}")]
    TooFewClusters {
        /// Distinct cluster labels present.
        found: usize,
    },

    /// Unknown bootstrap weight distribution name.
    #[error("unknown weight distribution `{0}` (expected rademacher, mammen or webb_6pt)")]
    UnknownDistribution(String),

    /// A confidence level outside (0, 1).
    #[error("confidence level must lie in (0, 1), got {0}")]
    InvalidConfidence(f64),

    /// The replication count must be positive.
    #[error("number of bootstrap replications must be positive")]
    NoReplications,

    /// The named weight column does not exist on the stacked panel.
    #[error("unknown weight column `{0}`")]
    UnknownColumn(String),

    /// The tested coefficient index is outside the regressor matrix.
    #[error("parameter index {index} out of range for {n_params} regressors")]
    ParamOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of regressors.
        n_params: usize,
    },

    /// The base offset is outside the event window.
    #[error("base period {base_period} outside event window ±{half_window}")]
    BaseOutsideWindow {
        /// Configured base offset.
        base_period: i32,
        /// Configured half-window.
        half_window: i32,
    },

    /// A numeric option is out of its domain.
    #[error("invalid option {name}: {reason}")]
    InvalidOption {
        /// Option name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Fixed-effect absorption exceeded its iteration bound.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("demeaning did not converge after {iterations} iterations (max group mean {max_mean:.3e})")]
pub struct ConvergenceError {
    /// Iterations performed.
    pub iterations: usize,
    /// Largest absolute group mean at exit.
    pub max_mean: f64,
}

/// A hypothesis test could not assemble a valid restriction. Returned in
/// place of the test result; never aborts a test suite.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    /// None of the requested offsets has both coefficients identified.
    #[error("No valid parameters found for test")]
    NoValidParameters,
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    /// See [`DataError`].
    #[error(transparent)]
    Data(#[from] DataError),

    /// See [`ModelError`].
    #[error(transparent)]
    Model(#[from] ModelError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// See [`ConvergenceError`].
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    /// I/O failure while loading a table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failure while loading a table.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
