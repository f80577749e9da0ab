//! Event-centred stacked panel.
//!
//! Each event contributes one window of rows covering every region of its
//! category over months `event - H ..= event + H`. The outcome is the log
//! price relative to the base offset, scaled by 100. Rows carry the keys the
//! regression absorbs and clusters on, so nothing downstream needs the raw
//! panel again.

mod groups;
mod treatment;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AbsorbKey, ClusterKey, EventStudyConfig, Normalization};
use crate::error::{ConfigError, DataError};
use crate::identification::{Event, EventType};
use crate::panel::{Month, Panel, PanelObservation};

pub use groups::{Durability, Mechanism, RegionGroup};
pub use treatment::TreatVar;

/// One (event, region, offset) row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedRow {
    /// Position of the event in the stacking input.
    pub event_id: usize,
    /// Region of this row.
    pub region: String,
    /// Category shared by the whole window.
    pub category: String,
    /// `region_category` compound key.
    pub region_category: String,
    /// Calendar month of this row.
    pub time: Month,
    /// Calendar year of this row.
    pub year: i32,
    /// Offset from the event month.
    pub rel_time: i32,
    /// `(log_price - base log_price) * 100`; missing when the row has no
    /// valid price.
    pub outcome: Option<f64>,
    /// Region where the event happened.
    pub event_region: String,
    /// Direction of the event.
    pub event_type: EventType,
    /// `100 * delta_tw` of the event.
    pub shock_size: f64,
    /// Row belongs to the event region.
    pub treated: bool,
    /// `shock_size * treated`.
    pub treat_shock: f64,
    /// Row's item weight at the base offset, or the window mean.
    pub event_weight: Option<f64>,
    /// Row's own item weight.
    pub weight: Option<f64>,
}

/// Builds [`StackedPanel`]s.
#[derive(Debug, Clone)]
pub struct StackedPanelBuilder {
    half_window: i32,
    base_period: i32,
    normalization: Normalization,
}

impl StackedPanelBuilder {
    /// Builder for offsets `-half_window..=half_window` normalized at
    /// `base_period`.
    pub fn new(half_window: i32, base_period: i32) -> Self {
        Self {
            half_window,
            base_period,
            normalization: Normalization::EventRegion,
        }
    }

    /// Builder with the window, base offset and normalization of `config`.
    pub fn from_config(config: &EventStudyConfig) -> Self {
        Self::new(config.analysis.event_window, config.identification.base_period)
            .normalization(config.analysis.normalization)
    }

    /// Selects the normalization reference.
    #[must_use]
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Stacks one window per event. Events whose window cannot be built are
    /// logged and contribute no rows; the pass itself never fails.
    pub fn build(&self, panel: &Panel, events: &[Event]) -> StackedPanel {
        let mut by_category: HashMap<&str, Vec<&PanelObservation>> = HashMap::new();
        for obs in panel.observations() {
            by_category.entry(obs.category.as_str()).or_default().push(obs);
        }

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (event_id, event) in events.iter().enumerate() {
            let category_rows = by_category.get(event.category.as_str()).map(Vec::as_slice).unwrap_or_default();
            match self.stack_event(event_id, event, category_rows) {
                Ok(window) => rows.extend(window),
                Err(err) => {
                    skipped += 1;
                    debug!(event_id, error = %err, "event skipped");
                }
            }
        }

        info!(
            events = events.len(),
            skipped,
            rows = rows.len(),
            half_window = self.half_window,
            "stacked panel built"
        );

        StackedPanel {
            rows,
            half_window: self.half_window,
            base_period: self.base_period,
        }
    }

    fn stack_event(
        &self,
        event_id: usize,
        event: &Event,
        category_rows: &[&PanelObservation],
    ) -> Result<Vec<StackedRow>, DataError> {
        if !category_rows.iter().any(|o| o.region == event.region) {
            return Err(DataError::SeriesNotFound {
                event_id,
                region: event.region.clone(),
                category: event.category.clone(),
            });
        }

        let base_month = event.time + self.base_period;
        let base_rows: HashMap<&str, &PanelObservation> = category_rows
            .iter()
            .filter(|o| o.time == base_month)
            .map(|o| (o.region.as_str(), *o))
            .collect();

        let event_base = base_rows
            .get(event.region.as_str())
            .and_then(|o| o.log_price())
            .ok_or(DataError::MissingBasePeriod {
                event_id,
                base_period: self.base_period,
            })?;

        let window: Vec<&PanelObservation> = category_rows
            .iter()
            .copied()
            .filter(|o| (o.time - event.time).abs() <= self.half_window)
            .filter(|o| match self.normalization {
                Normalization::EventRegion => true,
                Normalization::OwnRegion => base_rows
                    .get(o.region.as_str())
                    .and_then(|b| b.log_price())
                    .is_some(),
            })
            .collect();

        let weights: Vec<f64> = window.iter().filter_map(|o| o.valid_weight()).collect();
        let mean_weight = (!weights.is_empty()).then(|| weights.iter().sum::<f64>() / weights.len() as f64);

        let shock_size = event.magnitude * 100.0;
        let rows = window
            .into_iter()
            .map(|o| {
                let base = match self.normalization {
                    Normalization::EventRegion => Some(event_base),
                    Normalization::OwnRegion => base_rows.get(o.region.as_str()).and_then(|b| b.log_price()),
                };
                let treated = o.region == event.region;
                let event_weight = base_rows
                    .get(o.region.as_str())
                    .and_then(|b| b.valid_weight())
                    .or(mean_weight);
                StackedRow {
                    event_id,
                    region: o.region.clone(),
                    category: o.category.clone(),
                    region_category: format!("{}_{}", o.region, o.category),
                    time: o.time,
                    year: o.time.year(),
                    rel_time: o.time - event.time,
                    outcome: o.log_price().zip(base).map(|(p, b)| (p - b) * 100.0),
                    event_region: event.region.clone(),
                    event_type: event.event_type,
                    shock_size,
                    treated,
                    treat_shock: if treated { shock_size } else { 0.0 },
                    event_weight,
                    weight: o.valid_weight(),
                }
            })
            .collect();
        Ok(rows)
    }
}

/// Stacked rows plus the window geometry they were built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedPanel {
    rows: Vec<StackedRow>,
    half_window: i32,
    base_period: i32,
}

impl StackedPanel {
    /// Wraps pre-built rows.
    pub fn from_rows(rows: Vec<StackedRow>, half_window: i32, base_period: i32) -> Self {
        Self {
            rows,
            half_window,
            base_period,
        }
    }

    /// All rows.
    pub fn rows(&self) -> &[StackedRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no event produced rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Half-window `H`.
    pub fn half_window(&self) -> i32 {
        self.half_window
    }

    /// Base offset.
    pub fn base_period(&self) -> i32 {
        self.base_period
    }

    /// Offsets `-H..=H`.
    pub fn offsets(&self) -> std::ops::RangeInclusive<i32> {
        -self.half_window..=self.half_window
    }

    /// Distinct events with at least one row.
    pub fn n_events(&self) -> usize {
        self.rows.iter().map(|r| r.event_id).collect::<BTreeSet<_>>().len()
    }

    /// Rows satisfying `keep`, with the same geometry.
    #[must_use]
    pub fn filter<F>(&self, keep: F) -> Self
    where
        F: Fn(&StackedRow) -> bool,
    {
        Self {
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
            half_window: self.half_window,
            base_period: self.base_period,
        }
    }

    /// Rows at a single offset.
    #[must_use]
    pub fn at_offset(&self, rel_time: i32) -> Self {
        self.filter(|r| r.rel_time == rel_time)
    }

    /// Drops rows whose calendar year is in `years`.
    #[must_use]
    pub fn exclude_years(&self, years: &[i32]) -> Self {
        self.filter(|r| !years.contains(&r.year))
    }

    /// Values of a treatment variable, one per row.
    pub fn treatment(&self, var: TreatVar) -> Vec<f64> {
        self.rows.iter().map(|r| var.value(r)).collect()
    }

    /// Outcomes, one per row.
    pub fn outcomes(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.outcome).collect()
    }

    /// Observation weights from a named column: `event_weight` or `weight`.
    pub fn weights(&self, column: &str) -> Result<Vec<Option<f64>>, ConfigError> {
        match column {
            "event_weight" => Ok(self.rows.iter().map(|r| r.event_weight).collect()),
            "weight" => Ok(self.rows.iter().map(|r| r.weight).collect()),
            other => Err(ConfigError::UnknownColumn(other.to_string())),
        }
    }

    /// Cluster label per row.
    pub fn cluster_labels(&self, key: ClusterKey) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| match key {
                ClusterKey::Region => r.region.clone(),
                ClusterKey::RegionYear => format!("{}_{}", r.region, r.year),
                ClusterKey::RegionCategory => r.region_category.clone(),
            })
            .collect()
    }

    /// Dense 0-based codes of an absorbed key, ordered by key value.
    pub fn absorb_codes(&self, key: AbsorbKey) -> Vec<usize> {
        match key {
            AbsorbKey::RegionCategory => factorize(self.rows.iter().map(|r| r.region_category.as_str())),
            AbsorbKey::CalendarMonth => factorize(self.rows.iter().map(|r| r.time)),
            AbsorbKey::RelTime => factorize(self.rows.iter().map(|r| r.rel_time)),
            AbsorbKey::Event => factorize(self.rows.iter().map(|r| r.event_id)),
        }
    }
}

/// Maps labels to dense codes `0..levels` in sorted label order.
pub fn factorize<T, I>(labels: I) -> Vec<usize>
where
    T: Ord,
    I: IntoIterator<Item = T>,
{
    let labels: Vec<T> = labels.into_iter().collect();
    let mut levels: BTreeMap<&T, usize> = labels.iter().map(|l| (l, 0)).collect();
    for (code, slot) in levels.values_mut().enumerate() {
        *slot = code;
    }
    labels.iter().filter_map(|l| levels.get(l).copied()).collect()
}
