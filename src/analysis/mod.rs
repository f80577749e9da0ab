//! End-to-end event-study pipeline.
//!
//! [`EventStudy`] owns one validated [`EventStudyConfig`] and threads it
//! through detection, stacking, estimation and inference. Inputs that are
//! empty upstream produce empty results instead of errors. Robustness
//! checks, subgroup profiles and mechanism regressions live in submodules.

mod robustness;
mod subgroups;

use tracing::{info, warn};

use crate::config::EventStudyConfig;
use crate::error::{ConfigError, Result};
use crate::hypothesis::{AsymmetrySummary, AsymmetryTests, InteractionTable, PowerAnalysis};
use crate::identification::{Detection, Event, EventDetector};
use crate::panel::Panel;
use crate::regression::{AbsorbingRegression, EventTimeProfile, FittedModel};
use crate::resample::{bootstrap_event_time, EventTimeBootstrap};
use crate::stack::{StackedPanel, StackedPanelBuilder, TreatVar};

pub use robustness::{PlaceboConfig, PlaceboResult, PLACEBO_ABSORB};
pub use subgroups::{GroupProfile, HeterogeneityAnalysis, MechanismAnalysis, MechanismRow, MIN_GROUP_ROWS};

/// Hike-minus-cut pass-through difference the power analysis is run
/// against.
pub const ASYMMETRY_EFFECT_SIZE: f64 = 0.15;

/// Baseline pooled specification.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub detection: Detection,
    pub stacked: StackedPanel,
    /// `None` when stacking produced no rows.
    pub model: Option<FittedModel>,
    pub profile: EventTimeProfile,
}

/// Separate hike and cut pass-through with the asymmetry tests.
#[derive(Debug, Clone)]
pub struct AsymmetryAnalysis {
    pub model: Option<FittedModel>,
    pub hike: EventTimeProfile,
    pub cut: EventTimeProfile,
    pub summary: Option<AsymmetrySummary>,
    /// Power of the average-difference test.
    pub power: Option<PowerAnalysis>,
}

/// Interaction specification (`ShockAbs`, `ShockXHike`).
#[derive(Debug, Clone)]
pub struct InteractionAnalysis {
    pub model: Option<FittedModel>,
    pub table: InteractionTable,
}

/// Configured pipeline.
#[derive(Debug, Clone)]
pub struct EventStudy {
    config: EventStudyConfig,
}

impl EventStudy {
    /// Validates `config`.
    ///
    /// # Errors
    /// The first option outside its domain.
    pub fn new(config: EventStudyConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EventStudyConfig {
        &self.config
    }

    /// Wedge annotation and event detection.
    pub fn detect(&self, panel: &Panel) -> Detection {
        EventDetector::new(self.config.identification.clone()).detect(panel)
    }

    /// Stacks the event windows, keeping only clean events when configured.
    pub fn stack(&self, panel: &Panel, events: &[Event]) -> StackedPanel {
        let builder = StackedPanelBuilder::from_config(&self.config);
        if self.config.analysis.clean_only {
            let clean: Vec<Event> = events.iter().filter(|e| e.is_clean).cloned().collect();
            builder.build(panel, &clean)
        } else {
            builder.build(panel, events)
        }
    }

    /// Absorbing regression on `treat_vars`.
    ///
    /// # Errors
    /// See [`AbsorbingRegression::fit`].
    pub fn fit(&self, stacked: &StackedPanel, treat_vars: &[TreatVar]) -> Result<FittedModel> {
        AbsorbingRegression::new(treat_vars, &self.config).fit(stacked)
    }

    fn fit_nonempty(&self, stacked: &StackedPanel, treat_vars: &[TreatVar]) -> Result<Option<FittedModel>> {
        if stacked.is_empty() {
            warn!("stacked panel is empty, nothing to estimate");
            return Ok(None);
        }
        self.fit(stacked, treat_vars).map(Some)
    }

    /// Detect, stack and fit the pooled `TreatShock` profile.
    ///
    /// # Errors
    /// Fatal estimation errors; an empty stack is not one.
    pub fn baseline(&self, panel: &Panel) -> Result<Baseline> {
        let detection = self.detect(panel);
        let stacked = self.stack(panel, &detection.events);
        let model = self.fit_nonempty(&stacked, &[TreatVar::TreatShock])?;
        let profile = match &model {
            Some(m) => EventTimeProfile::extract(m, TreatVar::TreatShock),
            None => EventTimeProfile::empty(TreatVar::TreatShock, stacked.base_period()),
        };
        let summary = detection.summary();
        info!(
            events = summary.total,
            clean = summary.clean,
            stacked_rows = stacked.len(),
            "baseline specification done"
        );
        Ok(Baseline {
            detection,
            stacked,
            model,
            profile,
        })
    }

    /// Fits `PosShock` and `NegShock` jointly and runs the asymmetry tests.
    ///
    /// # Errors
    /// Fatal estimation errors.
    pub fn asymmetry(&self, stacked: &StackedPanel) -> Result<AsymmetryAnalysis> {
        let model = self.fit_nonempty(stacked, &[TreatVar::PosShock, TreatVar::NegShock])?;
        let Some(m) = &model else {
            return Ok(AsymmetryAnalysis {
                model: None,
                hike: EventTimeProfile::empty(TreatVar::PosShock, stacked.base_period()),
                cut: EventTimeProfile::empty(TreatVar::NegShock, stacked.base_period()),
                summary: None,
                power: None,
            });
        };

        let summary = AsymmetryTests::new(m).run_all();
        let power = summary
            .average
            .as_ref()
            .ok()
            .filter(|t| t.std_error > 0.0)
            .map(|t| PowerAnalysis::new(ASYMMETRY_EFFECT_SIZE, t.std_error, 0.05));
        info!(min_p = summary.min_p_value, verdict = %summary.verdict, "asymmetry tests done");
        Ok(AsymmetryAnalysis {
            hike: EventTimeProfile::extract(m, TreatVar::PosShock),
            cut: EventTimeProfile::extract(m, TreatVar::NegShock),
            summary: Some(summary),
            power,
            model,
        })
    }

    /// Interaction specification.
    ///
    /// # Errors
    /// Fatal estimation errors.
    pub fn interaction(&self, stacked: &StackedPanel) -> Result<InteractionAnalysis> {
        let model = self.fit_nonempty(stacked, &InteractionTable::VARIABLES)?;
        let table = model.as_ref().map_or_else(InteractionTable::empty, InteractionTable::extract);
        Ok(InteractionAnalysis { model, table })
    }

    /// Per-offset wild cluster bootstrap of `treat_var`.
    ///
    /// # Errors
    /// See [`bootstrap_event_time`].
    pub fn bootstrap(&self, stacked: &StackedPanel, treat_var: TreatVar) -> Result<EventTimeBootstrap> {
        bootstrap_event_time(stacked, treat_var, &self.config)
    }
}
