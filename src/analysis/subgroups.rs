use serde::Serialize;
use tracing::{debug, info, warn};

use super::EventStudy;
use crate::error::Result;
use crate::hypothesis::{InteractionRow, InteractionTable};
use crate::regression::{EventTimeProfile, FittedModel};
use crate::stack::{Durability, Mechanism, RegionGroup, StackedPanel, StackedRow, TreatVar};

/// Subgroups with fewer stacked rows are not estimated.
pub const MIN_GROUP_ROWS: usize = 100;

/// Pooled profile of one subgroup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupProfile {
    /// Group label.
    pub group: String,
    /// Stacked rows in the group.
    pub n_rows: usize,
    /// `None` when the group was skipped or its fit failed.
    pub profile: Option<EventTimeProfile>,
    /// Why there is no profile.
    pub error: Option<String>,
}

/// Country-group and durability subgroup profiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeterogeneityAnalysis {
    pub by_region: Vec<GroupProfile>,
    pub by_durability: Vec<GroupProfile>,
}

impl HeterogeneityAnalysis {
    /// Every group that produced a profile.
    pub fn estimated(&self) -> impl Iterator<Item = &GroupProfile> {
        self.by_region.iter().chain(&self.by_durability).filter(|g| g.profile.is_some())
    }
}

/// Shock-by-category interaction at one offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MechanismRow {
    pub rel_time: i32,
    /// Pass-through where the dummy is zero.
    pub base_coef: f64,
    pub base_se: f64,
    /// Extra pass-through where the dummy is one.
    pub interaction_coef: f64,
    pub interaction_se: f64,
    pub interaction_p: f64,
}

impl From<&InteractionRow> for MechanismRow {
    fn from(r: &InteractionRow) -> Self {
        Self {
            rel_time: r.rel_time,
            base_coef: r.base_coef,
            base_se: r.base_se,
            interaction_coef: r.interaction_coef,
            interaction_se: r.interaction_se,
            interaction_p: r.interaction_p,
        }
    }
}

/// Mechanism regression for one category indicator.
#[derive(Debug, Clone)]
pub struct MechanismAnalysis {
    pub mechanism: Mechanism,
    pub model: Option<FittedModel>,
    /// One row per offset in `-H..=H`.
    pub rows: Vec<MechanismRow>,
}

impl MechanismAnalysis {
    pub fn row(&self, rel_time: i32) -> Option<&MechanismRow> {
        self.rows.iter().find(|r| r.rel_time == rel_time)
    }
}

impl EventStudy {
    /// Pooled `TreatShock` profile on the rows `keep` selects. Groups below
    /// [`MIN_GROUP_ROWS`] rows are skipped; a failed fit is recorded on the
    /// group.
    pub fn group_profile<F>(&self, stacked: &StackedPanel, group: &str, keep: F) -> GroupProfile
    where
        F: Fn(&StackedRow) -> bool,
    {
        let rows = stacked.filter(keep);
        let (profile, error) = if rows.len() < MIN_GROUP_ROWS {
            debug!(group, rows = rows.len(), "subgroup too small, skipped");
            (None, Some(format!("{} rows, need {MIN_GROUP_ROWS}", rows.len())))
        } else {
            match self.fit(&rows, &[TreatVar::TreatShock]) {
                Ok(model) => (Some(EventTimeProfile::extract(&model, TreatVar::TreatShock)), None),
                Err(e) => {
                    warn!(group, error = %e, "subgroup fit failed");
                    (None, Some(e.to_string()))
                }
            }
        };
        GroupProfile {
            group: group.to_string(),
            n_rows: rows.len(),
            profile,
            error,
        }
    }

    /// Subgroup profiles by the row's country group and by the category's
    /// durability.
    pub fn heterogeneity(&self, stacked: &StackedPanel) -> HeterogeneityAnalysis {
        let by_region: Vec<GroupProfile> = RegionGroup::ALL
            .into_iter()
            .map(|g| self.group_profile(stacked, g.name(), |r| RegionGroup::of(&r.region) == g))
            .collect();
        let by_durability: Vec<GroupProfile> = Durability::ALL
            .into_iter()
            .map(|d| self.group_profile(stacked, d.name(), |r| Durability::of(&r.category) == d))
            .collect();
        let analysis = HeterogeneityAnalysis {
            by_region,
            by_durability,
        };
        info!(estimated = analysis.estimated().count(), "heterogeneity done");
        analysis
    }

    /// Fits `TreatShock`, its interaction with the `mechanism` dummy and the
    /// dummy itself, all by offset.
    ///
    /// # Errors
    /// Fatal estimation errors; an empty stack is not one.
    pub fn mechanism(&self, stacked: &StackedPanel, mechanism: Mechanism) -> Result<MechanismAnalysis> {
        let model = self.fit_nonempty(stacked, &mechanism.variables())?;
        let rows = model.as_ref().map_or_else(Vec::new, |m| {
            InteractionTable::extract_pair(m, TreatVar::TreatShock, mechanism.shock_var())
                .rows
                .iter()
                .map(MechanismRow::from)
                .collect()
        });
        Ok(MechanismAnalysis { mechanism, model, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventStudyConfig, Normalization};
    use crate::panel::tests::obs;
    use crate::panel::{Month, Panel};
    use itertools::iproduct;

    const H: i32 = 6;

    /// Six countries, a food and a furniture category, 36 months. Food hikes
    /// in DE and IT and the furniture hike in ES pass through at 0.8, the
    /// furniture cut in FR at 0.5.
    fn panel() -> Panel {
        let regions = ["DE", "FR", "AT", "IT", "ES", "PT"];
        let events = [
            ("DE", "CP0111", 8, 1.0, 0.8),
            ("IT", "CP0111", 20, 1.0, 0.8),
            ("FR", "CP0511", 12, -1.0, 0.5),
            ("ES", "CP0511", 24, 1.0, 0.8),
        ];
        let mut rows = Vec::new();
        for ((ri, region), category) in iproduct!(regions.iter().enumerate(), ["CP0111", "CP0511"]) {
            let event = events.iter().find(|e| e.0 == *region && e.1 == category);
            for m in 0..36 {
                let time = Month::new(2018, 1).unwrap() + m;
                let (wedge, pass) = match event {
                    Some(&(_, _, at, sign, pass)) if m >= at => (sign * 0.03, pass),
                    _ => (0.0, 0.0),
                };
                let trend = 0.002 * f64::from(m) + 0.01 * ri as f64;
                let noise = ((ri * 5 + m as usize * 3) % 7) as f64 * 0.0001;
                let price = 100.0 * (trend + pass * wedge + noise).exp();
                rows.push(obs(region, category, time, price, price / wedge.exp()));
            }
        }
        Panel::new(rows).unwrap()
    }

    fn study() -> EventStudy {
        let mut cfg = EventStudyConfig::default();
        cfg.analysis.event_window = H;
        cfg.analysis.normalization = Normalization::OwnRegion;
        cfg.identification.clean_window_months = 6;
        EventStudy::new(cfg).unwrap()
    }

    fn stacked() -> StackedPanel {
        let s = study();
        let p = panel();
        s.stack(&p, &s.detect(&p).events)
    }

    #[test]
    fn groups_split_the_stack() {
        let stacked = stacked();
        let analysis = study().heterogeneity(&stacked);

        let names: Vec<&str> = analysis.by_region.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(names, ["core", "periphery", "other"]);
        let total: usize = analysis.by_region.iter().map(|g| g.n_rows).sum();
        assert_eq!(total, stacked.len());
        let total: usize = analysis.by_durability.iter().map(|g| g.n_rows).sum();
        assert_eq!(total, stacked.len());

        let other = &analysis.by_region[2];
        assert_eq!(other.n_rows, 0);
        assert!(other.profile.is_none() && other.error.is_some());
        assert_eq!(analysis.estimated().count(), 4);
        for g in analysis.estimated() {
            assert_eq!(g.profile.as_ref().unwrap().len(), 2 * H as usize + 1);
        }
    }

    #[test]
    fn food_group_recovers_its_pass_through() {
        let analysis = study().heterogeneity(&stacked());
        let food = analysis.by_durability.iter().find(|g| g.group == "non_durable").unwrap();
        let coef = food.profile.as_ref().unwrap().row(0).unwrap().coef;
        assert!((coef - 0.8).abs() < 0.1, "coef {coef}");
    }

    #[test]
    fn small_groups_are_skipped() {
        let stacked = stacked();
        let g = study().group_profile(&stacked, "de only", |r| r.region == "DE" && r.rel_time == 0);
        assert!(g.n_rows < MIN_GROUP_ROWS);
        assert!(g.profile.is_none());
    }

    #[test]
    fn core_mechanism_splits_food_and_furniture() {
        let analysis = study().mechanism(&stacked(), Mechanism::Core).unwrap();
        assert_eq!(analysis.rows.len(), 2 * H as usize + 1);
        assert_eq!(analysis.row(-1).unwrap().interaction_p, 1.0);
        let r0 = analysis.row(0).unwrap();
        // food is the non-core base
        assert!((r0.base_coef - 0.8).abs() < 0.15, "base {}", r0.base_coef);
        assert!(r0.interaction_coef.is_finite() && r0.interaction_se.is_finite());
    }

    #[test]
    fn mechanism_on_empty_stack_is_empty() {
        let empty = StackedPanel::from_rows(Vec::new(), H, -1);
        let analysis = study().mechanism(&empty, Mechanism::NonDurable).unwrap();
        assert!(analysis.model.is_none() && analysis.rows.is_empty());
    }
}
