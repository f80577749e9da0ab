use rand::SeedableRng;
use rand::seq::{IteratorRandom, SliceRandom};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::EventStudy;
use crate::config::{AbsorbKey, ClusterKey};
use crate::error::Result;
use crate::identification::Event;
use crate::panel::Panel;
use crate::regression::{AbsorbingRegression, EventTimeProfile};
use crate::stack::{StackedPanel, TreatVar};
use crate::statistics::{Mean, Statistic};

/// Effects absorbed by every placebo fit, in place of the configured keys.
pub const PLACEBO_ABSORB: [AbsorbKey; 3] = [AbsorbKey::RelTime, AbsorbKey::CalendarMonth, AbsorbKey::Event];

/// Placebo simulation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceboConfig {
    /// Simulations to run.
    pub n_sim: usize,
    /// Generator seed.
    pub seed: u64,
    /// Subsample this many events before simulating.
    pub sample_events: Option<usize>,
}

impl Default for PlaceboConfig {
    fn default() -> Self {
        Self {
            n_sim: 1000,
            seed: 1,
            sample_events: Some(200),
        }
    }
}

/// Offset-0 estimates over the placebo draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceboResult {
    /// Seed the draws came from.
    pub seed: u64,
    /// Simulations that produced an offset-0 estimate.
    pub n_sim: usize,
    /// Offset-0 p-value per simulation.
    pub p_values: Vec<f64>,
    /// Offset-0 coefficient per simulation.
    pub coefs: Vec<f64>,
}

impl PlaceboResult {
    /// Share of finite p-values below 0.05; `NaN` without any.
    pub fn rejection_rate(&self) -> f64 {
        let finite: Vec<f64> = self.p_values.iter().copied().filter(|p| p.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        finite.iter().filter(|&&p| p < 0.05).count() as f64 / finite.len() as f64
    }

    /// Mean of the finite coefficients.
    pub fn mean_coef(&self) -> f64 {
        let finite: Vec<f64> = self.coefs.iter().copied().filter(|c| c.is_finite()).collect();
        Mean.compute(&finite)
    }
}

/// Moves every event to a month drawn from those observed for its category.
fn randomize_event_times(events: &[Event], panel: &Panel, rng: &mut Xoshiro256PlusPlus) -> Vec<Event> {
    events
        .iter()
        .map(|e| {
            let months = panel.months_in_category(&e.category);
            Event {
                time: months.choose(rng).copied().unwrap_or(e.time),
                ..e.clone()
            }
        })
        .collect()
}

impl EventStudy {
    /// Placebo test: re-stacks and re-fits the pooled model with randomly
    /// re-timed events and collects the offset-0 coefficient and p-value.
    /// Simulations whose fit fails are skipped.
    ///
    /// Each fit absorbs [`PLACEBO_ABSORB`] (offset, calendar month and event)
    /// whatever the configured keys are.
    pub fn placebo(&self, panel: &Panel, events: &[Event], config: &PlaceboConfig) -> PlaceboResult {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let events: Vec<Event> = match config.sample_events {
            Some(k) if events.len() > k => events.iter().cloned().choose_multiple(&mut rng, k),
            _ => events.to_vec(),
        };

        let mut p_values = Vec::with_capacity(config.n_sim);
        let mut coefs = Vec::with_capacity(config.n_sim);
        if !events.is_empty() {
            for sim in 0..config.n_sim {
                let placebo = randomize_event_times(&events, panel, &mut rng);
                let stacked = self.stack(panel, &placebo);
                if stacked.is_empty() {
                    continue;
                }
                let fit = AbsorbingRegression::new(&[TreatVar::TreatShock], self.config())
                    .absorb(PLACEBO_ABSORB.to_vec())
                    .fit(&stacked);
                match fit {
                    Ok(model) => {
                        let profile = EventTimeProfile::extract(&model, TreatVar::TreatShock);
                        if let Some(r) = profile.row(0) {
                            p_values.push(r.p_value);
                            coefs.push(r.coef);
                        }
                    }
                    Err(e) => debug!(sim, error = %e, "placebo fit failed"),
                }
            }
        }

        let result = PlaceboResult {
            seed: config.seed,
            n_sim: p_values.len(),
            p_values,
            coefs,
        };
        info!(n_sim = result.n_sim, rejection_rate = result.rejection_rate(), "placebo done");
        result
    }

    /// Pooled profile with another cluster key.
    ///
    /// # Errors
    /// See [`AbsorbingRegression::fit`].
    pub fn alternative_clustering(&self, stacked: &StackedPanel, cluster: ClusterKey) -> Result<EventTimeProfile> {
        let model = AbsorbingRegression::new(&[TreatVar::TreatShock], self.config())
            .cluster(cluster)
            .fit(stacked)?;
        Ok(EventTimeProfile::extract(&model, TreatVar::TreatShock))
    }

    /// Pooled profile without the rows of `years`.
    ///
    /// # Errors
    /// See [`AbsorbingRegression::fit`].
    pub fn excluding_years(&self, stacked: &StackedPanel, years: &[i32]) -> Result<EventTimeProfile> {
        let kept = stacked.exclude_years(years);
        debug!(dropped = stacked.len() - kept.len(), ?years, "calendar years excluded");
        if kept.is_empty() {
            return Ok(EventTimeProfile::empty(TreatVar::TreatShock, stacked.base_period()));
        }
        let model = self.fit(&kept, &[TreatVar::TreatShock])?;
        Ok(EventTimeProfile::extract(&model, TreatVar::TreatShock))
    }

    /// Pooled profile re-stacked with half-window `half_window`.
    ///
    /// # Errors
    /// [`crate::error::ConfigError`] when the window does not hold the base
    /// offset, otherwise see [`AbsorbingRegression::fit`].
    pub fn alternative_window(&self, panel: &Panel, events: &[Event], half_window: i32) -> Result<EventTimeProfile> {
        let mut config = self.config().clone();
        config.analysis.event_window = half_window;
        let study = EventStudy::new(config)?;
        let stacked = study.stack(panel, events);
        if stacked.is_empty() {
            return Ok(EventTimeProfile::empty(TreatVar::TreatShock, stacked.base_period()));
        }
        let model = study.fit(&stacked, &[TreatVar::TreatShock])?;
        Ok(EventTimeProfile::extract(&model, TreatVar::TreatShock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::panel;
    use crate::config::{EventStudyConfig, Normalization};

    fn study() -> EventStudy {
        let mut cfg = EventStudyConfig::default();
        cfg.analysis.event_window = 3;
        cfg.analysis.normalization = Normalization::OwnRegion;
        cfg.identification.clean_window_months = 6;
        EventStudy::new(cfg).unwrap()
    }

    #[test]
    fn placebo_is_seeded() {
        let s = study();
        let p = panel();
        let events = s.detect(&p).events;
        let cfg = PlaceboConfig {
            n_sim: 8,
            seed: 3,
            sample_events: None,
        };
        let a = s.placebo(&p, &events, &cfg);
        let b = s.placebo(&p, &events, &cfg);
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.coefs), bits(&b.coefs));
        assert_eq!(bits(&a.p_values), bits(&b.p_values));
        assert!(a.n_sim > 0 && a.n_sim <= 8);
        assert_eq!(a.p_values.len(), a.coefs.len());
        let rate = a.rejection_rate();
        assert!((0.0..=1.0).contains(&rate));
    }

    #[test]
    fn placebo_absorbs_offset_month_and_event() {
        let s = study();
        let p = panel();
        let events = s.detect(&p).events;
        let cfg = PlaceboConfig {
            n_sim: 1,
            seed: 21,
            sample_events: None,
        };
        let result = s.placebo(&p, &events, &cfg);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(21);
        let stacked = s.stack(&p, &randomize_event_times(&events, &p, &mut rng));
        let model = AbsorbingRegression::new(&[TreatVar::TreatShock], s.config())
            .absorb(PLACEBO_ABSORB.to_vec())
            .fit(&stacked)
            .unwrap();
        let expected = EventTimeProfile::extract(&model, TreatVar::TreatShock);
        assert_eq!(result.coefs.len(), 1);
        assert_eq!(result.coefs[0].to_bits(), expected.row(0).unwrap().coef.to_bits());
    }

    #[test]
    fn placebo_without_events_is_empty() {
        let r = study().placebo(&panel(), &[], &PlaceboConfig::default());
        assert_eq!(r.n_sim, 0);
        assert!(r.rejection_rate().is_nan());
        assert!(r.mean_coef().is_nan());
    }

    #[test]
    fn randomized_months_come_from_category() {
        let p = panel();
        let events = study().detect(&p).events;
        let months = p.months_in_category("food");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        for e in randomize_event_times(&events, &p, &mut rng) {
            assert!(months.contains(&e.time));
        }
    }

    #[test]
    fn robustness_variants_keep_dense_profiles() {
        let s = study();
        let p = panel();
        let events = s.detect(&p).events;
        let stacked = s.stack(&p, &events);

        let by_region_year = s.alternative_clustering(&stacked, ClusterKey::RegionYear).unwrap();
        assert_eq!(by_region_year.len(), 7);

        // the panel covers 2018-2020; dropping 2018 removes the first event
        let without_2018 = s.excluding_years(&stacked, &[2018]).unwrap();
        assert_eq!(without_2018.len(), 7);
        assert!(s.excluding_years(&stacked, &[2018, 2019, 2020]).unwrap().is_empty());

        let wide = s.alternative_window(&p, &events, 2).unwrap();
        assert_eq!(wide.len(), 5);
        assert!(s.alternative_window(&p, &events, 0).is_err());
    }
}
