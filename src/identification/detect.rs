use tracing::info;

use super::{AnnotatedObservation, Detection, Event, EventType};
use crate::config::IdentificationConfig;
use crate::panel::Panel;

/// Derives the tax wedge per series and flags threshold-crossing changes.
#[derive(Debug, Clone, Default)]
pub struct EventDetector {
    config: IdentificationConfig,
}

impl EventDetector {
    /// Detector with explicit options.
    pub fn new(config: IdentificationConfig) -> Self {
        Self { config }
    }

    /// Options in use.
    pub fn config(&self) -> &IdentificationConfig {
        &self.config
    }

    /// Annotates every panel row with the wedge and its first difference and
    /// returns the events table with the clean flag set.
    ///
    /// The first reading of a series, and any reading whose own or previous
    /// wedge is missing, has no `delta_tw` and can never be an event.
    pub fn detect(&self, panel: &Panel) -> Detection {
        let threshold = self.config.event_threshold;
        let mut annotated = Vec::with_capacity(panel.len());
        let mut events = Vec::new();

        for series in panel.series() {
            let mut prev_wedge: Option<f64> = None;
            for obs in series {
                let log_price = obs.log_price();
                let tax_wedge = log_price.zip(obs.log_tax_constant()).map(|(p, c)| p - c);
                let delta_tw = tax_wedge.zip(prev_wedge).map(|(w, prev)| w - prev);
                prev_wedge = tax_wedge;

                if let Some(delta) = delta_tw {
                    if let Some(event_type) = EventType::classify(delta, threshold) {
                        events.push(Event {
                            region: obs.region.clone(),
                            category: obs.category.clone(),
                            time: obs.time,
                            event_type,
                            magnitude: delta,
                            is_clean: true,
                        });
                    }
                }

                annotated.push(AnnotatedObservation {
                    observation: obs.clone(),
                    log_price,
                    tax_wedge,
                    delta_tw,
                });
            }
        }

        apply_clean_window(&mut events, self.config.clean_window_months);

        let detection = Detection { annotated, events };
        let summary = detection.summary();
        info!(
            total = summary.total,
            clean = summary.clean,
            hikes = summary.hikes,
            cuts = summary.cuts,
            window = self.config.clean_window_months,
            "events detected"
        );
        detection
    }
}

/// Sets `is_clean` on every event: sorted by time within its series, an event
/// is clean iff the gaps to its immediate predecessor and successor both
/// exceed `window_months`. A missing neighbour is clean on that side.
///
/// Events are reordered by (region, category, time).
pub fn apply_clean_window(events: &mut [Event], window_months: i32) {
    events.sort_by(|a, b| (&a.region, &a.category, a.time).cmp(&(&b.region, &b.category, b.time)));

    for series in events.chunk_by_mut(|a, b| a.region == b.region && a.category == b.category) {
        let times: Vec<_> = series.iter().map(|e| e.time).collect();
        for (i, event) in series.iter_mut().enumerate() {
            let prev = i.checked_sub(1).and_then(|j| times.get(j));
            let clean_prev = prev.is_none_or(|&prev| event.time - prev > window_months);
            let clean_next = times.get(i + 1).is_none_or(|&next| next - event.time > window_months);
            event.is_clean = clean_prev && clean_next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::tests::obs;
    use crate::panel::{Month, PanelObservation};

    fn month(y: i32, m: u32) -> Month {
        Month::new(y, m).unwrap()
    }

    fn event_at(region: &str, time: Month) -> Event {
        Event {
            region: region.to_string(),
            category: "food".to_string(),
            time,
            event_type: EventType::Hike,
            magnitude: 0.02,
            is_clean: false,
        }
    }

    /// One series with a constant tax-constant index and a headline index
    /// whose log jumps by `jumps[i]` at month `i`.
    fn series_with_jumps(region: &str, start: Month, jumps: &[f64]) -> Vec<PanelObservation> {
        let mut log_p = 0.0;
        jumps
            .iter()
            .enumerate()
            .map(|(i, j)| {
                log_p += j;
                obs(region, "food", start + i as i32, 100.0 * f64::exp(log_p), 100.0)
            })
            .collect()
    }

    #[test]
    fn nearest_neighbour_clean_window() {
        let mut events = vec![
            event_at("AT", month(2020, 10)),
            event_at("AT", month(2020, 1)),
            event_at("AT", month(2020, 3)),
        ];
        apply_clean_window(&mut events, 6);
        let flags: Vec<_> = events.iter().map(|e| (e.time, e.is_clean)).collect();
        assert_eq!(
            flags,
            vec![(month(2020, 1), false), (month(2020, 3), false), (month(2020, 10), true)]
        );
    }

    #[test]
    fn second_nearest_never_disqualifies() {
        let t0 = month(2018, 1);
        let mut events = vec![event_at("AT", t0), event_at("AT", t0 + 13), event_at("AT", t0 + 20)];
        apply_clean_window(&mut events, 12);
        assert!(events[0].is_clean);
        assert!(!events[1].is_clean);
        assert!(!events[2].is_clean);
    }

    #[test]
    fn gap_equal_to_window_is_not_clean() {
        let t0 = month(2018, 1);
        let mut events = vec![event_at("AT", t0), event_at("AT", t0 + 12), event_at("DE", t0 + 1)];
        apply_clean_window(&mut events, 12);
        assert!(!events[0].is_clean);
        assert!(!events[1].is_clean);
        // other series does not interact
        assert!(events[2].is_clean);
    }

    #[test]
    fn detects_hikes_and_cuts_above_threshold() {
        let start = month(2020, 1);
        let jumps = [0.0, 0.0, 0.02, 0.0, 0.005, -0.03, 0.0, 0.0];
        let panel = Panel::new(series_with_jumps("AT", start, &jumps)).unwrap();
        let detection = EventDetector::default().detect(&panel);

        assert_eq!(detection.annotated.len(), jumps.len());
        assert_eq!(detection.annotated[0].delta_tw, None);
        assert_eq!(detection.events.len(), 2);

        let hike = &detection.events[0];
        assert_eq!(hike.time, start + 2);
        assert_eq!(hike.event_type, EventType::Hike);
        approx::assert_abs_diff_eq!(hike.magnitude, 0.02, epsilon = 1e-12);

        let cut = &detection.events[1];
        assert_eq!(cut.time, start + 5);
        assert_eq!(cut.event_type, EventType::Cut);
        // three months apart under the default 12-month window
        assert!(!hike.is_clean && !cut.is_clean);

        let summary = detection.summary();
        assert_eq!((summary.total, summary.hikes, summary.cuts, summary.clean), (2, 1, 1, 0));
    }

    #[test]
    fn every_event_crosses_threshold_with_matching_sign() {
        let start = month(2015, 1);
        let jumps: Vec<f64> = (0..60).map(|i| ((i * 37 % 11) as f64 - 5.0) * 0.004).collect();
        let panel = Panel::new(series_with_jumps("AT", start, &jumps)).unwrap();
        let cfg = IdentificationConfig::default();
        let detection = EventDetector::new(cfg.clone()).detect(&panel);

        assert!(!detection.events.is_empty());
        for e in &detection.events {
            assert!(e.magnitude.abs() > cfg.event_threshold);
            assert_eq!(e.event_type == EventType::Hike, e.magnitude > cfg.event_threshold);
            assert_eq!(e.event_type == EventType::Cut, e.magnitude < -cfg.event_threshold);
        }
    }

    #[test]
    fn missing_index_breaks_the_difference() {
        let start = month(2020, 1);
        let mut rows = series_with_jumps("AT", start, &[0.0, 0.05, 0.0]);
        rows[1].tax_constant_index = Some(0.0);
        let detection = EventDetector::default().detect(&Panel::new(rows).unwrap());
        assert_eq!(detection.annotated[1].tax_wedge, None);
        assert_eq!(detection.annotated[1].delta_tw, None);
        assert_eq!(detection.annotated[2].delta_tw, None);
        assert!(detection.events.is_empty());
    }
}
