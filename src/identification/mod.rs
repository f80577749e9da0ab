//! Tax-wedge events: the detection signal and the events table.

mod detect;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::panel::{Month, PanelObservation};

pub use detect::{apply_clean_window, EventDetector};

/// Direction of a tax-wedge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Wedge increased.
    Hike,
    /// Wedge decreased.
    Cut,
}

impl EventType {
    /// Classifies a wedge change; `None` when `|delta| <= threshold`.
    pub fn classify(delta: f64, threshold: f64) -> Option<Self> {
        if delta > threshold {
            Some(EventType::Hike)
        } else if delta < -threshold {
            Some(EventType::Cut)
        } else {
            None
        }
    }

    /// Lower-case label.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Hike => "hike",
            EventType::Cut => "cut",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hike" => Ok(EventType::Hike),
            "cut" => Ok(EventType::Cut),
            _ => Err(DataError::UnknownEventType(s.to_string())),
        }
    }
}

/// A detected wedge change at a (region, category, time) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Region code.
    pub region: String,
    /// Category code.
    pub category: String,
    /// Month of the change.
    pub time: Month,
    /// Hike or cut.
    pub event_type: EventType,
    /// Signed wedge change `delta_tw`.
    pub magnitude: f64,
    /// No other event of the same series lies within the clean window.
    pub is_clean: bool,
}

/// A panel row with the derived wedge columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedObservation {
    /// Source reading.
    pub observation: PanelObservation,
    /// `ln(price_index)`.
    pub log_price: Option<f64>,
    /// `ln(price_index) - ln(tax_constant_index)`.
    pub tax_wedge: Option<f64>,
    /// Change of the wedge from the previous reading of the series.
    pub delta_tw: Option<f64>,
}

/// Event counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DetectionSummary {
    /// All detected events.
    pub total: usize,
    /// Events flagged clean.
    pub clean: usize,
    /// Hikes among all events.
    pub hikes: usize,
    /// Cuts among all events.
    pub cuts: usize,
}

/// Output of [`EventDetector::detect`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Every panel row, annotated.
    pub annotated: Vec<AnnotatedObservation>,
    /// Events sorted by (region, category, time).
    pub events: Vec<Event>,
}

impl Detection {
    /// Events flagged clean.
    pub fn clean_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_clean)
    }

    /// Aggregate counts.
    pub fn summary(&self) -> DetectionSummary {
        self.events.iter().fold(DetectionSummary::default(), |mut s, e| {
            s.total += 1;
            s.clean += usize::from(e.is_clean);
            match e.event_type {
                EventType::Hike => s.hikes += 1,
                EventType::Cut => s.cuts += 1,
            }
            s
        })
    }
}
