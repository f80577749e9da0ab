//! Stacked event-study estimation of VAT pass-through into consumer prices.
//!
//! The crate detects tax-wedge changes in a region × category × month price
//! panel, stacks an event window around each change and estimates the
//! event-time pass-through profile with an absorbing regression and
//! cluster-robust inference. Hike/cut asymmetry tests, an interaction
//! specification, subgroup and mechanism regressions and a wild cluster
//! restricted bootstrap sit on top.
//!
//! ```no_run
//! use vat_passthrough::{EventStudy, EventStudyConfig, Panel};
//!
//! # fn main() -> vat_passthrough::Result<()> {
//! let panel = Panel::read("prices.csv")?;
//! let study = EventStudy::new(EventStudyConfig::default())?;
//! let baseline = study.baseline(&panel)?;
//! println!("{}", baseline.profile);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
mod display;
pub mod error;
pub mod hypothesis;
pub mod identification;
pub mod math;
pub mod panel;
pub mod regression;
pub mod resample;
pub mod stack;
pub mod statistics;

pub use crate::analysis::{EventStudy, HeterogeneityAnalysis, MechanismAnalysis, PlaceboConfig, PlaceboResult};
pub use crate::config::EventStudyConfig;
pub use crate::error::{Error, Result};
pub use crate::identification::{Detection, Event, EventDetector, EventType};
pub use crate::panel::{Month, Panel, PanelObservation};
pub use crate::regression::{AbsorbingRegression, EventTimeProfile, FittedModel};
pub use crate::resample::{bootstrap_event_time, WildClusterBootstrap};
pub use crate::stack::{Durability, Mechanism, RegionGroup, StackedPanel, StackedPanelBuilder, TreatVar};
pub use rand;
