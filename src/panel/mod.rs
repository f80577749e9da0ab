//! Tidy monthly price panel.

mod read;

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Calendar month stored as an absolute index `year * 12 + (month - 1)`.
///
/// Parses `YYYY-MM` and the statistical-agency form `YYYYMmm` (`2020M01`);
/// always displays as `YYYY-MM`. Subtracting two months yields their
/// distance in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month(i32);

impl Month {
    /// Builds a month from a calendar year and a 1-based month number.
    pub fn new(year: i32, month: u32) -> Result<Self, DataError> {
        if !(1..=12).contains(&month) {
            return Err(DataError::InvalidMonth(format!("{year}-{month}")));
        }
        Ok(Self(year * 12 + month as i32 - 1))
    }

    /// Absolute month index.
    #[inline]
    pub const fn index(self) -> i32 {
        self.0
    }

    /// Inverse of [`Month::index`].
    #[inline]
    pub const fn from_index(index: i32) -> Self {
        Self(index)
    }

    /// Calendar year.
    #[inline]
    pub const fn year(self) -> i32 {
        self.0.div_euclid(12)
    }

    /// Month of year, 1 to 12.
    #[inline]
    pub const fn month(self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }
}

impl Add<i32> for Month {
    type Output = Month;

    fn add(self, rhs: i32) -> Month {
        Month(self.0 + rhs)
    }
}

impl Sub for Month {
    type Output = i32;

    fn sub(self, rhs: Month) -> i32 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Month {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DataError::InvalidMonth(s.to_string());
        let (year, month) = s
            .split_once('-')
            .or_else(|| s.split_once('M'))
            .ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Month::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Month {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

/// One reading of a (region, category) series.
///
/// Index values that are non-positive or non-finite are treated as missing by
/// every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelObservation {
    /// Region (country) code.
    pub region: String,
    /// Product category code.
    pub category: String,
    /// Reading month.
    pub time: Month,
    /// Headline price index.
    pub price_index: Option<f64>,
    /// Price index at constant tax rates.
    pub tax_constant_index: Option<f64>,
    /// Item weight.
    pub weight: Option<f64>,
}

impl PanelObservation {
    /// Natural log of the headline index, if it is a valid positive number.
    pub fn log_price(&self) -> Option<f64> {
        positive_ln(self.price_index)
    }

    /// Natural log of the constant-tax index, if it is a valid positive number.
    pub fn log_tax_constant(&self) -> Option<f64> {
        positive_ln(self.tax_constant_index)
    }

    /// The item weight, if present and finite.
    pub fn valid_weight(&self) -> Option<f64> {
        self.weight.filter(|w| w.is_finite())
    }

    fn key(&self) -> (&str, &str, Month) {
        (&self.region, &self.category, self.time)
    }
}

fn positive_ln(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0).map(f64::ln)
}

/// Panel keyed uniquely by (region, category, time), sorted in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    observations: Vec<PanelObservation>,
}

impl Panel {
    /// Sorts the observations and rejects repeated keys.
    pub fn new(mut observations: Vec<PanelObservation>) -> Result<Self, DataError> {
        observations.sort_by(|a, b| a.key().cmp(&b.key()));
        let repeated = observations.windows(2).find(|w| matches!(w, [a, b] if a.key() == b.key()));
        if let Some([_, dup]) = repeated {
            return Err(DataError::DuplicateObservation {
                region: dup.region.clone(),
                category: dup.category.clone(),
                time: dup.time,
            });
        }
        Ok(Self { observations })
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// True when the panel holds no readings.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// All readings in (region, category, time) order.
    pub fn observations(&self) -> &[PanelObservation] {
        &self.observations
    }

    /// Contiguous time-sorted slices, one per (region, category) series.
    pub fn series(&self) -> impl Iterator<Item = &[PanelObservation]> {
        self.observations
            .chunk_by(|a, b| a.region == b.region && a.category == b.category)
    }

    /// Distinct months observed for `category` across all regions, ascending.
    pub fn months_in_category(&self, category: &str) -> Vec<Month> {
        let mut months: Vec<Month> = self
            .observations
            .iter()
            .filter(|o| o.category == category)
            .map(|o| o.time)
            .collect();
        months.sort_unstable();
        months.dedup();
        months
    }
}

impl AsRef<[PanelObservation]> for Panel {
    fn as_ref(&self) -> &[PanelObservation] {
        &self.observations
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn obs(region: &str, category: &str, time: Month, price: f64, tax_constant: f64) -> PanelObservation {
        PanelObservation {
            region: region.to_string(),
            category: category.to_string(),
            time,
            price_index: Some(price),
            tax_constant_index: Some(tax_constant),
            weight: Some(1.0),
        }
    }

    #[test]
    fn month_parses_both_label_forms() {
        let a: Month = "2020-03".parse().unwrap();
        let b: Month = "2020M03".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.year(), 2020);
        assert_eq!(a.month(), 3);
        assert_eq!(a.to_string(), "2020-03");
    }

    #[test]
    fn month_arithmetic_crosses_years() {
        let dec = Month::new(2019, 12).unwrap();
        let jan = dec + 1;
        assert_eq!(jan, Month::new(2020, 1).unwrap());
        assert_eq!(Month::new(2021, 2).unwrap() - dec, 14);
    }

    #[test]
    fn month_rejects_garbage() {
        assert!("2020-13".parse::<Month>().is_err());
        assert!("2020".parse::<Month>().is_err());
        assert!("20x0-01".parse::<Month>().is_err());
        assert!(Month::new(2020, 0).is_err());
    }

    #[test]
    fn month_serde_uses_label() {
        let m = Month::new(2021, 7).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"2021-07\"");
        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn non_positive_index_is_missing() {
        let mut o = obs("AT", "food", Month::new(2020, 1).unwrap(), 0.0, 100.0);
        assert_eq!(o.log_price(), None);
        assert!(o.log_tax_constant().is_some());
        o.tax_constant_index = Some(-1.0);
        assert_eq!(o.log_tax_constant(), None);
    }

    #[test]
    fn panel_sorts_and_rejects_duplicates() {
        let t = Month::new(2020, 1).unwrap();
        let panel = Panel::new(vec![
            obs("B", "x", t + 1, 1.0, 1.0),
            obs("A", "x", t + 1, 1.0, 1.0),
            obs("A", "x", t, 1.0, 1.0),
        ])
        .unwrap();
        let keys: Vec<_> = panel.observations().iter().map(|o| (o.region.as_str(), o.time)).collect();
        assert_eq!(keys, vec![("A", t), ("A", t + 1), ("B", t + 1)]);
        assert_eq!(panel.series().count(), 2);
        assert_eq!(panel.months_in_category("x"), vec![t, t + 1]);

        let dup = Panel::new(vec![obs("A", "x", t, 1.0, 1.0), obs("A", "x", t, 2.0, 2.0)]);
        assert!(matches!(dup, Err(DataError::DuplicateObservation { .. })));
    }
}
