use serde::Serialize;

use super::FittedModel;
use crate::stack::TreatVar;
use crate::statistics::Interval;

/// Estimate for one relative-time offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileRow {
    /// Offset from the event month.
    pub rel_time: i32,
    /// Coefficient.
    pub coef: f64,
    /// Standard error.
    pub se: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
}

impl ProfileRow {
    /// The reference offset: not estimated.
    pub const fn pinned(rel_time: i32) -> Self {
        Self {
            rel_time,
            coef: 0.0,
            se: 0.0,
            p_value: 1.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
        }
    }

    /// An offset without an identified coefficient.
    pub const fn missing(rel_time: i32) -> Self {
        Self {
            rel_time,
            coef: f64::NAN,
            se: f64::NAN,
            p_value: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
        }
    }

    /// Confidence interval with the coefficient as estimate.
    pub fn ci(&self) -> Interval<f64> {
        Interval::new(self.ci_lower, self.ci_upper).estimate(self.coef)
    }
}

/// Dense event-time table for one treatment variable.
///
/// Holds exactly one row per offset in `-H..=H`. The base offset is pinned to
/// `(0, 0, 1, [0, 0])`; offsets whose column is absent or unidentified are
/// all-`NaN` rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTimeProfile {
    /// Variable the coefficients belong to.
    pub treat_var: TreatVar,
    /// Reference offset.
    pub base_period: i32,
    /// Rows in offset order.
    pub rows: Vec<ProfileRow>,
}

impl EventTimeProfile {
    /// Reads the `offset × treat_var` coefficients off a fitted model.
    pub fn extract(model: &FittedModel, treat_var: TreatVar) -> Self {
        let se = model.std_errors();
        let p = model.p_values();
        let ci = model.conf_int();
        let base = model.base_period();
        let h = model.half_window();

        let identified = |t: i32, i: usize| {
            let coef = *model.params().get(i).filter(|b| b.is_finite())?;
            let interval = ci.get(i)?;
            Some(ProfileRow {
                rel_time: t,
                coef,
                se: *se.get(i)?,
                p_value: *p.get(i)?,
                ci_lower: interval.lower,
                ci_upper: interval.upper,
            })
        };

        let rows = (-h..=h)
            .map(|t| {
                if t == base {
                    return ProfileRow::pinned(t);
                }
                model
                    .column(t, treat_var)
                    .and_then(|i| identified(t, i))
                    .unwrap_or_else(|| ProfileRow::missing(t))
            })
            .collect();

        Self {
            treat_var,
            base_period: base,
            rows,
        }
    }

    /// Table without rows, for upstream-empty inputs.
    pub fn empty(treat_var: TreatVar, base_period: i32) -> Self {
        Self {
            treat_var,
            base_period,
            rows: Vec::new(),
        }
    }

    /// Row at `rel_time`.
    pub fn row(&self, rel_time: i32) -> Option<&ProfileRow> {
        self.rows.iter().find(|r| r.rel_time == rel_time)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True for the upstream-empty table.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
