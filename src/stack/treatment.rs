use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Mechanism, StackedRow};
use crate::error::ConfigError;

/// Treatment variable interacted with relative-time indicators in the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatVar {
    /// `shock_size * treated`.
    TreatShock,
    /// `treat_shock` on hikes, zero otherwise.
    PosShock,
    /// `treat_shock` on cuts, zero otherwise.
    NegShock,
    /// `|treat_shock|`.
    ShockAbs,
    /// `|treat_shock|` on hikes, zero otherwise.
    ShockXHike,
    /// Treatment indicator.
    Treated,
    /// `treat_shock` on core categories.
    CoreShock,
    /// Core category indicator, on every row.
    Core,
    /// `treat_shock` on non-durable categories.
    NonDurableShock,
    /// Non-durable category indicator, on every row.
    NonDurable,
}

impl TreatVar {
    /// Every variable, in declaration order.
    pub const ALL: [TreatVar; 10] = [
        TreatVar::TreatShock,
        TreatVar::PosShock,
        TreatVar::NegShock,
        TreatVar::ShockAbs,
        TreatVar::ShockXHike,
        TreatVar::Treated,
        TreatVar::CoreShock,
        TreatVar::Core,
        TreatVar::NonDurableShock,
        TreatVar::NonDurable,
    ];

    /// Column name.
    pub const fn name(self) -> &'static str {
        match self {
            TreatVar::TreatShock => "treat_shock",
            TreatVar::PosShock => "pos_shock",
            TreatVar::NegShock => "neg_shock",
            TreatVar::ShockAbs => "shock_abs",
            TreatVar::ShockXHike => "shock_x_hike",
            TreatVar::Treated => "treated",
            TreatVar::CoreShock => "core_shock",
            TreatVar::Core => "core",
            TreatVar::NonDurableShock => "nondurable_shock",
            TreatVar::NonDurable => "nondurable",
        }
    }

    /// Value of the variable on one stacked row. A hike is a positive
    /// `shock_size`.
    #[inline]
    pub fn value(self, row: &StackedRow) -> f64 {
        let is_hike = row.shock_size > 0.0;
        match self {
            TreatVar::TreatShock => row.treat_shock,
            TreatVar::PosShock => if is_hike { row.treat_shock } else { 0.0 },
            TreatVar::NegShock => if is_hike { 0.0 } else { row.treat_shock },
            TreatVar::ShockAbs => row.treat_shock.abs(),
            TreatVar::ShockXHike => if is_hike { row.treat_shock.abs() } else { 0.0 },
            TreatVar::Treated => f64::from(u8::from(row.treated)),
            TreatVar::CoreShock => row.treat_shock * Mechanism::Core.dummy(&row.category),
            TreatVar::Core => Mechanism::Core.dummy(&row.category),
            TreatVar::NonDurableShock => row.treat_shock * Mechanism::NonDurable.dummy(&row.category),
            TreatVar::NonDurable => Mechanism::NonDurable.dummy(&row.category),
        }
    }
}

impl fmt::Display for TreatVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TreatVar {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TreatVar::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| ConfigError::UnknownColumn(s.to_string()))
    }
}
