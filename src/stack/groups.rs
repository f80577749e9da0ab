//! Country and product groupings for the subgroup and mechanism analyses.
//!
//! Regions are two-letter country codes and categories COICOP codes such as
//! `CP0111`. Codes outside the listed sets fall into `Other`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::TreatVar;

const CORE: [&str; 6] = ["DE", "FR", "NL", "BE", "AT", "FI"];
const PERIPHERY: [&str; 5] = ["IT", "ES", "PT", "GR", "IE"];

fn has_prefix(category: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| category.starts_with(p))
}

/// Euro-area country group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGroup {
    Core,
    Periphery,
    Other,
}

impl RegionGroup {
    pub const ALL: [RegionGroup; 3] = [RegionGroup::Core, RegionGroup::Periphery, RegionGroup::Other];

    pub fn of(region: &str) -> Self {
        if CORE.contains(&region) {
            RegionGroup::Core
        } else if PERIPHERY.contains(&region) {
            RegionGroup::Periphery
        } else {
            RegionGroup::Other
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegionGroup::Core => "core",
            RegionGroup::Periphery => "periphery",
            RegionGroup::Other => "other",
        }
    }
}

impl fmt::Display for RegionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durability class of a category: food and energy (`CP01`, `CP045`) are
/// non-durable, furnishings (`CP05`) durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    NonDurable,
    Durable,
    Other,
}

impl Durability {
    pub const ALL: [Durability; 3] = [Durability::NonDurable, Durability::Durable, Durability::Other];

    pub fn of(category: &str) -> Self {
        if has_prefix(category, &["CP01", "CP045"]) {
            Durability::NonDurable
        } else if has_prefix(category, &["CP05"]) {
            Durability::Durable
        } else {
            Durability::Other
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Durability::NonDurable => "non_durable",
            Durability::Durable => "durable",
            Durability::Other => "other",
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category indicator interacted with the shock in the mechanism regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    /// One outside food and energy.
    Core,
    /// One for food, energy and vehicle fuel (`CP01`, `CP045`, `CP072`).
    NonDurable,
}

impl Mechanism {
    pub const ALL: [Mechanism; 2] = [Mechanism::Core, Mechanism::NonDurable];

    /// Indicator value for `category`.
    pub fn dummy(self, category: &str) -> f64 {
        let on = match self {
            Mechanism::Core => !has_prefix(category, &["CP01", "CP045"]),
            Mechanism::NonDurable => has_prefix(category, &["CP01", "CP045", "CP072"]),
        };
        f64::from(u8::from(on))
    }

    /// `treat_shock × dummy`.
    pub const fn shock_var(self) -> TreatVar {
        match self {
            Mechanism::Core => TreatVar::CoreShock,
            Mechanism::NonDurable => TreatVar::NonDurableShock,
        }
    }

    /// The dummy itself.
    pub const fn dummy_var(self) -> TreatVar {
        match self {
            Mechanism::Core => TreatVar::Core,
            Mechanism::NonDurable => TreatVar::NonDurable,
        }
    }

    /// Variables the mechanism model is fitted on.
    pub const fn variables(self) -> [TreatVar; 3] {
        [TreatVar::TreatShock, self.shock_var(), self.dummy_var()]
    }

    pub const fn name(self) -> &'static str {
        match self {
            Mechanism::Core => "core",
            Mechanism::NonDurable => "non_durable",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
