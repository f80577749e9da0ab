mod wald;
mod asymmetry;
mod interaction;
mod power;

pub use wald::{chi2_sf, linear_combination, wald_statistic};
pub use asymmetry::*;
pub use interaction::{InteractionRow, InteractionTable};
pub use power::{minimum_detectable_effect, power, PowerAnalysis};
