mod variance;
mod skewness;

pub use variance::{std_error, Variance};
pub use skewness::Skewness;
