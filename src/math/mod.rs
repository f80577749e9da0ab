//! Linear algebra used by the estimators.

mod linalg;

pub use linalg::{aliased_columns, invert_symmetric, pseudo_inverse, weighted_gram, Projector, Solution};
