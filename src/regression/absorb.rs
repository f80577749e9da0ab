//! Fixed-effect absorption by alternating projections.
//!
//! Each sweep subtracts the (weighted) group mean for every absorbed
//! dimension in turn. A single dimension is exact after one sweep; with more,
//! sweeps repeat until the largest absolute group mean across all dimensions
//! drops below the tolerance. Hitting the iteration bound is an error, not a
//! silently returned approximation.

use crate::config::AbsorptionConfig;
use crate::error::{ConvergenceError, ModelError};

/// Member rows of one level and their total weight.
#[derive(Debug, Clone, Default)]
struct Level {
    rows: Vec<usize>,
    mass: f64,
}

impl Level {
    fn mean(&self, v: &[f64], weights: &[f64]) -> Option<f64> {
        if self.mass <= 0.0 {
            return None;
        }
        let sum: f64 = self.rows.iter().filter_map(|&i| Some(weights.get(i)? * v.get(i)?)).sum();
        Some(sum / self.mass)
    }
}

/// Demeaning operator for one or more categorical dimensions.
#[derive(Debug, Clone)]
pub struct FixedEffects {
    n: usize,
    /// For each dimension, its levels.
    dimensions: Vec<Vec<Level>>,
    /// Row weights, all one when unweighted.
    weights: Vec<f64>,
    tolerance: f64,
    max_iter: usize,
}

impl FixedEffects {
    /// `groups[d][i]` is the 0-based level of row `i` in dimension `d`.
    pub fn new(groups: &[Vec<usize>], weights: Option<&[f64]>) -> Result<Self, ModelError> {
        let n = groups.first().map_or(0, Vec::len);
        if let Some((d, g)) = groups.iter().enumerate().find(|(_, g)| g.len() != n) {
            return Err(ModelError::DimensionMismatch(format!(
                "absorbed dimension {d} has {} rows, expected {n}",
                g.len()
            )));
        }
        if let Some(w) = weights {
            if w.len() != n {
                return Err(ModelError::DimensionMismatch(format!("{} weights for {n} rows", w.len())));
            }
        }

        let weights = weights.map_or_else(|| vec![1.0; n], <[f64]>::to_vec);
        let dimensions = groups
            .iter()
            .map(|g| {
                let n_levels = g.iter().copied().max().map_or(0, |m| m + 1);
                let mut levels = vec![Level::default(); n_levels];
                for ((i, &level), &w) in g.iter().enumerate().zip(&weights) {
                    if let Some(l) = levels.get_mut(level) {
                        l.rows.push(i);
                        l.mass += w;
                    }
                }
                levels
            })
            .collect();

        let config = AbsorptionConfig::default();
        Ok(Self {
            n,
            dimensions,
            weights,
            tolerance: config.tolerance,
            max_iter: config.max_iter,
        })
    }

    /// Applies tolerance and iteration bound.
    #[must_use]
    pub fn with_config(mut self, config: &AbsorptionConfig) -> Self {
        self.tolerance = config.tolerance;
        self.max_iter = config.max_iter;
        self
    }

    /// Number of absorbed dimensions.
    pub fn n_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Levels per dimension.
    pub fn levels(&self) -> Vec<usize> {
        self.dimensions.iter().map(Vec::len).collect()
    }

    /// Removes all absorbed effects from `v` in place and returns the number
    /// of sweeps performed.
    pub fn partial_out(&self, v: &mut [f64]) -> Result<usize, ConvergenceError> {
        debug_assert_eq!(v.len(), self.n);
        match self.dimensions.as_slice() {
            [] => return Ok(0),
            [only] => {
                self.sweep(v, only);
                return Ok(1);
            }
            _ => {}
        }

        let mut max_mean = f64::INFINITY;
        for iter in 1..=self.max_iter {
            for levels in &self.dimensions {
                self.sweep(v, levels);
            }
            max_mean = self.max_group_mean(v);
            if max_mean < self.tolerance {
                return Ok(iter);
            }
        }
        Err(ConvergenceError {
            iterations: self.max_iter,
            max_mean,
        })
    }

    fn sweep(&self, v: &mut [f64], levels: &[Level]) {
        for level in levels {
            if let Some(mean) = level.mean(v, &self.weights) {
                for &i in &level.rows {
                    if let Some(x) = v.get_mut(i) {
                        *x -= mean;
                    }
                }
            }
        }
    }

    fn max_group_mean(&self, v: &[f64]) -> f64 {
        self.dimensions
            .iter()
            .flatten()
            .filter_map(|level| level.mean(v, &self.weights))
            .fold(0.0_f64, |acc, m| acc.max(m.abs()))
    }
}
