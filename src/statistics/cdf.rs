use std::cmp::Ordering;

use num_traits::Float;

use super::Statistic;

/// Empirical CDF `Fₙ(x) = (1/n) Σᵢ I(Xᵢ ≤ x)` over the non-`NaN` inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalCDF<T> {
    sorted: Vec<T>,
}

impl<T> EmpiricalCDF<T> {
    #[inline]
    pub fn n(&self) -> usize {
        self.sorted.len()
    }

    /// Sorted support points.
    #[inline]
    pub fn points(&self) -> &[T] {
        &self.sorted
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

impl<T: Float> EmpiricalCDF<T> {
    /// Sorts `data` after dropping `NaN`s. Infinities are kept.
    pub fn from_float_slice(data: &[T]) -> Self {
        let mut sorted: Vec<T> = data.iter().copied().filter(|x| !x.is_nan()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Self { sorted }
    }

    /// `Fₙ(x)`; `NaN` for a `NaN` argument or an empty sample.
    #[inline]
    pub fn eval(&self, x: T) -> f64 {
        if x.is_nan() || self.sorted.is_empty() {
            return f64::NAN;
        }
        self.sorted.partition_point(|v| *v <= x) as f64 / self.n() as f64
    }

    /// Share of points `>= x`; `NaN` for a `NaN` argument or an empty sample.
    #[inline]
    pub fn exceedance(&self, x: T) -> f64 {
        if x.is_nan() || self.sorted.is_empty() {
            return f64::NAN;
        }
        let below = self.sorted.partition_point(|v| *v < x);
        (self.n() - below) as f64 / self.n() as f64
    }
}

/// ECDF constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CDF;

impl<D, T> Statistic<D, EmpiricalCDF<T>> for CDF
where
    D: AsRef<[T]>,
    T: Float,
{
    #[inline]
    fn compute(&self, data: &D) -> EmpiricalCDF<T> {
        EmpiricalCDF::from_float_slice(data.as_ref())
    }
}
