use num_traits::Float;

use super::{EmpiricalCDF, Statistic};

/// Type-1 quantile `Q(p) = inf { x : Fₙ(x) ≥ p }`. `NaN` on an empty sample.
#[derive(Debug, Clone, Copy)]
pub struct Quantile {
    p: f64,
}

impl Quantile {
    #[inline]
    pub fn new(p: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&p), "Quantile p must be in [0,1]");
        Self { p }
    }
}

#[inline]
fn index(n: usize, p: f64) -> usize {
    ((n as f64 * p).ceil() as usize).saturating_sub(1).min(n - 1)
}

impl<T: Float> Statistic<EmpiricalCDF<T>, T> for Quantile {
    #[inline]
    fn compute(&self, ecdf: &EmpiricalCDF<T>) -> T {
        if ecdf.is_empty() {
            return T::nan();
        }
        ecdf.points().get(index(ecdf.n(), self.p)).copied().unwrap_or_else(T::nan)
    }
}

/// Pair of type-1 quantiles `(Q(lower), Q(upper))`.
#[derive(Debug, Clone, Copy)]
pub struct QuantileInterval {
    lower: f64,
    upper: f64,
}

impl QuantileInterval {
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&lower));
        debug_assert!((0.0..=1.0).contains(&upper));
        debug_assert!(lower <= upper);
        Self { lower, upper }
    }

    /// Equal-tailed pair `(α/2, 1 - α/2)` for `α = 1 - confidence`.
    #[inline]
    pub fn percentile(confidence: f64) -> Self {
        let alpha = 1.0 - confidence;
        Self::new(alpha / 2.0, 1.0 - alpha / 2.0)
    }
}

impl<T: Float> Statistic<EmpiricalCDF<T>, (T, T)> for QuantileInterval {
    #[inline]
    fn compute(&self, ecdf: &EmpiricalCDF<T>) -> (T, T) {
        (Quantile::new(self.lower).compute(ecdf), Quantile::new(self.upper).compute(ecdf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::CDF;

    #[test]
    fn type_one_quantiles() {
        let ecdf = CDF.compute(&(1..=10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(Quantile::new(0.5).compute(&ecdf), 5.0);
        assert_eq!(Quantile::new(0.0).compute(&ecdf), 1.0);
        assert_eq!(Quantile::new(1.0).compute(&ecdf), 10.0);
        assert_eq!(QuantileInterval::percentile(0.8).compute(&ecdf), (1.0, 9.0));
    }

    #[test]
    fn empty_is_nan() {
        let ecdf = CDF.compute(&Vec::<f64>::new());
        assert!(Quantile::new(0.5).compute(&ecdf).is_nan());
        let (lo, hi) = QuantileInterval::percentile(0.95).compute(&ecdf);
        assert!(lo.is_nan() && hi.is_nan());
    }
}
