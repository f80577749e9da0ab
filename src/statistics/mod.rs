//! Small statistics toolkit: summary statistics, empirical distributions,
//! intervals and the standard normal helpers used for inference.

pub trait Statistic<D, T> {
    fn compute(&self, data: &D) -> T;
}

mod mean;
mod basic;
mod cdf;
mod quantile;
mod ci;
mod normal;

pub use mean::Mean;
pub use basic::*;
pub use cdf::{CDF, EmpiricalCDF};
pub use quantile::{Quantile, QuantileInterval};
pub use ci::Interval;
pub use normal::{critical_value, normal_cdf, normal_quantile, two_sided_p};

// ===== 2-tuple =====
impl<D, T1, T2, S1, S2> Statistic<D, (T1, T2)> for (S1, S2)
where
    S1: Statistic<D, T1>,
    S2: Statistic<D, T2>,
{
    #[inline]
    fn compute(&self, data: &D) -> (T1, T2) {
        (self.0.compute(data), self.1.compute(data))
    }
}

// ===== 3-tuple =====
impl<D, T1, T2, T3, S1, S2, S3> Statistic<D, (T1, T2, T3)> for (S1, S2, S3)
where
    S1: Statistic<D, T1>,
    S2: Statistic<D, T2>,
    S3: Statistic<D, T3>,
{
    #[inline]
    fn compute(&self, data: &D) -> (T1, T2, T3) {
        (
            self.0.compute(data),
            self.1.compute(data),
            self.2.compute(data),
        )
    }
}
