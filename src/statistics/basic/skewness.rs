use num_traits::{Float, FromPrimitive};
use crate::statistics::*;

/// Sample skewness `κ̂₃ / κ̂₂^{3/2}`.
///
/// The unbiased form (default) uses the bias-corrected cumulants and needs
/// `n >= 3`.
#[derive(Debug, Clone, Copy)]
pub struct Skewness {
    pub unbiased: bool,
}

impl Skewness {
    pub fn new(unbiased: bool) -> Self {
        Skewness { unbiased }
    }
}

impl Default for Skewness {
    fn default() -> Self {
        Skewness { unbiased: true }
    }
}

impl<D, T> Statistic<D, T> for Skewness
where
    D: AsRef<[T]>,
    T: Float + FromPrimitive,
{
    fn compute(&self, data: &D) -> T {
        let slice = data.as_ref();
        let n = slice.len();
        if n < 2 || (self.unbiased && n < 3) {
            return T::nan();
        }
        let (Some(n_f), Some(two)) = (T::from_usize(n), T::from_u8(2)) else {
            return T::nan();
        };
        let mean: T = Mean.compute(data);

        let (sum2, sum3) = slice.iter().fold((T::zero(), T::zero()), |(s2, s3), &x| {
            let dev = x - mean;
            (s2 + dev * dev, s3 + dev * dev * dev)
        });
        let m2 = sum2 / n_f;
        let m3 = sum3 / n_f;

        let (k2, k3) = if self.unbiased {
            let n1 = n_f - T::one();
            let n2 = n_f - two;
            ((n_f / n1) * m2, (n_f * n_f) / (n1 * n2) * m3)
        } else {
            (m2, m3)
        };

        let denom = k2.sqrt().powi(3);
        if denom.is_zero() { T::nan() } else { k3 / denom }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn symmetric_data_has_zero_skew() {
        let data = [-2.0_f64, -1.0, 0.0, 1.0, 2.0];
        assert_abs_diff_eq!(Skewness::default().compute(&data), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn right_tail_is_positive() {
        let data = [0.0_f64, 0.0, 0.0, 1.0, 10.0];
        assert!(Skewness::default().compute(&data) > 0.0);
        assert!(Skewness::new(false).compute(&data) > 0.0);
    }

    #[test]
    fn constant_is_nan() {
        assert!(Skewness::default().compute(&[3.0_f64; 5]).is_nan());
    }
}
