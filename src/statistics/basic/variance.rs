use num_traits::{Float, FromPrimitive};
use crate::statistics::*;

/// Central second moment over `n - ddof`.
#[derive(Debug, Clone, Copy)]
pub struct Variance {
    pub ddof: usize,
}

impl Variance {
    /// `ddof = 0` is the population variance, `ddof = 1` the sample variance.
    pub fn new(ddof: usize) -> Self {
        Variance { ddof }
    }
}

impl Default for Variance {
    /// Sample variance.
    fn default() -> Self {
        Variance { ddof: 1 }
    }
}

impl<D, T> Statistic<D, T> for Variance
where
    D: AsRef<[T]>,
    T: Float + FromPrimitive,
{
    fn compute(&self, data: &D) -> T {
        let slice = data.as_ref();
        if slice.len() < 2 || slice.len() <= self.ddof {
            return T::nan();
        }

        let mean: T = Mean.compute(data);

        // Kahan summation for squared deviations
        let mut sq_sum = T::zero();
        let mut c = T::zero();
        for &x in slice {
            let dev = x - mean;
            let y = dev * dev - c;
            let t = sq_sum + y;
            c = (t - sq_sum) - y;
            sq_sum = t;
        }

        T::from_usize(slice.len() - self.ddof).map_or(T::nan(), |dof| sq_sum / dof)
    }
}

/// Negative variances down to this size are rounding noise.
const ROUNDING: f64 = 1e-12;

/// Square root of a variance. Rounding noise below zero maps to 0; a `NaN`
/// or clearly negative variance stays missing.
pub fn std_error(variance: f64) -> f64 {
    if variance >= 0.0 {
        variance.sqrt()
    } else if variance > -ROUNDING {
        0.0
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sample_and_population() {
        let data = [2.0_f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(Variance::new(0).compute(&data), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Variance::default().compute(&data), 32.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn too_short_is_nan() {
        assert!(Variance::default().compute(&[1.0_f64]).is_nan());
    }

    #[test]
    fn std_error_keeps_missing_variances_missing() {
        assert_abs_diff_eq!(std_error(0.04), 0.2, epsilon = 1e-15);
        assert_abs_diff_eq!(std_error(-1e-15), 0.0);
        assert!(std_error(f64::NAN).is_nan());
        assert!(std_error(-0.01).is_nan());
    }
}
