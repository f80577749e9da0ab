use num_traits::{Float, FromPrimitive};

use super::Statistic;

/// Arithmetic mean with Kahan-compensated summation. `NaN` for empty input.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mean;

impl<D, T> Statistic<D, T> for Mean
where
    D: AsRef<[T]>,
    T: Float + FromPrimitive,
{
    fn compute(&self, data: &D) -> T {
        let slice: &[T] = data.as_ref();
        if slice.is_empty() {
            return T::nan();
        }

        let mut sum = T::zero();
        let mut c = T::zero();
        for &x in slice {
            let y = x - c;
            let t = sum + y;
            c = (t - sum) - y;
            sum = t;
        }

        T::from_usize(slice.len()).map_or(T::nan(), |n| sum / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn empty_slice_returns_nan() {
        let mean: f64 = Mean.compute(&Vec::<f64>::new());
        assert!(mean.is_nan());
    }

    #[test]
    fn exact_integer_means() {
        assert_abs_diff_eq!(Mean.compute(&[1.0_f64, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Mean.compute(&[-10.5_f64, -3.2, 0.0, 7.1, 6.6]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn maintains_precision_at_scale() {
        let data = vec![1e-10_f64; 1_000_000];
        assert_relative_eq!(Mean.compute(&data), 1e-10, max_relative = 1e-13);
    }
}
