use statrs::distribution::{ContinuousCDF, Normal};

fn standard() -> Normal {
    Normal::standard()
}

/// `P(|Z| >= |z|)` for a standard normal `Z`; `NaN` propagates.
#[inline]
pub fn two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    2.0 * standard().sf(z.abs())
}

/// Standard normal quantile.
#[inline]
pub fn normal_quantile(p: f64) -> f64 {
    standard().inverse_cdf(p)
}

/// Standard normal CDF.
#[inline]
pub fn normal_cdf(z: f64) -> f64 {
    standard().cdf(z)
}

/// Two-sided critical value `z_{1 - (1 - level) / 2}`.
#[inline]
pub fn critical_value(confidence: f64) -> f64 {
    normal_quantile(1.0 - (1.0 - confidence) / 2.0)
}
