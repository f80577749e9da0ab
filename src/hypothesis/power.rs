use serde::Serialize;

use crate::statistics::{normal_cdf, normal_quantile};

/// Two-sided normal power of a test with standard error `se` against a true
/// effect `effect` at level `alpha`.
pub fn power(effect: f64, se: f64, alpha: f64) -> f64 {
    let z = normal_quantile(1.0 - alpha / 2.0);
    let ncp = effect / se;
    1.0 - normal_cdf(z - ncp) + normal_cdf(-z - ncp)
}

/// Smallest effect detected with probability `target` at level `alpha`.
pub fn minimum_detectable_effect(se: f64, alpha: f64, target: f64) -> f64 {
    (normal_quantile(1.0 - alpha / 2.0) + normal_quantile(target)) * se
}

/// Power summary for one standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerAnalysis {
    pub effect_size: f64,
    pub se: f64,
    pub alpha: f64,
    pub power: f64,
    pub mde_80: f64,
    pub mde_90: f64,
}

impl PowerAnalysis {
    pub fn new(effect_size: f64, se: f64, alpha: f64) -> Self {
        Self {
            effect_size,
            se,
            alpha,
            power: power(effect_size, se, alpha),
            mde_80: minimum_detectable_effect(se, alpha, 0.80),
            mde_90: minimum_detectable_effect(se, alpha, 0.90),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn textbook_values() {
        // 1.96 + 0.8416 = 2.8016 standard errors
        assert_abs_diff_eq!(minimum_detectable_effect(0.07, 0.05, 0.80), 2.801_6 * 0.07, epsilon = 1e-4);
        assert_abs_diff_eq!(power(2.801_6 * 0.07, 0.07, 0.05), 0.80, epsilon = 1e-3);
        assert_abs_diff_eq!(power(0.0, 0.07, 0.05), 0.05, epsilon = 1e-9);
    }

    #[test]
    fn summary_orders_mdes() {
        let pa = PowerAnalysis::new(0.15, 0.07, 0.05);
        assert!(pa.mde_90 > pa.mde_80);
        assert!(pa.power > 0.5 && pa.power < 0.6);
    }
}
