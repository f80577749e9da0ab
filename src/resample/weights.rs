use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::Re;
use crate::error::ConfigError;
use crate::regression::Clusters;

/// Distribution of the per-cluster bootstrap weights. All three have mean 0
/// and variance 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeightDist {
    /// `±1` with probability 1/2 each.
    #[default]
    #[serde(rename = "rademacher")]
    Rademacher,
    /// Mammen (1993) two-point law with third moment 1.
    #[serde(rename = "mammen")]
    Mammen,
    /// Webb (2014) six-point law `{±√1.5, ±1, ±√0.5}`.
    #[serde(rename = "webb_6pt")]
    Webb6,
}

const SQRT5: f64 = 2.236_067_977_499_79;

/// Mammen low point `-(√5 - 1) / 2`.
const MAMMEN_LOW: f64 = -(SQRT5 - 1.0) / 2.0;
/// Mammen high point `(√5 + 1) / 2`.
const MAMMEN_HIGH: f64 = (SQRT5 + 1.0) / 2.0;
/// `P(w = MAMMEN_LOW) = (√5 + 1) / (2√5)`.
const MAMMEN_P_LOW: f64 = (SQRT5 + 1.0) / (2.0 * SQRT5);

const WEBB_POINTS: [f64; 6] = [
    -1.224_744_871_391_589,
    -1.0,
    -std::f64::consts::FRAC_1_SQRT_2,
    std::f64::consts::FRAC_1_SQRT_2,
    1.0,
    1.224_744_871_391_589,
];

impl WeightDist {
    /// Configuration name.
    pub const fn name(self) -> &'static str {
        match self {
            WeightDist::Rademacher => "rademacher",
            WeightDist::Mammen => "mammen",
            WeightDist::Webb6 => "webb_6pt",
        }
    }

    /// Theoretical `(mean, variance, third moment)`.
    pub const fn moments(self) -> (f64, f64, f64) {
        match self {
            WeightDist::Rademacher | WeightDist::Webb6 => (0.0, 1.0, 0.0),
            WeightDist::Mammen => (0.0, 1.0, 1.0),
        }
    }
}

impl fmt::Display for WeightDist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WeightDist {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rademacher" => Ok(WeightDist::Rademacher),
            "mammen" => Ok(WeightDist::Mammen),
            "webb_6pt" | "webb" => Ok(WeightDist::Webb6),
            _ => Err(ConfigError::UnknownDistribution(s.to_string())),
        }
    }
}

/// Suggested distribution for `g` clusters: Webb below 10, Mammen below 30,
/// Rademacher otherwise.
pub fn recommend_distribution(g: usize) -> WeightDist {
    match g {
        0..10 => WeightDist::Webb6,
        10..30 => WeightDist::Mammen,
        _ => WeightDist::Rademacher,
    }
}

/// Draws weights from one distribution and one generator.
///
/// Rademacher signs come out of a 64-bit reservoir, so one generator call
/// serves 64 draws.
#[derive(Debug, Clone)]
pub struct WeightSampler<R> {
    dist: WeightDist,
    rng: R,
    bit_reservoir: u64,
    bits_consumed: u32,
}

impl<R: Rng> WeightSampler<R> {
    /// Sampler over `rng`.
    pub fn new(dist: WeightDist, rng: R) -> Self {
        Self {
            dist,
            rng,
            bit_reservoir: 0,
            bits_consumed: 64, // force refill on first use
        }
    }

    /// One weight.
    #[inline]
    pub fn draw(&mut self) -> f64 {
        match self.dist {
            WeightDist::Rademacher => {
                if self.bits_consumed >= 64 {
                    self.bit_reservoir = self.rng.next_u64();
                    self.bits_consumed = 0;
                }
                let bit = (self.bit_reservoir >> self.bits_consumed) & 1;
                self.bits_consumed += 1;
                if bit == 1 { 1.0 } else { -1.0 }
            }
            WeightDist::Mammen => {
                if self.rng.gen_range(0.0..1.0) < MAMMEN_P_LOW {
                    MAMMEN_LOW
                } else {
                    MAMMEN_HIGH
                }
            }
            WeightDist::Webb6 => WEBB_POINTS.choose(&mut self.rng).copied().unwrap_or(1.0),
        }
    }

    /// Fills `out` with independent weights.
    pub fn fill(&mut self, out: &mut [f64]) {
        for w in out {
            *w = self.draw();
        }
    }
}

/// Per-replication cluster weights.
///
/// Replication `b` draws from the seeded generator advanced by `b` jumps of
/// 2^128 steps, so every replication owns an independent stream and the
/// weights of replication `b` do not depend on how many other replications
/// run or in which order.
#[derive(Debug, Clone)]
pub struct WildWeights {
    dist: WeightDist,
    rng: Xoshiro256PlusPlus,
}

impl WildWeights {
    /// Streams for `dist` rooted at `seed`.
    pub fn new(dist: WeightDist, seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            dist,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl Re<Clusters> for WildWeights {
    type Item = Vec<f64>;

    fn re(&self, clusters: &Clusters) -> impl Iterator<Item = Self::Item> {
        let g = clusters.n_clusters();
        let dist = self.dist;
        let mut base = self.rng.clone();
        std::iter::from_fn(move || {
            let mut sampler = WeightSampler::new(dist, base.clone());
            base.jump();
            let mut w = vec![0.0; g];
            sampler.fill(&mut w);
            Some(w)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{Mean, Skewness, Statistic, Variance};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn draws(dist: WeightDist, n: usize) -> Vec<f64> {
        let mut sampler = WeightSampler::new(dist, Xoshiro256PlusPlus::seed_from_u64(7));
        let mut out = vec![0.0; n];
        sampler.fill(&mut out);
        out
    }

    fn third_moment(data: &[f64]) -> f64 {
        data.iter().map(|x| x.powi(3)).sum::<f64>() / data.len() as f64
    }

    #[test]
    fn rademacher_moments() {
        let w = draws(WeightDist::Rademacher, 200_000);
        assert!(w.iter().all(|x| (x.abs() - 1.0).abs() < f64::EPSILON));
        assert_abs_diff_eq!(Mean.compute(&w), 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(Variance::new(0).compute(&w), 1.0, epsilon = 0.01);
    }

    #[test]
    fn mammen_moments() {
        let (m, v, s) = WeightDist::Mammen.moments();
        let w = draws(WeightDist::Mammen, 400_000);
        assert_abs_diff_eq!(Mean.compute(&w), m, epsilon = 0.01);
        assert_abs_diff_eq!(Variance::new(0).compute(&w), v, epsilon = 0.01);
        assert_abs_diff_eq!(third_moment(&w), s, epsilon = 0.03);
    }

    #[test]
    fn webb_moments() {
        let (m, v, s) = WeightDist::Webb6.moments();
        let w = draws(WeightDist::Webb6, 400_000);
        assert_abs_diff_eq!(Mean.compute(&w), m, epsilon = 0.01);
        assert_abs_diff_eq!(Variance::new(0).compute(&w), v, epsilon = 0.01);
        assert_abs_diff_eq!(third_moment(&w), s, epsilon = 0.02);
        assert_abs_diff_eq!(Skewness::default().compute(&w), 0.0, epsilon = 0.02);
    }

    #[test]
    fn mammen_constants_have_unit_moments() {
        let p = MAMMEN_P_LOW;
        let mean = p * MAMMEN_LOW + (1.0 - p) * MAMMEN_HIGH;
        let var = p * MAMMEN_LOW.powi(2) + (1.0 - p) * MAMMEN_HIGH.powi(2);
        let third = p * MAMMEN_LOW.powi(3) + (1.0 - p) * MAMMEN_HIGH.powi(3);
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(third, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn names_parse() {
        assert_eq!("webb_6pt".parse::<WeightDist>().unwrap(), WeightDist::Webb6);
        assert_eq!("Mammen".parse::<WeightDist>().unwrap(), WeightDist::Mammen);
        assert_eq!(
            "normal".parse::<WeightDist>(),
            Err(ConfigError::UnknownDistribution("normal".to_string()))
        );
    }

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(recommend_distribution(5), WeightDist::Webb6);
        assert_eq!(recommend_distribution(10), WeightDist::Mammen);
        assert_eq!(recommend_distribution(29), WeightDist::Mammen);
        assert_eq!(recommend_distribution(30), WeightDist::Rademacher);
    }

    #[test]
    fn streams_are_reproducible_and_prefix_stable() {
        let clusters = Clusters::from_labels(0..12);
        let a: Vec<Vec<f64>> = WildWeights::new(WeightDist::Webb6, 42).re(&clusters).take(50).collect();
        let b: Vec<Vec<f64>> = WildWeights::new(WeightDist::Webb6, 42).re(&clusters).take(10).collect();
        assert_eq!(&a[..10], &b[..]);
        assert!(a.iter().all(|w| w.len() == 12));
        let c: Vec<Vec<f64>> = WildWeights::new(WeightDist::Webb6, 43).re(&clusters).take(10).collect();
        assert_ne!(&a[..10], &c[..]);
    }
}
