//! Hike/cut asymmetry tests on a fitted event-time model.
//!
//! Every test compares the `hike` and `cut` coefficient of an offset. An
//! offset takes part only when both coefficients are identified; a test left
//! without any offset returns [`TestError::NoValidParameters`]. Tests work on
//! the parameter sub-vector and covariance sub-matrix of the offsets they
//! use, so aliased columns elsewhere in the model never reach them.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use super::wald::{chi2_sf, linear_combination, wald_statistic};
use crate::error::TestError;
use crate::regression::FittedModel;
use crate::stack::TreatVar;
use crate::statistics::{std_error, two_sided_p};

/// Offsets summed by the default cumulative test.
pub const KEY_PERIODS: [i32; 3] = [0, 6, 12];

/// Joint chi-square test of `β_hike(t) = β_cut(t)` over several offsets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaldTest {
    pub statistic: f64,
    /// Number of valid restrictions.
    pub df: usize,
    pub p_value: f64,
    pub times_tested: Vec<i32>,
    pub rejected_05: bool,
    pub rejected_01: bool,
}

/// Normal test of one linear combination of hike-minus-cut differences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifferenceTest {
    pub difference: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub times_tested: Vec<i32>,
    pub rejected_05: bool,
    pub rejected_01: bool,
}

/// Equality of the summed hike and cut effects over a set of offsets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeTest {
    pub periods: Vec<i32>,
    pub cum_hike: f64,
    pub cum_cut: f64,
    pub difference: f64,
    pub std_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub rejected_05: bool,
    pub rejected_01: bool,
}

/// Per-offset comparison using the joint covariance of the two coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairwiseRow {
    pub rel_time: i32,
    pub hike_coef: f64,
    pub hike_se: f64,
    pub cut_coef: f64,
    pub cut_se: f64,
    pub difference: f64,
    pub diff_se: f64,
    pub t_stat: f64,
    pub p_value: f64,
}

impl PairwiseRow {
    const fn pinned(rel_time: i32) -> Self {
        Self {
            rel_time,
            hike_coef: 0.0,
            hike_se: 0.0,
            cut_coef: 0.0,
            cut_se: 0.0,
            difference: 0.0,
            diff_se: 0.0,
            t_stat: 0.0,
            p_value: 1.0,
        }
    }

    const fn missing(rel_time: i32) -> Self {
        Self {
            rel_time,
            hike_coef: f64::NAN,
            hike_se: f64::NAN,
            cut_coef: f64::NAN,
            cut_se: f64::NAN,
            difference: f64::NAN,
            diff_se: f64::NAN,
            t_stat: f64::NAN,
            p_value: f64::NAN,
        }
    }
}

/// Overall reading of the joint-style tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Smallest p-value above 0.10.
    Symmetric,
    /// Smallest p-value in (0.05, 0.10].
    WeakAsymmetry,
    /// Smallest p-value at or below 0.05.
    Asymmetric,
    /// The tests ran but none produced a p-value.
    Inconclusive,
}

impl Verdict {
    pub fn from_p_value(min_p: f64) -> Self {
        if min_p.is_nan() {
            Verdict::Inconclusive
        } else if min_p <= 0.05 {
            Verdict::Asymmetric
        } else if min_p <= 0.10 {
            Verdict::WeakAsymmetry
        } else {
            Verdict::Symmetric
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Symmetric => "symmetric",
            Verdict::WeakAsymmetry => "weak asymmetry",
            Verdict::Asymmetric => "asymmetric",
            Verdict::Inconclusive => "inconclusive",
        })
    }
}

/// Results of [`AsymmetryTests::run_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct AsymmetrySummary {
    /// Joint test over every offset except the base.
    pub joint_all: Result<WaldTest, TestError>,
    /// Joint test over `0..=H`.
    pub joint_post: Result<WaldTest, TestError>,
    pub average: Result<DifferenceTest, TestError>,
    /// Cumulative test over [`KEY_PERIODS`].
    pub cumulative: Result<CumulativeTest, TestError>,
    pub pairwise: Vec<PairwiseRow>,
    /// Smallest finite p-value among the joint and cumulative tests; 1 when
    /// none ran, `NaN` when they ran without a finite p-value.
    pub min_p_value: f64,
    pub verdict: Verdict,
}

impl AsymmetrySummary {
    /// `min_p_value > 0.05`.
    pub fn is_symmetric(&self) -> bool {
        self.min_p_value > 0.05
    }
}

fn rejected(p: f64) -> (bool, bool) {
    (p < 0.05, p < 0.01)
}

fn t_test(value: f64, se: f64) -> (f64, f64) {
    let t = if se > 0.0 { value / se } else { f64::NAN };
    (t, two_sided_p(t))
}

/// Offset with the parameter indices of its hike and cut coefficients.
#[derive(Debug, Clone, Copy)]
struct Pair {
    t: i32,
    hike: usize,
    cut: usize,
}

/// Asymmetry test suite over one fitted model.
#[derive(Debug, Clone, Copy)]
pub struct AsymmetryTests<'a> {
    model: &'a FittedModel,
    hike: TreatVar,
    cut: TreatVar,
}

impl<'a> AsymmetryTests<'a> {
    /// Compares [`TreatVar::PosShock`] with [`TreatVar::NegShock`].
    pub fn new(model: &'a FittedModel) -> Self {
        Self {
            model,
            hike: TreatVar::PosShock,
            cut: TreatVar::NegShock,
        }
    }

    /// Compares two other variables.
    #[must_use]
    pub fn variables(mut self, hike: TreatVar, cut: TreatVar) -> Self {
        self.hike = hike;
        self.cut = cut;
        self
    }

    /// Hike and cut parameter indices at `t` when both coefficients and
    /// their variances are finite.
    fn pair(&self, t: i32) -> Option<(usize, usize)> {
        if t == self.model.base_period() {
            return None;
        }
        let h = self.model.column(t, self.hike)?;
        let c = self.model.column(t, self.cut)?;
        let identified = |i: usize| {
            self.model.params().get(i).is_some_and(|p| p.is_finite())
                && self.model.cov().get((i, i)).is_some_and(|v| v.is_finite())
        };
        (identified(h) && identified(c)).then_some((h, c))
    }

    fn valid_pairs(&self, times: &[i32]) -> Vec<Pair> {
        times
            .iter()
            .filter_map(|&t| self.pair(t).map(|(hike, cut)| Pair { t, hike, cut }))
            .collect()
    }

    /// Parameters and covariance over the columns of `pairs`, ordered
    /// `(hike, cut)` per pair.
    fn restrict(&self, pairs: &[Pair]) -> (DVector<f64>, DMatrix<f64>) {
        let idx: Vec<usize> = pairs.iter().flat_map(|p| [p.hike, p.cut]).collect();
        let params = self.model.params().select_rows(idx.iter());
        let cov = self.model.cov().select_rows(idx.iter()).select_columns(idx.iter());
        (params, cov)
    }

    fn all_offsets(&self) -> Vec<i32> {
        let h = self.model.half_window();
        (-h..=h).filter(|&t| t != self.model.base_period()).collect()
    }

    /// Joint Wald test of equality at `times` (every non-base offset when
    /// `None`).
    pub fn wald_equality(&self, times: Option<&[i32]>) -> Result<WaldTest, TestError> {
        let times = times.map_or_else(|| self.all_offsets(), <[i32]>::to_vec);
        let pairs = self.valid_pairs(&times);
        if pairs.is_empty() {
            return Err(TestError::NoValidParameters);
        }

        let (params, cov) = self.restrict(&pairs);
        let df = pairs.len();
        let r = DMatrix::from_fn(df, 2 * df, |row, col| match col.checked_sub(2 * row) {
            Some(0) => 1.0,
            Some(1) => -1.0,
            _ => 0.0,
        });
        let statistic = wald_statistic(&params, &cov, &r);
        let p_value = chi2_sf(statistic, df);
        let (rejected_05, rejected_01) = rejected(p_value);
        Ok(WaldTest {
            statistic,
            df,
            p_value,
            times_tested: pairs.iter().map(|p| p.t).collect(),
            rejected_05,
            rejected_01,
        })
    }

    /// Joint test over the post-event offsets `0..=H`.
    pub fn joint_post(&self) -> Result<WaldTest, TestError> {
        let post: Vec<i32> = (0..=self.model.half_window()).collect();
        self.wald_equality(Some(&post))
    }

    /// t-test of the mean hike-minus-cut difference over `times`.
    pub fn average_difference(&self, times: Option<&[i32]>) -> Result<DifferenceTest, TestError> {
        let times = times.map_or_else(|| self.all_offsets(), <[i32]>::to_vec);
        let pairs = self.valid_pairs(&times);
        if pairs.is_empty() {
            return Err(TestError::NoValidParameters);
        }
        let (params, cov) = self.restrict(&pairs);
        let share = 1.0 / pairs.len() as f64;
        let row = DVector::from_fn(params.len(), |i, _| if i % 2 == 0 { share } else { -share });
        let (difference, std_error) = linear_combination(&params, &cov, &row);
        let (t_statistic, p_value) = t_test(difference, std_error);
        let (rejected_05, rejected_01) = rejected(p_value);
        Ok(DifferenceTest {
            difference,
            std_error,
            t_statistic,
            p_value,
            times_tested: pairs.iter().map(|p| p.t).collect(),
            rejected_05,
            rejected_01,
        })
    }

    /// Equality of the summed effects over `periods`.
    pub fn cumulative(&self, periods: &[i32]) -> Result<CumulativeTest, TestError> {
        let pairs = self.valid_pairs(periods);
        if pairs.is_empty() {
            return Err(TestError::NoValidParameters);
        }
        let (params, cov) = self.restrict(&pairs);
        let hike = DVector::from_fn(params.len(), |i, _| if i % 2 == 0 { 1.0 } else { 0.0 });
        let cut = DVector::from_fn(params.len(), |i, _| if i % 2 == 1 { 1.0 } else { 0.0 });
        let cum_hike = hike.dot(&params);
        let cum_cut = cut.dot(&params);
        let (difference, std_error) = linear_combination(&params, &cov, &(hike - cut));
        let (t_statistic, p_value) = t_test(difference, std_error);
        let (rejected_05, rejected_01) = rejected(p_value);
        Ok(CumulativeTest {
            periods: pairs.iter().map(|p| p.t).collect(),
            cum_hike,
            cum_cut,
            difference,
            std_error,
            t_statistic,
            p_value,
            rejected_05,
            rejected_01,
        })
    }

    /// One row per offset in `-H..=H`: base pinned, unidentified offsets `NaN`.
    pub fn pairwise(&self) -> Vec<PairwiseRow> {
        let h = self.model.half_window();
        (-h..=h)
            .map(|t| {
                if t == self.model.base_period() {
                    return PairwiseRow::pinned(t);
                }
                let Some((hike, cut)) = self.pair(t) else {
                    return PairwiseRow::missing(t);
                };
                let (p, v) = self.restrict(&[Pair { t, hike, cut }]);
                let (difference, diff_se) = linear_combination(&p, &v, &DVector::from_vec(vec![1.0, -1.0]));
                let (t_stat, p_value) = t_test(difference, diff_se);
                let coef = |i: usize| p.get(i).copied().unwrap_or(f64::NAN);
                let se = |i: usize| v.get((i, i)).copied().map_or(f64::NAN, std_error);
                PairwiseRow {
                    rel_time: t,
                    hike_coef: coef(0),
                    hike_se: se(0),
                    cut_coef: coef(1),
                    cut_se: se(1),
                    difference,
                    diff_se,
                    t_stat,
                    p_value,
                }
            })
            .collect()
    }

    /// Runs every test and derives the verdict.
    pub fn run_all(&self) -> AsymmetrySummary {
        let joint_all = self.wald_equality(None);
        let joint_post = self.joint_post();
        let average = self.average_difference(None);
        let cumulative = self.cumulative(&KEY_PERIODS);

        let ran: Vec<f64> = [
            joint_all.as_ref().map(|t| t.p_value),
            joint_post.as_ref().map(|t| t.p_value),
            cumulative.as_ref().map(|t| t.p_value),
        ]
        .into_iter()
        .flatten()
        .collect();
        let min_p_value = if ran.is_empty() {
            1.0
        } else {
            ran.into_iter().filter(|p| !p.is_nan()).reduce(f64::min).unwrap_or(f64::NAN)
        };

        AsymmetrySummary {
            joint_all,
            joint_post,
            average,
            cumulative,
            pairwise: self.pairwise(),
            min_p_value,
            verdict: Verdict::from_p_value(min_p_value),
        }
    }
}
