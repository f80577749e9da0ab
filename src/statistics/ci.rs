use std::fmt;
use std::ops::{Add, Sub};

use num_traits::Float;
use serde::Serialize;

/// Interval with an optional point estimate and confidence level.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct Interval<T> {
    pub lower: T,
    pub upper: T,
    pub estimate: Option<T>,
    pub confidence: Option<f64>,
}

impl<T: PartialOrd + Copy> Interval<T> {
    #[inline]
    pub const fn new(lower: T, upper: T) -> Self {
        Self { lower, upper, estimate: None, confidence: None }
    }

    /// `[estimate - error, estimate + error]`.
    #[inline]
    pub fn symmetric(estimate: T, error: T) -> Self
    where
        T: Sub<Output = T> + Add<Output = T>,
    {
        Self {
            lower: estimate - error,
            upper: estimate + error,
            estimate: Some(estimate),
            confidence: None,
        }
    }

    #[must_use]
    pub const fn estimate(mut self, estimate: T) -> Self {
        self.estimate = Some(estimate);
        self
    }

    #[must_use]
    pub const fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Inclusive membership.
    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        self.lower <= *value && *value <= self.upper
    }
}

impl<T: Float> Interval<T> {
    /// Both bounds `NaN`.
    pub fn nan() -> Self {
        Self::new(T::nan(), T::nan())
    }

    /// True when both bounds are finite.
    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }
}

impl<T: Float + fmt::Display> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(4);
        write!(f, "[{:.*}, {:.*}]", prec, self.lower, prec, self.upper)?;
        if let Some(c) = self.confidence {
            write!(f, " at {:.0}%", c * 100.0)?;
        }
        Ok(())
    }
}
