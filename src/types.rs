//! Core records for two-group comparisons.
//!
//! Every record is a plain value: built once by the engine and never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ComparisonError, Result};

/// z value of a two-sided 95% interval, as used when authors report
/// `mean ± 1.96 · SE`.
pub const Z_95: f64 = 1.96;

/// Descriptive statistics of one observed group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group mean on the outcome scale.
    pub mean: f64,
    /// Group standard deviation.
    pub sd: f64,
    /// Number of observations.
    pub n: u32,
}

impl GroupSummary {
    pub const fn new(mean: f64, sd: f64, n: u32) -> Self {
        Self { mean, sd, n }
    }

    /// Reconstructs a summary from a plotted interval of half-width `half_width`.
    pub fn from_interval(mean: f64, half_width: f64, n: u32, kind: IntervalKind) -> Result<Self> {
        if !(half_width.is_finite() && half_width >= 0.0) {
            return Err(ComparisonError::InvalidInput(format!(
                "interval half-width must be finite and non-negative, got {half_width}"
            )));
        }
        Ok(Self::new(mean, kind.sd_from_half_width(half_width, n), n))
    }

    /// Checks `sd >= 0`, `n >= 2` and finiteness.
    pub fn validate(&self, label: &str) -> Result<()> {
        if self.n < 2 {
            return Err(ComparisonError::InvalidInput(format!(
                "{label}: need at least 2 observations, got n = {}",
                self.n
            )));
        }
        if !self.mean.is_finite() {
            return Err(ComparisonError::InvalidInput(format!(
                "{label}: mean must be finite, got {}",
                self.mean
            )));
        }
        if !self.sd.is_finite() || self.sd < 0.0 {
            return Err(ComparisonError::InvalidInput(format!(
                "{label}: standard deviation must be finite and non-negative, got {}",
                self.sd
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.sd * self.sd
    }
}

/// How the error bar of a plotted mean was defined by the source study.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalKind {
    /// 95% confidence interval of the mean.
    #[default]
    Ci95,
    /// One standard error of the mean.
    Sem,
}

impl IntervalKind {
    /// `w / 1.96 · √n` for a 95% CI, `w · √n` for an SEM band.
    pub fn sd_from_half_width(self, half_width: f64, n: u32) -> f64 {
        let root_n = f64::from(n).sqrt();
        match self {
            Self::Ci95 => half_width / Z_95 * root_n,
            Self::Sem => half_width * root_n,
        }
    }

    pub const fn all() -> [Self; 2] {
        [Self::Ci95, Self::Sem]
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ci95 => f.write_str("ci95"),
            Self::Sem => f.write_str("sem"),
        }
    }
}

/// Variance model for the standard error and degrees of freedom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceAssumption {
    /// Unequal variances with Welch–Satterthwaite degrees of freedom.
    #[default]
    Welch,
    /// Equal variances, pooled by sample size.
    Pooled,
}

impl VarianceAssumption {
    pub const fn from_equal_variance(assume_equal_variance: bool) -> Self {
        if assume_equal_variance {
            Self::Pooled
        } else {
            Self::Welch
        }
    }

    pub const fn all() -> [Self; 2] {
        [Self::Welch, Self::Pooled]
    }
}

impl fmt::Display for VarianceAssumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welch => f.write_str("welch"),
            Self::Pooled => f.write_str("pooled"),
        }
    }
}

/// Options for [`crate::engine::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Confidence level of the effect-size intervals, in (0, 1).
    pub confidence_level: f64,
    pub variance: VarianceAssumption,
    /// Mean difference under the null hypothesis.
    pub null_difference: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            variance: VarianceAssumption::Welch,
            null_difference: 0.0,
        }
    }
}

impl CompareOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ComparisonError::InvalidInput(format!(
                "confidence level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if !self.null_difference.is_finite() {
            return Err(ComparisonError::InvalidInput(format!(
                "null difference must be finite, got {}",
                self.null_difference
            )));
        }
        Ok(())
    }
}

/// Result of comparing two groups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// `mean1 - mean2`.
    pub mean_difference: f64,
    pub standard_error: f64,
    /// Non-integer under Welch.
    pub degrees_of_freedom: f64,
    pub t_statistic: f64,
    /// Two-sided.
    pub p_value: f64,
    pub cohen_d: f64,
    pub cohen_d_lower: f64,
    pub cohen_d_upper: f64,
    pub hedges_g: f64,
    /// Lower limit of the Hedges' g interval.
    pub ci_lower: f64,
    /// Upper limit of the Hedges' g interval.
    pub ci_upper: f64,
    pub confidence_level: f64,
}

impl ComparisonResult {
    /// Hedges' g with its interval as a plotting tuple.
    pub const fn hedges_interval(&self) -> (f64, f64, f64) {
        (self.hedges_g, self.ci_lower, self.ci_upper)
    }
}

/// Difference-in-differences standardized effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedComparisonResult {
    pub adjusted_g: f64,
    pub adjusted_lower: f64,
    pub adjusted_upper: f64,
}

/// Test of whether two independent effect sizes differ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseDifference {
    pub z_statistic: f64,
    pub p_value: f64,
}
