//! Distribution helpers and tolerance comparison.
//!
//! Wraps the `statrs` distributions used by the comparison engine and keeps
//! the relative-tolerance checks used to compare recomputed statistics with
//! published ones.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

use crate::error::{ComparisonError, Result};

/// Tolerance levels for checking recomputed values against published ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Relative tolerance for effect sizes (fraction, e.g., 0.01 = 1%).
    pub effect: f64,
    /// Relative tolerance for test statistics.
    pub statistic: f64,
    /// Absolute tolerance for p-values.
    pub p_value: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            effect: 0.01,
            statistic: 0.01,
            p_value: 0.005,
        }
    }
}

impl Tolerance {
    /// Tolerance for values copied from tables (stricter).
    #[must_use]
    pub const fn tabulated() -> Self {
        Self {
            effect: 0.001,
            statistic: 0.001,
            p_value: 0.0005,
        }
    }

    /// Tolerance for values read off figures (looser).
    #[must_use]
    pub const fn digitized() -> Self {
        Self {
            effect: 0.05,
            statistic: 0.05,
            p_value: 0.01,
        }
    }
}

/// Where a published value was taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Reported in the running text.
    #[default]
    Text,
    /// Copied from a table.
    Table,
    /// Read off a figure.
    Figure,
}

impl ValueSource {
    pub fn tolerance(self) -> Tolerance {
        match self {
            Self::Text => Tolerance::default(),
            Self::Table => Tolerance::tabulated(),
            Self::Figure => Tolerance::digitized(),
        }
    }
}

/// Checks if actual value is within tolerance of expected value.
#[inline]
#[must_use]
pub fn within_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    relative_difference(actual, expected) <= tolerance
}

/// Calculates relative difference between two values.
#[inline]
#[must_use]
pub fn relative_difference(actual: f64, expected: f64) -> f64 {
    if expected.abs() < f64::EPSILON {
        actual.abs()
    } else {
        (actual - expected).abs() / expected.abs()
    }
}

/// Standard normal CDF.
#[inline]
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile.
#[inline]
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Two-sided p-value of a z statistic.
#[inline]
#[must_use]
pub fn two_sided_normal_pvalue(z: f64) -> f64 {
    (2.0 * normal_cdf(-z.abs())).clamp(0.0, 1.0)
}

/// Central Student's t(df).
pub fn students_t(df: f64) -> Result<StudentsT> {
    StudentsT::new(0.0, 1.0, df)
        .map_err(|e| ComparisonError::InvalidInput(format!("t-distribution with df = {df}: {e}")))
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
///
/// Evaluated as `2 * CDF(-|t|)`, which equals `2 * (1 - CDF(|t|))` without
/// losing the small tail to cancellation.
pub fn two_sided_t_pvalue(t: f64, df: f64) -> Result<f64> {
    if t.is_nan() {
        return Err(ComparisonError::InvalidInput(
            "t statistic is NaN".to_string(),
        ));
    }
    let dist = students_t(df)?;
    Ok((2.0 * dist.cdf(-t.abs())).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_tolerance_pass() {
        assert!(within_tolerance(100.5, 100.0, 0.01));
    }

    #[test]
    fn test_within_tolerance_fail() {
        assert!(!within_tolerance(102.0, 100.0, 0.01));
    }

    #[test]
    fn test_within_tolerance_near_zero_is_absolute() {
        assert!(within_tolerance(0.004, 0.0, 0.005));
        assert!(!within_tolerance(0.006, 0.0, 0.005));
    }

    #[test]
    fn test_tolerance_default() {
        let tol = Tolerance::default();
        assert!((tol.effect - 0.01).abs() < f64::EPSILON);
        assert!(Tolerance::tabulated().effect < tol.effect);
        assert!(Tolerance::digitized().effect > tol.effect);
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.959_963_984_540_054) - 0.975).abs() < 1e-9);
        assert!((normal_quantile(0.975) - 1.959_963_984_540_054).abs() < 1e-8);
    }

    #[test]
    fn t_pvalue_is_two_sided() {
        let p = two_sided_t_pvalue(2.0, 10.0).unwrap();
        let p_neg = two_sided_t_pvalue(-2.0, 10.0).unwrap();
        assert!((p - p_neg).abs() < 1e-15);
        // R: 2 * pt(-2, 10)
        assert!((p - 0.073_388_034_770_6).abs() < 1e-9);
        assert!((two_sided_t_pvalue(0.0, 10.0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn t_pvalue_rejects_bad_df() {
        assert!(two_sided_t_pvalue(1.0, 0.0).is_err());
    }
}
