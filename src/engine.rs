//! Two-group comparison from summary statistics.
//!
//! Computes the t-test, Cohen's d and Hedges' g (with noncentral-t
//! intervals) from means, standard deviations and sample sizes alone, plus
//! the baseline adjustment, the effect-size contrast and Bonferroni
//! correction used on top of those results.

use crate::error::{ComparisonError, Result};
use crate::noncentral::noncentrality_interval;
use crate::stats::{normal_quantile, two_sided_normal_pvalue, two_sided_t_pvalue};
use crate::types::{
    AdjustedComparisonResult, CompareOptions, ComparisonResult, GroupSummary, PairwiseDifference,
    VarianceAssumption,
};

/// Compares `group1` against `group2`.
///
/// Cohen's d uses the unweighted average of the two variances as its
/// denominator whatever the variance assumption, and Hedges' correction
/// always uses `n1 + n2 - 2`. Both intervals are noncentral-t intervals on
/// `n1 + n2 - 2` degrees of freedom.
pub fn compare(
    group1: &GroupSummary,
    group2: &GroupSummary,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    group1.validate("group1")?;
    group2.validate("group2")?;
    options.validate()?;

    let n1 = f64::from(group1.n);
    let n2 = f64::from(group2.n);
    let v1 = group1.variance();
    let v2 = group2.variance();
    let mean_difference = group1.mean - group2.mean;
    let total_df = n1 + n2 - 2.0;

    if v1 == 0.0 && v2 == 0.0 {
        return zero_variance_result(mean_difference, total_df, options);
    }

    let (standard_error, degrees_of_freedom) = match options.variance {
        VarianceAssumption::Welch => {
            let a1 = v1 / n1;
            let a2 = v2 / n2;
            let se = (a1 + a2).sqrt();
            let df = (a1 + a2).powi(2) / (a1.powi(2) / (n1 - 1.0) + a2.powi(2) / (n2 - 1.0));
            (se, df)
        }
        VarianceAssumption::Pooled => {
            let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / total_df;
            (((1.0 / n1 + 1.0 / n2) * pooled).sqrt(), total_df)
        }
    };

    let t_statistic = (mean_difference - options.null_difference) / standard_error;
    let p_value = two_sided_t_pvalue(t_statistic, degrees_of_freedom)?;

    let cohen_d = mean_difference / ((v1 + v2) / 2.0).sqrt();
    let hedges_g = cohen_d * hedges_correction(group1.n, group2.n);

    let scale = (1.0 / n1 + 1.0 / n2).sqrt();
    let (cohen_d_lower, cohen_d_upper) =
        effect_size_interval(cohen_d, scale, total_df, options.confidence_level)?;
    let (ci_lower, ci_upper) =
        effect_size_interval(hedges_g, scale, total_df, options.confidence_level)?;

    Ok(ComparisonResult {
        mean_difference,
        standard_error,
        degrees_of_freedom,
        t_statistic,
        p_value,
        cohen_d,
        cohen_d_lower,
        cohen_d_upper,
        hedges_g,
        ci_lower,
        ci_upper,
        confidence_level: options.confidence_level,
    })
}

/// Both groups constant: only "no difference" has a defined answer.
fn zero_variance_result(
    mean_difference: f64,
    total_df: f64,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    if mean_difference != 0.0 || options.null_difference != 0.0 {
        return Err(ComparisonError::DegenerateInput(format!(
            "both standard deviations are zero with mean difference {mean_difference} \
             (null difference {})",
            options.null_difference
        )));
    }
    Ok(ComparisonResult {
        mean_difference: 0.0,
        standard_error: 0.0,
        degrees_of_freedom: total_df,
        t_statistic: 0.0,
        p_value: 1.0,
        cohen_d: 0.0,
        cohen_d_lower: 0.0,
        cohen_d_upper: 0.0,
        hedges_g: 0.0,
        ci_lower: 0.0,
        ci_upper: 0.0,
        confidence_level: options.confidence_level,
    })
}

/// Hedges' small-sample correction `1 - 3 / (4 (n1 + n2 - 2) - 1)`.
#[inline]
pub fn hedges_correction(n1: u32, n2: u32) -> f64 {
    let df = f64::from(n1) + f64::from(n2) - 2.0;
    1.0 - 3.0 / (4.0 * df - 1.0)
}

/// Noncentral-t interval for a standardized mean difference `effect`,
/// where `scale = sqrt(1/n1 + 1/n2)` converts between effect and t scale.
fn effect_size_interval(
    effect: f64,
    scale: f64,
    df: f64,
    confidence_level: f64,
) -> Result<(f64, f64)> {
    let (lower, upper) = noncentrality_interval(effect / scale, df, confidence_level)?;
    Ok((lower * scale, upper * scale))
}

/// Subtracts the baseline Hedges' g from a later comparison of the same pairing.
///
/// The baseline is a fixed offset: its own uncertainty is not carried into
/// the adjusted interval.
pub fn adjust_for_baseline(
    post: &ComparisonResult,
    baseline: &ComparisonResult,
) -> AdjustedComparisonResult {
    AdjustedComparisonResult {
        adjusted_g: post.hedges_g - baseline.hedges_g,
        adjusted_lower: post.ci_lower - baseline.hedges_g,
        adjusted_upper: post.ci_upper - baseline.hedges_g,
    }
}

/// z-test for the difference between two independent effect sizes.
pub fn pairwise_effect_size_difference(
    g1: f64,
    se1: f64,
    g2: f64,
    se2: f64,
) -> Result<PairwiseDifference> {
    if !(se1 > 0.0 && se2 > 0.0) {
        return Err(ComparisonError::InvalidInput(format!(
            "standard errors must be positive, got {se1} and {se2}"
        )));
    }
    if !(g1.is_finite() && g2.is_finite() && se1.is_finite() && se2.is_finite()) {
        return Err(ComparisonError::InvalidInput(
            "effect sizes and standard errors must be finite".to_string(),
        ));
    }
    let z_statistic = (g1 - g2) / se1.hypot(se2);
    Ok(PairwiseDifference {
        z_statistic,
        p_value: two_sided_normal_pvalue(z_statistic),
    })
}

/// Standard error implied by an equal-tailed interval at `confidence_level`,
/// read as `estimate ± z · SE`.
pub fn standard_error_from_interval(lower: f64, upper: f64, confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ComparisonError::InvalidInput(format!(
            "confidence level must be in (0, 1), got {confidence_level}"
        )));
    }
    if upper.is_nan() || lower.is_nan() || upper < lower {
        return Err(ComparisonError::InvalidInput(format!(
            "interval upper limit {upper} is below lower limit {lower}"
        )));
    }
    let z = normal_quantile(1.0 - (1.0 - confidence_level) / 2.0);
    Ok((upper - lower) / (2.0 * z))
}

/// Bonferroni adjustment over one family: `min(1, p · k)`.
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    bonferroni_within(p_values, p_values.len())
}

/// Bonferroni adjustment when the family has more members than p-values,
/// e.g. planned comparisons that failed. `k` is at least `p_values.len()`.
pub fn bonferroni_within(p_values: &[f64], family_size: usize) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let k = family_size.max(p_values.len()) as f64;
    p_values.iter().map(|p| (p * k).min(1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn welch() -> CompareOptions {
        CompareOptions::default()
    }

    fn pooled() -> CompareOptions {
        CompareOptions {
            variance: VarianceAssumption::Pooled,
            ..CompareOptions::default()
        }
    }

    fn treatment() -> GroupSummary {
        GroupSummary::new(69.7, 14.4, 34)
    }

    fn control() -> GroupSummary {
        GroupSummary::new(35.0, 27.0, 40)
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual} (tol {tol})"
        );
    }

    #[test]
    fn welch_matches_closed_form() {
        let result = compare(&treatment(), &control(), &welch()).unwrap();

        let a1 = 14.4_f64.powi(2) / 34.0;
        let a2 = 27.0_f64.powi(2) / 40.0;
        let se = (a1 + a2).sqrt();
        let df = (a1 + a2).powi(2) / (a1.powi(2) / 33.0 + a2.powi(2) / 39.0);

        assert_close(result.mean_difference, 34.7, 1e-12);
        assert_close(result.standard_error, se, 1e-12);
        assert_close(result.degrees_of_freedom, df, 1e-9);
        assert_close(result.t_statistic, 34.7 / se, 1e-12);
        assert_close(result.t_statistic, 7.035_801_087_781_87, 1e-6);
        assert_close(result.degrees_of_freedom, 61.349_980_924_468_4, 1e-6);
        assert_close(result.p_value, 1.958_119_146_130_44e-9, 1e-6);
    }

    #[test]
    fn welch_effect_sizes_and_intervals() {
        let result = compare(&treatment(), &control(), &welch()).unwrap();
        assert_close(result.cohen_d, 1.603_699_693_279_29, 1e-9);
        assert_close(result.hedges_g, 1.586_936_281_851_29, 1e-9);
        assert_close(result.cohen_d_lower, 1.072_776_895_517_57, 1e-5);
        assert_close(result.cohen_d_upper, 2.126_124_437_157_14, 1e-5);
        assert_close(result.ci_lower, 1.057_388_837_655_13, 1e-5);
        assert_close(result.ci_upper, 2.108_033_659_759_19, 1e-5);
    }

    #[test]
    fn pooled_uses_total_df() {
        let result = compare(&treatment(), &control(), &pooled()).unwrap();
        assert_close(result.degrees_of_freedom, 72.0, 1e-12);
        assert_close(result.standard_error, 5.163_055_268_528_74, 1e-9);
        assert_close(result.t_statistic, 6.720_826_757_658_96, 1e-9);
        assert_close(result.p_value, 3.601_504_229_876_41e-9, 1e-6);
    }

    #[test]
    fn effect_size_ignores_variance_assumption() {
        let w = compare(&treatment(), &control(), &welch()).unwrap();
        let p = compare(&treatment(), &control(), &pooled()).unwrap();
        assert_close(w.cohen_d, p.cohen_d, 1e-15);
        assert_close(w.hedges_g, p.hedges_g, 1e-15);
        assert_close(w.ci_lower, p.ci_lower, 1e-12);
        assert_close(w.ci_upper, p.ci_upper, 1e-12);
    }

    #[test]
    fn small_sample_interval_crosses_zero() {
        let g1 = GroupSummary::new(5.2, 1.1, 12);
        let g2 = GroupSummary::new(4.1, 1.4, 10);
        let result = compare(&g1, &g2, &welch()).unwrap();
        assert_close(result.t_statistic, 2.019_000_147_253_53, 1e-9);
        assert_close(result.p_value, 0.059_575_192_358_814_6, 1e-6);
        assert_close(result.hedges_g, 0.840_551_936_177_283, 1e-9);
        assert_close(result.ci_lower, -0.047_207_627_892_662_4, 1e-5);
        assert_close(result.ci_upper, 1.709_209_243_201_43, 1e-5);
    }

    #[test]
    fn swapping_groups_negates_signed_quantities() {
        let cases = [
            ((69.7, 14.4, 34), (35.0, 27.0, 40)),
            ((5.2, 1.1, 12), (4.1, 1.4, 10)),
            ((-3.0, 0.5, 3), (-2.0, 2.5, 7)),
        ];
        for options in [welch(), pooled()] {
            for &((m1, s1, n1), (m2, s2, n2)) in &cases {
                let a = GroupSummary::new(m1, s1, n1);
                let b = GroupSummary::new(m2, s2, n2);
                let ab = compare(&a, &b, &options).unwrap();
                let ba = compare(&b, &a, &options).unwrap();
                assert_close(ab.mean_difference, -ba.mean_difference, 1e-12);
                assert_close(ab.t_statistic, -ba.t_statistic, 1e-12);
                assert_close(ab.cohen_d, -ba.cohen_d, 1e-12);
                assert_close(ab.hedges_g, -ba.hedges_g, 1e-12);
                assert_close(ab.ci_lower, -ba.ci_upper, 1e-5);
                assert_close(ab.ci_upper, -ba.ci_lower, 1e-5);
                assert_close(ab.cohen_d_lower, -ba.cohen_d_upper, 1e-5);
                assert_close(ab.p_value, ba.p_value, 1e-15);
                assert_close(ab.standard_error, ba.standard_error, 1e-15);
                assert_close(ab.degrees_of_freedom, ba.degrees_of_freedom, 1e-9);
            }
        }
    }

    #[test]
    fn p_value_in_unit_interval_and_g_shrinks() {
        for n in [2_u32, 3, 5, 20, 200] {
            for diff in [-50.0, -1.0, 0.0, 0.3, 8.0] {
                let a = GroupSummary::new(10.0 + diff, 2.0, n);
                let b = GroupSummary::new(10.0, 3.0, n + 1);
                let result = compare(&a, &b, &welch()).unwrap();
                assert!((0.0..=1.0).contains(&result.p_value));
                assert!(result.hedges_g.abs() <= result.cohen_d.abs());
                assert!(result.ci_lower <= result.hedges_g && result.hedges_g <= result.ci_upper);
            }
        }
    }

    #[test]
    fn large_samples_converge() {
        let small = compare(
            &GroupSummary::new(10.5, 2.0, 20),
            &GroupSummary::new(10.0, 2.0, 20),
            &welch(),
        )
        .unwrap();
        let large = compare(
            &GroupSummary::new(10.5, 2.0, 200_000),
            &GroupSummary::new(10.0, 2.0, 200_000),
            &welch(),
        )
        .unwrap();
        assert!((large.hedges_g - large.cohen_d).abs() < 1e-5);
        assert!((large.hedges_g - large.cohen_d).abs() < (small.hedges_g - small.cohen_d).abs());
        assert!(large.ci_upper - large.ci_lower < 0.02);
        assert!(large.ci_upper - large.ci_lower < small.ci_upper - small.ci_lower);
    }

    #[test]
    fn equal_groups_give_null_result() {
        let g = GroupSummary::new(10.0, 5.0, 20);
        let result = compare(&g, &g, &welch()).unwrap();
        assert_close(result.mean_difference, 0.0, 0.0);
        assert_close(result.t_statistic, 0.0, 0.0);
        assert_close(result.p_value, 1.0, 1e-12);
        assert_close(result.cohen_d, 0.0, 0.0);
        assert_close(result.hedges_g, 0.0, 0.0);
        assert_close(result.ci_lower, -result.ci_upper, 1e-6);
    }

    #[test]
    fn zero_variance_equal_means_is_defined() {
        let g = GroupSummary::new(5.0, 0.0, 10);
        let result = compare(&g, &g, &welch()).unwrap();
        assert_close(result.t_statistic, 0.0, 0.0);
        assert_close(result.p_value, 1.0, 0.0);
        assert_close(result.hedges_g, 0.0, 0.0);
    }

    #[test]
    fn zero_variance_different_means_is_degenerate() {
        let a = GroupSummary::new(5.0, 0.0, 10);
        let b = GroupSummary::new(7.0, 0.0, 10);
        assert!(matches!(
            compare(&a, &b, &welch()),
            Err(ComparisonError::DegenerateInput(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let good = GroupSummary::new(1.0, 1.0, 10);
        assert!(matches!(
            compare(&GroupSummary::new(1.0, 1.0, 1), &good, &welch()),
            Err(ComparisonError::InvalidInput(_))
        ));
        assert!(matches!(
            compare(&good, &GroupSummary::new(1.0, -1.0, 10), &welch()),
            Err(ComparisonError::InvalidInput(_))
        ));
        let bad_level = CompareOptions {
            confidence_level: 0.0,
            ..welch()
        };
        assert!(matches!(
            compare(&good, &good, &bad_level),
            Err(ComparisonError::InvalidInput(_))
        ));
    }

    #[test]
    fn null_difference_shifts_t() {
        let options = CompareOptions {
            null_difference: 34.7,
            ..welch()
        };
        let result = compare(&treatment(), &control(), &options).unwrap();
        assert_close(result.t_statistic, 0.0, 1e-12);
        assert_close(result.p_value, 1.0, 1e-12);
        assert_close(result.cohen_d, 1.603_699_693_279_29, 1e-9);
    }

    #[test]
    fn baseline_adjustment_is_translation_invariant() {
        let post = compare(&treatment(), &control(), &welch()).unwrap();
        let baseline = compare(
            &GroupSummary::new(36.0, 20.0, 34),
            &GroupSummary::new(33.0, 22.0, 40),
            &welch(),
        )
        .unwrap();
        let adjusted = adjust_for_baseline(&post, &baseline);
        let shift = baseline.hedges_g;
        assert_close(adjusted.adjusted_g, post.hedges_g - shift, 1e-15);
        assert_close(adjusted.adjusted_lower, post.ci_lower - shift, 1e-15);
        assert_close(adjusted.adjusted_upper, post.ci_upper - shift, 1e-15);

        let k = 0.75;
        let shifted = ComparisonResult {
            hedges_g: baseline.hedges_g + k,
            ci_lower: baseline.ci_lower + k,
            ci_upper: baseline.ci_upper + k,
            ..baseline
        };
        let moved = adjust_for_baseline(&post, &shifted);
        assert_close(moved.adjusted_g, adjusted.adjusted_g - k, 1e-12);
        assert_close(moved.adjusted_lower, adjusted.adjusted_lower - k, 1e-12);
        assert_close(moved.adjusted_upper, adjusted.adjusted_upper - k, 1e-12);
    }

    #[test]
    fn pairwise_difference_matches_normal_test() {
        let result = pairwise_effect_size_difference(0.8, 0.2, 0.3, 0.25).unwrap();
        assert_close(result.z_statistic, 0.5 / 0.1025_f64.sqrt(), 1e-12);
        assert_close(result.p_value, 0.118_349_812_735_628, 1e-9);

        let flipped = pairwise_effect_size_difference(0.3, 0.25, 0.8, 0.2).unwrap();
        assert_close(flipped.z_statistic, -result.z_statistic, 1e-12);
        assert_close(flipped.p_value, result.p_value, 1e-15);
    }

    #[test]
    fn pairwise_difference_requires_positive_se() {
        assert!(matches!(
            pairwise_effect_size_difference(0.8, 0.0, 0.3, 0.25),
            Err(ComparisonError::InvalidInput(_))
        ));
        assert!(pairwise_effect_size_difference(0.8, 0.2, 0.3, -1.0).is_err());
    }

    #[test]
    fn standard_error_from_95_interval() {
        let se = standard_error_from_interval(-1.96, 1.96, 0.95).unwrap();
        assert_close(se, 1.96 / 1.959_963_984_540_054, 1e-9);
        assert!(standard_error_from_interval(1.0, 0.0, 0.95).is_err());
        assert!(standard_error_from_interval(f64::NAN, 1.0, 0.95).is_err());
        assert!(standard_error_from_interval(0.0, f64::NAN, 0.95).is_err());
    }

    #[test]
    fn bonferroni_caps_and_scales() {
        let adjusted = bonferroni(&[0.01, 0.2, 0.4, 0.0]);
        assert_eq!(adjusted, vec![0.04, 0.8, 1.0, 0.0]);
        assert!(bonferroni(&[]).is_empty());
    }

    #[test]
    fn bonferroni_monotone_in_family_size() {
        let p = 0.03;
        let mut previous = 0.0;
        for k in 1..=40 {
            let family = vec![p; k];
            let adjusted = bonferroni(&family)[0];
            assert!(adjusted >= previous);
            #[allow(clippy::cast_precision_loss)]
            let expected = (p * k as f64).min(1.0);
            assert_close(adjusted, expected, 1e-15);
            previous = adjusted;
        }
    }

    #[test]
    fn bonferroni_counts_members_without_p_values() {
        let adjusted = bonferroni_within(&[0.01, 0.2], 3);
        assert_close(adjusted[0], 0.03, 1e-15);
        assert_close(adjusted[1], 0.6, 1e-15);
        // Never smaller than the number of p-values given.
        assert_eq!(bonferroni_within(&[0.1, 0.1], 0), bonferroni(&[0.1, 0.1]));
    }

    #[test]
    fn interval_search_fails_on_extreme_separation() {
        let far = GroupSummary::new(1e12, 1.0, 10);
        let near = GroupSummary::new(0.0, 1.0, 10);
        let result = compare(&far, &near, &welch());
        assert!(
            matches!(result, Err(ComparisonError::ConvergenceFailure(_))),
            "{result:?}"
        );
    }
}
