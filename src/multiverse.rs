//! Specification curve over the analytic choices of a study.
//!
//! Each variant is one combination of variance assumption, reading of
//! unlabelled error bars and baseline adjustment. Every effect computed
//! under every variant becomes one point of the curve.

use serde::Serialize;
use std::fmt;

use crate::batch::{run_study, ComparisonOutcome, RunSettings, StudyReport};
use crate::study::{CellRef, StudyFile};
use crate::types::{CompareOptions, IntervalKind, VarianceAssumption};

/// One combination of analytic choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Variant {
    pub variance: VarianceAssumption,
    pub interval: IntervalKind,
    pub baseline_adjusted: bool,
}

impl Variant {
    /// Variants that can actually differ for `study`.
    ///
    /// The interval axis collapses when no row has an unlabelled error bar,
    /// and the adjustment axis when the study has no baseline timepoint.
    pub fn for_study(study: &StudyFile) -> Vec<Self> {
        let intervals: Vec<IntervalKind> = if study.rows.iter().any(|r| r.is_ambiguous()) {
            IntervalKind::all().to_vec()
        } else {
            vec![study.analysis.default_interval]
        };
        let adjustments: &[bool] = if study.analysis.baseline_timepoint.is_some() {
            &[false, true]
        } else {
            &[false]
        };

        let mut variants = Vec::new();
        for variance in VarianceAssumption::all() {
            for &interval in &intervals {
                for &baseline_adjusted in adjustments {
                    variants.push(Self {
                        variance,
                        interval,
                        baseline_adjusted,
                    });
                }
            }
        }
        variants
    }

    fn settings(self, base: &CompareOptions) -> RunSettings {
        RunSettings {
            options: CompareOptions {
                variance: self.variance,
                ..*base
            },
            interval: self.interval,
            adjust_for_baseline: self.baseline_adjusted,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adjustment = if self.baseline_adjusted {
            "adjusted"
        } else {
            "raw"
        };
        write!(f, "{}/{}/{adjustment}", self.variance, self.interval)
    }
}

/// One effect under one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecificationPoint {
    pub variant: Variant,
    pub outcome: String,
    pub timepoint: String,
    pub condition: String,
    /// Hedges' g, or the baseline-adjusted g for adjusted variants.
    pub estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Raw two-sided p-value of the underlying t-test.
    pub p_value: f64,
    pub p_adjusted: Option<f64>,
    /// 1-based position when sorted by estimate.
    pub rank: usize,
}

impl SpecificationPoint {
    pub fn label(&self) -> String {
        format!(
            "{} {} {} [{}]",
            self.outcome, self.timepoint, self.condition, self.variant
        )
    }

    pub fn cell(&self) -> CellRef {
        CellRef::new(&self.outcome, &self.timepoint, &self.condition)
    }

    /// Whether the interval excludes zero.
    pub fn excludes_zero(&self) -> bool {
        self.ci_lower > 0.0 || self.ci_upper < 0.0
    }
}

/// `(label, estimate, ci_lower, ci_upper)` for plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotTuple {
    pub label: String,
    pub estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// All specification points of a study, ranked by estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecificationCurve {
    pub study: String,
    pub variants: Vec<Variant>,
    pub points: Vec<SpecificationPoint>,
    /// Comparisons that failed, summed over variants.
    pub failures: usize,
}

impl SpecificationCurve {
    pub fn plot_tuples(&self) -> Vec<PlotTuple> {
        self.points
            .iter()
            .map(|point| PlotTuple {
                label: point.label(),
                estimate: point.estimate,
                ci_lower: point.ci_lower,
                ci_upper: point.ci_upper,
            })
            .collect()
    }

    pub fn median_estimate(&self) -> Option<f64> {
        let n = self.points.len();
        if n == 0 {
            return None;
        }
        // Points are sorted by estimate.
        let mid = n / 2;
        Some(if n % 2 == 1 {
            self.points[mid].estimate
        } else {
            0.5 * (self.points[mid - 1].estimate + self.points[mid].estimate)
        })
    }

    /// Share of points whose interval excludes zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn share_excluding_zero(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let count = self.points.iter().filter(|p| p.excludes_zero()).count();
        count as f64 / self.points.len() as f64
    }
}

/// Runs `study` under every variant and ranks the resulting effects.
///
/// Baseline comparisons are not effects of interest and are left out of the
/// curve; adjusted variants contribute only comparisons that have a baseline.
pub fn run_multiverse(study: &StudyFile, base: &CompareOptions) -> SpecificationCurve {
    let variants = Variant::for_study(study);
    let baseline = study.analysis.baseline_timepoint.as_deref();

    let mut points = Vec::new();
    let mut failures = 0;
    for &variant in &variants {
        let report = run_study(study, &variant.settings(base));
        failures += report.failures().count();
        collect_points(&report, variant, baseline, &mut points);
    }

    // Equal estimates keep the declared cell order.
    let order = &study.levels;
    points.sort_by(|a, b| {
        a.estimate
            .total_cmp(&b.estimate)
            .then_with(|| order.compare_cells(&a.cell(), &b.cell()))
    });
    for (index, point) in points.iter_mut().enumerate() {
        point.rank = index + 1;
    }

    tracing::debug!(
        study = %study.name,
        variants = variants.len(),
        points = points.len(),
        failures,
        "specification curve built"
    );

    SpecificationCurve {
        study: study.name.clone(),
        variants,
        points,
        failures,
    }
}

fn collect_points(
    report: &StudyReport,
    variant: Variant,
    baseline: Option<&str>,
    points: &mut Vec<SpecificationPoint>,
) {
    for outcome in &report.comparisons {
        let ComparisonOutcome::Computed {
            key,
            result,
            adjusted,
            p_adjusted,
        } = outcome
        else {
            continue;
        };
        if baseline == Some(key.timepoint.as_str()) {
            continue;
        }
        let (estimate, ci_lower, ci_upper) = if variant.baseline_adjusted {
            let Some(adjusted) = adjusted else {
                continue;
            };
            (
                adjusted.adjusted_g,
                adjusted.adjusted_lower,
                adjusted.adjusted_upper,
            )
        } else {
            result.hedges_interval()
        };
        points.push(SpecificationPoint {
            variant,
            outcome: key.outcome.clone(),
            timepoint: key.timepoint.clone(),
            condition: key.condition.clone(),
            estimate,
            ci_lower,
            ci_upper,
            p_value: result.p_value,
            p_adjusted: *p_adjusted,
            rank: 0,
        });
    }
}
