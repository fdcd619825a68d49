//! Runs every comparison of a study.
//!
//! One comparison per outcome, timepoint and non-control condition. A
//! failing comparison is recorded and the rest still run.

use serde::Serialize;
use std::collections::HashMap;

use crate::engine::{
    adjust_for_baseline, bonferroni_within, compare, pairwise_effect_size_difference,
    standard_error_from_interval,
};
use crate::error::{ComparisonError, Result};
use crate::stats::within_tolerance;
use crate::study::{CellRef, ContrastSpec, ExpectedEffect, LevelOrder, StudyFile};
use crate::types::{
    AdjustedComparisonResult, CompareOptions, ComparisonResult, GroupSummary, IntervalKind,
    PairwiseDifference,
};

/// Settings for one run over a study.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSettings {
    pub options: CompareOptions,
    /// Reading of unlabelled error bars.
    pub interval: IntervalKind,
    /// Attach baseline-adjusted effects when the study has a baseline.
    pub adjust_for_baseline: bool,
}

impl RunSettings {
    /// Settings exactly as the study file configures them.
    pub fn from_study(study: &StudyFile) -> Self {
        Self {
            options: study.analysis.compare_options(),
            interval: study.analysis.default_interval,
            adjust_for_baseline: study.analysis.baseline_timepoint.is_some(),
        }
    }
}

/// Identifies one treatment-versus-control comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ComparisonKey {
    pub outcome: String,
    pub timepoint: String,
    pub condition: String,
    pub control: String,
}

impl ComparisonKey {
    pub fn treatment_cell(&self) -> CellRef {
        CellRef::new(&self.outcome, &self.timepoint, &self.condition)
    }

    fn at_timepoint(&self, timepoint: &str) -> Self {
        Self {
            timepoint: timepoint.to_string(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}: {} vs {}",
            self.outcome, self.timepoint, self.condition, self.control
        )
    }
}

/// Outcome of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ComparisonOutcome {
    Computed {
        key: ComparisonKey,
        result: ComparisonResult,
        /// Present for non-baseline timepoints when baseline adjustment is on.
        adjusted: Option<AdjustedComparisonResult>,
        /// Bonferroni-adjusted p-value within the study's family.
        p_adjusted: Option<f64>,
    },
    Failed {
        key: ComparisonKey,
        error: ComparisonError,
    },
}

impl ComparisonOutcome {
    pub const fn key(&self) -> &ComparisonKey {
        match self {
            Self::Computed { key, .. } | Self::Failed { key, .. } => key,
        }
    }

    pub const fn result(&self) -> Option<&ComparisonResult> {
        match self {
            Self::Computed { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub const fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }
}

/// Result of checking a recomputed effect against the published one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExpectationCheck {
    Pass {
        name: String,
        details: String,
    },
    Fail {
        name: String,
        reason: String,
    },
    /// The comparison the check refers to was not computed.
    Missing {
        name: String,
        reason: String,
    },
}

impl ExpectationCheck {
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub const fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Pass { name, .. } | Self::Fail { name, .. } | Self::Missing { name, .. } => name,
        }
    }
}

/// Result of a contrast between two effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ContrastOutcome {
    Computed {
        label: String,
        first_g: f64,
        second_g: f64,
        difference: PairwiseDifference,
    },
    Failed {
        label: String,
        error: ComparisonError,
    },
}

/// Everything computed for one study under one set of settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyReport {
    pub study: String,
    pub settings: RunSettings,
    pub comparisons: Vec<ComparisonOutcome>,
    pub checks: Vec<ExpectationCheck>,
    pub contrasts: Vec<ContrastOutcome>,
}

impl StudyReport {
    pub fn computed(&self) -> impl Iterator<Item = (&ComparisonKey, &ComparisonResult)> {
        self.comparisons.iter().filter_map(|outcome| match outcome {
            ComparisonOutcome::Computed { key, result, .. } => Some((key, result)),
            ComparisonOutcome::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ComparisonKey, &ComparisonError)> {
        self.comparisons.iter().filter_map(|outcome| match outcome {
            ComparisonOutcome::Failed { key, error } => Some((key, error)),
            ComparisonOutcome::Computed { .. } => None,
        })
    }

    pub fn find(&self, cell: &CellRef) -> Option<&ComparisonOutcome> {
        self.comparisons
            .iter()
            .find(|outcome| &outcome.key().treatment_cell() == cell)
    }
}

/// Runs all comparisons of `study` under `settings`.
pub fn run_study(study: &StudyFile, settings: &RunSettings) -> StudyReport {
    let control = study.analysis.control_condition.as_str();
    let order = &study.levels;

    let cells: HashMap<CellRef, Result<GroupSummary>> = study
        .rows
        .iter()
        .map(|row| (row.cell(), row.summary(settings.interval)))
        .collect();

    let outcomes = LevelOrder::sorted(study.rows.iter().map(|r| r.outcome.as_str()), |a, b| {
        order.compare_outcomes(a, b)
    });
    let timepoints = LevelOrder::sorted(study.rows.iter().map(|r| r.timepoint.as_str()), |a, b| {
        order.compare_timepoints(a, b)
    });
    let conditions = LevelOrder::sorted(study.rows.iter().map(|r| r.condition.as_str()), |a, b| {
        order.compare_conditions(a, b)
    });

    let mut comparisons = Vec::new();
    for outcome in &outcomes {
        for timepoint in &timepoints {
            let control_cell = CellRef::new(outcome, timepoint, control);
            for condition in conditions.iter().filter(|c| c.as_str() != control) {
                let Some(treatment) = cells.get(&CellRef::new(outcome, timepoint, condition))
                else {
                    continue;
                };
                let key = ComparisonKey {
                    outcome: outcome.clone(),
                    timepoint: timepoint.clone(),
                    condition: condition.clone(),
                    control: control.to_string(),
                };
                let computed = match (treatment, cells.get(&control_cell)) {
                    (Ok(group1), Some(Ok(group2))) => compare(group1, group2, &settings.options),
                    (Err(e), _) | (_, Some(Err(e))) => Err(e.clone()),
                    (_, None) => Err(ComparisonError::InvalidInput(format!(
                        "no control row for {control_cell}"
                    ))),
                };
                comparisons.push(match computed {
                    Ok(result) => ComparisonOutcome::Computed {
                        key,
                        result,
                        adjusted: None,
                        p_adjusted: None,
                    },
                    Err(error) => {
                        tracing::warn!(
                            study = %study.name,
                            comparison = %key,
                            kind = error.kind(),
                            %error,
                            "comparison failed"
                        );
                        ComparisonOutcome::Failed { key, error }
                    }
                });
            }
        }
    }

    let baseline = study.analysis.baseline_timepoint.as_deref();
    if settings.adjust_for_baseline {
        if let Some(baseline) = baseline {
            attach_baseline_adjustments(&mut comparisons, baseline);
        }
    }
    apply_bonferroni(&mut comparisons, baseline);

    let checks = study
        .expected
        .iter()
        .map(|expected| check_expected(&comparisons, expected))
        .collect();
    let contrasts = study
        .contrasts
        .iter()
        .map(|contrast| run_contrast(&comparisons, contrast))
        .collect();

    tracing::debug!(
        study = %study.name,
        comparisons = comparisons.len(),
        failed = comparisons.iter().filter(|c| !c.is_computed()).count(),
        "study run finished"
    );

    StudyReport {
        study: study.name.clone(),
        settings: *settings,
        comparisons,
        checks,
        contrasts,
    }
}

fn attach_baseline_adjustments(comparisons: &mut [ComparisonOutcome], baseline: &str) {
    let baselines: HashMap<ComparisonKey, ComparisonResult> = comparisons
        .iter()
        .filter_map(|outcome| match outcome {
            ComparisonOutcome::Computed { key, result, .. } if key.timepoint == baseline => {
                Some((key.clone(), *result))
            }
            _ => None,
        })
        .collect();

    for outcome in comparisons.iter_mut() {
        if let ComparisonOutcome::Computed {
            key,
            result,
            adjusted,
            ..
        } = outcome
        {
            if key.timepoint != baseline {
                *adjusted = baselines
                    .get(&key.at_timepoint(baseline))
                    .map(|base| adjust_for_baseline(result, base));
            }
        }
    }
}

/// The family is every planned comparison outside the baseline timepoint.
/// Failed comparisons get no adjusted p-value but still count towards `k`.
fn apply_bonferroni(comparisons: &mut [ComparisonOutcome], baseline: Option<&str>) {
    let in_family = |key: &ComparisonKey| baseline != Some(key.timepoint.as_str());

    let family_size = comparisons.iter().filter(|c| in_family(c.key())).count();
    let raw: Vec<f64> = comparisons
        .iter()
        .filter_map(|outcome| match outcome {
            ComparisonOutcome::Computed { key, result, .. } if in_family(key) => {
                Some(result.p_value)
            }
            _ => None,
        })
        .collect();
    let mut adjusted = bonferroni_within(&raw, family_size).into_iter();

    for outcome in comparisons.iter_mut() {
        if let ComparisonOutcome::Computed {
            key, p_adjusted, ..
        } = outcome
        {
            if in_family(key) {
                *p_adjusted = adjusted.next();
            }
        }
    }
}

fn find_result<'a>(
    comparisons: &'a [ComparisonOutcome],
    cell: &CellRef,
) -> Result<&'a ComparisonResult> {
    match comparisons
        .iter()
        .find(|outcome| &outcome.key().treatment_cell() == cell)
    {
        Some(ComparisonOutcome::Computed { result, .. }) => Ok(result),
        Some(ComparisonOutcome::Failed { error, .. }) => Err(error.clone()),
        None => Err(ComparisonError::InvalidInput(format!("no comparison for {cell}"))),
    }
}

fn check_expected(
    comparisons: &[ComparisonOutcome],
    expected: &ExpectedEffect,
) -> ExpectationCheck {
    let cell = expected.cell();
    let name = cell.to_string();
    let result = match find_result(comparisons, &cell) {
        Ok(result) => result,
        Err(error) => {
            let reason = error.to_string();
            return ExpectationCheck::Missing { name, reason };
        }
    };
    let tolerance = expected.tolerance();

    if let Some(g) = expected.hedges_g {
        if !within_tolerance(result.hedges_g, g, tolerance.effect) {
            return ExpectationCheck::Fail {
                name,
                reason: format!(
                    "Hedges' g mismatch: recomputed={:.4}, published={g:.4} (tol={:.1}%)",
                    result.hedges_g,
                    tolerance.effect * 100.0
                ),
            };
        }
    }

    if let Some(t) = expected.t_statistic {
        if !within_tolerance(result.t_statistic, t, tolerance.statistic) {
            return ExpectationCheck::Fail {
                name,
                reason: format!(
                    "t mismatch: recomputed={:.4}, published={t:.4} (tol={:.1}%)",
                    result.t_statistic,
                    tolerance.statistic * 100.0
                ),
            };
        }
    }

    if let Some(p) = expected.p_value {
        if (result.p_value - p).abs() > tolerance.p_value {
            return ExpectationCheck::Fail {
                name,
                reason: format!(
                    "p mismatch: recomputed={:.4}, published={p:.4} (tol=±{})",
                    result.p_value, tolerance.p_value
                ),
            };
        }
    }

    ExpectationCheck::Pass {
        name,
        details: format!(
            "g={:.3} t={:.3} p={:.4} (within tolerance)",
            result.hedges_g, result.t_statistic, result.p_value
        ),
    }
}

/// Standard error of Hedges' g, read back from its interval.
fn effect_standard_error(result: &ComparisonResult) -> Result<f64> {
    standard_error_from_interval(result.ci_lower, result.ci_upper, result.confidence_level)
}

fn contrast_difference(
    comparisons: &[ComparisonOutcome],
    contrast: &ContrastSpec,
) -> Result<(f64, f64, PairwiseDifference)> {
    let first = find_result(comparisons, &contrast.first)?;
    let second = find_result(comparisons, &contrast.second)?;
    let se1 = effect_standard_error(first)?;
    let se2 = effect_standard_error(second)?;
    let diff = pairwise_effect_size_difference(first.hedges_g, se1, second.hedges_g, se2)?;
    Ok((first.hedges_g, second.hedges_g, diff))
}

fn run_contrast(comparisons: &[ComparisonOutcome], contrast: &ContrastSpec) -> ContrastOutcome {
    let label = contrast.label.clone();
    match contrast_difference(comparisons, contrast) {
        Ok((first_g, second_g, difference)) => ContrastOutcome::Computed {
            label,
            first_g,
            second_g,
            difference,
        },
        Err(error) => {
            tracing::warn!(contrast = %label, kind = error.kind(), %error, "contrast failed");
            ContrastOutcome::Failed { label, error }
        }
    }
}
