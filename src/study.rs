//! Study files: summary rows extracted from a publication.
//!
//! A study file is YAML. Each row is one cell (outcome × timepoint ×
//! condition) with its sample size, mean, and either a standard deviation
//! or the half-width of a plotted error bar.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ComparisonError, Result};
use crate::stats::{Tolerance, ValueSource};
use crate::types::{CompareOptions, GroupSummary, IntervalKind, VarianceAssumption};

/// A study as extracted from its publication.
#[derive(Debug, Clone, Deserialize)]
pub struct StudyFile {
    pub name: String,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Display ordering of factor levels.
    #[serde(default)]
    pub levels: LevelOrder,
    pub rows: Vec<SummaryRow>,
    /// Published values to check the recomputation against.
    #[serde(default)]
    pub expected: Vec<ExpectedEffect>,
    /// Pairs of effects to test against each other.
    #[serde(default)]
    pub contrasts: Vec<ContrastSpec>,
}

/// Per-study analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default)]
    pub variance: VarianceAssumption,
    #[serde(default)]
    pub null_difference: f64,
    /// Condition every other condition is compared against.
    #[serde(default = "default_control_condition")]
    pub control_condition: String,
    /// Timepoint used for baseline adjustment, if the study has one.
    #[serde(default)]
    pub baseline_timepoint: Option<String>,
    /// Interval convention for rows that give a half-width without saying
    /// what the error bar was.
    #[serde(default)]
    pub default_interval: IntervalKind,
}

const fn default_confidence_level() -> f64 {
    0.95
}

fn default_control_condition() -> String {
    "control".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_level: default_confidence_level(),
            variance: VarianceAssumption::default(),
            null_difference: 0.0,
            control_condition: default_control_condition(),
            baseline_timepoint: None,
            default_interval: IntervalKind::default(),
        }
    }
}

impl AnalysisConfig {
    pub const fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            confidence_level: self.confidence_level,
            variance: self.variance,
            null_difference: self.null_difference,
        }
    }
}

/// Explicit ordering of outcomes, conditions and timepoints.
///
/// Levels not listed sort after the listed ones, alphabetically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOrder {
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub timepoints: Vec<String>,
}

impl LevelOrder {
    fn position(levels: &[String], value: &str) -> usize {
        levels
            .iter()
            .position(|level| level == value)
            .unwrap_or(levels.len())
    }

    fn compare_in(levels: &[String], a: &str, b: &str) -> Ordering {
        Self::position(levels, a)
            .cmp(&Self::position(levels, b))
            .then_with(|| a.cmp(b))
    }

    pub fn compare_outcomes(&self, a: &str, b: &str) -> Ordering {
        Self::compare_in(&self.outcomes, a, b)
    }

    pub fn compare_conditions(&self, a: &str, b: &str) -> Ordering {
        Self::compare_in(&self.conditions, a, b)
    }

    pub fn compare_timepoints(&self, a: &str, b: &str) -> Ordering {
        Self::compare_in(&self.timepoints, a, b)
    }

    /// Orders cells by outcome, then timepoint, then condition.
    pub fn compare_cells(&self, a: &CellRef, b: &CellRef) -> Ordering {
        self.compare_outcomes(&a.outcome, &b.outcome)
            .then_with(|| self.compare_timepoints(&a.timepoint, &b.timepoint))
            .then_with(|| self.compare_conditions(&a.condition, &b.condition))
    }

    /// Distinct values in display order.
    pub fn sorted<'a>(
        values: impl IntoIterator<Item = &'a str>,
        compare: impl Fn(&str, &str) -> Ordering,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut distinct: Vec<&str> = values.into_iter().filter(|v| seen.insert(*v)).collect();
        distinct.sort_by(|a, b| compare(a, b));
        distinct.into_iter().map(str::to_string).collect()
    }
}

/// Identifies one cell of a study.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub outcome: String,
    pub timepoint: String,
    pub condition: String,
}

impl CellRef {
    pub fn new(outcome: &str, timepoint: &str, condition: &str) -> Self {
        Self {
            outcome: outcome.to_string(),
            timepoint: timepoint.to_string(),
            condition: condition.to_string(),
        }
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.outcome, self.timepoint, self.condition)
    }
}

/// One row of a summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub outcome: String,
    pub timepoint: String,
    pub condition: String,
    pub n: u32,
    pub mean: f64,
    /// Standard deviation, when reported directly.
    #[serde(default)]
    pub sd: Option<f64>,
    /// Half-width of a plotted error bar.
    #[serde(default)]
    pub half_width: Option<f64>,
    /// What the error bar was, when the source says so.
    #[serde(default)]
    pub interval: Option<IntervalKind>,
}

impl SummaryRow {
    pub fn cell(&self) -> CellRef {
        CellRef::new(&self.outcome, &self.timepoint, &self.condition)
    }

    /// Whether the SD of this row depends on the interval convention.
    pub const fn is_ambiguous(&self) -> bool {
        self.sd.is_none() && self.half_width.is_some() && self.interval.is_none()
    }

    /// Resolves the row to a [`GroupSummary`]. A reported SD wins over an
    /// error bar; an unlabelled error bar is read with `fallback`.
    pub fn summary(&self, fallback: IntervalKind) -> Result<GroupSummary> {
        match (self.sd, self.half_width) {
            (Some(sd), _) => Ok(GroupSummary::new(self.mean, sd, self.n)),
            (None, Some(width)) => GroupSummary::from_interval(
                self.mean,
                width,
                self.n,
                self.interval.unwrap_or(fallback),
            ),
            (None, None) => Err(ComparisonError::InvalidInput(format!(
                "{}: row has neither sd nor half_width",
                self.cell()
            ))),
        }
    }
}

/// Published values for one treatment cell against the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEffect {
    pub outcome: String,
    pub timepoint: String,
    pub condition: String,
    pub hedges_g: Option<f64>,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    /// Sets the base tolerance; `tolerance` overrides single fields.
    #[serde(default)]
    pub source: ValueSource,
    pub tolerance: Option<ToleranceSpec>,
}

impl ExpectedEffect {
    pub fn cell(&self) -> CellRef {
        CellRef::new(&self.outcome, &self.timepoint, &self.condition)
    }

    pub fn tolerance(&self) -> Tolerance {
        let base = self.source.tolerance();
        self.tolerance.as_ref().map_or(base, |t| Tolerance {
            effect: t.effect.unwrap_or(base.effect),
            statistic: t.statistic.unwrap_or(base.statistic),
            p_value: t.p_value.unwrap_or(base.p_value),
        })
    }
}

/// Tolerance overrides from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub effect: Option<f64>,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
}

/// Two effects whose Hedges' g values are tested against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastSpec {
    pub label: String,
    pub first: CellRef,
    pub second: CellRef,
}

/// Parses a study from YAML and checks that no cell is listed twice.
pub fn load_study(content: &str) -> anyhow::Result<StudyFile> {
    let study: StudyFile = serde_yaml_ng::from_str(content)?;

    let mut seen = HashSet::new();
    for row in &study.rows {
        if !seen.insert(row.cell()) {
            bail!("{}: duplicate row for cell {}", study.name, row.cell());
        }
    }

    Ok(study)
}

/// Reads and parses a study file.
pub fn load_study_file(path: &Path) -> anyhow::Result<StudyFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read study file: {}", path.display()))?;
    load_study(&content).with_context(|| format!("Failed to parse study file: {}", path.display()))
}
