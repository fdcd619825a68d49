//! effect-reanalysis: recompute two-group effect sizes from published
//! summary statistics.
//!
//! Computes Welch or pooled t-tests, Cohen's d and Hedges' g with
//! noncentral-t intervals from means, SDs and sample sizes, adjusts for
//! baseline differences, applies Bonferroni correction, and runs a
//! specification curve over the analytic choices.

pub mod batch;
pub mod engine;
pub mod error;
pub mod multiverse;
pub mod noncentral;
pub mod stats;
pub mod study;
pub mod types;

pub use engine::{
    adjust_for_baseline, bonferroni, bonferroni_within, compare, pairwise_effect_size_difference,
    standard_error_from_interval,
};
pub use error::ComparisonError;
pub use types::{
    AdjustedComparisonResult, CompareOptions, ComparisonResult, GroupSummary, IntervalKind,
    PairwiseDifference, VarianceAssumption,
};
