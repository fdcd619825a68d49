//! Error types for effect-size computation.

use serde::Serialize;
use thiserror::Error;

/// Failure of a single comparison.
///
/// All variants are local to one comparison; batch callers record them next
/// to the successful results and keep going.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ComparisonError {
    /// Out-of-domain parameters (negative SD, fewer than two observations,
    /// non-finite values, confidence level outside (0, 1)).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Valid-looking input whose result is mathematically undefined.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The noncentral-t interval search did not settle within its budget.
    #[error("confidence interval did not converge: {0}")]
    ConvergenceFailure(String),
}

impl ComparisonError {
    /// Short machine-readable kind; matches the serialized `kind` tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DegenerateInput(_) => "degenerate_input",
            Self::ConvergenceFailure(_) => "convergence_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, ComparisonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_detail() {
        let err = ComparisonError::InvalidInput("n1 = 1".to_string());
        assert_eq!(err.to_string(), "invalid input: n1 = 1");
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let err = ComparisonError::DegenerateInput("sd = 0".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "degenerate_input", "detail": "sd = 0" })
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        for err in [
            ComparisonError::InvalidInput(String::new()),
            ComparisonError::DegenerateInput(String::new()),
            ComparisonError::ConvergenceFailure(String::new()),
        ] {
            let json = serde_json::to_value(&err).unwrap();
            assert_eq!(json["kind"], err.kind());
        }
    }
}
