//! Error types for Conductor

use thiserror::Error;

/// Result type alias using Conductor's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Conductor error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Feature '{0}' not found.")]
    FeatureNotFound(String),

    #[error("Feature '{0}' is declared more than once.")]
    DuplicateFeature(String),

    #[error("Feature '{0}' has no agent type. Every feature must name the agent that executes it.")]
    MissingAgentType(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Circular dependencies detected: {}", format_cycles(.0))]
    CyclesDetected(Vec<Vec<String>>),

    #[error("Dependency graph is inconsistent: ordered {ordered} of {total} features")]
    InconsistentGraph { ordered: usize, total: usize },

    // Distribution errors (E100-E199)
    #[error("No features to distribute.")]
    EmptyFeatureSet,

    #[error("A distribution is already running. Stop it before starting another.")]
    DistributionInProgress,

    // Worker errors (E200-E299)
    #[error("Worker '{0}' is not available in the worker pool.")]
    WorkerNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Feature '{feature_id}' timed out after {timeout_ms}ms")]
    Timeout { feature_id: String, timeout_ms: u64 },

    #[error("Cancellation failed for feature '{0}'")]
    CancelFailed(String),

    // Persistence errors (E300-E399)
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::FeatureNotFound(_) => "E001",
            Self::DuplicateFeature(_) => "E002",
            Self::MissingAgentType(_) => "E003",
            Self::Validation(_) => "E010",
            Self::CyclesDetected(_) => "E011",
            Self::InconsistentGraph { .. } => "E012",
            Self::EmptyFeatureSet => "E100",
            Self::DistributionInProgress => "E101",
            Self::WorkerNotFound(_) => "E200",
            Self::ExecutionFailed(_) => "E201",
            Self::Timeout { .. } => "E202",
            Self::CancelFailed(_) => "E203",
            Self::Persistence(_) => "E300",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Validation(_) => Some("conductor analyze <manifest>".to_string()),
            Self::CyclesDetected(cycles) => cycles
                .first()
                .and_then(|cycle| cycle.first())
                .map(|id| format!("Remove one dependency edge from the cycle through '{}'", id)),
            Self::DistributionInProgress => Some("Wait for the current run or call stop()".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_per_category() {
        assert_eq!(Error::DuplicateFeature("a".into()).code(), "E002");
        assert_eq!(Error::CyclesDetected(vec![]).code(), "E011");
        assert_eq!(Error::EmptyFeatureSet.code(), "E100");
        assert_eq!(Error::WorkerNotFound("w".into()).code(), "E200");
    }

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = Error::Validation(vec![
            "Feature 'b' depends on unknown feature 'x'".to_string(),
            "Feature 'a' is declared more than once.".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("unknown feature 'x'"));
        assert!(msg.contains("declared more than once"));
    }

    #[test]
    fn test_cycle_message_shows_paths() {
        let err = Error::CyclesDetected(vec![vec!["x".into(), "y".into(), "x".into()]]);
        assert!(err.to_string().contains("x -> y -> x"));
        assert!(err.suggestion().unwrap().contains("'x'"));
    }
}
