//! Distribution phases

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the distributor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionPhase {
    #[default]
    Idle,
    AnalyzingDependencies,
    GeneratingBatches,
    PlanningExecution,
    Executing,
    DistributionComplete,
    DistributionFailed,
}

impl DistributionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AnalyzingDependencies => "analyzing-dependencies",
            Self::GeneratingBatches => "generating-batches",
            Self::PlanningExecution => "planning-execution",
            Self::Executing => "executing",
            Self::DistributionComplete => "distribution-complete",
            Self::DistributionFailed => "distribution-failed",
        }
    }
}

impl std::fmt::Display for DistributionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
