//! Execution planning
//!
//! Places the features of each batch on workers, honouring agent support,
//! declared capacity and a per-batch concurrency limit, and estimates the
//! wall-clock time of the resulting plan.

pub mod planner;
pub mod types;

pub use planner::ExecutionPlanner;
pub use types::{
    Assignment, ExecutionPlan, PlanStatistics, PlannedBatch, PlannerConfig, PriorityWeights,
    Reassignment, ResourceEstimate, UnassignedFeature, Worker, WorkerCapabilities,
    WorkerPlanStatistics, WorkerUtilization, default_resource_estimates,
};
