//! Planning types: workers, resource estimates, assignments and plans

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::graph::Priority;

/// Estimated resources needed to execute one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    /// Expected wall-clock time in milliseconds
    pub time_ms: u64,
    /// Expected peak memory in megabytes
    pub memory_mb: u64,
    /// Expected CPU cores
    pub cpu: f64,
}

impl ResourceEstimate {
    pub const fn new(time_ms: u64, memory_mb: u64, cpu: f64) -> Self {
        Self {
            time_ms,
            memory_mb,
            cpu,
        }
    }
}

/// Declared capacity of a worker. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub cpu: Option<f64>,
    /// Agent types this worker can run
    #[serde(default)]
    pub agents: Option<Vec<String>>,
}

/// A worker in the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    #[serde(default)]
    pub capabilities: WorkerCapabilities,
}

impl Worker {
    /// Create an unconstrained worker
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: WorkerCapabilities::default(),
        }
    }

    /// Restrict the worker to the given agent types
    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.agents = Some(agents.into_iter().map(Into::into).collect());
        self
    }

    /// Declare available memory in megabytes
    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.capabilities.memory = Some(memory_mb);
        self
    }

    /// Declare available CPU cores
    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.capabilities.cpu = Some(cpu);
        self
    }

    /// Whether this worker supports the agent type
    pub fn supports_agent(&self, agent_type: &str) -> bool {
        match &self.capabilities.agents {
            Some(agents) => agents.iter().any(|a| a == agent_type),
            None => true,
        }
    }

    /// Whether declared memory and CPU cover the estimate
    pub fn has_capacity_for(&self, estimate: &ResourceEstimate) -> bool {
        let memory_ok = self
            .capabilities
            .memory
            .is_none_or(|memory| memory >= estimate.memory_mb);
        let cpu_ok = self.capabilities.cpu.is_none_or(|cpu| cpu >= estimate.cpu);
        memory_ok && cpu_ok
    }

    /// Agent support and capacity together
    pub fn can_run(&self, agent_type: &str, estimate: &ResourceEstimate) -> bool {
        self.supports_agent(agent_type) && self.has_capacity_for(estimate)
    }
}

/// Per-priority weights, used both for ordering and to scale time estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl PriorityWeights {
    pub fn weight(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            critical: 1.5,
            high: 1.2,
            medium: 1.0,
            low: 0.8,
        }
    }
}

/// Default base estimates per agent type
pub fn default_resource_estimates() -> HashMap<String, ResourceEstimate> {
    [
        ("planner", ResourceEstimate::new(60_000, 256, 0.5)),
        ("coder", ResourceEstimate::new(300_000, 512, 1.0)),
        ("reviewer", ResourceEstimate::new(120_000, 256, 0.5)),
        ("tester", ResourceEstimate::new(180_000, 512, 1.0)),
        ("documenter", ResourceEstimate::new(120_000, 256, 0.5)),
    ]
    .into_iter()
    .map(|(agent, estimate)| (agent.to_string(), estimate))
    .collect()
}

fn default_fallback_estimate() -> ResourceEstimate {
    ResourceEstimate::new(180_000, 256, 0.5)
}

fn default_max_concurrent_per_worker() -> usize {
    1
}

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Base estimate per agent type
    #[serde(default = "default_resource_estimates")]
    pub resource_estimates: HashMap<String, ResourceEstimate>,
    /// Estimate used for agent types missing from the table
    #[serde(default = "default_fallback_estimate")]
    pub default_estimate: ResourceEstimate,
    #[serde(default)]
    pub priority_weights: PriorityWeights,
    /// Features a single worker may take within one batch
    #[serde(default = "default_max_concurrent_per_worker")]
    pub max_concurrent_per_worker: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            resource_estimates: default_resource_estimates(),
            default_estimate: default_fallback_estimate(),
            priority_weights: PriorityWeights::default(),
            max_concurrent_per_worker: default_max_concurrent_per_worker(),
        }
    }
}

impl PlannerConfig {
    /// Override the estimate for one agent type
    pub fn with_estimate(mut self, agent_type: impl Into<String>, estimate: ResourceEstimate) -> Self {
        self.resource_estimates.insert(agent_type.into(), estimate);
        self
    }

    pub fn with_priority_weights(mut self, weights: PriorityWeights) -> Self {
        self.priority_weights = weights;
        self
    }

    pub fn with_max_concurrent_per_worker(mut self, max: usize) -> Self {
        self.max_concurrent_per_worker = max;
        self
    }
}

/// A feature placed on a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub feature_id: String,
    pub worker_id: String,
    pub agent_type: String,
    pub priority: Priority,
    pub batch_index: usize,
    pub estimate: ResourceEstimate,
}

/// One batch of the plan with its timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedBatch {
    pub index: usize,
    pub assignments: Vec<Assignment>,
    /// Longest assignment in the batch
    pub estimated_duration_ms: u64,
    /// Offset from plan start
    pub start_time_ms: u64,
    pub end_time_ms: u64,
}

/// Per-worker load across the whole plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerUtilization {
    pub assigned_features: usize,
    pub estimated_time_ms: u64,
}

/// A feature the planner could not place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedFeature {
    pub feature_id: String,
    pub batch_index: usize,
    pub reason: String,
}

/// A move made by the rebalancing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reassignment {
    pub feature_id: String,
    pub batch_index: usize,
    pub from_worker: String,
    pub to_worker: String,
}

/// Full ordered batch/assignment structure with timing estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub batches: Vec<PlannedBatch>,
    pub total_estimated_time_ms: u64,
    pub worker_utilization: BTreeMap<String, WorkerUtilization>,
    #[serde(default)]
    pub unassigned: Vec<UnassignedFeature>,
    #[serde(default)]
    pub reassignments: Vec<Reassignment>,
    #[serde(default)]
    pub optimized: bool,
}

impl ExecutionPlan {
    /// Total number of assignments
    pub fn assignment_count(&self) -> usize {
        self.batches.iter().map(|b| b.assignments.len()).sum()
    }

    /// Iterate over every assignment in batch order
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.batches.iter().flat_map(|b| b.assignments.iter())
    }

    /// Find the assignment for a feature
    pub fn assignment_for(&self, feature_id: &str) -> Option<&Assignment> {
        self.assignments().find(|a| a.feature_id == feature_id)
    }

    /// Ids of features that were not placed
    pub fn unassigned_ids(&self) -> Vec<String> {
        self.unassigned.iter().map(|u| u.feature_id.clone()).collect()
    }
}

/// Per-worker statistics for a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPlanStatistics {
    pub features: usize,
    pub estimated_time_ms: u64,
    /// Share of the total plan time this worker is busy
    pub utilization_percent: f64,
}

/// Summary of an execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatistics {
    pub total_batches: usize,
    pub total_features: usize,
    pub unassigned_features: usize,
    pub total_estimated_time_ms: u64,
    pub avg_batch_time_ms: f64,
    pub max_batch_time_ms: u64,
    pub workers: BTreeMap<String, WorkerPlanStatistics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_without_restrictions_runs_anything() {
        let worker = Worker::new("w1");
        let estimate = ResourceEstimate::new(1000, 4096, 8.0);
        assert!(worker.can_run("anything", &estimate));
    }

    #[test]
    fn test_worker_agent_restriction() {
        let worker = Worker::new("w1").with_agents(["backend"]);
        assert!(worker.supports_agent("backend"));
        assert!(!worker.supports_agent("frontend"));
    }

    #[test]
    fn test_worker_capacity() {
        let worker = Worker::new("w1").with_memory(512).with_cpu(1.0);
        assert!(worker.has_capacity_for(&ResourceEstimate::new(1, 512, 1.0)));
        assert!(!worker.has_capacity_for(&ResourceEstimate::new(1, 1024, 1.0)));
        assert!(!worker.has_capacity_for(&ResourceEstimate::new(1, 256, 2.0)));
    }

    #[test]
    fn test_priority_weights_order() {
        let weights = PriorityWeights::default();
        let ordered: Vec<f64> = Priority::all().iter().map(|p| weights.weight(*p)).collect();
        assert!(ordered.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_planner_config_deserializes_with_defaults() {
        let config: PlannerConfig = toml::from_str("max_concurrent_per_worker = 2").unwrap();
        assert_eq!(config.max_concurrent_per_worker, 2);
        assert!(config.resource_estimates.contains_key("coder"));
        assert_eq!(config.priority_weights, PriorityWeights::default());
    }
}
