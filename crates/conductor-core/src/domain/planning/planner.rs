//! Execution planner
//!
//! Assigns the features of each batch to workers with a greedy scoring
//! heuristic and estimates how long the plan will take. Batches are planned
//! independently; per-worker cumulative time carries across batches so later
//! batches favour workers that have been less busy.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    Assignment, ExecutionPlan, PlanStatistics, PlannedBatch, PlannerConfig, Reassignment,
    ResourceEstimate, UnassignedFeature, Worker, WorkerPlanStatistics, WorkerUtilization,
};
use crate::domain::graph::{Batch, Feature};

/// Load above this multiple of the batch average counts as overloaded
const OVERLOAD_FACTOR: f64 = 1.2;
/// Load below this multiple of the batch average counts as underloaded
const UNDERLOAD_FACTOR: f64 = 0.8;
/// Weight of a worker's batch-local load in its score
const LOAD_SCORE_WEIGHT: f64 = 100.0;
/// Upper bound of the random tie-break added to every score
const SCORE_JITTER: f64 = 0.01;

/// Greedy, resource-aware planner
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Estimate the resources a feature needs
    ///
    /// The base estimate comes from the agent type; time is scaled by the
    /// priority weight.
    pub fn estimate(&self, feature: &Feature) -> ResourceEstimate {
        let base = self
            .config
            .resource_estimates
            .get(&feature.agent_type)
            .copied()
            .unwrap_or(self.config.default_estimate);
        let weight = self.config.priority_weights.weight(feature.priority);

        ResourceEstimate {
            time_ms: (base.time_ms as f64 * weight).round() as u64,
            ..base
        }
    }

    /// Assign every batch's features to workers
    ///
    /// Features without a qualifying worker are left out of the plan and
    /// listed in `ExecutionPlan::unassigned`.
    pub fn create_execution_plan(&self, batches: &[Batch], workers: &[Worker]) -> ExecutionPlan {
        let mut rng = rand::thread_rng();
        let mut utilization: BTreeMap<String, WorkerUtilization> = workers
            .iter()
            .map(|w| (w.id.clone(), WorkerUtilization::default()))
            .collect();
        let mut planned = Vec::with_capacity(batches.len());
        let mut unassigned = Vec::new();
        let mut clock = 0u64;

        for (index, batch) in batches.iter().enumerate() {
            let weights = &self.config.priority_weights;
            let mut ordered: Vec<&Feature> = batch.iter().collect();
            ordered.sort_by(|a, b| {
                weights
                    .weight(b.priority)
                    .partial_cmp(&weights.weight(a.priority))
                    .unwrap_or(Ordering::Equal)
            });

            let mut batch_load: HashMap<&str, usize> = HashMap::new();
            let mut assignments = Vec::with_capacity(ordered.len());

            for feature in ordered {
                let estimate = self.estimate(feature);

                let best = workers
                    .iter()
                    .filter(|w| w.can_run(&feature.agent_type, &estimate))
                    .filter(|w| {
                        batch_load.get(w.id.as_str()).copied().unwrap_or(0)
                            < self.config.max_concurrent_per_worker
                    })
                    .map(|w| {
                        let load = batch_load.get(w.id.as_str()).copied().unwrap_or(0);
                        let cumulative = utilization.get(&w.id).map_or(0, |u| u.estimated_time_ms);
                        let score = LOAD_SCORE_WEIGHT * load as f64
                            + cumulative as f64 / 1000.0
                            + rng.gen_range(0.0..SCORE_JITTER);
                        (w, score)
                    })
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

                let Some((worker, score)) = best else {
                    let reason = self.unassignable_reason(feature, &estimate, workers);
                    warn!(
                        feature_id = %feature.id,
                        agent_type = %feature.agent_type,
                        batch = index,
                        "Feature cannot be assigned: {}",
                        reason
                    );
                    unassigned.push(UnassignedFeature {
                        feature_id: feature.id.clone(),
                        batch_index: index,
                        reason,
                    });
                    continue;
                };

                debug!(
                    feature_id = %feature.id,
                    worker_id = %worker.id,
                    score,
                    "Feature assigned"
                );

                *batch_load.entry(worker.id.as_str()).or_insert(0) += 1;
                let entry = utilization.entry(worker.id.clone()).or_default();
                entry.assigned_features += 1;
                entry.estimated_time_ms += estimate.time_ms;

                assignments.push(Assignment {
                    feature_id: feature.id.clone(),
                    worker_id: worker.id.clone(),
                    agent_type: feature.agent_type.clone(),
                    priority: feature.priority,
                    batch_index: index,
                    estimate,
                });
            }

            let duration = batch_duration(&assignments);
            planned.push(PlannedBatch {
                index,
                assignments,
                estimated_duration_ms: duration,
                start_time_ms: clock,
                end_time_ms: clock + duration,
            });
            clock += duration;
        }

        let plan = ExecutionPlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            batches: planned,
            total_estimated_time_ms: clock,
            worker_utilization: utilization,
            unassigned,
            reassignments: Vec::new(),
            optimized: false,
        };

        info!(
            plan_id = %plan.id,
            batches = plan.batches.len(),
            assignments = plan.assignment_count(),
            unassigned = plan.unassigned.len(),
            total_ms = plan.total_estimated_time_ms,
            "Execution plan created"
        );

        plan
    }

    fn unassignable_reason(
        &self,
        feature: &Feature,
        estimate: &ResourceEstimate,
        workers: &[Worker],
    ) -> String {
        if workers.is_empty() {
            "no workers available".to_string()
        } else if !workers.iter().any(|w| w.supports_agent(&feature.agent_type)) {
            format!("no worker supports agent type '{}'", feature.agent_type)
        } else if !workers.iter().any(|w| w.can_run(&feature.agent_type, estimate)) {
            format!(
                "no compatible worker has {}MB memory and {} CPU available",
                estimate.memory_mb, estimate.cpu
            )
        } else {
            "all compatible workers are at their concurrency limit".to_string()
        }
    }

    /// Best-effort rebalancing pass over a copy of the plan
    ///
    /// In each batch, moves at most one assignment from an overloaded worker
    /// to the first underloaded worker that can run it.
    pub fn optimize_plan(&self, plan: &ExecutionPlan, workers: &[Worker]) -> ExecutionPlan {
        let mut optimized = plan.clone();
        optimized.optimized = true;

        if workers.is_empty() {
            return optimized;
        }

        for batch in optimized.batches.iter_mut() {
            let mut load: BTreeMap<String, u64> =
                workers.iter().map(|w| (w.id.clone(), 0)).collect();
            let mut count: HashMap<String, usize> = HashMap::new();
            for assignment in &batch.assignments {
                *load.entry(assignment.worker_id.clone()).or_insert(0) += assignment.estimate.time_ms;
                *count.entry(assignment.worker_id.clone()).or_insert(0) += 1;
            }

            let total: u64 = workers.iter().map(|w| load[&w.id]).sum();
            let average = total as f64 / workers.len() as f64;
            if average <= 0.0 {
                continue;
            }

            let overloaded: Vec<&str> = workers
                .iter()
                .filter(|w| load[&w.id] as f64 > average * OVERLOAD_FACTOR)
                .map(|w| w.id.as_str())
                .collect();
            let underloaded: Vec<&Worker> = workers
                .iter()
                .filter(|w| (load[&w.id] as f64) < average * UNDERLOAD_FACTOR)
                .collect();

            if overloaded.is_empty() || underloaded.is_empty() {
                continue;
            }

            let max_concurrent = self.config.max_concurrent_per_worker;
            let mut moved = None;
            'search: for over in &overloaded {
                for assignment in batch.assignments.iter_mut().filter(|a| a.worker_id == *over) {
                    let target = underloaded.iter().find(|w| {
                        w.can_run(&assignment.agent_type, &assignment.estimate)
                            && count.get(&w.id).copied().unwrap_or(0) < max_concurrent
                    });
                    if let Some(target) = target {
                        moved = Some(Reassignment {
                            feature_id: assignment.feature_id.clone(),
                            batch_index: batch.index,
                            from_worker: assignment.worker_id.clone(),
                            to_worker: target.id.clone(),
                        });
                        assignment.worker_id = target.id.clone();
                        break 'search;
                    }
                }
            }

            if let Some(reassignment) = moved {
                debug!(
                    feature_id = %reassignment.feature_id,
                    from = %reassignment.from_worker,
                    to = %reassignment.to_worker,
                    batch = batch.index,
                    "Assignment rebalanced"
                );
                optimized.reassignments.push(reassignment);
            }
        }

        optimized.worker_utilization = recompute_utilization(&optimized.batches, workers);

        info!(
            plan_id = %optimized.id,
            reassignments = optimized.reassignments.len(),
            "Execution plan optimized"
        );

        optimized
    }

    /// Summarize a plan
    pub fn plan_statistics(plan: &ExecutionPlan) -> PlanStatistics {
        let durations: Vec<u64> = plan.batches.iter().map(|b| b.estimated_duration_ms).collect();
        let avg_batch_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };
        let total = plan.total_estimated_time_ms;

        let workers = plan
            .worker_utilization
            .iter()
            .map(|(id, u)| {
                let utilization_percent = if total == 0 {
                    0.0
                } else {
                    u.estimated_time_ms as f64 / total as f64 * 100.0
                };
                (
                    id.clone(),
                    WorkerPlanStatistics {
                        features: u.assigned_features,
                        estimated_time_ms: u.estimated_time_ms,
                        utilization_percent,
                    },
                )
            })
            .collect();

        PlanStatistics {
            total_batches: plan.batches.len(),
            total_features: plan.assignment_count(),
            unassigned_features: plan.unassigned.len(),
            total_estimated_time_ms: total,
            avg_batch_time_ms,
            max_batch_time_ms: durations.into_iter().max().unwrap_or(0),
            workers,
        }
    }
}

fn batch_duration(assignments: &[Assignment]) -> u64 {
    assignments.iter().map(|a| a.estimate.time_ms).max().unwrap_or(0)
}

fn recompute_utilization(
    batches: &[PlannedBatch],
    workers: &[Worker],
) -> BTreeMap<String, WorkerUtilization> {
    let mut utilization: BTreeMap<String, WorkerUtilization> = workers
        .iter()
        .map(|w| (w.id.clone(), WorkerUtilization::default()))
        .collect();
    for assignment in batches.iter().flat_map(|b| b.assignments.iter()) {
        let entry = utilization.entry(assignment.worker_id.clone()).or_default();
        entry.assigned_features += 1;
        entry.estimated_time_ms += assignment.estimate.time_ms;
    }
    utilization
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{DependencyAnalyzer, Priority};

    fn planner() -> ExecutionPlanner {
        ExecutionPlanner::new(PlannerConfig::default())
    }

    fn batches_for(features: Vec<Feature>) -> Vec<Batch> {
        let mut analyzer = DependencyAnalyzer::new();
        analyzer.add_features(features).unwrap();
        analyzer.generate_batches().unwrap()
    }

    #[test]
    fn test_estimate_scales_time_by_priority() {
        let planner = planner();
        let base = planner.estimate(&Feature::new("a", "coder"));
        let critical = planner.estimate(&Feature::new("b", "coder").with_priority(Priority::Critical));
        let low = planner.estimate(&Feature::new("c", "coder").with_priority(Priority::Low));

        assert_eq!(base.time_ms, 300_000);
        assert_eq!(critical.time_ms, 450_000);
        assert_eq!(low.time_ms, 240_000);
        assert_eq!(critical.memory_mb, base.memory_mb);
    }

    #[test]
    fn test_estimate_falls_back_for_unknown_agent() {
        let planner = planner();
        let estimate = planner.estimate(&Feature::new("a", "astrologer"));
        assert_eq!(estimate, PlannerConfig::default().default_estimate);
    }

    #[test]
    fn test_agent_restricted_workers_get_matching_features() {
        let batches = batches_for(vec![
            Feature::new("F1", "backend"),
            Feature::new("F2", "frontend"),
        ]);
        let workers = vec![
            Worker::new("W1").with_agents(["backend"]),
            Worker::new("W2").with_agents(["frontend"]),
        ];

        let plan = planner().create_execution_plan(&batches, &workers);
        assert_eq!(plan.assignment_for("F1").unwrap().worker_id, "W1");
        assert_eq!(plan.assignment_for("F2").unwrap().worker_id, "W2");
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn test_unsupported_feature_is_left_out() {
        let batches = batches_for(vec![Feature::new("F1", "backend"), Feature::new("F2", "ml")]);
        let workers = vec![Worker::new("W1").with_agents(["backend"])];

        let plan = planner().create_execution_plan(&batches, &workers);
        assert_eq!(plan.assignment_count(), 1);
        assert_eq!(plan.unassigned_ids(), vec!["F2"]);
        assert!(plan.unassigned[0].reason.contains("'ml'"));
    }

    #[test]
    fn test_memory_constraint_excludes_worker() {
        let batches = batches_for(vec![Feature::new("F1", "coder")]);
        let workers = vec![Worker::new("small").with_memory(128), Worker::new("big").with_memory(2048)];

        let plan = planner().create_execution_plan(&batches, &workers);
        assert_eq!(plan.assignment_for("F1").unwrap().worker_id, "big");
    }

    #[test]
    fn test_concurrency_limit_per_batch() {
        let batches = batches_for(vec![
            Feature::new("a", "coder"),
            Feature::new("b", "coder"),
            Feature::new("c", "coder").with_priority(Priority::Critical),
        ]);
        let workers = vec![Worker::new("w1"), Worker::new("w2")];

        let plan = planner().create_execution_plan(&batches, &workers);
        assert_eq!(plan.assignment_count(), 2);
        // Critical feature is planned first, so it always gets a worker
        assert!(plan.assignment_for("c").is_some());
        assert_eq!(plan.unassigned.len(), 1);
        assert!(plan.unassigned[0].reason.contains("concurrency limit"));

        let relaxed = ExecutionPlanner::new(PlannerConfig::default().with_max_concurrent_per_worker(2));
        let plan = relaxed.create_execution_plan(&batches, &workers);
        assert_eq!(plan.assignment_count(), 3);
    }

    #[test]
    fn test_total_time_is_sum_of_batch_maxima() {
        let batches = batches_for(vec![
            Feature::new("a", "coder"),
            Feature::new("b", "reviewer"),
            Feature::new("c", "tester").with_dependency("a"),
            Feature::new("d", "planner").with_dependency("c"),
        ]);
        let workers = vec![Worker::new("w1"), Worker::new("w2")];

        let plan = planner().create_execution_plan(&batches, &workers);
        let expected: u64 = plan
            .batches
            .iter()
            .map(|b| b.assignments.iter().map(|a| a.estimate.time_ms).max().unwrap_or(0))
            .sum();
        assert_eq!(plan.total_estimated_time_ms, expected);
        assert_eq!(plan.total_estimated_time_ms, 300_000 + 180_000 + 60_000);

        assert_eq!(plan.batches[0].start_time_ms, 0);
        assert_eq!(plan.batches[1].start_time_ms, plan.batches[0].end_time_ms);
        assert_eq!(plan.batches[2].end_time_ms, plan.total_estimated_time_ms);
    }

    #[test]
    fn test_optimize_never_breaks_agent_restrictions() {
        let batches = batches_for(vec![
            Feature::new("a", "backend"),
            Feature::new("b", "backend"),
            Feature::new("c", "backend"),
        ]);
        let workers = vec![
            Worker::new("be1").with_agents(["backend"]),
            Worker::new("fe1").with_agents(["frontend"]),
            Worker::new("fe2").with_agents(["frontend"]),
        ];
        let planner = ExecutionPlanner::new(PlannerConfig::default().with_max_concurrent_per_worker(3));

        let plan = planner.create_execution_plan(&batches, &workers);
        let optimized = planner.optimize_plan(&plan, &workers);

        assert!(optimized.reassignments.is_empty());
        for assignment in optimized.assignments() {
            let worker = workers.iter().find(|w| w.id == assignment.worker_id).unwrap();
            assert!(worker.supports_agent(&assignment.agent_type));
        }
    }

    #[test]
    fn test_optimize_moves_one_assignment_per_batch() {
        let batches = batches_for(vec![
            Feature::new("a", "coder"),
            Feature::new("b", "coder"),
            Feature::new("c", "coder"),
        ]);
        let workers = vec![
            Worker::new("busy").with_agents(["coder"]),
            Worker::new("idle").with_agents(["coder", "tester"]),
        ];
        let planner = ExecutionPlanner::new(PlannerConfig::default().with_max_concurrent_per_worker(3));

        // Force everything onto one worker, as a skewed plan would
        let mut plan = planner.create_execution_plan(&batches, &workers[..1]);
        plan.worker_utilization.insert("idle".to_string(), WorkerUtilization::default());

        let optimized = planner.optimize_plan(&plan, &workers);
        assert_eq!(optimized.reassignments.len(), 1);
        assert_eq!(optimized.reassignments[0].to_worker, "idle");
        assert_eq!(optimized.worker_utilization["busy"].assigned_features, 2);
        assert_eq!(optimized.worker_utilization["idle"].assigned_features, 1);
        // The input plan is untouched
        assert!(plan.assignments().all(|a| a.worker_id == "busy"));
        assert!(optimized.optimized);
    }

    #[test]
    fn test_plan_statistics() {
        let batches = batches_for(vec![
            Feature::new("a", "coder"),
            Feature::new("b", "planner").with_dependency("a"),
        ]);
        let workers = vec![Worker::new("w1")];

        let plan = planner().create_execution_plan(&batches, &workers);
        let stats = ExecutionPlanner::plan_statistics(&plan);

        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_features, 2);
        assert_eq!(stats.max_batch_time_ms, 300_000);
        assert!((stats.avg_batch_time_ms - 180_000.0).abs() < f64::EPSILON);
        let w1 = &stats.workers["w1"];
        assert_eq!(w1.features, 2);
        assert!((w1.utilization_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_workers_leaves_everything_unassigned() {
        let batches = batches_for(vec![Feature::new("a", "coder")]);
        let plan = planner().create_execution_plan(&batches, &[]);
        assert_eq!(plan.assignment_count(), 0);
        assert_eq!(plan.unassigned[0].reason, "no workers available");
        assert_eq!(plan.total_estimated_time_ms, 0);
    }
}
