//! Work distributor
//!
//! Top-level controller for a run: analyzes the feature graph, plans the
//! batches onto workers, then executes them batch by batch with retries and
//! backpressure, publishing events and progress along the way.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backpressure::Backpressure;
use super::event::DistributionEvent;
use super::observer::EventBus;
use super::state::DistributionPhase;
use super::types::{DistributionConfig, DistributionResult, FeatureOutcome};
use super::worker::{AgentOutcome, ExecuteOptions, RemoteWorker, WorkerPool};
use crate::domain::graph::{DependencyAnalyzer, Feature};
use crate::domain::planning::{Assignment, ExecutionPlan, ExecutionPlanner, PlannerConfig, Worker};
use crate::domain::progress::{FeatureProgressUpdate, ProgressAggregator, ProgressConfig};
use crate::error::{Error, Result};

/// A dispatched call that has not returned yet
struct OutstandingCall {
    run_id: Uuid,
    feature_id: String,
    worker_id: String,
    worker: Arc<dyn RemoteWorker>,
}

type OutstandingCalls = Arc<Mutex<HashMap<u64, OutstandingCall>>>;

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

/// Orchestrates distribution runs over a worker pool
///
/// Only one run may be active at a time. All methods take `&self`, so the
/// distributor can be shared behind an `Arc` and stopped from another task.
pub struct WorkDistributor {
    config: DistributionConfig,
    pool: Arc<dyn WorkerPool>,
    analyzer: Mutex<DependencyAnalyzer>,
    planner: ExecutionPlanner,
    progress: Arc<ProgressAggregator>,
    events: EventBus,
    running: AtomicBool,
    phase: Mutex<DistributionPhase>,
    active: Mutex<Option<ActiveRun>>,
    plan: Mutex<Option<ExecutionPlan>>,
    outstanding: OutstandingCalls,
    next_ticket: AtomicU64,
}

impl std::fmt::Debug for WorkDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkDistributor")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WorkDistributor {
    /// Create a distributor with default planner and progress settings
    pub fn new(pool: Arc<dyn WorkerPool>, config: DistributionConfig) -> Self {
        Self {
            config,
            pool,
            analyzer: Mutex::new(DependencyAnalyzer::new()),
            planner: ExecutionPlanner::default(),
            progress: Arc::new(ProgressAggregator::default()),
            events: EventBus::new(),
            running: AtomicBool::new(false),
            phase: Mutex::new(DistributionPhase::Idle),
            active: Mutex::new(None),
            plan: Mutex::new(None),
            outstanding: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn with_planner(mut self, config: PlannerConfig) -> Self {
        self.planner = ExecutionPlanner::new(config);
        self
    }

    pub fn with_progress(mut self, config: ProgressConfig) -> Self {
        self.progress = Arc::new(ProgressAggregator::new(config));
        self
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    pub fn planner(&self) -> &ExecutionPlanner {
        &self.planner
    }

    pub fn progress(&self) -> &Arc<ProgressAggregator> {
        &self.progress
    }

    /// Event bus for subscribing to run events
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn phase(&self) -> DistributionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Plan of the most recent run
    pub fn last_plan(&self) -> Option<ExecutionPlan> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Dispatched calls that have not returned, including abandoned ones
    pub fn outstanding_count(&self) -> usize {
        outstanding_len(&self.outstanding)
    }

    /// Run every feature to completion or failure
    ///
    /// `workers` overrides the pool's roster. Fails before executing anything
    /// when the feature set is empty, invalid or cyclic, or when another run
    /// is active.
    pub async fn distribute_work(
        &self,
        features: Vec<Feature>,
        workers: Option<Vec<Worker>>,
    ) -> Result<DistributionResult> {
        if features.is_empty() {
            return Err(Error::EmptyFeatureSet);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::DistributionInProgress);
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveRun {
            run_id,
            cancel: cancel.clone(),
        });

        info!(run_id = %run_id, features = features.len(), "Distribution started");
        self.events.emit(&DistributionEvent::started(run_id, features.len()));

        let result = self.run(run_id, &cancel, features, workers).await;

        match &result {
            Ok(outcome) => {
                self.set_phase(run_id, DistributionPhase::DistributionComplete);
                info!(
                    run_id = %run_id,
                    successful = outcome.successful,
                    failed = outcome.failed,
                    unassigned = outcome.unassigned.len(),
                    stopped = outcome.stopped,
                    duration_ms = outcome.duration_ms,
                    "Distribution complete"
                );
                self.events.emit(&DistributionEvent::complete(
                    run_id,
                    outcome.successful,
                    outcome.failed,
                    outcome.duration_ms,
                ));
            }
            Err(e) => {
                self.set_phase(run_id, DistributionPhase::DistributionFailed);
                warn!(run_id = %run_id, error = %e, code = e.code(), "Distribution failed");
                self.events.emit(&DistributionEvent::failed(run_id, &e.to_string()));
            }
        }

        if self.is_current(run_id) {
            self.progress.stop_auto_save();
        }
        self.finish(run_id);
        result
    }

    async fn run(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        features: Vec<Feature>,
        workers: Option<Vec<Worker>>,
    ) -> Result<DistributionResult> {
        self.set_phase(run_id, DistributionPhase::AnalyzingDependencies);
        let features = self.analyze(run_id, features)?;

        self.set_phase(run_id, DistributionPhase::GeneratingBatches);
        let batches = self
            .analyzer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_batches()?;
        debug!(run_id = %run_id, batches = batches.len(), "Batches generated");
        self.events.emit(&DistributionEvent::batches_generated(
            run_id,
            batches.iter().map(Vec::len).collect(),
        ));

        self.set_phase(run_id, DistributionPhase::PlanningExecution);
        let roster = match workers {
            Some(workers) => workers,
            None => self.pool.available_workers().await?,
        };
        let plan = self.build_plan(run_id, &batches, &roster);

        let started = Utc::now();
        if self.is_current(run_id) {
            self.progress.initialize(&features, &plan);
            self.progress.start_auto_save();
            *self.plan.lock().unwrap_or_else(PoisonError::into_inner) = Some(plan.clone());
        }

        self.set_phase(run_id, DistributionPhase::Executing);
        let by_id: HashMap<&str, &Feature> = features.iter().map(|f| (f.id.as_str(), f)).collect();
        let backpressure = Backpressure::new(
            self.config.backpressure_threshold,
            self.config.backpressure_poll_interval(),
        );

        let mut results = BTreeMap::new();
        let mut stopped = false;

        for (position, batch) in plan.batches.iter().enumerate() {
            if cancel.is_cancelled() {
                stopped = true;
                break;
            }

            info!(
                run_id = %run_id,
                batch = batch.index,
                assignments = batch.assignments.len(),
                "Batch started"
            );
            self.events.emit(&DistributionEvent::batch_started(
                run_id,
                batch.index,
                batch.assignments.len(),
            ));

            let outcomes: Vec<(String, FeatureOutcome)> = if self.config.sequential {
                let mut outcomes = Vec::with_capacity(batch.assignments.len());
                for assignment in &batch.assignments {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let feature = by_id.get(assignment.feature_id.as_str()).copied();
                    outcomes.push(self.execute_assignment(run_id, cancel, assignment, feature).await);
                }
                outcomes
            } else {
                join_all(batch.assignments.iter().map(|assignment| {
                    let feature = by_id.get(assignment.feature_id.as_str()).copied();
                    self.execute_assignment(run_id, cancel, assignment, feature)
                }))
                .await
            };

            let succeeded = outcomes.iter().filter(|(_, o)| o.success).count();
            let failed = outcomes.len() - succeeded;
            results.extend(outcomes);

            info!(run_id = %run_id, batch = batch.index, succeeded, failed, "Batch complete");
            self.events.emit(&DistributionEvent::batch_complete(
                run_id,
                batch.index,
                succeeded,
                failed,
            ));

            if position + 1 < plan.batches.len() {
                self.apply_backpressure(run_id, cancel, &backpressure, roster.len())
                    .await;
            }
        }

        // A stop during the last batch still counts
        stopped |= cancel.is_cancelled();
        if self.is_current(run_id) {
            self.progress.persist();
        }

        let successful = results.values().filter(|o| o.success).count();
        let failed = results.len() - successful;
        let retried = results.values().filter(|o| o.retried).count();
        let unassigned = plan.unassigned_ids();
        let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        Ok(DistributionResult {
            run_id,
            plan_id: plan.id,
            success: failed == 0 && unassigned.is_empty() && !stopped,
            total: features.len(),
            successful,
            failed,
            retried,
            unassigned,
            results,
            duration_ms,
            stopped,
        })
    }

    /// Load, validate and cycle-check the feature set
    ///
    /// Returns the features as normalized by the analyzer.
    fn analyze(&self, run_id: Uuid, features: Vec<Feature>) -> Result<Vec<Feature>> {
        let mut analyzer = self.analyzer.lock().unwrap_or_else(PoisonError::into_inner);
        analyzer.reset();

        let mut errors = match analyzer.add_features(features) {
            Ok(()) => Vec::new(),
            Err(Error::Validation(errors)) => errors,
            Err(e) => return Err(e),
        };
        errors.extend(analyzer.validate().errors);
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let cycles = analyzer.detect_cycles();
        if cycles.has_cycles {
            return Err(Error::CyclesDetected(cycles.cycles));
        }

        debug!(run_id = %run_id, features = analyzer.len(), "Dependency graph valid");
        Ok(analyzer
            .feature_ids()
            .iter()
            .filter_map(|id| analyzer.feature(id).cloned())
            .collect())
    }

    fn build_plan(&self, run_id: Uuid, batches: &[Vec<Feature>], roster: &[Worker]) -> ExecutionPlan {
        let mut plan = self.planner.create_execution_plan(batches, roster);
        self.events.emit(&DistributionEvent::plan_created(
            run_id,
            plan.id,
            plan.assignment_count(),
            plan.total_estimated_time_ms,
        ));
        for unassigned in &plan.unassigned {
            self.events.emit(&DistributionEvent::warning(
                run_id,
                format!(
                    "Feature '{}' was not assigned: {}",
                    unassigned.feature_id, unassigned.reason
                ),
                Some(&unassigned.feature_id),
            ));
        }

        if self.config.auto_optimize {
            plan = self.planner.optimize_plan(&plan, roster);
            self.events.emit(&DistributionEvent::plan_optimized(
                run_id,
                plan.reassignments.len(),
            ));
        }
        plan
    }

    /// Run one assignment through its retry loop
    async fn execute_assignment(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        assignment: &Assignment,
        feature: Option<&Feature>,
    ) -> (String, FeatureOutcome) {
        let feature_id = assignment.feature_id.clone();
        let worker_id = assignment.worker_id.clone();
        let mut retries = 0u32;

        loop {
            self.track(run_id, &feature_id, FeatureProgressUpdate::in_progress(worker_id.clone()));
            self.events.emit(&DistributionEvent::feature_started(
                run_id,
                &feature_id,
                &worker_id,
                retries + 1,
            ));

            let error = match self.dispatch(run_id, cancel, assignment, feature).await {
                Ok(outcome) if outcome.success => {
                    self.track(run_id, &feature_id, FeatureProgressUpdate::complete());
                    info!(
                        run_id = %run_id,
                        feature_id = %feature_id,
                        worker_id = %worker_id,
                        attempts = retries + 1,
                        "Feature complete"
                    );
                    self.events.emit(&DistributionEvent::feature_complete(
                        run_id,
                        &feature_id,
                        &worker_id,
                        outcome.duration_ms,
                    ));
                    return (
                        feature_id,
                        FeatureOutcome {
                            success: true,
                            worker_id,
                            attempts: retries + 1,
                            retried: retries > 0,
                            error: None,
                            output: outcome.output,
                            duration_ms: outcome.duration_ms,
                        },
                    );
                }
                Ok(outcome) => outcome
                    .error
                    .unwrap_or_else(|| "agent reported failure".to_string()),
                Err(e) => e.to_string(),
            };

            if retries < self.config.max_retries && !cancel.is_cancelled() {
                retries += 1;
                warn!(
                    run_id = %run_id,
                    feature_id = %feature_id,
                    retry = retries,
                    max_retries = self.config.max_retries,
                    error = %error,
                    "Feature failed, retrying"
                );
                self.events.emit(&DistributionEvent::feature_retry(
                    run_id,
                    &feature_id,
                    retries,
                    &error,
                ));

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.retry_delay()) => {}
                }
                if !cancel.is_cancelled() {
                    self.track(run_id, &feature_id, FeatureProgressUpdate::pending());
                    continue;
                }
            }

            self.track(run_id, &feature_id, FeatureProgressUpdate::failed(error.clone()));
            warn!(
                run_id = %run_id,
                feature_id = %feature_id,
                attempts = retries + 1,
                error = %error,
                "Feature failed"
            );
            self.events.emit(&DistributionEvent::feature_failed(
                run_id,
                &feature_id,
                retries + 1,
                &error,
            ));
            return (
                feature_id,
                FeatureOutcome {
                    success: false,
                    worker_id,
                    attempts: retries + 1,
                    retried: retries > 0,
                    error: Some(error),
                    output: None,
                    duration_ms: 0,
                },
            );
        }
    }

    /// Send one attempt to the worker, bounded by the estimated time
    ///
    /// The call runs on its own task and stays outstanding until the worker
    /// returns, even when the attempt has already timed out here. A stop
    /// abandons the call immediately.
    async fn dispatch(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        assignment: &Assignment,
        feature: Option<&Feature>,
    ) -> Result<AgentOutcome> {
        if cancel.is_cancelled() {
            return Err(stopped_error(&assignment.feature_id));
        }

        let worker = self
            .pool
            .get_worker(&assignment.worker_id)
            .await
            .ok_or_else(|| Error::WorkerNotFound(assignment.worker_id.clone()))?;

        let task = task_text(assignment, feature);
        let options = ExecuteOptions {
            context: serde_json::json!({
                "run_id": run_id,
                "feature_id": assignment.feature_id,
                "batch": assignment.batch_index,
                "priority": assignment.priority,
                "dependencies": feature.map(|f| f.dependencies.clone()).unwrap_or_default(),
                "metadata": feature.map(|f| f.metadata.clone()).unwrap_or_default(),
            }),
            timeout: Duration::from_millis(assignment.estimate.time_ms),
        };
        let timeout = options.timeout;

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                ticket,
                OutstandingCall {
                    run_id,
                    feature_id: assignment.feature_id.clone(),
                    worker_id: assignment.worker_id.clone(),
                    worker: worker.clone(),
                },
            );

        let outstanding = self.outstanding.clone();
        let agent_type = assignment.agent_type.clone();
        let handle = tokio::spawn(async move {
            let outcome = worker.execute_agent(&agent_type, &task, options).await;
            outstanding
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&ticket);
            outcome
        });

        tokio::select! {
            _ = cancel.cancelled() => Err(stopped_error(&assignment.feature_id)),
            joined = tokio::time::timeout(timeout, handle) => match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => Err(Error::ExecutionFailed(format!("worker task aborted: {}", e))),
                Err(_) => Err(Error::Timeout {
                    feature_id: assignment.feature_id.clone(),
                    timeout_ms: assignment.estimate.time_ms,
                }),
            },
        }
    }

    async fn apply_backpressure(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        backpressure: &Backpressure,
        pool_size: usize,
    ) {
        let outstanding = outstanding_for(&self.outstanding, run_id);
        if !backpressure.is_saturated(outstanding, pool_size) {
            return;
        }

        info!(
            run_id = %run_id,
            outstanding,
            pool_size,
            threshold = backpressure.threshold,
            "Backpressure: waiting before next batch"
        );
        self.events
            .emit(&DistributionEvent::backpressure_wait(run_id, outstanding, pool_size));

        let waited = backpressure
            .wait_for_capacity(|| outstanding_for(&self.outstanding, run_id), pool_size, cancel)
            .await;

        let outstanding = outstanding_for(&self.outstanding, run_id);
        info!(
            run_id = %run_id,
            outstanding,
            waited_ms = waited.as_millis() as u64,
            "Backpressure released"
        );
        self.events.emit(&DistributionEvent::backpressure_release(
            run_id,
            outstanding,
            waited.as_millis() as u64,
        ));
    }

    /// Stop the active run
    ///
    /// Asks workers that support it to cancel their outstanding calls, forgets
    /// the outstanding set, saves a final snapshot and releases the running
    /// flag. Calls already dispatched to workers without cancel support keep
    /// running; no new batch or retry starts. Returns the number of cancel
    /// requests sent, or `None` when nothing was running.
    pub async fn stop(&self) -> Option<usize> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        active.cancel.cancel();

        let calls: Vec<OutstandingCall> = {
            let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
            let tickets: Vec<u64> = outstanding
                .iter()
                .filter(|(_, call)| call.run_id == active.run_id)
                .map(|(ticket, _)| *ticket)
                .collect();
            tickets
                .iter()
                .filter_map(|ticket| outstanding.remove(ticket))
                .collect()
        };

        let mut cancelled = 0;
        for call in calls.iter().filter(|c| c.worker.supports_cancel()) {
            match call.worker.cancel(&call.feature_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    let error = Error::CancelFailed(call.feature_id.clone());
                    warn!(
                        run_id = %active.run_id,
                        feature_id = %call.feature_id,
                        worker_id = %call.worker_id,
                        error = %e,
                        "{}",
                        error
                    );
                }
            }
        }

        self.progress.stop_auto_save();
        self.progress.persist();
        self.replace_phase(active.run_id, DistributionPhase::DistributionComplete);
        self.running.store(false, Ordering::SeqCst);

        info!(
            run_id = %active.run_id,
            outstanding = calls.len(),
            cancelled,
            "Distribution stopped"
        );
        self.events
            .emit(&DistributionEvent::stopped(active.run_id, cancelled));
        Some(cancelled)
    }

    /// Whether `run_id` still owns the distributor's shared state
    ///
    /// False once `stop()` has released the run, so a stopped run that is
    /// still unwinding leaves the phase, progress and plan of the next run
    /// alone.
    fn is_current(&self, run_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|run| run.run_id == run_id)
    }

    fn set_phase(&self, run_id: Uuid, phase: DistributionPhase) {
        let previous = {
            let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if !active.as_ref().is_some_and(|run| run.run_id == run_id) {
                return;
            }
            let mut current = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, phase)
        };
        self.phase_changed(run_id, previous, phase);
    }

    fn replace_phase(&self, run_id: Uuid, phase: DistributionPhase) {
        let previous = std::mem::replace(
            &mut *self.phase.lock().unwrap_or_else(PoisonError::into_inner),
            phase,
        );
        self.phase_changed(run_id, previous, phase);
    }

    fn phase_changed(&self, run_id: Uuid, previous: DistributionPhase, phase: DistributionPhase) {
        if previous != phase {
            debug!(run_id = %run_id, from = %previous, to = %phase, "Phase changed");
            self.events
                .emit(&DistributionEvent::phase_changed(run_id, previous, phase));
        }
    }

    fn track(&self, run_id: Uuid, feature_id: &str, update: FeatureProgressUpdate) {
        if !self.is_current(run_id) {
            return;
        }
        if let Err(e) = self.progress.update_feature(feature_id, update) {
            warn!(feature_id = %feature_id, error = %e, "Progress update rejected");
        }
    }

    /// Release the running flag unless `stop()` already did
    fn finish(&self, run_id: Uuid) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|run| run.run_id == run_id) {
            *active = None;
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

fn outstanding_len(outstanding: &OutstandingCalls) -> usize {
    outstanding
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

fn outstanding_for(outstanding: &OutstandingCalls, run_id: Uuid) -> usize {
    outstanding
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .filter(|call| call.run_id == run_id)
        .count()
}

fn stopped_error(feature_id: &str) -> Error {
    Error::ExecutionFailed(format!("distribution stopped before '{}' finished", feature_id))
}

/// Prompt sent to the agent for a feature
fn task_text(assignment: &Assignment, feature: Option<&Feature>) -> String {
    let mut task = match feature.and_then(Feature::description) {
        Some(description) => description.to_string(),
        None => format!("Implement feature '{}'", assignment.feature_id),
    };

    let requirements = feature.map(Feature::requirements).unwrap_or_default();
    if !requirements.is_empty() {
        task.push_str("\n\nRequirements:");
        for requirement in &requirements {
            task.push_str("\n- ");
            task.push_str(requirement);
        }
    }

    if let Some(feature) = feature
        && !feature.dependencies.is_empty()
    {
        task.push_str("\n\nDepends on: ");
        task.push_str(&feature.dependencies.join(", "));
    }

    task
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(feature_id: &str) -> Assignment {
        Assignment {
            feature_id: feature_id.to_string(),
            worker_id: "w1".to_string(),
            agent_type: "coder".to_string(),
            priority: Default::default(),
            batch_index: 0,
            estimate: crate::domain::planning::ResourceEstimate::new(1000, 256, 0.5),
        }
    }

    #[test]
    fn test_task_text_uses_description_and_requirements() {
        let feature = Feature::new("auth", "coder")
            .with_description("Add login")
            .with_requirements(["hash passwords", "rate limit"])
            .with_dependency("db");

        let text = task_text(&assignment("auth"), Some(&feature));
        assert!(text.starts_with("Add login"));
        assert!(text.contains("- hash passwords"));
        assert!(text.contains("- rate limit"));
        assert!(text.ends_with("Depends on: db"));
    }

    #[test]
    fn test_task_text_fallback() {
        let text = task_text(&assignment("auth"), None);
        assert_eq!(text, "Implement feature 'auth'");
    }
}
