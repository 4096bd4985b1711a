//! In-process simulated worker pool
//!
//! Each call sleeps for a scaled fraction of its time budget and then
//! succeeds or fails at random. Used for dry runs and demos.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::distribution::{AgentOutcome, ExecuteOptions, RemoteWorker, WorkerPool};
use crate::domain::planning::Worker;
use crate::error::Result;

fn default_time_scale() -> f64 {
    0.001
}

/// Simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fraction of the time budget each call sleeps
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Probability in `[0, 1]` that a call fails
    #[serde(default)]
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: default_time_scale(),
            failure_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }
}

/// A simulated worker
#[derive(Debug)]
pub struct SimulatedWorker {
    id: String,
    config: SimulationConfig,
    cancelled: Mutex<HashSet<String>>,
}

impl SimulatedWorker {
    pub fn new(id: impl Into<String>, config: SimulationConfig) -> Self {
        Self {
            id: id.into(),
            config,
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Features this worker was asked to cancel
    pub fn cancelled(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl RemoteWorker for SimulatedWorker {
    async fn execute_agent(
        &self,
        agent_type: &str,
        task: &str,
        options: ExecuteOptions,
    ) -> Result<AgentOutcome> {
        let delay = options.timeout.mul_f64(self.config.time_scale.clamp(0.0, 1.0));
        let fails = rand::thread_rng().gen_bool(self.config.failure_rate.clamp(0.0, 1.0));

        debug!(
            worker_id = %self.id,
            agent_type,
            delay_ms = delay.as_millis() as u64,
            "Simulating agent call"
        );
        tokio::time::sleep(delay).await;

        let duration_ms = delay.as_millis() as u64;
        if fails {
            return Ok(AgentOutcome::failure(
                format!("simulated failure on worker '{}'", self.id),
                duration_ms,
            ));
        }

        Ok(AgentOutcome::success(
            Some(serde_json::json!({
                "worker_id": self.id,
                "agent_type": agent_type,
                "task_chars": task.chars().count(),
                "feature_id": options.context.get("feature_id"),
            })),
            duration_ms,
        ))
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    async fn cancel(&self, feature_id: &str) -> Result<()> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(feature_id.to_string());
        Ok(())
    }
}

/// Worker pool backed by [`SimulatedWorker`]s
#[derive(Debug)]
pub struct SimulatedWorkerPool {
    roster: Vec<Worker>,
    workers: HashMap<String, Arc<SimulatedWorker>>,
}

impl SimulatedWorkerPool {
    pub fn new(roster: Vec<Worker>, config: SimulationConfig) -> Self {
        let workers = roster
            .iter()
            .map(|w| (w.id.clone(), Arc::new(SimulatedWorker::new(w.id.clone(), config))))
            .collect();
        Self { roster, workers }
    }

    /// Pool of `count` unconstrained workers named `worker-1`, `worker-2`, ...
    pub fn uniform(count: usize, config: SimulationConfig) -> Self {
        let roster = (1..=count)
            .map(|i| Worker::new(format!("worker-{}", i)))
            .collect();
        Self::new(roster, config)
    }

    pub fn worker(&self, worker_id: &str) -> Option<Arc<SimulatedWorker>> {
        self.workers.get(worker_id).cloned()
    }
}

#[async_trait]
impl WorkerPool for SimulatedWorkerPool {
    async fn available_workers(&self) -> Result<Vec<Worker>> {
        Ok(self.roster.clone())
    }

    async fn get_worker(&self, worker_id: &str) -> Option<Arc<dyn RemoteWorker>> {
        self.workers
            .get(worker_id)
            .map(|w| w.clone() as Arc<dyn RemoteWorker>)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn options(timeout_ms: u64) -> ExecuteOptions {
        ExecuteOptions {
            context: serde_json::json!({"feature_id": "a"}),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scaled_sleep_and_success() {
        let worker = SimulatedWorker::new("w1", SimulationConfig::default().with_time_scale(0.5));
        let outcome = worker.execute_agent("coder", "do it", options(1000)).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.duration_ms, 500);
        assert_eq!(outcome.output.unwrap()["feature_id"], "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing() {
        let worker = SimulatedWorker::new("w1", SimulationConfig::default().with_failure_rate(1.0));
        let outcome = worker.execute_agent("coder", "do it", options(1000)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("w1"));
    }

    #[tokio::test]
    async fn test_pool_lookup_and_cancel() {
        let pool = SimulatedWorkerPool::uniform(2, SimulationConfig::default());
        assert_eq!(pool.available_workers().await.unwrap().len(), 2);
        assert!(pool.get_worker("worker-3").await.is_none());

        let worker = pool.get_worker("worker-1").await.unwrap();
        assert!(worker.supports_cancel());
        worker.cancel("a").await.unwrap();
        assert_eq!(pool.worker("worker-1").unwrap().cancelled(), vec!["a"]);
    }
}
