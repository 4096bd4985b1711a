//! Worker pool collaborator traits

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::planning::Worker;
use crate::error::Result;

/// Options for one agent execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Feature id, dependencies and other context for the agent
    pub context: serde_json::Value,
    /// Hard limit for the call
    pub timeout: Duration,
}

/// Outcome reported by a worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl AgentOutcome {
    pub fn success(output: Option<serde_json::Value>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// A worker that can execute agents remotely
#[async_trait]
pub trait RemoteWorker: Send + Sync {
    /// Run an agent on a task
    ///
    /// `Err` and `Ok` with `success == false` are both treated as a failed
    /// attempt.
    async fn execute_agent(
        &self,
        agent_type: &str,
        task: &str,
        options: ExecuteOptions,
    ) -> Result<AgentOutcome>;

    /// Whether `cancel` does anything
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Ask the worker to abandon a feature
    async fn cancel(&self, _feature_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Source of workers for a distribution run
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Roster used when the caller passes none
    async fn available_workers(&self) -> Result<Vec<Worker>>;

    /// Handle for a worker by id
    async fn get_worker(&self, worker_id: &str) -> Option<Arc<dyn RemoteWorker>>;
}
