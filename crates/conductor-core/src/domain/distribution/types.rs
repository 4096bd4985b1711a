//! Distribution configuration and results

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_backpressure_threshold() -> f64 {
    0.8
}

fn default_backpressure_poll_interval_ms() -> u64 {
    1000
}

/// Distributor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Run the rebalancing pass after planning
    #[serde(default = "default_true")]
    pub auto_optimize: bool,
    /// Outstanding ÷ pool size above which the next batch waits
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: f64,
    #[serde(default = "default_backpressure_poll_interval_ms")]
    pub backpressure_poll_interval_ms: u64,
    /// Execute a batch's assignments one at a time
    #[serde(default)]
    pub sequential: bool,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            auto_optimize: true,
            backpressure_threshold: default_backpressure_threshold(),
            backpressure_poll_interval_ms: default_backpressure_poll_interval_ms(),
            sequential: false,
        }
    }
}

impl DistributionConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_auto_optimize(mut self, enabled: bool) -> Self {
        self.auto_optimize = enabled;
        self
    }

    pub fn with_backpressure_threshold(mut self, threshold: f64) -> Self {
        self.backpressure_threshold = threshold;
        self
    }

    pub fn with_backpressure_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.backpressure_poll_interval_ms = interval_ms;
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn backpressure_poll_interval(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_interval_ms)
    }
}

/// Final record for one executed feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub success: bool,
    pub worker_id: String,
    /// Attempts made, including the first
    pub attempts: u32,
    pub retried: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Duration of the last attempt as reported by the worker
    pub duration_ms: u64,
}

/// Result of a distribution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub run_id: Uuid,
    pub plan_id: Uuid,
    /// No failed, unassigned or skipped features
    pub success: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Features that needed more than one attempt
    pub retried: usize,
    /// Features the planner could not place
    pub unassigned: Vec<String>,
    pub results: BTreeMap<String, FeatureOutcome>,
    pub duration_ms: u64,
    /// The run was stopped before every batch ran
    pub stopped: bool,
}

impl DistributionResult {
    /// Ids of features that exhausted their retries
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, outcome)| !outcome.success)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DistributionConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert!(config.auto_optimize);
        assert!((config.backpressure_threshold - 0.8).abs() < f64::EPSILON);
        assert!(!config.sequential);
    }

    #[test]
    fn test_partial_toml() {
        let config: DistributionConfig = toml::from_str("max_retries = 1\nsequential = true").unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(config.sequential);
        assert_eq!(config.retry_delay_ms, 5000);
    }
}
