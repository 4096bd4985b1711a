//! Progress records and snapshot types

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a single feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureStatus {
    #[default]
    NotStarted,
    /// Waiting for a retry
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current state of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProgress {
    pub feature_id: String,
    pub status: FeatureStatus,
    pub worker_id: Option<String>,
    /// Percentage, 0 to 100
    pub progress: u8,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureProgress {
    pub fn new(feature_id: impl Into<String>, worker_id: Option<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            status: FeatureStatus::NotStarted,
            worker_id,
            progress: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Partial update merged into a [`FeatureProgress`]
///
/// Fields left as `None` keep their current value. `error` is replaced
/// whenever `status` is set, so a retry clears the previous failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureProgressUpdate {
    pub status: Option<FeatureStatus>,
    pub worker_id: Option<String>,
    pub progress: Option<u8>,
    pub error: Option<String>,
}

impl FeatureProgressUpdate {
    pub fn status(status: FeatureStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn in_progress(worker_id: impl Into<String>) -> Self {
        Self::status(FeatureStatus::InProgress).with_worker(worker_id)
    }

    pub fn pending() -> Self {
        Self::status(FeatureStatus::Pending).with_progress(0)
    }

    pub fn complete() -> Self {
        Self::status(FeatureStatus::Complete).with_progress(100)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::status(FeatureStatus::Failed).with_error(error)
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Run-wide counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallProgress {
    pub start_time: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub percent_complete: f64,
}

impl OverallProgress {
    pub fn new(total: usize) -> Self {
        Self {
            start_time: Utc::now(),
            total,
            completed: 0,
            failed: 0,
            percent_complete: 0.0,
        }
    }
}

/// Per-worker view derived from the feature records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub assigned_features: Vec<String>,
    /// Feature currently in progress on this worker, if any
    pub active_feature: Option<String>,
    pub completed: usize,
    pub failed: usize,
}

/// Elapsed time of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub start_time: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Read-only summary of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub overall: OverallProgress,
    pub timeline: Timeline,
    pub status_counts: BTreeMap<FeatureStatus, usize>,
    pub workers: Vec<WorkerStatus>,
}

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Whole-document persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub overall: OverallProgress,
    pub features: BTreeMap<String, FeatureProgress>,
    pub workers: BTreeMap<String, WorkerStatus>,
}

/// Observable change emitted after every accepted update
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressChange {
    pub feature: FeatureProgress,
    pub overall: OverallProgress,
}

/// Aggregator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Snapshot file; persistence is disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Periodic save interval; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_save_interval_secs: Option<u64>,
}

impl ProgressConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_auto_save_interval(mut self, secs: u64) -> Self {
        self.auto_save_interval_secs = Some(secs);
        self
    }
}
