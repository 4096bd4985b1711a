//! Progress tracking
//!
//! Live per-feature and per-worker status for a distribution run, with
//! observer callbacks and JSON snapshots on disk.

pub mod aggregator;
pub mod types;

pub use aggregator::{ProgressAggregator, ProgressObserver, read_snapshot};
pub use types::{
    FeatureProgress, FeatureProgressUpdate, FeatureStatus, OverallProgress, ProgressChange,
    ProgressConfig, ProgressSnapshot, ProgressSummary, SNAPSHOT_VERSION, Timeline, WorkerStatus,
};
