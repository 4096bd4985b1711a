//! Conductor Core Library
//!
//! This crate provides the core functionality for Conductor, including:
//! - Dependency graph analysis (validation, cycle detection, batching)
//! - Resource-aware execution planning across a worker roster
//! - Progress tracking with JSON snapshots
//! - Work distribution with retries, backpressure and cooperative stop
//! - Manifest loading, a simulated worker pool and a JSONL event log

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::distribution::{
        AgentOutcome, DistributionConfig, DistributionEvent, DistributionEventType,
        DistributionResult, ExecuteOptions, RemoteWorker, WorkDistributor, WorkerPool,
    };
    pub use crate::domain::graph::{DependencyAnalyzer, Feature, Priority};
    pub use crate::domain::planning::{ExecutionPlan, ExecutionPlanner, PlannerConfig, Worker};
    pub use crate::domain::progress::{FeatureStatus, ProgressAggregator, ProgressConfig};
    pub use crate::error::{Error, Result};
}
