//! Distribution event types
//!
//! Every notable step of a run is published as a [`DistributionEvent`] so
//! callers can log, display or persist the run as it happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::DistributionPhase;

/// Type of distribution event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionEventType {
    /// Run accepted and started
    Started,
    /// Run finished, possibly with failed features
    Complete,
    /// Run aborted before execution
    Failed,
    /// Run stopped by the caller
    Stopped,
    PhaseChanged,
    BatchesGenerated,
    BatchStarted,
    BatchComplete,
    FeatureStarted,
    FeatureComplete,
    FeatureRetry,
    FeatureFailed,
    PlanCreated,
    PlanOptimized,
    BackpressureWait,
    BackpressureRelease,
    Warning,
}

impl DistributionEventType {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.as_str() == s.to_lowercase())
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::PhaseChanged => "phase_changed",
            Self::BatchesGenerated => "batches_generated",
            Self::BatchStarted => "batch_started",
            Self::BatchComplete => "batch_complete",
            Self::FeatureStarted => "feature_started",
            Self::FeatureComplete => "feature_complete",
            Self::FeatureRetry => "feature_retry",
            Self::FeatureFailed => "feature_failed",
            Self::PlanCreated => "plan_created",
            Self::PlanOptimized => "plan_optimized",
            Self::BackpressureWait => "backpressure_wait",
            Self::BackpressureRelease => "backpressure_release",
            Self::Warning => "warning",
        }
    }

    pub fn all() -> [Self; 17] {
        [
            Self::Started,
            Self::Complete,
            Self::Failed,
            Self::Stopped,
            Self::PhaseChanged,
            Self::BatchesGenerated,
            Self::BatchStarted,
            Self::BatchComplete,
            Self::FeatureStarted,
            Self::FeatureComplete,
            Self::FeatureRetry,
            Self::FeatureFailed,
            Self::PlanCreated,
            Self::PlanOptimized,
            Self::BackpressureWait,
            Self::BackpressureRelease,
            Self::Warning,
        ]
    }
}

impl std::fmt::Display for DistributionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event emitted during a distribution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionEvent {
    /// Unique event identifier
    pub id: Uuid,

    /// Run this event belongs to
    pub run_id: Uuid,

    /// Type of event
    pub event_type: DistributionEventType,

    /// Event data (JSON)
    pub data: Option<serde_json::Value>,

    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl DistributionEvent {
    /// Create a new distribution event
    pub fn new(
        run_id: Uuid,
        event_type: DistributionEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn started(run_id: Uuid, features: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::Started,
            Some(serde_json::json!({ "features": features })),
        )
    }

    pub fn complete(run_id: Uuid, successful: usize, failed: usize, duration_ms: u64) -> Self {
        Self::new(
            run_id,
            DistributionEventType::Complete,
            Some(serde_json::json!({
                "successful": successful,
                "failed": failed,
                "duration_ms": duration_ms,
            })),
        )
    }

    pub fn failed(run_id: Uuid, error: &str) -> Self {
        Self::new(
            run_id,
            DistributionEventType::Failed,
            Some(serde_json::json!({ "error": error })),
        )
    }

    pub fn stopped(run_id: Uuid, cancelled: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::Stopped,
            Some(serde_json::json!({ "cancelled": cancelled })),
        )
    }

    pub fn phase_changed(run_id: Uuid, from: DistributionPhase, to: DistributionPhase) -> Self {
        Self::new(
            run_id,
            DistributionEventType::PhaseChanged,
            Some(serde_json::json!({ "from": from.as_str(), "to": to.as_str() })),
        )
    }

    pub fn batches_generated(run_id: Uuid, batch_sizes: Vec<usize>) -> Self {
        Self::new(
            run_id,
            DistributionEventType::BatchesGenerated,
            Some(serde_json::json!({ "count": batch_sizes.len(), "sizes": batch_sizes })),
        )
    }

    pub fn batch_started(run_id: Uuid, index: usize, assignments: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::BatchStarted,
            Some(serde_json::json!({ "batch": index, "assignments": assignments })),
        )
    }

    pub fn batch_complete(run_id: Uuid, index: usize, successful: usize, failed: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::BatchComplete,
            Some(serde_json::json!({
                "batch": index,
                "successful": successful,
                "failed": failed,
            })),
        )
    }

    pub fn feature_started(run_id: Uuid, feature_id: &str, worker_id: &str, attempt: u32) -> Self {
        Self::new(
            run_id,
            DistributionEventType::FeatureStarted,
            Some(serde_json::json!({
                "feature_id": feature_id,
                "worker_id": worker_id,
                "attempt": attempt,
            })),
        )
    }

    pub fn feature_complete(run_id: Uuid, feature_id: &str, worker_id: &str, duration_ms: u64) -> Self {
        Self::new(
            run_id,
            DistributionEventType::FeatureComplete,
            Some(serde_json::json!({
                "feature_id": feature_id,
                "worker_id": worker_id,
                "duration_ms": duration_ms,
            })),
        )
    }

    pub fn feature_retry(run_id: Uuid, feature_id: &str, retry: u32, error: &str) -> Self {
        Self::new(
            run_id,
            DistributionEventType::FeatureRetry,
            Some(serde_json::json!({
                "feature_id": feature_id,
                "retry": retry,
                "error": error,
            })),
        )
    }

    pub fn feature_failed(run_id: Uuid, feature_id: &str, attempts: u32, error: &str) -> Self {
        Self::new(
            run_id,
            DistributionEventType::FeatureFailed,
            Some(serde_json::json!({
                "feature_id": feature_id,
                "attempts": attempts,
                "error": error,
            })),
        )
    }

    pub fn plan_created(run_id: Uuid, plan_id: Uuid, assignments: usize, total_ms: u64) -> Self {
        Self::new(
            run_id,
            DistributionEventType::PlanCreated,
            Some(serde_json::json!({
                "plan_id": plan_id,
                "assignments": assignments,
                "total_estimated_time_ms": total_ms,
            })),
        )
    }

    pub fn plan_optimized(run_id: Uuid, reassignments: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::PlanOptimized,
            Some(serde_json::json!({ "reassignments": reassignments })),
        )
    }

    pub fn backpressure_wait(run_id: Uuid, outstanding: usize, pool_size: usize) -> Self {
        Self::new(
            run_id,
            DistributionEventType::BackpressureWait,
            Some(serde_json::json!({ "outstanding": outstanding, "pool_size": pool_size })),
        )
    }

    pub fn backpressure_release(run_id: Uuid, outstanding: usize, waited_ms: u64) -> Self {
        Self::new(
            run_id,
            DistributionEventType::BackpressureRelease,
            Some(serde_json::json!({ "outstanding": outstanding, "waited_ms": waited_ms })),
        )
    }

    pub fn warning(run_id: Uuid, message: impl Into<String>, feature_id: Option<&str>) -> Self {
        Self::new(
            run_id,
            DistributionEventType::Warning,
            Some(serde_json::json!({ "message": message.into(), "feature_id": feature_id })),
        )
    }

    /// Feature id carried in the event data, if any
    pub fn feature_id(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get("feature_id"))
            .and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip_through_str() {
        for event_type in DistributionEventType::all() {
            assert_eq!(DistributionEventType::from_str(event_type.as_str()), Some(event_type));
        }
        assert_eq!(DistributionEventType::from_str("nope"), None);
    }

    #[test]
    fn test_serialized_type_matches_as_str() {
        let event = DistributionEvent::feature_retry(Uuid::new_v4(), "auth", 1, "timeout");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "feature_retry");
        assert_eq!(event.feature_id(), Some("auth"));
    }
}
