//! Progress aggregator
//!
//! Holds the live status of every feature and worker for the current run,
//! notifies observers on each change and persists whole-document snapshots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{
    FeatureProgress, FeatureProgressUpdate, FeatureStatus, OverallProgress, ProgressChange,
    ProgressConfig, ProgressSnapshot, ProgressSummary, SNAPSHOT_VERSION, Timeline, WorkerStatus,
};
use crate::domain::graph::Feature;
use crate::domain::planning::ExecutionPlan;
use crate::error::{Error, Result};

/// Callback invoked after every accepted update
pub type ProgressObserver = Arc<dyn Fn(&ProgressChange) + Send + Sync>;

#[derive(Debug, Default)]
struct State {
    overall: Option<OverallProgress>,
    features: BTreeMap<String, FeatureProgress>,
    workers: BTreeMap<String, WorkerStatus>,
}

impl State {
    fn recompute_overall(&mut self) {
        let Some(overall) = self.overall.as_mut() else {
            return;
        };
        overall.completed = self
            .features
            .values()
            .filter(|f| f.status == FeatureStatus::Complete)
            .count();
        overall.failed = self
            .features
            .values()
            .filter(|f| f.status == FeatureStatus::Failed)
            .count();
        overall.percent_complete = if overall.total == 0 {
            0.0
        } else {
            overall.completed as f64 / overall.total as f64 * 100.0
        };
    }

    fn refresh_worker(&mut self, worker_id: &str) {
        let records: Vec<&FeatureProgress> = self
            .features
            .values()
            .filter(|f| f.worker_id.as_deref() == Some(worker_id))
            .collect();

        let status = self
            .workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerStatus {
                worker_id: worker_id.to_string(),
                ..Default::default()
            });
        for record in &records {
            if !status.assigned_features.contains(&record.feature_id) {
                status.assigned_features.push(record.feature_id.clone());
            }
        }
        status.active_feature = records
            .iter()
            .find(|f| f.status == FeatureStatus::InProgress)
            .map(|f| f.feature_id.clone());
        status.completed = records
            .iter()
            .filter(|f| f.status == FeatureStatus::Complete)
            .count();
        status.failed = records
            .iter()
            .filter(|f| f.status == FeatureStatus::Failed)
            .count();
    }
}

/// Live progress state for one distribution run
pub struct ProgressAggregator {
    config: ProgressConfig,
    state: RwLock<State>,
    observers: RwLock<Vec<ProgressObserver>>,
    auto_save: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl ProgressAggregator {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
            observers: RwLock::new(Vec::new()),
            auto_save: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Snapshot path, if persistence is enabled
    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    /// Reset state for a new run
    ///
    /// Every feature starts not-started, carrying the worker the plan placed
    /// it on. Every worker in the plan gets a status entry.
    pub fn initialize(&self, features: &[Feature], plan: &ExecutionPlan) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        state.features = features
            .iter()
            .map(|feature| {
                let worker_id = plan.assignment_for(&feature.id).map(|a| a.worker_id.clone());
                (feature.id.clone(), FeatureProgress::new(feature.id.clone(), worker_id))
            })
            .collect();

        state.workers = plan
            .worker_utilization
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    WorkerStatus {
                        worker_id: id.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let planned: Vec<String> = plan.assignments().map(|a| a.worker_id.clone()).collect();
        for worker_id in planned {
            state.refresh_worker(&worker_id);
        }

        state.overall = Some(OverallProgress::new(features.len()));

        info!(
            features = features.len(),
            workers = state.workers.len(),
            "Progress initialized"
        );
    }

    /// Merge an update into a feature record and notify observers
    pub fn update_feature(
        &self,
        feature_id: &str,
        update: FeatureProgressUpdate,
    ) -> Result<FeatureProgress> {
        let change = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let record = state
                .features
                .get_mut(feature_id)
                .ok_or_else(|| Error::FeatureNotFound(feature_id.to_string()))?;

            let previous_worker = record.worker_id.clone();
            if let Some(status) = update.status {
                record.status = status;
                record.error = update.error;
            } else if update.error.is_some() {
                record.error = update.error;
            }
            if let Some(worker_id) = update.worker_id {
                record.worker_id = Some(worker_id);
            }
            if let Some(progress) = update.progress {
                record.progress = progress.min(100);
            }
            record.updated_at = Utc::now();

            let feature = record.clone();
            state.recompute_overall();
            if let Some(worker_id) = &feature.worker_id {
                state.refresh_worker(worker_id);
            }
            if let Some(previous) = previous_worker
                && feature.worker_id.as_deref() != Some(previous.as_str())
            {
                state.refresh_worker(&previous);
            }

            debug!(
                feature_id = %feature.feature_id,
                status = %feature.status,
                progress = feature.progress,
                "Feature progress updated"
            );

            ProgressChange {
                feature,
                overall: state
                    .overall
                    .clone()
                    .unwrap_or_else(|| OverallProgress::new(0)),
            }
        };

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(&change);
        }

        Ok(change.feature)
    }

    /// Register an observer
    pub fn subscribe(&self, observer: ProgressObserver) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Overall progress, `None` before the first run
    pub fn progress(&self) -> Option<OverallProgress> {
        self.read_state().overall.clone()
    }

    pub fn feature_progress(&self, feature_id: &str) -> Option<FeatureProgress> {
        self.read_state().features.get(feature_id).cloned()
    }

    pub fn all_feature_progress(&self) -> Vec<FeatureProgress> {
        self.read_state().features.values().cloned().collect()
    }

    pub fn all_worker_statuses(&self) -> Vec<WorkerStatus> {
        self.read_state().workers.values().cloned().collect()
    }

    /// Counts, timeline and worker view, `None` before the first run
    pub fn summary(&self) -> Option<ProgressSummary> {
        let state = self.read_state();
        let overall = state.overall.clone()?;

        let mut status_counts = BTreeMap::new();
        for record in state.features.values() {
            *status_counts.entry(record.status).or_insert(0) += 1;
        }
        let duration_ms = (Utc::now() - overall.start_time).num_milliseconds().max(0) as u64;

        Some(ProgressSummary {
            timeline: Timeline {
                start_time: overall.start_time,
                duration_ms,
            },
            overall,
            status_counts,
            workers: state.workers.values().cloned().collect(),
        })
    }

    /// Whole-document snapshot of the current state
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let state = self.read_state();
        Some(ProgressSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            overall: state.overall.clone()?,
            features: state.features.clone(),
            workers: state.workers.clone(),
        })
    }

    /// Write the snapshot to the configured path
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self
            .config
            .path
            .clone()
            .ok_or_else(|| Error::Persistence("no progress path configured".to_string()))?;
        let snapshot = self
            .snapshot()
            .ok_or_else(|| Error::Persistence("progress has not been initialized".to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = temp_path(&path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), "Progress snapshot saved");
        Ok(path)
    }

    /// Replace state with the snapshot at the configured path
    ///
    /// Returns `false` when no path is configured or the file is missing.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.config.path.as_deref() else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }

        let snapshot = read_snapshot(path)?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.overall = Some(snapshot.overall);
        state.features = snapshot.features;
        state.workers = snapshot.workers;

        info!(path = %path.display(), features = state.features.len(), "Progress snapshot loaded");
        Ok(true)
    }

    /// Save if a path is configured, logging failures instead of returning them
    pub fn persist(&self) {
        if self.config.path.is_none() {
            return;
        }
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to persist progress snapshot");
        }
    }

    /// Start periodic saving on the current tokio runtime
    ///
    /// Returns `false` when no path or interval is configured. The task holds
    /// only a weak reference and exits once the aggregator is dropped.
    pub fn start_auto_save(self: &Arc<Self>) -> bool {
        let (Some(_), Some(secs)) = (&self.config.path, self.config.auto_save_interval_secs) else {
            return false;
        };
        let period = Duration::from_secs(secs.max(1));

        let token = CancellationToken::new();
        if let Some(previous) = self
            .auto_save
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(aggregator) = weak.upgrade() else {
                            break;
                        };
                        aggregator.persist();
                    }
                }
            }
            debug!("Progress auto-save stopped");
        });

        info!(interval_secs = period.as_secs(), "Progress auto-save started");
        true
    }

    /// Stop auto-save if running
    pub fn stop_auto_save(&self) {
        if let Some(token) = self
            .auto_save
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    /// Stop auto-save and detach all observers
    pub fn destroy(&self) {
        self.stop_auto_save();
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.stop_auto_save();
    }
}

/// Read a snapshot document from disk
pub fn read_snapshot(path: &Path) -> Result<ProgressSnapshot> {
    let content = std::fs::read_to_string(path)?;
    let snapshot: ProgressSnapshot = serde_json::from_str(&content)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Persistence(format!(
            "unsupported snapshot version {} in {}",
            snapshot.version,
            path.display()
        )));
    }
    Ok(snapshot)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "progress.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::graph::DependencyAnalyzer;
    use crate::domain::planning::{ExecutionPlanner, Worker};

    fn setup(features: Vec<Feature>, workers: &[Worker]) -> (Vec<Feature>, ExecutionPlan) {
        let mut analyzer = DependencyAnalyzer::new();
        analyzer.add_features(features.clone()).unwrap();
        let batches = analyzer.generate_batches().unwrap();
        let plan = ExecutionPlanner::default().create_execution_plan(&batches, workers);
        (features, plan)
    }

    fn initialized(config: ProgressConfig) -> ProgressAggregator {
        let (features, plan) = setup(
            vec![
                Feature::new("a", "coder"),
                Feature::new("b", "coder"),
                Feature::new("c", "tester").with_dependency("a"),
                Feature::new("d", "tester").with_dependency("c"),
            ],
            &[Worker::new("w1"), Worker::new("w2")],
        );
        let aggregator = ProgressAggregator::new(config);
        aggregator.initialize(&features, &plan);
        aggregator
    }

    #[test]
    fn test_initialize_marks_everything_not_started() {
        let aggregator = initialized(ProgressConfig::default());

        let progress = aggregator.progress().unwrap();
        assert_eq!(progress.total, 4);
        assert_eq!(progress.completed, 0);
        assert!(
            aggregator
                .all_feature_progress()
                .iter()
                .all(|f| f.status == FeatureStatus::NotStarted && f.worker_id.is_some())
        );
        assert_eq!(aggregator.all_worker_statuses().len(), 2);
    }

    #[test]
    fn test_update_recomputes_overall() {
        let aggregator = initialized(ProgressConfig::default());

        aggregator
            .update_feature("a", FeatureProgressUpdate::complete())
            .unwrap();
        aggregator
            .update_feature("b", FeatureProgressUpdate::failed("boom"))
            .unwrap();

        let progress = aggregator.progress().unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert!((progress.percent_complete - 25.0).abs() < f64::EPSILON);

        let b = aggregator.feature_progress("b").unwrap();
        assert_eq!(b.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_change_clears_previous_error() {
        let aggregator = initialized(ProgressConfig::default());
        aggregator
            .update_feature("a", FeatureProgressUpdate::failed("first"))
            .unwrap();
        let record = aggregator
            .update_feature("a", FeatureProgressUpdate::pending())
            .unwrap();
        assert_eq!(record.status, FeatureStatus::Pending);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_update_unknown_feature() {
        let aggregator = initialized(ProgressConfig::default());
        let err = aggregator
            .update_feature("zzz", FeatureProgressUpdate::complete())
            .unwrap_err();
        assert!(matches!(err, Error::FeatureNotFound(id) if id == "zzz"));
    }

    #[test]
    fn test_worker_status_tracks_active_feature() {
        let aggregator = initialized(ProgressConfig::default());
        let worker = aggregator.feature_progress("a").unwrap().worker_id.unwrap();

        aggregator
            .update_feature("a", FeatureProgressUpdate::in_progress(worker.clone()))
            .unwrap();
        let status = aggregator
            .all_worker_statuses()
            .into_iter()
            .find(|w| w.worker_id == worker)
            .unwrap();
        assert_eq!(status.active_feature.as_deref(), Some("a"));

        aggregator
            .update_feature("a", FeatureProgressUpdate::complete())
            .unwrap();
        let status = aggregator
            .all_worker_statuses()
            .into_iter()
            .find(|w| w.worker_id == worker)
            .unwrap();
        assert!(status.active_feature.is_none());
        assert!(status.completed >= 1);
    }

    #[test]
    fn test_observers_are_notified() {
        let aggregator = initialized(ProgressConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        aggregator.subscribe(Arc::new(move |_change| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        aggregator
            .update_feature("a", FeatureProgressUpdate::complete())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        aggregator.destroy();
        aggregator
            .update_feature("b", FeatureProgressUpdate::complete())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_summary_counts_statuses() {
        let aggregator = initialized(ProgressConfig::default());
        aggregator
            .update_feature("a", FeatureProgressUpdate::complete())
            .unwrap();

        let summary = aggregator.summary().unwrap();
        assert_eq!(summary.status_counts[&FeatureStatus::Complete], 1);
        assert_eq!(summary.status_counts[&FeatureStatus::NotStarted], 3);
    }

    #[test]
    fn test_uninitialized_reads() {
        let aggregator = ProgressAggregator::default();
        assert!(aggregator.progress().is_none());
        assert!(aggregator.summary().is_none());
        assert!(aggregator.all_feature_progress().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("progress.json");
        let config = ProgressConfig::default().with_path(&path);

        let aggregator = initialized(config.clone());
        aggregator
            .update_feature("a", FeatureProgressUpdate::complete())
            .unwrap();
        aggregator.save().unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let restored = ProgressAggregator::new(config);
        assert!(restored.load().unwrap());
        assert_eq!(restored.progress().unwrap().completed, 1);
        assert_eq!(
            restored.feature_progress("a").unwrap().status,
            FeatureStatus::Complete
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator =
            ProgressAggregator::new(ProgressConfig::default().with_path(dir.path().join("none.json")));
        assert!(!aggregator.load().unwrap());
    }

    #[test]
    fn test_save_without_path_fails() {
        let aggregator = initialized(ProgressConfig::default());
        assert!(matches!(aggregator.save(), Err(Error::Persistence(_))));
        // persist swallows the missing path
        aggregator.persist();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_writes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let config = ProgressConfig::default()
            .with_path(&path)
            .with_auto_save_interval(5);

        let aggregator = Arc::new(initialized(config));
        assert!(aggregator.start_auto_save());
        assert!(!path.exists());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(path.exists());

        aggregator.destroy();
    }

    #[test]
    fn test_auto_save_requires_interval() {
        let aggregator = Arc::new(ProgressAggregator::default());
        assert!(!aggregator.start_auto_save());
    }
}
