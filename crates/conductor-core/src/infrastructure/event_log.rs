//! JSONL event log
//!
//! Appends every distribution event to a file, one JSON object per line, so
//! a run can be followed with `tail -f` or inspected afterwards.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::domain::distribution::{DistributionEvent, EventHandler};
use crate::error::Result;

/// Append-only event sink
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    /// Open for appending, creating the file and its directory if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    ///
    /// Write failures are logged and dropped so a bad disk never aborts a run.
    pub fn record(&self, event: &DistributionEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize distribution event");
                return;
            }
        };

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write event log");
        }
    }

    /// Event bus handler that records into this log
    pub fn handler(self: &Arc<Self>) -> EventHandler {
        let log = Arc::clone(self);
        Arc::new(move |event: &DistributionEvent| log.record(event))
    }
}

/// Read every well-formed event from a log file
///
/// Lines that fail to parse are skipped.
pub fn read_events(path: &Path) -> Result<Vec<DistributionEvent>> {
    let file = File::open(path)?;
    let events = BufReader::new(file)
        .lines()
        .map_while(std::result::Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect();
    Ok(events)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::distribution::{DistributionEventType, EventBus};

    #[test]
    fn test_events_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let log = Arc::new(EventLog::open(&path).unwrap());

        let bus = EventBus::new();
        bus.subscribe(log.handler());

        let run = Uuid::new_v4();
        bus.emit(&DistributionEvent::started(run, 3));
        bus.emit(&DistributionEvent::feature_complete(run, "a", "w1", 12));

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, DistributionEventType::Started);
        assert_eq!(events[1].feature_id(), Some("a"));
        assert!(events.iter().all(|e| e.run_id == run));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let log = EventLog::open(&path).unwrap();
            log.record(&DistributionEvent::started(Uuid::new_v4(), 1));
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();

        assert_eq!(read_events(&path).unwrap().len(), 1);
    }
}
