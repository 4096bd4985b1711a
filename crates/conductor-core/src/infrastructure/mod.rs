//! Infrastructure layer
//!
//! Adapters around the domain: manifest files, a simulated worker pool and a
//! JSONL event sink.

pub mod event_log;
pub mod manifest;
pub mod simulated;

pub use event_log::{EventLog, read_events};
pub use manifest::{Manifest, ManifestFormat};
pub use simulated::{SimulatedWorker, SimulatedWorkerPool, SimulationConfig};
