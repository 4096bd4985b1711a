//! Work distribution
//!
//! Runs a feature set end to end against a [`WorkerPool`]:
//!
//! 1. Validate the dependency graph and reject cycles
//! 2. Partition it into batches of independent features
//! 3. Plan each batch onto workers and optionally rebalance
//! 4. Execute batches in order, retrying failed features and holding the
//!    next batch back while too many calls are outstanding
//!
//! Progress goes to the [`ProgressAggregator`](crate::domain::progress::ProgressAggregator)
//! and every step is published on the distributor's [`EventBus`].

pub mod backpressure;
pub mod distributor;
pub mod event;
pub mod observer;
pub mod state;
pub mod types;
pub mod worker;

pub use backpressure::Backpressure;
pub use distributor::WorkDistributor;
pub use event::{DistributionEvent, DistributionEventType};
pub use observer::{EventBus, EventHandler, SubscriptionId};
pub use state::DistributionPhase;
pub use types::{DistributionConfig, DistributionResult, FeatureOutcome};
pub use worker::{AgentOutcome, ExecuteOptions, RemoteWorker, WorkerPool};
