//! Domain layer
//!
//! Contains the scheduling logic: dependency analysis, execution planning,
//! progress tracking and the distributor that ties them together.

pub mod distribution;
pub mod graph;
pub mod planning;
pub mod progress;
