//! Dependency graph analysis
//!
//! Turns a flat list of features into a validated DAG, a dependency order
//! and a sequence of batches whose members can run in parallel.
//!
//! # Example
//!
//! ```ignore
//! use conductor_core::domain::graph::{DependencyAnalyzer, Feature};
//!
//! let mut analyzer = DependencyAnalyzer::new();
//! analyzer.add_feature(Feature::new("schema", "coder"))?;
//! analyzer.add_feature(Feature::new("api", "coder").with_dependency("schema"))?;
//!
//! let batches = analyzer.generate_batches()?;
//! assert_eq!(batches.len(), 2);
//! ```

pub mod analyzer;
pub mod types;

pub use analyzer::{Batch, DependencyAnalyzer};
pub use types::{CycleReport, Feature, GraphStatistics, Priority, ValidationReport};
