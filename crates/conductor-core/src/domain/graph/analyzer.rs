//! Dependency graph analyzer
//!
//! Builds a directed graph from declared features and answers the questions
//! the planner needs: are all references valid, are there cycles, in which
//! order can features run, and which features can run side by side.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use super::types::{CycleReport, Feature, GraphStatistics, ValidationReport};
use crate::error::{Error, Result};

/// A set of features that may execute in parallel
pub type Batch = Vec<Feature>;

/// Dependency graph over features
///
/// Forward edges point from a feature to the features it depends on;
/// reverse edges point from a feature to its dependents. Both are updated on
/// every insertion. Neighbour sets carry no ordering meaning.
#[derive(Debug, Clone, Default)]
pub struct DependencyAnalyzer {
    features: HashMap<String, Feature>,
    /// Insertion order, used to break ties deterministically
    order: Vec<String>,
    forward: HashMap<String, BTreeSet<String>>,
    reverse: HashMap<String, BTreeSet<String>>,
}

impl DependencyAnalyzer {
    /// Create an empty analyzer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature to the graph
    ///
    /// Dependencies are not required to exist yet; `validate()` checks them.
    pub fn add_feature(&mut self, feature: Feature) -> Result<()> {
        let mut feature = feature;
        feature.id = feature.id.trim().to_string();
        feature.agent_type = feature.agent_type.trim().to_string();

        if feature.id.is_empty() {
            return Err(Error::InvalidInput("Feature id must not be empty".to_string()));
        }
        if self.features.contains_key(&feature.id) {
            return Err(Error::DuplicateFeature(feature.id));
        }
        if feature.agent_type.is_empty() {
            return Err(Error::MissingAgentType(feature.id));
        }

        let mut seen = HashSet::new();
        feature.dependencies = std::mem::take(&mut feature.dependencies)
            .into_iter()
            .map(|dep| dep.trim().to_string())
            .filter(|dep| seen.insert(dep.clone()))
            .collect();

        let id = feature.id.clone();
        let deps = self.forward.entry(id.clone()).or_default();
        deps.extend(feature.dependencies.iter().cloned());
        self.reverse.entry(id.clone()).or_default();
        for dep in &feature.dependencies {
            self.reverse.entry(dep.clone()).or_default().insert(id.clone());
        }

        debug!(feature_id = %id, dependencies = feature.dependencies.len(), "Feature added");

        self.order.push(id.clone());
        self.features.insert(id, feature);
        Ok(())
    }

    /// Add every feature, reporting all insertion violations together
    pub fn add_features(&mut self, features: impl IntoIterator<Item = Feature>) -> Result<()> {
        let errors: Vec<String> = features
            .into_iter()
            .filter_map(|feature| self.add_feature(feature).err())
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Check that every dependency resolves to a known feature
    pub fn validate(&self) -> ValidationReport {
        let errors: Vec<String> = self
            .order
            .iter()
            .flat_map(|id| {
                self.features[id]
                    .dependencies
                    .iter()
                    .filter(|dep| !self.features.contains_key(*dep))
                    .map(move |dep| format!("Feature '{}' depends on unknown feature '{}'", id, dep))
            })
            .collect();

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Find dependency cycles with a depth-first search
    pub fn detect_cycles(&self) -> CycleReport {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();
        let mut cycles = Vec::new();

        for id in &self.order {
            if !visited.contains(id) {
                self.visit(id, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        CycleReport {
            has_cycles: !cycles.is_empty(),
            cycles,
        }
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node.to_string());
        on_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(deps) = self.forward.get(node) {
            for dep in deps {
                if !self.features.contains_key(dep) {
                    continue;
                }
                if on_stack.contains(dep) {
                    // Back edge: the path from `dep` to here closes a cycle
                    if let Some(start) = path.iter().position(|p| p == dep) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(dep.clone());
                        cycles.push(cycle);
                    }
                } else if !visited.contains(dep) {
                    self.visit(dep, visited, on_stack, path, cycles);
                }
            }
        }

        path.pop();
        on_stack.remove(node);
    }

    /// Order features so that every feature comes after its dependencies
    ///
    /// Fails with the validation or cycle errors if the graph is not a DAG.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let validation = self.validate();
        if !validation.valid {
            return Err(Error::Validation(validation.errors));
        }
        let cycles = self.detect_cycles();
        if cycles.has_cycles {
            return Err(Error::CyclesDetected(cycles.cycles));
        }

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.forward.get(id).map_or(0, BTreeSet::len)))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());

            let mut dependents: Vec<&str> = self
                .reverse
                .get(id)
                .map(|set| set.iter().map(String::as_str).collect())
                .unwrap_or_default();
            dependents.sort_by_key(|d| position.get(d).copied().unwrap_or(usize::MAX));

            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() < self.order.len() {
            return Err(Error::InconsistentGraph {
                ordered: sorted.len(),
                total: self.order.len(),
            });
        }

        Ok(sorted)
    }

    /// Partition the topological order into maximal parallel batches
    pub fn generate_batches(&self) -> Result<Vec<Batch>> {
        let sorted = self.topological_sort()?;
        let mut placed: HashSet<&str> = HashSet::with_capacity(sorted.len());
        let mut batches = Vec::new();

        while placed.len() < sorted.len() {
            let ready: Vec<&str> = sorted
                .iter()
                .map(String::as_str)
                .filter(|id| !placed.contains(id))
                .filter(|id| {
                    self.forward
                        .get(*id)
                        .is_none_or(|deps| deps.iter().all(|d| placed.contains(d.as_str())))
                })
                .collect();

            if ready.is_empty() {
                return Err(Error::InconsistentGraph {
                    ordered: placed.len(),
                    total: sorted.len(),
                });
            }

            placed.extend(ready.iter().copied());
            batches.push(ready.iter().map(|id| self.features[*id].clone()).collect());
        }

        debug!(batches = batches.len(), features = sorted.len(), "Batches generated");
        Ok(batches)
    }

    /// Features with no dependencies
    pub fn root_features(&self) -> Vec<&Feature> {
        self.order
            .iter()
            .filter(|id| self.forward.get(*id).is_none_or(BTreeSet::is_empty))
            .map(|id| &self.features[id])
            .collect()
    }

    /// Features nothing depends on
    pub fn leaf_features(&self) -> Vec<&Feature> {
        self.order
            .iter()
            .filter(|id| self.reverse.get(*id).is_none_or(BTreeSet::is_empty))
            .map(|id| &self.features[id])
            .collect()
    }

    /// Direct dependents of a feature
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.reverse
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of a feature
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.forward
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a feature by id
    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Feature ids in insertion order
    pub fn feature_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Summary statistics, including batch shape
    pub fn statistics(&self) -> Result<GraphStatistics> {
        let batches = self.generate_batches()?;
        let total = self.order.len();

        let max_parallelism = batches.iter().map(Vec::len).max().unwrap_or(0);
        let avg_batch_size = if batches.is_empty() {
            0.0
        } else {
            total as f64 / batches.len() as f64
        };
        let total_deps: usize = self
            .order
            .iter()
            .map(|id| self.forward.get(id).map_or(0, BTreeSet::len))
            .sum();
        let avg_dependencies = if total == 0 {
            0.0
        } else {
            total_deps as f64 / total as f64
        };

        Ok(GraphStatistics {
            total_features: total,
            root_features: self.root_features().len(),
            leaf_features: self.leaf_features().len(),
            batch_count: batches.len(),
            max_parallelism,
            avg_batch_size,
            avg_dependencies,
        })
    }

    /// Clear all graph state
    pub fn reset(&mut self) {
        self.features.clear();
        self.order.clear();
        self.forward.clear();
        self.reverse.clear();
    }
}
