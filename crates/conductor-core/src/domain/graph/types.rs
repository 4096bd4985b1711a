//! Feature and graph report types

use serde::{Deserialize, Serialize};

/// Priority of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// All priorities, highest first
    pub fn all() -> [Priority; 4] {
        [Self::Critical, Self::High, Self::Medium, Self::Low]
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown priority '{}'. Valid options: critical, high, medium, low",
                other
            ))),
        }
    }
}

/// A declared unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique identifier within a graph
    pub id: String,
    /// Agent capability required to execute this feature
    #[serde(default)]
    pub agent_type: String,
    /// Priority used for ordering and time estimation
    #[serde(default)]
    pub priority: Priority,
    /// Ids of features that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form metadata (description, requirements, ...)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    /// Create a new feature with medium priority and no dependencies
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency
    pub fn with_dependency(mut self, feature_id: impl Into<String>) -> Self {
        self.dependencies.push(feature_id.into());
        self
    }

    /// Add multiple dependencies
    pub fn with_dependencies<I, S>(mut self, feature_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(feature_ids.into_iter().map(Into::into));
        self
    }

    /// Set the human readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.insert(
            "description".to_string(),
            serde_json::Value::String(description.into()),
        );
        self
    }

    /// Set the list of requirements
    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = requirements
            .into_iter()
            .map(|r| serde_json::Value::String(r.into()))
            .collect();
        self.metadata
            .insert("requirements".to_string(), serde_json::Value::Array(values));
        self
    }

    /// Set an arbitrary metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Description from metadata, if any
    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").and_then(|v| v.as_str())
    }

    /// Requirements from metadata
    ///
    /// Accepts either a list of strings or a single string.
    pub fn requirements(&self) -> Vec<String> {
        match self.metadata.get("requirements") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Result of reference validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Result of cycle detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub has_cycles: bool,
    /// Each cycle starts and ends with the same feature id
    pub cycles: Vec<Vec<String>>,
}

/// Statistics about a dependency graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_features: usize,
    pub root_features: usize,
    pub leaf_features: usize,
    pub batch_count: usize,
    /// Size of the largest batch
    pub max_parallelism: usize,
    pub avg_batch_size: f64,
    /// Mean number of declared dependencies per feature
    pub avg_dependencies: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_builder() {
        let feature = Feature::new("auth", "coder")
            .with_priority(Priority::High)
            .with_dependency("db")
            .with_description("Login flow")
            .with_requirements(["jwt", "refresh tokens"]);

        assert_eq!(feature.agent_type, "coder");
        assert_eq!(feature.priority, Priority::High);
        assert_eq!(feature.dependencies, vec!["db".to_string()]);
        assert_eq!(feature.description(), Some("Login flow"));
        assert_eq!(feature.requirements().len(), 2);
    }

    #[test]
    fn test_feature_deserialize_defaults() {
        let feature: Feature = serde_json::from_str(r#"{"id": "a", "agent_type": "coder"}"#).unwrap();
        assert_eq!(feature.priority, Priority::Medium);
        assert!(feature.dependencies.is_empty());
        assert!(feature.metadata.is_empty());
    }

    #[test]
    fn test_requirements_accepts_single_string() {
        let feature = Feature::new("a", "coder")
            .with_metadata("requirements", serde_json::json!("must compile"));
        assert_eq!(feature.requirements(), vec!["must compile".to_string()]);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("CRITICAL".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
