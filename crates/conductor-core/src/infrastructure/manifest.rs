//! Feature manifests
//!
//! A manifest declares the features of a run and, optionally, the worker
//! roster. JSON and TOML are accepted; the format follows the file extension.
//!
//! ```toml
//! [[features]]
//! id = "schema"
//! agent_type = "coder"
//!
//! [[features]]
//! id = "api"
//! agent_type = "coder"
//! priority = "high"
//! dependencies = ["schema"]
//!
//! [[workers]]
//! id = "w1"
//! capabilities = { agents = ["coder"], memory = 2048 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::graph::Feature;
use crate::domain::planning::Worker;
use crate::error::{Error, Result};

/// Manifest file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// Detect from the file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Features and workers for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub workers: Vec<Worker>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::parse(&contents, ManifestFormat::from_path(path))
    }

    pub fn parse(contents: &str, format: ManifestFormat) -> Result<Self> {
        let manifest: Manifest = match format {
            ManifestFormat::Json => serde_json::from_str(contents)?,
            ManifestFormat::Toml => toml::from_str(contents)
                .map_err(|e| Error::InvalidInput(format!("Invalid TOML manifest: {}", e)))?,
        };
        Ok(manifest)
    }

    /// Roster to pass to the distributor; `None` defers to the worker pool
    pub fn roster(&self) -> Option<Vec<Worker>> {
        if self.workers.is_empty() {
            None
        } else {
            Some(self.workers.clone())
        }
    }
}
