//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::distribution::DistributionConfig;
use crate::domain::planning::{PlannerConfig, ResourceEstimate};
use crate::domain::progress::ProgressConfig;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "CONDUCTOR_CONFIG_DIR";

/// Conductor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("conductor")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if missing
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.distribution.backpressure_threshold;
        if !(threshold > 0.0 && threshold.is_finite()) {
            return Err(anyhow!("distribution.backpressure_threshold must be greater than 0"));
        }
        if self.distribution.backpressure_poll_interval_ms == 0 {
            return Err(anyhow!("distribution.backpressure_poll_interval_ms must be at least 1"));
        }
        if self.planner.max_concurrent_per_worker == 0 {
            return Err(anyhow!("planner.max_concurrent_per_worker must be at least 1"));
        }

        let weights = &self.planner.priority_weights;
        for (name, weight) in [
            ("critical", weights.critical),
            ("high", weights.high),
            ("medium", weights.medium),
            ("low", weights.low),
        ] {
            if !(weight > 0.0 && weight.is_finite()) {
                return Err(anyhow!("planner.priority_weights.{} must be greater than 0", name));
            }
        }

        let estimates = self
            .planner
            .resource_estimates
            .iter()
            .map(|(agent, estimate)| (agent.as_str(), estimate))
            .chain(std::iter::once(("default", &self.planner.default_estimate)));
        for (agent, estimate) in estimates {
            if estimate.time_ms == 0 {
                return Err(anyhow!("Estimated time for '{}' must be greater than 0", agent));
            }
            if estimate.cpu < 0.0 {
                return Err(anyhow!("Estimated CPU for '{}' must be non-negative", agent));
            }
        }

        if self.progress.auto_save_interval_secs == Some(0) {
            return Err(anyhow!("progress.auto_save_interval_secs must be at least 1"));
        }

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        if let Some((agent, field)) = estimate_key(key) {
            let estimate = self.estimate(agent).ok_or_else(|| {
                anyhow!("No resource estimate for agent type '{}'", agent)
            })?;
            return estimate_field(&estimate, field);
        }

        match key {
            // Distribution settings
            "distribution.max_retries" => Ok(self.distribution.max_retries.to_string()),
            "distribution.retry_delay_ms" => Ok(self.distribution.retry_delay_ms.to_string()),
            "distribution.auto_optimize" => Ok(self.distribution.auto_optimize.to_string()),
            "distribution.backpressure_threshold" => {
                Ok(self.distribution.backpressure_threshold.to_string())
            }
            "distribution.backpressure_poll_interval_ms" => {
                Ok(self.distribution.backpressure_poll_interval_ms.to_string())
            }
            "distribution.sequential" => Ok(self.distribution.sequential.to_string()),

            // Planner settings
            "planner.max_concurrent_per_worker" => {
                Ok(self.planner.max_concurrent_per_worker.to_string())
            }
            "planner.priority_weights.critical" => Ok(self.planner.priority_weights.critical.to_string()),
            "planner.priority_weights.high" => Ok(self.planner.priority_weights.high.to_string()),
            "planner.priority_weights.medium" => Ok(self.planner.priority_weights.medium.to_string()),
            "planner.priority_weights.low" => Ok(self.planner.priority_weights.low.to_string()),

            // Progress settings
            "progress.path" => Ok(self
                .progress
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(not set)".to_string())),
            "progress.auto_save_interval_secs" => Ok(self
                .progress
                .auto_save_interval_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(not set)".to_string())),

            _ => Err(unknown_key(key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some((agent, field)) = estimate_key(key) {
            let mut estimate = self
                .estimate(agent)
                .unwrap_or(self.planner.default_estimate);
            set_estimate_field(&mut estimate, field, value)?;
            if agent == "default" {
                self.planner.default_estimate = estimate;
            } else {
                self.planner
                    .resource_estimates
                    .insert(agent.to_string(), estimate);
            }
            return Ok(());
        }

        match key {
            // Distribution settings
            "distribution.max_retries" => {
                self.distribution.max_retries = parse(key, value)?;
            }
            "distribution.retry_delay_ms" => {
                self.distribution.retry_delay_ms = parse(key, value)?;
            }
            "distribution.auto_optimize" => {
                self.distribution.auto_optimize = parse(key, value)?;
            }
            "distribution.backpressure_threshold" => {
                let threshold: f64 = parse(key, value)?;
                if threshold <= 0.0 {
                    return Err(anyhow!("Backpressure threshold must be greater than 0"));
                }
                self.distribution.backpressure_threshold = threshold;
            }
            "distribution.backpressure_poll_interval_ms" => {
                let interval: u64 = parse(key, value)?;
                if interval == 0 {
                    return Err(anyhow!("Poll interval must be at least 1ms"));
                }
                self.distribution.backpressure_poll_interval_ms = interval;
            }
            "distribution.sequential" => {
                self.distribution.sequential = parse(key, value)?;
            }

            // Planner settings
            "planner.max_concurrent_per_worker" => {
                let max: usize = parse(key, value)?;
                if max == 0 {
                    return Err(anyhow!("max_concurrent_per_worker must be at least 1"));
                }
                self.planner.max_concurrent_per_worker = max;
            }
            "planner.priority_weights.critical"
            | "planner.priority_weights.high"
            | "planner.priority_weights.medium"
            | "planner.priority_weights.low" => {
                let weight: f64 = parse(key, value)?;
                if weight <= 0.0 {
                    return Err(anyhow!("Priority weights must be greater than 0"));
                }
                let weights = &mut self.planner.priority_weights;
                match key.rsplit('.').next() {
                    Some("critical") => weights.critical = weight,
                    Some("high") => weights.high = weight,
                    Some("medium") => weights.medium = weight,
                    _ => weights.low = weight,
                }
            }

            // Progress settings
            "progress.path" => {
                self.progress.path = if is_unset(value) {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "progress.auto_save_interval_secs" => {
                self.progress.auto_save_interval_secs = if is_unset(value) {
                    None
                } else {
                    let secs: u64 = parse(key, value)?;
                    if secs == 0 {
                        return Err(anyhow!("Auto-save interval must be at least 1 second"));
                    }
                    Some(secs)
                };
            }

            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut keys: Vec<String> = [
            "distribution.max_retries",
            "distribution.retry_delay_ms",
            "distribution.auto_optimize",
            "distribution.backpressure_threshold",
            "distribution.backpressure_poll_interval_ms",
            "distribution.sequential",
            "planner.max_concurrent_per_worker",
            "planner.priority_weights.critical",
            "planner.priority_weights.high",
            "planner.priority_weights.medium",
            "planner.priority_weights.low",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let mut agents: Vec<&String> = self.planner.resource_estimates.keys().collect();
        agents.sort();
        for agent in agents.into_iter().map(String::as_str).chain(["default"]) {
            for field in ["time_ms", "memory_mb", "cpu"] {
                keys.push(format!("planner.resource_estimates.{}.{}", agent, field));
            }
        }

        keys.push("progress.path".to_string());
        keys.push("progress.auto_save_interval_secs".to_string());

        keys.into_iter()
            .map(|key| {
                let value = self.get(&key)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        Self::reset_at(&Self::config_path()?)
    }

    /// Remove the config file at a path
    pub fn reset_at(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }

    fn estimate(&self, agent: &str) -> Option<ResourceEstimate> {
        if agent == "default" {
            Some(self.planner.default_estimate)
        } else {
            self.planner.resource_estimates.get(agent).copied()
        }
    }
}

/// Split `planner.resource_estimates.<agent>.<field>`
fn estimate_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("planner.resource_estimates.")?;
    let (agent, field) = rest.rsplit_once('.')?;
    if agent.is_empty() {
        return None;
    }
    Some((agent, field))
}

fn estimate_field(estimate: &ResourceEstimate, field: &str) -> anyhow::Result<String> {
    match field {
        "time_ms" => Ok(estimate.time_ms.to_string()),
        "memory_mb" => Ok(estimate.memory_mb.to_string()),
        "cpu" => Ok(estimate.cpu.to_string()),
        other => Err(anyhow!(
            "Unknown estimate field: {}. Valid options: time_ms, memory_mb, cpu",
            other
        )),
    }
}

fn set_estimate_field(estimate: &mut ResourceEstimate, field: &str, value: &str) -> anyhow::Result<()> {
    match field {
        "time_ms" => {
            let time: u64 = parse(field, value)?;
            if time == 0 {
                return Err(anyhow!("Estimated time must be greater than 0"));
            }
            estimate.time_ms = time;
        }
        "memory_mb" => estimate.memory_mb = parse(field, value)?,
        "cpu" => {
            let cpu: f64 = parse(field, value)?;
            if cpu < 0.0 {
                return Err(anyhow!("Estimated CPU must be non-negative"));
            }
            estimate.cpu = cpu;
        }
        other => {
            return Err(anyhow!(
                "Unknown estimate field: {}. Valid options: time_ms, memory_mb, cpu",
                other
            ));
        }
    }
    Ok(())
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

fn is_unset(value: &str) -> bool {
    matches!(value.trim(), "" | "none" | "unset")
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `conductor config list` to see available keys.",
        key
    )
}
