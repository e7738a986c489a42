// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the Rollup CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rollup_executor::ExecutorConfig;
use rollup_queue::RateLimiterConfig;
use rollup_service::ServiceConfig;
use rollup_service::ServiceLimits;
use serde::Deserialize;

/// Top-level configuration for the `rollup` CLI, loaded from
/// `rollup.toml` if present, else defaulted entirely.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Where per-tenant state snapshots are read from and written back to.
    pub dir: PathBuf,
    /// Where per-repository graph fixtures are read from by `run`.
    pub graphs_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".rollup/state"), graphs_dir: PathBuf::from(".rollup/graphs") }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExecutorSection {
    pub per_repository_timeout_secs: Option<u64>,
    pub per_matcher_timeout_secs: Option<u64>,
    pub blast_radius_timeout_secs: Option<u64>,
    pub total_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RateLimitSection {
    pub max_requests_per_window: Option<u32>,
    pub window_secs: Option<u64>,
    pub burst_allowance: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LimitsSection {
    pub max_repositories_per_rollup: Option<usize>,
    pub max_matchers_per_rollup: Option<usize>,
}

impl CliConfig {
    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            per_repository_timeout: self.executor.per_repository_timeout_secs.map_or(defaults.per_repository_timeout, Duration::from_secs),
            per_matcher_timeout: self.executor.per_matcher_timeout_secs.map_or(defaults.per_matcher_timeout, Duration::from_secs),
            blast_radius_timeout: self.executor.blast_radius_timeout_secs.map_or(defaults.blast_radius_timeout, Duration::from_secs),
            total_timeout: self.executor.total_timeout_secs.map_or(defaults.total_timeout, Duration::from_secs),
        }
    }

    #[must_use]
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        let defaults = RateLimiterConfig::default();
        RateLimiterConfig {
            max_requests_per_window: self.rate_limit.max_requests_per_window.unwrap_or(defaults.max_requests_per_window),
            window: self.rate_limit.window_secs.map_or(defaults.window, Duration::from_secs),
            burst_allowance: self.rate_limit.burst_allowance.unwrap_or(defaults.burst_allowance),
        }
    }

    #[must_use]
    pub fn service_limits(&self) -> ServiceLimits {
        let defaults = ServiceLimits::default();
        ServiceLimits {
            max_repositories_per_rollup: self.limits.max_repositories_per_rollup.unwrap_or(defaults.max_repositories_per_rollup),
            max_matchers_per_rollup: self.limits.max_matchers_per_rollup.unwrap_or(defaults.max_matchers_per_rollup),
        }
    }

    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig { limits: self.service_limits(), queue_capacity: self.queue_capacity.unwrap_or(1_000), blast_radius_timeout: self.executor_config().blast_radius_timeout }
    }
}

/// Errors found during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroTimeout { field: &'static str },
    ZeroWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTimeout { field } => write!(f, "{field} must be greater than zero seconds"),
            ConfigError::ZeroWindow => write!(f, "rate_limit.window_secs must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and parse a TOML configuration file. Returns defaults if `path` is
/// `None`; propagates read/parse errors when a path is given explicitly.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else { return Ok(CliConfig::default()) };
    let content = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    let config: CliConfig = toml::from_str(&content).map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))?;
    Ok(config)
}

/// Validate a parsed configuration, returning any semantic errors found.
pub fn validate_config(config: &CliConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.executor.per_repository_timeout_secs == Some(0) {
        errors.push(ConfigError::ZeroTimeout { field: "executor.per_repository_timeout_secs" });
    }
    if config.executor.per_matcher_timeout_secs == Some(0) {
        errors.push(ConfigError::ZeroTimeout { field: "executor.per_matcher_timeout_secs" });
    }
    if config.executor.total_timeout_secs == Some(0) {
        errors.push(ConfigError::ZeroTimeout { field: "executor.total_timeout_secs" });
    }
    if config.rate_limit.window_secs == Some(0) {
        errors.push(ConfigError::ZeroWindow);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let config = CliConfig::default();
        validate_config(&config).unwrap();
    }

    #[test]
    fn zero_total_timeout_is_invalid() {
        let mut config = CliConfig::default();
        config.executor.total_timeout_secs = Some(0);
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::ZeroTimeout { field: "executor.total_timeout_secs" })));
    }

    #[test]
    fn load_missing_path_falls_back_to_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.state.dir, PathBuf::from(".rollup/state"));
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollup.toml");
        std::fs::write(&path, "queue_capacity = 50\n[state]\ndir = \"/tmp/state\"\ngraphs_dir = \"/tmp/graphs\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.queue_capacity, Some(50));
        assert_eq!(config.state.dir, PathBuf::from("/tmp/state"));
    }
}
