//! Configuration management for the wave batcher
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Every section has defaults, so an empty file yields a usable configuration.

use crate::batch::{DEFAULT_MAX_BATCH_SIZE, MAX_GAS_LIMIT, MIN_GAS_LIMIT};
use crate::coordination::CyclePolicy;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Batches above this size get a "consider splitting" warning
    pub max_batch_size: usize,
    /// Gas limits below this floor are flagged
    pub min_gas_limit: u64,
    /// Gas limits above this ceiling are flagged
    pub max_gas_limit: u64,
    /// What to do when the dependency graph contains a cycle
    pub cycle_policy: CyclePolicy,
    /// Optional cap on operations per wave
    pub max_wave_size: Option<usize>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_gas_limit: MIN_GAS_LIMIT,
            max_gas_limit: MAX_GAS_LIMIT,
            cycle_policy: CyclePolicy::default(),
            max_wave_size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-submission timeout; 0 disables it
    pub submission_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            submission_timeout_ms: 30_000,
        }
    }
}

impl ExecutorConfig {
    pub fn submission_timeout(&self) -> Option<Duration> {
        (self.submission_timeout_ms > 0)
            .then(|| Duration::from_millis(self.submission_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Price of one gas unit in wei
    pub gas_price_wei: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            gas_price_wei: 1_000_000_000,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `WAVE_BATCHER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("WAVE_BATCHER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.planner.min_gas_limit > self.planner.max_gas_limit {
            anyhow::bail!(
                "min_gas_limit {} exceeds max_gas_limit {}",
                self.planner.min_gas_limit,
                self.planner.max_gas_limit
            );
        }

        if self.planner.max_wave_size == Some(0) {
            anyhow::bail!("max_wave_size must be at least 1");
        }

        if self.pricing.gas_price_wei == 0 {
            tracing::warn!("gas_price_wei is zero - cost estimates will all be zero");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN.replace_all(input, |cap: &regex::Captures| {
        env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}
