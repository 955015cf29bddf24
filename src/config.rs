//! Configuration management
//!
//! Engine-wide defaults live in a TOML file with environment variable
//! overrides (`PVHIST_*`). Per-request parameters are not configured here;
//! they are passed as the objects in [`crate::params`].
//!
//! ```toml
//! [sampling]
//! default_num_bins = 1000
//! default_limit = 1000
//! n_queries_threshold = 5000
//! strategy = "auto"
//!
//! [logging]
//! log_level = "info"
//! ```

use crate::error::{ConfigError, Error, Result};
use crate::params::SamplingStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Sampler defaults
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sampler defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SamplingConfig {
    /// Bins for the bucket sampler when a request names none
    #[serde(default = "default_num_bins")]
    pub default_num_bins: u64,

    /// Output cap for the bin sampler when a request names none
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Events per sample above which the fixed-interval sampler switches
    /// from streaming to one point query per sample
    #[serde(default = "default_n_queries_threshold")]
    pub n_queries_threshold: u64,

    /// Fixed-interval strategy used when a request leaves it open
    #[serde(default)]
    pub strategy: SamplingStrategy,
}

/// Logging configuration
///
/// The library never installs a subscriber. `log_level` is the filter a
/// host binary is expected to hand to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log filter directive (e.g. "info", "pvhist=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_num_bins() -> u64 { 1_000 }
fn default_limit() -> u64 { 1_000 }
fn default_n_queries_threshold() -> u64 { 5_000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            default_num_bins: default_num_bins(),
            default_limit: default_limit(),
            n_queries_threshold: default_n_queries_threshold(),
            strategy: SamplingStrategy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&contents).map_err(|e| {
            Error::Serialization(format!(
                "failed to parse config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        // Sampling
        override_from_env("PVHIST_DEFAULT_NUM_BINS", &mut self.sampling.default_num_bins);
        override_from_env("PVHIST_DEFAULT_LIMIT", &mut self.sampling.default_limit);
        override_from_env(
            "PVHIST_N_QUERIES_THRESHOLD",
            &mut self.sampling.n_queries_threshold,
        );
        if let Ok(strategy) = std::env::var("PVHIST_STRATEGY") {
            match strategy.as_str() {
                "auto" => self.sampling.strategy = SamplingStrategy::Auto,
                "stream" => self.sampling.strategy = SamplingStrategy::Stream,
                "point_queries" => self.sampling.strategy = SamplingStrategy::PointQueries,
                other => tracing::warn!(value = other, "ignoring PVHIST_STRATEGY"),
            }
        }

        // Logging
        if let Ok(log_level) = std::env::var("PVHIST_LOG") {
            self.logging.log_level = log_level;
        } else if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sampling.default_num_bins < 3 {
            return Err(ConfigError::out_of_range(
                "sampling.default_num_bins",
                self.sampling.default_num_bins,
                3,
                u64::MAX,
            ));
        }
        if self.sampling.default_limit == 0 {
            return Err(ConfigError::out_of_range(
                "sampling.default_limit",
                0,
                1,
                u64::MAX,
            ));
        }
        if self.sampling.n_queries_threshold == 0 {
            return Err(ConfigError::out_of_range(
                "sampling.n_queries_threshold",
                0,
                1,
                u64::MAX,
            ));
        }
        if self.logging.log_level.trim().is_empty() {
            return Err(ConfigError::MissingField("logging.log_level".to_string()));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn override_from_env(var: &str, target: &mut u64) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(var, value = %raw, "ignoring unparseable override"),
        }
    }
}
