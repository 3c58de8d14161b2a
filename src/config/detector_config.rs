//! Detector Configuration - training, threshold and runtime knobs as TOML values
//!
//! Each section implements `Default` (15 epochs, batch 48, learning rate
//! 0.01, 80/20 split, 3-sigma threshold), so a run needs no config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::context::ExecutionTarget;
use crate::model::RecurrentMode;
use crate::pipeline::TestNormalization;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "DETECTOR_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "detector.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Optimisation schedule
    #[serde(default)]
    pub training: TrainingConfig,

    /// Reconstruction-error threshold
    #[serde(default)]
    pub threshold: ThresholdConfig,

    /// Model topology
    #[serde(default)]
    pub model: ModelConfig,

    /// Scaling of the test series
    #[serde(default)]
    pub normalization: NormalizationConfig,

    /// Execution target and seeding
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl DetectorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$DETECTOR_CONFIG`
    /// 2. `./detector.toml`
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(
                            path = %p.display(),
                            "Loaded detector config from {}",
                            CONFIG_ENV_VAR
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded detector config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No detector config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the effective configuration.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the effective configuration to disk.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Validate every section, collecting all problems before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Optimisation schedule for the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Full passes over the training split.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Samples per batch; also the SGD gradient rescale divisor.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// SGD learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Fraction of the reference series used for training; the tail is validation.
    #[serde(default = "default_split_fraction")]
    pub split_fraction: f64,
}

fn default_epochs() -> usize { 15 }
fn default_batch_size() -> usize { 48 }
fn default_learning_rate() -> f64 { 0.01 }
fn default_split_fraction() -> f64 { 0.8 }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            split_fraction: default_split_fraction(),
        }
    }
}

/// Reconstruction-error threshold parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Standard deviations above the mean training error.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 { 3.0 }

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
        }
    }
}

/// Sequence model topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Values per timestep. Hidden and output width follow it.
    #[serde(default = "default_feature_count")]
    pub feature_count: usize,

    /// How a batch is fed through the recurrent layer.
    #[serde(default)]
    pub recurrent_mode: RecurrentMode,
}

fn default_feature_count() -> usize { 1 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            feature_count: default_feature_count(),
            recurrent_mode: RecurrentMode::default(),
        }
    }
}

/// Scaling applied to the test series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// `refit` (default) fits fresh statistics on the test series;
    /// `reuse_training` applies the training statistics.
    #[serde(default)]
    pub test_policy: TestNormalization,
}

/// Execution target and seeding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Seed for parameter initialisation.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// `cpu` or `cpu_parallel` (rayon-backed inference).
    #[serde(default)]
    pub execution: ExecutionTarget,
}

fn default_seed() -> u64 { 42 }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            execution: ExecutionTarget::default(),
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n{}", bullet_list(.0))]
    Validation(Vec<String>),
}

fn bullet_list(errors: &[String]) -> String {
    errors.iter().map(|e| format!("  - {e}\n")).collect()
}
