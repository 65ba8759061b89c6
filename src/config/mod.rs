//! Configuration module for nextclose.
//!
//! A `PipelineConfig` can be built from defaults, from environment variables
//! (the binary loads a `.env` file first) or from a TOML file. Every source
//! goes through the same `validate` step before a run uses it.

mod indicator_config;
mod model_config;

pub use indicator_config::IndicatorPeriods;
pub use model_config::ModelConfig;

use crate::domain::errors::ForecastError;
use crate::domain::ml::{DEFAULT_FEATURES, FeatureColumn};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Everything a single pipeline run needs besides the price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub periods: IndicatorPeriods,
    pub epochs: usize,
    pub batch_size: usize,
    /// Runs with fewer labeled rows than this fail with `InsufficientData`.
    pub min_training_rows: usize,
    /// Ordered feature columns. The model input width is `features.len()`.
    pub features: Vec<FeatureColumn>,
    /// Fraction of the most recent labeled rows held out for evaluation.
    pub holdout_fraction: f64,
    /// Absolute price move at or below which the forecast is `Flat`.
    pub flat_tolerance: f64,
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            periods: IndicatorPeriods::default(),
            epochs: 50,
            batch_size: 32,
            min_training_rows: 30,
            features: DEFAULT_FEATURES.to_vec(),
            holdout_fraction: 0.0,
            flat_tolerance: 0.0,
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let periods = IndicatorPeriods::from_env().context("Failed to load indicator periods")?;
        let model = ModelConfig::from_env().context("Failed to load model config")?;

        let features = match env::var("FEATURE_COLUMNS") {
            Ok(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(FeatureColumn::from_str)
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to parse FEATURE_COLUMNS")?,
            Err(_) => defaults.features,
        };

        let config = Self {
            periods,
            epochs: parse_env("TRAINING_EPOCHS", defaults.epochs)?,
            batch_size: parse_env("TRAINING_BATCH_SIZE", defaults.batch_size)?,
            min_training_rows: parse_env("MIN_TRAINING_ROWS", defaults.min_training_rows)?,
            features,
            holdout_fraction: parse_env("HOLDOUT_FRACTION", defaults.holdout_fraction)?,
            flat_tolerance: parse_env("FLAT_TOLERANCE", defaults.flat_tolerance)?,
            model,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        self.periods.validate()?;
        self.model.validate()?;

        if self.epochs == 0 {
            return Err(ForecastError::invalid_config("epochs must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::invalid_config("batch_size must be > 0"));
        }
        if self.min_training_rows < 2 {
            return Err(ForecastError::invalid_config(format!(
                "min_training_rows must be at least 2, got {}",
                self.min_training_rows
            )));
        }
        if self.features.is_empty() {
            return Err(ForecastError::invalid_config(
                "at least one feature column is required",
            ));
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(ForecastError::invalid_config(format!(
                "holdout_fraction must be in [0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if !self.flat_tolerance.is_finite() || self.flat_tolerance < 0.0 {
            return Err(ForecastError::invalid_config(format!(
                "flat_tolerance must be a non-negative number, got {}",
                self.flat_tolerance
            )));
        }
        Ok(())
    }
}

pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}
