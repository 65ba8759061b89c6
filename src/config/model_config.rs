//! Sequence model hyper-parameters.

use super::parse_env;
use crate::domain::errors::ForecastError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the recurrent layer.
    pub hidden_units: usize,
    /// Adam step size.
    pub learning_rate: f64,
    /// Number of consecutive rows fed to the LSTM for each prediction.
    pub lookback: usize,
    /// Shuffle mini-batches every epoch.
    pub shuffle: bool,
    /// Global gradient-norm clip. `None` disables clipping.
    pub gradient_clip: Option<f64>,
    /// Seed for weight init and shuffling. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_units: 50,
            learning_rate: 0.001,
            lookback: 1,
            shuffle: true,
            gradient_clip: Some(1.0),
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gradient_clip = match env::var("GRADIENT_CLIP") {
            Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
            Ok(v) => Some(
                v.trim()
                    .parse::<f64>()
                    .context("Failed to parse GRADIENT_CLIP")?,
            ),
            Err(_) => defaults.gradient_clip,
        };

        let seed = env::var("MODEL_SEED")
            .ok()
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .context("Failed to parse MODEL_SEED")?;

        Ok(Self {
            hidden_units: parse_env("LSTM_HIDDEN_UNITS", defaults.hidden_units)?,
            learning_rate: parse_env("LEARNING_RATE", defaults.learning_rate)?,
            lookback: parse_env("LSTM_LOOKBACK", defaults.lookback)?,
            shuffle: parse_env("SHUFFLE_BATCHES", defaults.shuffle)?,
            gradient_clip,
            seed,
        })
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.hidden_units == 0 {
            return Err(ForecastError::invalid_config("hidden_units must be > 0"));
        }
        if self.lookback == 0 {
            return Err(ForecastError::invalid_config("lookback must be > 0"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ForecastError::invalid_config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if let Some(clip) = self.gradient_clip.filter(|c| !c.is_finite() || *c <= 0.0) {
            return Err(ForecastError::invalid_config(format!(
                "gradient_clip must be positive, got {}",
                clip
            )));
        }
        Ok(())
    }
}
