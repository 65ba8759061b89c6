//! Indicator period parsing from environment variables.

use super::parse_env;
use crate::domain::errors::ForecastError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Lookback windows for every indicator the engine computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorPeriods {
    pub sma: usize,
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            sma: 20,
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
        }
    }
}

impl IndicatorPeriods {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            sma: parse_env("SMA_PERIOD", defaults.sma)?,
            rsi: parse_env("RSI_PERIOD", defaults.rsi)?,
            macd_fast: parse_env("MACD_FAST_PERIOD", defaults.macd_fast)?,
            macd_slow: parse_env("MACD_SLOW_PERIOD", defaults.macd_slow)?,
            macd_signal: parse_env("MACD_SIGNAL_PERIOD", defaults.macd_signal)?,
            bollinger_period: parse_env("BB_PERIOD", defaults.bollinger_period)?,
            bollinger_std_dev: parse_env("BB_STD_DEV", defaults.bollinger_std_dev)?,
        })
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let named = [
            ("sma", self.sma),
            ("rsi", self.rsi),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("bollinger_period", self.bollinger_period),
        ];
        if let Some((name, _)) = named.iter().find(|(_, p)| *p == 0) {
            return Err(ForecastError::invalid_config(format!(
                "{} period must be > 0",
                name
            )));
        }

        if self.macd_fast >= self.macd_slow {
            return Err(ForecastError::invalid_config(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }

        if !self.bollinger_std_dev.is_finite() || self.bollinger_std_dev < 0.0 {
            return Err(ForecastError::invalid_config(format!(
                "bollinger_std_dev must be a non-negative number, got {}",
                self.bollinger_std_dev
            )));
        }

        Ok(())
    }

    /// Index of the first price at which every indicator is defined.
    pub fn warmup(&self) -> usize {
        let sma = self.sma.saturating_sub(1);
        let rsi = self.rsi;
        let macd = (self.macd_slow + self.macd_signal).saturating_sub(2);
        let bollinger = self.bollinger_period.saturating_sub(1);
        sma.max(rsi).max(macd).max(bollinger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_warmup_is_macd_bound() {
        // MACD 26/9 needs 33 prior values before the signal line exists.
        assert_eq!(IndicatorPeriods::default().warmup(), 33);
    }

    #[test]
    fn test_warmup_on_unvalidated_periods_does_not_underflow() {
        let periods = IndicatorPeriods {
            sma: 0,
            macd_slow: 0,
            macd_signal: 0,
            bollinger_period: 0,
            ..Default::default()
        };
        assert_eq!(periods.warmup(), periods.rsi);
    }

    #[test]
    fn test_rejects_inverted_macd() {
        let periods = IndicatorPeriods {
            macd_fast: 26,
            macd_slow: 12,
            ..Default::default()
        };
        assert!(matches!(
            periods.validate(),
            Err(ForecastError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_period() {
        let periods = IndicatorPeriods {
            rsi: 0,
            ..Default::default()
        };
        let err = periods.validate().unwrap_err();
        assert!(err.to_string().contains("rsi"));
    }
}
