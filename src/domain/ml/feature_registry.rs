use crate::domain::errors::ForecastError;
use crate::domain::market::{IndicatorFrame, PricePoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A column a feature vector can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Close,
    Volume,
    Sma,
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
}

/// Column order used when no explicit feature set is configured.
/// Any change here changes the model input layout.
pub const DEFAULT_FEATURES: &[FeatureColumn] = &[
    FeatureColumn::Sma,
    FeatureColumn::Rsi,
    FeatureColumn::MacdHistogram,
    FeatureColumn::BollingerLower,
    FeatureColumn::BollingerUpper,
];

impl FeatureColumn {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Close => "close",
            FeatureColumn::Volume => "volume",
            FeatureColumn::Sma => "sma",
            FeatureColumn::Rsi => "rsi",
            FeatureColumn::MacdLine => "macd_line",
            FeatureColumn::MacdSignal => "macd_signal",
            FeatureColumn::MacdHistogram => "macd_histogram",
            FeatureColumn::BollingerUpper => "bollinger_upper",
            FeatureColumn::BollingerMiddle => "bollinger_middle",
            FeatureColumn::BollingerLower => "bollinger_lower",
        }
    }

    /// Value of this column at one index, `None` while warming up.
    pub fn value(&self, point: &PricePoint, frame: &IndicatorFrame) -> Option<f64> {
        match self {
            FeatureColumn::Close => Some(point.close),
            FeatureColumn::Volume => point.volume,
            FeatureColumn::Sma => frame.sma,
            FeatureColumn::Rsi => frame.rsi,
            FeatureColumn::MacdLine => frame.macd.map(|m| m.macd_line),
            FeatureColumn::MacdSignal => frame.macd.map(|m| m.signal_line),
            FeatureColumn::MacdHistogram => frame.macd.map(|m| m.histogram),
            FeatureColumn::BollingerUpper => frame.bollinger.map(|b| b.upper),
            FeatureColumn::BollingerMiddle => frame.bollinger.map(|b| b.middle),
            FeatureColumn::BollingerLower => frame.bollinger.map(|b| b.lower),
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureColumn {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(FeatureColumn::Close),
            "volume" => Ok(FeatureColumn::Volume),
            "sma" => Ok(FeatureColumn::Sma),
            "rsi" => Ok(FeatureColumn::Rsi),
            "macd_line" | "macd" => Ok(FeatureColumn::MacdLine),
            "macd_signal" => Ok(FeatureColumn::MacdSignal),
            "macd_histogram" | "macd_hist" => Ok(FeatureColumn::MacdHistogram),
            "bollinger_upper" | "bb_upper" => Ok(FeatureColumn::BollingerUpper),
            "bollinger_middle" | "bb_middle" => Ok(FeatureColumn::BollingerMiddle),
            "bollinger_lower" | "bb_lower" => Ok(FeatureColumn::BollingerLower),
            other => Err(ForecastError::invalid_config(format!(
                "unknown feature column '{}'",
                other
            ))),
        }
    }
}

/// Builds the raw (unnormalized) feature vector for one index.
///
/// Returns `None` if any requested column is still undefined. Nothing is
/// zero-filled.
pub fn features_to_vector(
    columns: &[FeatureColumn],
    point: &PricePoint,
    frame: &IndicatorFrame,
) -> Option<Vec<f64>> {
    columns.iter().map(|c| c.value(point, frame)).collect()
}
