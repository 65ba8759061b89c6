use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Indicator values at one index of a price series.
///
/// A field is `None` while its indicator is still warming up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerValue>,
}

impl IndicatorFrame {
    /// True once every indicator has enough history.
    pub fn is_complete(&self) -> bool {
        self.sma.is_some() && self.rsi.is_some() && self.macd.is_some() && self.bollinger.is_some()
    }
}
