//! Technical indicators over a daily close series
//!
//! This module provides:
//! - Simple and exponential moving averages
//! - Wilder's Relative Strength Index
//! - MACD (line, signal, histogram)
//! - Bollinger Bands (population standard deviation)
//!
//! SMA and Bollinger Bands come from the `ta` crate. RSI (Wilder smoothing) and
//! the SMA-seeded EMA behind MACD are computed here, since `ta` seeds its EMA
//! with the first value and its RSI uses EMA smoothing.
//!
//! Each indicator has a compact form that returns only the defined values, so
//! the first element corresponds to the first index with a full lookback
//! window. `align` left-pads a compact output with `None` back to the input
//! length; the engine never shifts or truncates the series.

use crate::config::IndicatorPeriods;
use crate::domain::errors::ForecastError;
use crate::domain::market::{BollingerValue, IndicatorFrame, MacdValue, PriceSeries};
use ta::Next;
use ta::indicators::{BollingerBands, SimpleMovingAverage};
use tracing::debug;

/// Arithmetic mean of each trailing window of `period` values.
///
/// Length is `values.len() - period + 1`, or empty when there is not enough
/// history.
pub fn simple_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }
    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return Vec::new();
    };
    // ta emits partial averages while its window fills.
    values
        .iter()
        .map(|&v| sma.next(v))
        .skip(period - 1)
        .collect()
}

/// EMA with smoothing factor `2/(N+1)`, seeded by the SMA of the first N values.
pub fn exponential_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Wilder's RSI. The first value sits at input index `period`.
pub fn relative_strength_index(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }

    let n = period as f64;
    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / n;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / n;

    let mut out = Vec::with_capacity(changes.len() - period + 1);
    out.push(rsi_from_averages(avg_gain, avg_loss));

    for &change in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD values from the first index where the signal line exists
/// (input index `slow + signal - 2`).
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdValue> {
    if fast == 0 || signal == 0 || fast >= slow {
        return Vec::new();
    }

    let fast_ema = exponential_moving_average(values, fast);
    let slow_ema = exponential_moving_average(values, slow);
    if slow_ema.is_empty() {
        return Vec::new();
    }

    // slow_ema[j] and fast_ema[j + offset] refer to the same input index.
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(j, s)| fast_ema[j + offset] - s)
        .collect();

    let signal_line = exponential_moving_average(&macd_line, signal);
    if signal_line.is_empty() {
        return Vec::new();
    }
    signal_line
        .iter()
        .zip(&macd_line[signal - 1..])
        .map(|(&s, &m)| MacdValue {
            macd_line: m,
            signal_line: s,
            histogram: m - s,
        })
        .collect()
}

/// Bollinger Bands: SMA middle band, `std_dev` population sigmas either side.
pub fn bollinger_bands(values: &[f64], period: usize, std_dev: f64) -> Vec<BollingerValue> {
    if values.len() < period {
        return Vec::new();
    }
    let Ok(mut bands) = BollingerBands::new(period, std_dev) else {
        return Vec::new();
    };
    values
        .iter()
        .map(|&v| bands.next(v))
        .skip(period - 1)
        .map(|out| BollingerValue {
            upper: out.upper,
            middle: out.average,
            lower: out.lower,
        })
        .collect()
}

/// Left-pads a compact indicator output to `len` entries.
pub fn align<T: Copy>(compact: &[T], len: usize) -> Vec<Option<T>> {
    let pad = len.saturating_sub(compact.len());
    std::iter::repeat_n(None, pad)
        .chain(compact.iter().copied().map(Some))
        .collect()
}

/// Computes every indicator for a series, index-aligned with its prices.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    periods: IndicatorPeriods,
}

impl IndicatorEngine {
    pub fn new(periods: IndicatorPeriods) -> Result<Self, ForecastError> {
        periods.validate()?;
        Ok(Self { periods })
    }

    pub fn periods(&self) -> &IndicatorPeriods {
        &self.periods
    }

    pub fn compute(&self, series: &PriceSeries) -> Vec<IndicatorFrame> {
        self.compute_closes(&series.closes())
    }

    pub fn compute_closes(&self, closes: &[f64]) -> Vec<IndicatorFrame> {
        let p = &self.periods;
        let len = closes.len();

        let sma = align(&simple_moving_average(closes, p.sma), len);
        let rsi = align(&relative_strength_index(closes, p.rsi), len);
        let macd = align(&macd(closes, p.macd_fast, p.macd_slow, p.macd_signal), len);
        let bollinger = align(
            &bollinger_bands(closes, p.bollinger_period, p.bollinger_std_dev),
            len,
        );

        let frames: Vec<IndicatorFrame> = sma
            .into_iter()
            .zip(rsi)
            .zip(macd)
            .zip(bollinger)
            .map(|(((sma, rsi), macd), bollinger)| IndicatorFrame {
                sma,
                rsi,
                macd,
                bollinger,
            })
            .collect();

        debug!(
            "Computed {} indicator frames ({} complete, warm-up {})",
            frames.len(),
            frames.iter().filter(|f| f.is_complete()).count(),
            p.warmup()
        );
        frames
    }
}
