//! Reads daily closes from the formats price providers hand out.
//!
//! Supported inputs:
//! - Alpha Vantage `TIME_SERIES_DAILY` / `TIME_SERIES_DAILY_ADJUSTED` JSON
//! - a JSON array of `{date, close, volume}` records (numbers or strings)
//! - CSV with a `date,close[,volume]` header
//!
//! Records may arrive in any order; the resulting series is ascending.

use crate::domain::errors::ForecastError;
use crate::domain::market::{PricePoint, PriceSeries};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Picks a format from the first non-blank character.
    #[default]
    Auto,
    AlphaVantage,
    Json,
    Csv,
}

impl FromStr for InputFormat {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(InputFormat::Auto),
            "alpha-vantage" | "alpha_vantage" | "alphavantage" => Ok(InputFormat::AlphaVantage),
            "json" => Ok(InputFormat::Json),
            "csv" => Ok(InputFormat::Csv),
            other => Err(ForecastError::invalid_config(format!(
                "unknown input format '{}' (expected auto, alpha-vantage, json or csv)",
                other
            ))),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputFormat::Auto => "auto",
            InputFormat::AlphaVantage => "alpha-vantage",
            InputFormat::Json => "json",
            InputFormat::Csv => "csv",
        };
        write!(f, "{}", name)
    }
}

/// Providers disagree on whether prices are JSON numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn to_f64(&self, field: &str, date: &str) -> Result<f64, ForecastError> {
        match self {
            NumberOrString::Number(v) => Ok(*v),
            NumberOrString::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                ForecastError::malformed(format!("{} on {}: '{}' is not a number", field, date, s))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlphaVantageResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, AlphaVantageBar>>,
    #[serde(rename = "Error Message")]
    error: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageBar {
    #[serde(rename = "4. close")]
    close: NumberOrString,
    #[serde(rename = "5. volume")]
    volume: Option<NumberOrString>,
    /// The adjusted endpoint shifts volume to field 6.
    #[serde(rename = "6. volume")]
    adjusted_volume: Option<NumberOrString>,
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    date: String,
    close: NumberOrString,
    #[serde(default)]
    volume: Option<NumberOrString>,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    date: String,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Reads and parses a price file.
pub fn load_path(
    path: impl AsRef<Path>,
    format: InputFormat,
) -> Result<PriceSeries, ForecastError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ForecastError::malformed(format!("cannot read {}: {}", path.display(), e))
    })?;
    let series = parse_str(&contents, format)?;
    info!(
        "Loaded {} closes from {} ({})",
        series.len(),
        path.display(),
        format
    );
    Ok(series)
}

pub fn parse_str(contents: &str, format: InputFormat) -> Result<PriceSeries, ForecastError> {
    match resolve(contents, format) {
        InputFormat::AlphaVantage => parse_alpha_vantage(contents),
        InputFormat::Json => parse_json_records(contents),
        _ => parse_csv(contents.as_bytes()),
    }
}

fn resolve(contents: &str, format: InputFormat) -> InputFormat {
    if format != InputFormat::Auto {
        return format;
    }
    match contents.trim_start().chars().next() {
        Some('{') => InputFormat::AlphaVantage,
        Some('[') => InputFormat::Json,
        _ => InputFormat::Csv,
    }
}

pub fn parse_alpha_vantage(contents: &str) -> Result<PriceSeries, ForecastError> {
    let response: AlphaVantageResponse = serde_json::from_str(contents)
        .map_err(|e| ForecastError::malformed(format!("invalid Alpha Vantage JSON: {}", e)))?;

    let Some(series) = response.series else {
        // The API reports quota and symbol errors in-band.
        let message = response
            .error
            .or(response.note)
            .or(response.information)
            .unwrap_or_else(|| "missing \"Time Series (Daily)\"".to_string());
        warn!("Alpha Vantage response without prices: {}", message);
        return Err(ForecastError::malformed(message));
    };

    let points = series
        .iter()
        .map(|(date, bar)| {
            let volume = bar
                .volume
                .as_ref()
                .or(bar.adjusted_volume.as_ref())
                .map(|v| v.to_f64("volume", date))
                .transpose()?;
            PricePoint::new(parse_date(date)?, bar.close.to_f64("close", date)?, volume)
        })
        .collect::<Result<Vec<_>, _>>()?;

    PriceSeries::from_unordered(points)
}

pub fn parse_json_records(contents: &str) -> Result<PriceSeries, ForecastError> {
    let records: Vec<JsonRecord> = serde_json::from_str(contents)
        .map_err(|e| ForecastError::malformed(format!("invalid price records: {}", e)))?;

    let points = records
        .iter()
        .map(|r| {
            let volume = r
                .volume
                .as_ref()
                .map(|v| v.to_f64("volume", &r.date))
                .transpose()?;
            PricePoint::new(parse_date(&r.date)?, r.close.to_f64("close", &r.date)?, volume)
        })
        .collect::<Result<Vec<_>, _>>()?;

    PriceSeries::from_unordered(points)
}

pub fn parse_csv<R: Read>(reader: R) -> Result<PriceSeries, ForecastError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut points = Vec::new();
    for (line, record) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = record.map_err(|e| {
            ForecastError::malformed(format!("CSV record {}: {}", line + 1, e))
        })?;
        points.push(PricePoint::new(
            parse_date(&record.date)?,
            record.close,
            record.volume,
        )?);
    }

    PriceSeries::from_unordered(points)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(raw: &str) -> Result<NaiveDate, ForecastError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|e| match raw.get(..10) {
            Some(prefix) if raw.len() > 10 => NaiveDate::parse_from_str(prefix, "%Y-%m-%d"),
            _ => Err(e),
        })
        .map_err(|_| ForecastError::malformed(format!("invalid date '{}'", raw)))
}
