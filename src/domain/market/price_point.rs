use crate::domain::errors::ForecastError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One daily observation of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64, volume: Option<f64>) -> Result<Self, ForecastError> {
        let point = Self {
            date,
            close,
            volume,
        };
        point.validate()?;
        Ok(point)
    }

    /// Rejects prices that cannot come from a real market.
    pub fn validate(&self) -> Result<(), ForecastError> {
        if !self.close.is_finite() || self.close <= 0.0 {
            warn!(
                "Validation FAILED: {} has non-positive or non-finite close: {}",
                self.date, self.close
            );
            return Err(ForecastError::malformed(format!(
                "close on {} must be a positive finite number, got {}",
                self.date, self.close
            )));
        }

        if let Some(volume) = self.volume.filter(|v| !v.is_finite() || *v < 0.0) {
            warn!(
                "Validation FAILED: {} has negative or non-finite volume: {}",
                self.date, volume
            );
            return Err(ForecastError::malformed(format!(
                "volume on {} must be a non-negative finite number, got {}",
                self.date, volume
            )));
        }

        Ok(())
    }
}

/// Strictly ascending, duplicate-free daily price history.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Builds a series from points that are already in ascending date order.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, ForecastError> {
        for point in &points {
            point.validate()?;
        }

        if let Some(pair) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(ForecastError::malformed(format!(
                "dates must be strictly ascending: {} is followed by {}",
                pair[0].date, pair[1].date
            )));
        }

        Ok(Self { points })
    }

    /// Builds a series from provider-native order (often newest first).
    pub fn from_unordered(mut points: Vec<PricePoint>) -> Result<Self, ForecastError> {
        points.sort_by_key(|p| p.date);
        if let Some(pair) = points.windows(2).find(|w| w[1].date == w[0].date) {
            return Err(ForecastError::malformed(format!(
                "duplicate date {} in price series",
                pair[0].date
            )));
        }
        Self::new(points)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
