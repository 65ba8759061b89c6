use crate::domain::errors::{ErrorKind, ForecastError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// Compares a predicted close with the last known close.
    /// Moves no larger than `tolerance` (absolute) count as `Flat`.
    pub fn between(last_known: f64, predicted: f64, tolerance: f64) -> Self {
        let delta = predicted - last_known;
        if delta.abs() <= tolerance {
            Direction::Flat
        } else if delta > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

/// Result of one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Date of the last observed close.
    pub as_of: NaiveDate,
    pub last_known_close: f64,
    pub predicted_next_close: f64,
    pub direction: Direction,
    /// Mean squared error on the (normalized) training rows.
    pub training_loss: f64,
    /// Mean squared error on the hold-out rows, when a hold-out was configured.
    pub evaluation_loss: Option<f64>,
    pub training_rows: usize,
}

/// Tagged outcome handed to UI consumers instead of a raw error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Ok { forecast: Forecast },
    Failed { kind: ErrorKind, message: String },
}

impl PipelineOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, PipelineOutcome::Ok { .. })
    }
}

impl From<Result<Forecast, ForecastError>> for PipelineOutcome {
    fn from(result: Result<Forecast, ForecastError>) -> Self {
        match result {
            Ok(forecast) => PipelineOutcome::Ok { forecast },
            Err(e) => PipelineOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}
