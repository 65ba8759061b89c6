use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while turning a price series into a forecast.
///
/// Every variant is fatal to the run that raised it. None of them leave state
/// behind that could leak into another, independent run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("Insufficient data: need at least {required} rows, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Training diverged: {context}")]
    TrainingDivergence { context: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Model has not been trained yet")]
    ModelNotTrained,

    #[error("Pipeline run was cancelled")]
    Cancelled,

    #[error("Pipeline task failed: {reason}")]
    TaskFailed { reason: String },
}

impl ForecastError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ForecastError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        ForecastError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Stable tag for the error, suitable for UI fallbacks.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::MalformedInput { .. } => ErrorKind::MalformedInput,
            ForecastError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ForecastError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            ForecastError::TrainingDivergence { .. } => ErrorKind::TrainingDivergence,
            ForecastError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            ForecastError::ModelNotTrained => ErrorKind::ModelNotTrained,
            ForecastError::Cancelled => ErrorKind::Cancelled,
            ForecastError::TaskFailed { .. } => ErrorKind::TaskFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    InsufficientData,
    ShapeMismatch,
    TrainingDivergence,
    InvalidConfig,
    ModelNotTrained,
    Cancelled,
    TaskFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_formatting() {
        let error = ForecastError::ShapeMismatch {
            what: "feature width",
            expected: 3,
            actual: 5,
        };

        let msg = error.to_string();
        assert!(msg.contains("feature width"));
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let error = ForecastError::InsufficientData {
            required: 2,
            available: 1,
        };
        let json = serde_json::to_string(&error.kind()).unwrap();
        assert_eq!(json, "\"insufficient_data\"");
    }
}
