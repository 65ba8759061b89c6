use crate::domain::errors::ForecastError;
use ndarray::Array2;

/// Read-only inference over normalized feature rows.
pub trait Predictor: Send + Sync {
    /// One output per input row, in the label's normalized scale.
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>, ForecastError>;

    /// Number of feature columns each row must have.
    fn input_width(&self) -> usize;

    /// Get model name/type
    fn name(&self) -> &str;
}
