pub mod feature_registry;
pub mod forecast;
pub mod normalization;

pub use feature_registry::{DEFAULT_FEATURES, FeatureColumn, features_to_vector};
pub use forecast::{Direction, Forecast, PipelineOutcome};
pub use normalization::{ColumnBounds, NormalizationBounds};
