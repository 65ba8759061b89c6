pub mod dataset;
pub mod lstm;
pub mod optimizer;
pub mod predictor;
pub mod sequence_model;

pub use dataset::{Dataset, EvaluationSet, FeatureBuilder};
pub use predictor::Predictor;
pub use sequence_model::{ModelState, SequenceModel, TrainingReport};
