// Indicator computation over price series
pub mod market_data;

// Feature building and the sequence model
pub mod ml;

// Orchestration of a full forecast run
pub mod pipeline;

// Cancellation and other run-level plumbing
pub mod system;

pub use pipeline::PredictionPipeline;
