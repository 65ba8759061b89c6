// Price history and indicator values
pub mod market;

// Features, normalization and forecasts
pub mod ml;

// Domain-specific error types
pub mod errors;
