pub mod indicators;

pub use indicators::IndicatorEngine;
