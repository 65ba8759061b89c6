//! End-to-end forecast: indicators → features → fresh LSTM → next close.
//!
//! Every run builds its own model, bounds and RNG. Nothing is cached between
//! runs, so independent runs can execute concurrently on separate threads or
//! blocking tasks.

use crate::application::market_data::IndicatorEngine;
use crate::application::ml::{FeatureBuilder, Predictor, SequenceModel};
use crate::application::system::CancellationFlag;
use crate::config::PipelineConfig;
use crate::domain::errors::ForecastError;
use crate::domain::market::{IndicatorFrame, PriceSeries};
use crate::domain::ml::{ColumnBounds, Direction, Forecast};
use ndarray::Array2;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PredictionPipeline {
    config: PipelineConfig,
    engine: IndicatorEngine,
}

/// Validates `config` and runs the pipeline once over `series`.
pub fn run(series: &PriceSeries, config: &PipelineConfig) -> Result<Forecast, ForecastError> {
    PredictionPipeline::new(config.clone())?.run(series)
}

impl PredictionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ForecastError> {
        config.validate()?;
        let engine = IndicatorEngine::new(config.periods.clone())?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Indicator frames aligned with `series`, for display.
    pub fn indicators(&self, series: &PriceSeries) -> Vec<IndicatorFrame> {
        self.engine.compute(series)
    }

    pub fn run(&self, series: &PriceSeries) -> Result<Forecast, ForecastError> {
        self.run_with_cancel(series, &CancellationFlag::new())
    }

    /// Runs the pipeline, giving up with `Cancelled` as soon as `cancel` is
    /// observed between steps or training batches.
    pub fn run_with_cancel(
        &self,
        series: &PriceSeries,
        cancel: &CancellationFlag,
    ) -> Result<Forecast, ForecastError> {
        let cfg = &self.config;
        let last = series.last().ok_or(ForecastError::InsufficientData {
            required: cfg.min_training_rows,
            available: 0,
        })?;
        info!(
            "Forecast run: {} closes up to {}, {} features",
            series.len(),
            last.date,
            cfg.features.len()
        );

        checkpoint(cancel)?;
        let frames = self.engine.compute(series);

        checkpoint(cancel)?;
        let builder =
            FeatureBuilder::new(cfg.features.clone()).with_min_rows(cfg.min_training_rows);
        let (dataset, evaluation) =
            builder.build_split(series.points(), &frames, cfg.holdout_fraction)?;

        checkpoint(cancel)?;
        let mut model = SequenceModel::create(dataset.width(), &cfg.model)?;
        model.train_with_cancel(
            &dataset.features,
            &dataset.normalized_labels,
            cfg.epochs,
            cfg.batch_size,
            cancel,
        )?;

        let training_loss = model.evaluate(&dataset.features, &dataset.normalized_labels)?;
        let evaluation_loss = evaluation
            .as_ref()
            .map(|set| model.evaluate(&set.features, &set.normalized_labels))
            .transpose()?;

        checkpoint(cancel)?;
        let latest = builder.latest_features(series.points(), &frames, cfg.model.lookback)?;
        let scaled = dataset.bounds.transform(&latest)?;
        let predicted_next_close = predict_next_close(&model, &scaled, &dataset.label_bounds)?;

        let direction = Direction::between(last.close, predicted_next_close, cfg.flat_tolerance);
        info!(
            "Predicted next close {:.4} vs last {:.4} ({:?}), training loss {:.6}",
            predicted_next_close, last.close, direction, training_loss
        );

        Ok(Forecast {
            as_of: last.date,
            last_known_close: last.close,
            predicted_next_close,
            direction,
            training_loss,
            evaluation_loss,
            training_rows: dataset.len(),
        })
    }

    /// Runs on tokio's blocking pool so async callers never stall their
    /// executor on training.
    pub async fn run_async(&self, series: PriceSeries) -> Result<Forecast, ForecastError> {
        self.run_async_with_cancel(series, CancellationFlag::new())
            .await
    }

    pub async fn run_async_with_cancel(
        &self,
        series: PriceSeries,
        cancel: CancellationFlag,
    ) -> Result<Forecast, ForecastError> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.run_with_cancel(&series, &cancel))
            .await
            .map_err(|e| {
                warn!("Forecast task failed: {}", e);
                ForecastError::TaskFailed {
                    reason: e.to_string(),
                }
            })?
    }
}

fn checkpoint(cancel: &CancellationFlag) -> Result<(), ForecastError> {
    if cancel.is_cancelled() {
        return Err(ForecastError::Cancelled);
    }
    Ok(())
}

/// Last output of `predictor` over the inference window, in price units.
fn predict_next_close(
    predictor: &dyn Predictor,
    window: &Array2<f64>,
    label_bounds: &ColumnBounds,
) -> Result<f64, ForecastError> {
    if window.ncols() != predictor.input_width() {
        return Err(ForecastError::ShapeMismatch {
            what: "inference row width",
            expected: predictor.input_width(),
            actual: window.ncols(),
        });
    }
    let outputs = predictor.predict(window)?;
    let scaled = outputs
        .last()
        .copied()
        .ok_or(ForecastError::InsufficientData {
            required: 1,
            available: 0,
        })?;
    Ok(label_bounds.denormalize(scaled))
}
