//! LSTM regressor owning its weights, optimizer moments and RNG.
//!
//! A model is created `Compiled`, becomes `Trained` after the first
//! successful `train` call, and is read-only for `evaluate`/`predict`.
//! Training is all-or-nothing: on any error the weights, optimizer state and
//! RNG are restored to what they were before the call.

use super::lstm::{LstmGradients, LstmParams};
use super::optimizer::Adam;
use super::predictor::Predictor;
use crate::application::system::CancellationFlag;
use crate::config::ModelConfig;
use crate::domain::errors::ForecastError;
use ndarray::{Array1, Array2, ArrayView2, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Compiled,
    Trained,
}

/// Mean squared error of every epoch, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    pub samples: usize,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct SequenceModel {
    input_width: usize,
    config: ModelConfig,
    params: LstmParams,
    optimizer: Adam,
    rng: StdRng,
    state: ModelState,
}

struct Snapshot {
    params: LstmParams,
    optimizer: Adam,
    rng: StdRng,
}

impl SequenceModel {
    pub fn create(input_width: usize, config: &ModelConfig) -> Result<Self, ForecastError> {
        config.validate()?;
        if input_width == 0 {
            return Err(ForecastError::invalid_config("input width must be > 0"));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let params = LstmParams::new(input_width, config.hidden_units, &mut rng);
        let optimizer = Adam::new(config.learning_rate, &params);

        debug!(
            "Compiled LSTM: input {} hidden {} lookback {}",
            input_width, config.hidden_units, config.lookback
        );

        Ok(Self {
            input_width,
            config: config.clone(),
            params,
            optimizer,
            rng,
            state: ModelState::Compiled,
        })
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn train(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainingReport, ForecastError> {
        self.train_with_cancel(
            features,
            labels,
            epochs,
            batch_size,
            &CancellationFlag::new(),
        )
    }

    /// Like `train`, checking `cancel` before every mini-batch.
    pub fn train_with_cancel(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        epochs: usize,
        batch_size: usize,
        cancel: &CancellationFlag,
    ) -> Result<TrainingReport, ForecastError> {
        self.check_inputs(features, Some(labels))?;
        if epochs == 0 || batch_size == 0 {
            return Err(ForecastError::invalid_config(
                "epochs and batch_size must be > 0",
            ));
        }

        let snapshot = Snapshot {
            params: self.params.clone(),
            optimizer: self.optimizer.clone(),
            rng: self.rng.clone(),
        };

        match self.run_epochs(features, labels, epochs, batch_size, cancel) {
            Ok(report) => {
                self.state = ModelState::Trained;
                info!(
                    "Training finished: {} epochs over {} samples, final loss {:.6}",
                    report.epoch_losses.len(),
                    report.samples,
                    report.final_loss().unwrap_or(f64::NAN)
                );
                Ok(report)
            }
            Err(e) => {
                self.params = snapshot.params;
                self.optimizer = snapshot.optimizer;
                self.rng = snapshot.rng;
                warn!("Training aborted, weights restored: {}", e);
                Err(e)
            }
        }
    }

    /// Mean squared error over `features`/`labels`.
    pub fn evaluate(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
    ) -> Result<f64, ForecastError> {
        self.check_inputs(features, Some(labels))?;
        let predictions = self.predict(features)?;
        let sse: f64 = predictions
            .iter()
            .zip(labels.iter())
            .map(|(p, y)| (p - y) * (p - y))
            .sum();
        Ok(sse / predictions.len() as f64)
    }

    /// One output per row; row `i` sees rows `i+1-lookback ..= i`.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>, ForecastError> {
        if self.state != ModelState::Trained {
            return Err(ForecastError::ModelNotTrained);
        }
        self.check_inputs(features, None)?;

        let lookback = self.config.lookback;
        let predictions: Vec<f64> = (0..features.nrows())
            .into_par_iter()
            .map(|row| self.params.forward(window(features, row, lookback)))
            .collect();

        if let Some(row) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(ForecastError::TrainingDivergence {
                context: format!("non-finite prediction at row {}", row),
            });
        }
        Ok(predictions)
    }

    fn check_inputs(
        &self,
        features: &Array2<f64>,
        labels: Option<&Array1<f64>>,
    ) -> Result<(), ForecastError> {
        if features.ncols() != self.input_width {
            return Err(ForecastError::ShapeMismatch {
                what: "feature width",
                expected: self.input_width,
                actual: features.ncols(),
            });
        }
        if let Some(labels) = labels {
            if labels.len() != features.nrows() {
                return Err(ForecastError::ShapeMismatch {
                    what: "label count",
                    expected: features.nrows(),
                    actual: labels.len(),
                });
            }
            if labels.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::malformed("labels contain non-finite values"));
            }
        }
        if features.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::malformed(
                "features contain non-finite values",
            ));
        }
        Ok(())
    }

    fn run_epochs(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        epochs: usize,
        batch_size: usize,
        cancel: &CancellationFlag,
    ) -> Result<TrainingReport, ForecastError> {
        let samples = features.nrows();
        let lookback = self.config.lookback;
        let mut order: Vec<usize> = (0..samples).collect();
        let mut epoch_losses = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            if self.config.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut total = 0.0;
            for batch in order.chunks(batch_size) {
                if cancel.is_cancelled() {
                    return Err(ForecastError::Cancelled);
                }

                let params = &self.params;
                let scale = 1.0 / batch.len() as f64;
                let per_sample: Vec<(f64, LstmGradients)> = batch
                    .par_iter()
                    .map(|&row| {
                        params.sample_gradients(window(features, row, lookback), labels[row], scale)
                    })
                    .collect();

                // Summed in batch order so seeded runs are bit-for-bit repeatable.
                let mut grads = LstmGradients::zeros_like(params);
                let mut batch_loss = 0.0;
                for (loss, sample) in &per_sample {
                    batch_loss += loss;
                    grads.add_assign(sample);
                }

                if !batch_loss.is_finite() {
                    return Err(ForecastError::TrainingDivergence {
                        context: format!("non-finite loss in epoch {}", epoch + 1),
                    });
                }

                if let Some(clip) = self.config.gradient_clip {
                    let norm = grads.norm();
                    if norm > clip {
                        grads.scale(clip / norm);
                    }
                }

                self.optimizer.step(&mut self.params, &grads);
                total += batch_loss;
            }

            if !self.params.is_finite() {
                return Err(ForecastError::TrainingDivergence {
                    context: format!("non-finite weights after epoch {}", epoch + 1),
                });
            }

            let loss = total / samples as f64;
            debug!("Epoch {}/{}: loss {:.6}", epoch + 1, epochs, loss);
            epoch_losses.push(loss);
        }

        Ok(TrainingReport {
            epoch_losses,
            samples,
        })
    }
}

impl Predictor for SequenceModel {
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>, ForecastError> {
        SequenceModel::predict(self, features)
    }

    fn input_width(&self) -> usize {
        self.input_width
    }

    fn name(&self) -> &str {
        "lstm"
    }
}

fn window(features: &Array2<f64>, row: usize, lookback: usize) -> ArrayView2<'_, f64> {
    let start = (row + 1).saturating_sub(lookback);
    features.slice(s![start..=row, ..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn config(seed: u64) -> ModelConfig {
        ModelConfig {
            hidden_units: 8,
            learning_rate: 0.01,
            seed: Some(seed),
            ..ModelConfig::default()
        }
    }

    /// Two normalized columns and a target that depends smoothly on them.
    fn toy_data(rows: usize) -> (Array2<f64>, Array1<f64>) {
        let features = Array::from_shape_fn((rows, 2), |(i, j)| {
            let t = i as f64 / rows as f64;
            if j == 0 { t } else { (t * 6.0).sin() * 0.5 + 0.5 }
        });
        let labels = features
            .rows()
            .into_iter()
            .map(|r| 0.7 * r[0] + 0.2 * r[1])
            .collect();
        (features, labels)
    }

    #[test]
    fn test_create_starts_compiled() {
        let model = SequenceModel::create(2, &config(1)).unwrap();
        assert_eq!(model.state(), ModelState::Compiled);
        assert_eq!(model.input_width(), 2);
        assert_eq!(Predictor::name(&model), "lstm");
    }

    #[test]
    fn test_create_rejects_zero_width() {
        assert!(matches!(
            SequenceModel::create(0, &config(1)),
            Err(ForecastError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_predict_requires_training() {
        let model = SequenceModel::create(2, &config(1)).unwrap();
        let (features, labels) = toy_data(10);
        assert_eq!(model.predict(&features), Err(ForecastError::ModelNotTrained));
        assert_eq!(
            model.evaluate(&features, &labels),
            Err(ForecastError::ModelNotTrained)
        );
    }

    #[test]
    fn test_train_width_mismatch_leaves_model_untouched() {
        let mut model = SequenceModel::create(3, &config(1)).unwrap();
        let before = model.params.clone();
        let features = Array2::<f64>::zeros((10, 5));
        let labels = Array1::<f64>::zeros(10);

        let err = model.train(&features, &labels, 2, 4).unwrap_err();
        assert_eq!(
            err,
            ForecastError::ShapeMismatch {
                what: "feature width",
                expected: 3,
                actual: 5
            }
        );
        assert_eq!(model.state(), ModelState::Compiled);
        assert_eq!(model.params, before);
        assert_eq!(model.optimizer.steps(), 0);
    }

    #[test]
    fn test_train_label_count_mismatch() {
        let mut model = SequenceModel::create(2, &config(1)).unwrap();
        let (features, _) = toy_data(10);
        let labels = Array1::<f64>::zeros(9);
        assert!(matches!(
            model.train(&features, &labels, 1, 4),
            Err(ForecastError::ShapeMismatch {
                what: "label count",
                ..
            })
        ));
    }

    #[test]
    fn test_training_reduces_loss() {
        let (features, labels) = toy_data(40);
        let mut model = SequenceModel::create(2, &config(7)).unwrap();

        model.train(&features, &labels, 1, 8).unwrap();
        let early = model.evaluate(&features, &labels).unwrap();

        let report = model.train(&features, &labels, 150, 8).unwrap();
        let late = model.evaluate(&features, &labels).unwrap();

        assert_eq!(report.epoch_losses.len(), 150);
        assert_eq!(report.samples, 40);
        assert!(late <= early, "late {} > early {}", late, early);
        assert!(late < 0.05, "late loss {}", late);
    }

    #[test]
    fn test_predict_is_repeatable_and_pure() {
        let (features, labels) = toy_data(20);
        let mut model = SequenceModel::create(2, &config(3)).unwrap();
        model.train(&features, &labels, 5, 4).unwrap();

        let first = model.predict(&features).unwrap();
        let second = model.predict(&features).unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (features, labels) = toy_data(16);
        let mut a = SequenceModel::create(2, &config(11)).unwrap();
        let b = SequenceModel::create(2, &config(11)).unwrap();
        assert_eq!(a.params, b.params);

        a.train(&features, &labels, 1, 16).unwrap();
        assert_ne!(a.params, b.params);
    }

    #[test]
    fn test_divergence_restores_weights() {
        let (features, mut labels) = toy_data(12);
        let mut model = SequenceModel::create(2, &config(5)).unwrap();
        model.train(&features, &labels, 2, 4).unwrap();
        let trained = model.params.clone();
        let steps = model.optimizer.steps();

        // Huge targets overflow the squared error.
        labels.fill(1e200);
        let err = model.train(&features, &labels, 3, 4).unwrap_err();
        assert!(matches!(err, ForecastError::TrainingDivergence { .. }));
        assert_eq!(model.params, trained);
        assert_eq!(model.optimizer.steps(), steps);
        assert_eq!(model.state(), ModelState::Trained);
    }

    #[test]
    fn test_cancelled_training_restores_weights() {
        let (features, labels) = toy_data(12);
        let mut model = SequenceModel::create(2, &config(5)).unwrap();
        let before = model.params.clone();

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let err = model
            .train_with_cancel(&features, &labels, 3, 4, &cancel)
            .unwrap_err();

        assert_eq!(err, ForecastError::Cancelled);
        assert_eq!(model.params, before);
        assert_eq!(model.state(), ModelState::Compiled);
    }

    #[test]
    fn test_lookback_windows() {
        let features = Array::from_shape_fn((5, 1), |(i, _)| i as f64);
        assert_eq!(window(&features, 0, 3).nrows(), 1);
        assert_eq!(window(&features, 1, 3).nrows(), 2);
        let w = window(&features, 4, 3);
        assert_eq!(w.nrows(), 3);
        assert_eq!(w[[0, 0]], 2.0);
        assert_eq!(w[[2, 0]], 4.0);
    }

    #[test]
    fn test_lookback_model_trains() {
        let (features, labels) = toy_data(24);
        let mut cfg = config(9);
        cfg.lookback = 4;
        let mut model = SequenceModel::create(2, &cfg).unwrap();
        let report = model.train(&features, &labels, 10, 6).unwrap();
        assert!(report.final_loss().unwrap().is_finite());
        assert_eq!(model.predict(&features).unwrap().len(), 24);
    }

    #[test]
    fn test_rejects_non_finite_features() {
        let (mut features, labels) = toy_data(8);
        features[[3, 1]] = f64::NAN;
        let mut model = SequenceModel::create(2, &config(1)).unwrap();
        assert!(matches!(
            model.train(&features, &labels, 1, 4),
            Err(ForecastError::MalformedInput { .. })
        ));
    }
}
