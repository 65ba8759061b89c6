use chrono::{Days, NaiveDate};
use ndarray::{Array1, Array2};
use nextclose::application::PredictionPipeline;
use nextclose::application::market_data::IndicatorEngine;
use nextclose::application::ml::{FeatureBuilder, ModelState, SequenceModel};
use nextclose::config::{IndicatorPeriods, ModelConfig, PipelineConfig};
use nextclose::domain::errors::ForecastError;
use nextclose::domain::market::{PricePoint, PriceSeries};
use nextclose::domain::ml::{Direction, PipelineOutcome};
use nextclose::infrastructure::{InputFormat, parse_str};

fn series(closes: &[f64]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let points = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PricePoint::new(start + Days::new(i as u64), c, None).unwrap())
        .collect();
    PriceSeries::new(points).unwrap()
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        epochs: 15,
        batch_size: 16,
        model: ModelConfig {
            hidden_units: 12,
            learning_rate: 0.01,
            seed: Some(2024),
            ..ModelConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Ramp with a small oscillation so no column is constant.
fn ramp(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 50.0 + i as f64 * 0.5 + (i as f64 * 0.9).sin())
        .collect()
}

#[test]
fn test_default_indicators_forecast_in_price_range() {
    let closes = ramp(120);
    let forecast = PredictionPipeline::new(fast_config())
        .unwrap()
        .run(&series(&closes))
        .unwrap();

    let lo = closes.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    assert!(forecast.predicted_next_close.is_finite());
    assert!(forecast.predicted_next_close > lo - span);
    assert!(forecast.predicted_next_close < hi + span);
    // default warm-up is 33 and the final index has no label
    assert_eq!(forecast.training_rows, 120 - 33 - 1);
    assert_eq!(forecast.last_known_close, closes[119]);
    assert_eq!(
        forecast.direction,
        Direction::between(closes[119], forecast.predicted_next_close, 0.0)
    );
}

#[test]
fn test_one_usable_row_is_insufficient_and_builds_no_model() {
    // 35 closes: indices 33 and 34 are defined, only 33 has a label.
    let closes = ramp(35);
    let s = series(&closes);

    let engine = IndicatorEngine::new(IndicatorPeriods::default()).unwrap();
    let frames = engine.compute(&s);
    let builder = FeatureBuilder::new(fast_config().features).with_min_rows(30);
    let err = builder.build_dataset(s.points(), &frames).unwrap_err();
    assert_eq!(
        err,
        ForecastError::InsufficientData {
            required: 30,
            available: 1
        }
    );

    let outcome = PipelineOutcome::from(PredictionPipeline::new(fast_config()).unwrap().run(&s));
    assert!(!outcome.is_ok());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["kind"], "insufficient_data");
}

#[test]
fn test_width_mismatch_leaves_model_usable() {
    let config = fast_config().model;
    let mut model = SequenceModel::create(3, &config).unwrap();

    let wrong = Array2::<f64>::zeros((8, 5));
    let labels = Array1::<f64>::zeros(8);
    assert!(matches!(
        model.train(&wrong, &labels, 1, 4),
        Err(ForecastError::ShapeMismatch {
            expected: 3,
            actual: 5,
            ..
        })
    ));
    assert_eq!(model.state(), ModelState::Compiled);

    let right = Array2::from_shape_fn((8, 3), |(i, j)| (i + j) as f64 / 10.0);
    let labels = Array1::from_shape_fn(8, |i| i as f64 / 8.0);
    model.train(&right, &labels, 2, 4).unwrap();
    assert_eq!(model.predict(&right).unwrap().len(), 8);
}

#[test]
fn test_more_epochs_do_not_increase_loss() {
    let closes = ramp(100);
    let s = series(&closes);
    let engine = IndicatorEngine::new(IndicatorPeriods::default()).unwrap();
    let frames = engine.compute(&s);
    let dataset = FeatureBuilder::new(fast_config().features)
        .build_dataset(s.points(), &frames)
        .unwrap();

    let mut model = SequenceModel::create(dataset.width(), &fast_config().model).unwrap();
    model
        .train(&dataset.features, &dataset.normalized_labels, 1, 16)
        .unwrap();
    let after_one = model
        .evaluate(&dataset.features, &dataset.normalized_labels)
        .unwrap();

    model
        .train(&dataset.features, &dataset.normalized_labels, 100, 16)
        .unwrap();
    let after_many = model
        .evaluate(&dataset.features, &dataset.normalized_labels)
        .unwrap();

    assert!(
        after_many <= after_one,
        "loss went from {} to {}",
        after_one,
        after_many
    );
}

#[test]
fn test_alpha_vantage_payload_end_to_end() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let closes = ramp(80);
    // Newest first, as the provider sends it.
    let entries: Vec<String> = closes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, c)| {
            format!(
                r#""{}": {{"1. open": "{:.4}", "4. close": "{:.4}", "5. volume": "{}"}}"#,
                start + Days::new(i as u64),
                c,
                c,
                1_000 + i
            )
        })
        .collect();
    let payload = format!(
        r#"{{"Meta Data": {{"2. Symbol": "TSLA"}}, "Time Series (Daily)": {{{}}}}}"#,
        entries.join(",")
    );

    let s = parse_str(&payload, InputFormat::Auto).unwrap();
    assert_eq!(s.len(), 80);
    assert_eq!(s.points()[0].date, start);

    let forecast = PredictionPipeline::new(fast_config()).unwrap().run(&s).unwrap();
    assert_eq!(forecast.as_of, start + Days::new(79));
    assert!(forecast.predicted_next_close.is_finite());
}

#[test]
fn test_holdout_uses_training_bounds() {
    let config = PipelineConfig {
        holdout_fraction: 0.25,
        ..fast_config()
    };
    let forecast = PredictionPipeline::new(config)
        .unwrap()
        .run(&series(&ramp(120)))
        .unwrap();

    let labeled = 120 - 33 - 1;
    let held_out = (labeled as f64 * 0.25).round() as usize;
    assert_eq!(forecast.training_rows, labeled - held_out);
    // Rising series: hold-out labels sit above the training range.
    assert!(forecast.evaluation_loss.unwrap() > 0.0);
}
