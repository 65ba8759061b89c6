use crate::domain::errors::ForecastError;
use crate::domain::market::{IndicatorFrame, PricePoint};
use crate::domain::ml::{ColumnBounds, FeatureColumn, NormalizationBounds, features_to_vector};
use ndarray::{Array1, Array2};
use tracing::{debug, info};

/// Normalized training rows with the bounds that produced them.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Min-max scaled features, one row per retained index.
    pub features: Array2<f64>,
    /// Next-day close for each row.
    pub labels: Array1<f64>,
    /// `labels` scaled with `label_bounds`.
    pub normalized_labels: Array1<f64>,
    pub bounds: NormalizationBounds,
    pub label_bounds: ColumnBounds,
    /// Position of each row in the source series.
    pub indices: Vec<usize>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn width(&self) -> usize {
        self.features.ncols()
    }
}

/// Hold-out rows scaled with bounds fitted on the training rows.
#[derive(Debug, Clone)]
pub struct EvaluationSet {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub normalized_labels: Array1<f64>,
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone)]
struct LabeledRow {
    index: usize,
    features: Vec<f64>,
    label: f64,
}

/// Joins prices and indicator frames into (feature vector, next close) pairs.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    columns: Vec<FeatureColumn>,
    min_rows: usize,
}

impl FeatureBuilder {
    pub fn new(columns: Vec<FeatureColumn>) -> Self {
        Self {
            columns,
            min_rows: 1,
        }
    }

    /// Fewer retained training rows than this is `InsufficientData`.
    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows.max(1);
        self
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Builds the labeled dataset, fitting bounds on every retained row.
    pub fn build_dataset(
        &self,
        points: &[PricePoint],
        frames: &[IndicatorFrame],
    ) -> Result<Dataset, ForecastError> {
        let rows = self.labeled_rows(points, frames)?;
        self.check_row_count(rows.len())?;
        let dataset = self.fit(&rows)?;

        info!(
            "Built dataset: {} rows x {} features from {} prices",
            dataset.len(),
            dataset.width(),
            points.len()
        );
        Ok(dataset)
    }

    /// Chronological split: the most recent `holdout_fraction` of labeled rows
    /// becomes the evaluation set, scaled with the training bounds.
    pub fn build_split(
        &self,
        points: &[PricePoint],
        frames: &[IndicatorFrame],
        holdout_fraction: f64,
    ) -> Result<(Dataset, Option<EvaluationSet>), ForecastError> {
        let rows = self.labeled_rows(points, frames)?;
        let holdout = ((rows.len() as f64) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
        let train_len = rows.len().saturating_sub(holdout);
        self.check_row_count(train_len)?;

        let (train_rows, eval_rows) = rows.split_at(train_len);
        let dataset = self.fit(train_rows)?;

        if eval_rows.is_empty() {
            return Ok((dataset, None));
        }

        let raw = self.to_matrix(eval_rows)?;
        let labels: Array1<f64> = eval_rows.iter().map(|r| r.label).collect();
        let evaluation = EvaluationSet {
            features: dataset.bounds.transform(&raw)?,
            normalized_labels: labels.mapv(|l| dataset.label_bounds.normalize(l)),
            labels,
            indices: eval_rows.iter().map(|r| r.index).collect(),
        };

        info!(
            "Split dataset: {} training rows, {} hold-out rows",
            dataset.len(),
            evaluation.indices.len()
        );
        Ok((dataset, Some(evaluation)))
    }

    /// Raw feature rows for the `lookback` most recent indices, ending at the
    /// final price (the row whose next close is unknown).
    pub fn latest_features(
        &self,
        points: &[PricePoint],
        frames: &[IndicatorFrame],
        lookback: usize,
    ) -> Result<Array2<f64>, ForecastError> {
        check_alignment(points, frames)?;

        let last = points.len().checked_sub(1).ok_or(ForecastError::InsufficientData {
            required: 1,
            available: 0,
        })?;
        if features_to_vector(&self.columns, &points[last], &frames[last]).is_none() {
            return Err(ForecastError::InsufficientData {
                required: last + 2,
                available: points.len(),
            });
        }

        let start = (last + 1).saturating_sub(lookback.max(1));
        let rows: Vec<LabeledRow> = (start..=last)
            .filter_map(|i| {
                features_to_vector(&self.columns, &points[i], &frames[i]).map(|features| {
                    LabeledRow {
                        index: i,
                        features,
                        label: f64::NAN,
                    }
                })
            })
            .collect();

        self.to_matrix(&rows)
    }

    fn labeled_rows(
        &self,
        points: &[PricePoint],
        frames: &[IndicatorFrame],
    ) -> Result<Vec<LabeledRow>, ForecastError> {
        check_alignment(points, frames)?;

        // windows(2) pairs each index with its successor, so the final index
        // never produces a row.
        let rows: Vec<LabeledRow> = points
            .windows(2)
            .zip(frames)
            .enumerate()
            .filter_map(|(index, (pair, frame))| {
                let features = features_to_vector(&self.columns, &pair[0], frame)?;
                Some(LabeledRow {
                    index,
                    features,
                    label: pair[1].close,
                })
            })
            .collect();

        debug!(
            "Retained {} of {} indices after warm-up and lookahead exclusion",
            rows.len(),
            points.len()
        );
        Ok(rows)
    }

    fn fit(&self, rows: &[LabeledRow]) -> Result<Dataset, ForecastError> {
        let raw_features = self.to_matrix(rows)?;
        let bounds = NormalizationBounds::fit(&raw_features)?;
        let features = bounds.transform(&raw_features)?;

        let labels: Array1<f64> = rows.iter().map(|r| r.label).collect();
        let label_bounds =
            ColumnBounds::fit(labels.iter().copied()).ok_or(ForecastError::InsufficientData {
                required: self.min_rows,
                available: 0,
            })?;
        let normalized_labels = labels.mapv(|l| label_bounds.normalize(l));

        Ok(Dataset {
            features,
            labels,
            normalized_labels,
            bounds,
            label_bounds,
            indices: rows.iter().map(|r| r.index).collect(),
        })
    }

    fn to_matrix(&self, rows: &[LabeledRow]) -> Result<Array2<f64>, ForecastError> {
        let width = self.columns.len();
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.features.iter().copied()).collect();
        let actual = flat.len();
        Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| {
            ForecastError::ShapeMismatch {
                what: "feature matrix",
                expected: rows.len() * width,
                actual,
            }
        })
    }

    fn check_row_count(&self, available: usize) -> Result<(), ForecastError> {
        if available < self.min_rows {
            return Err(ForecastError::InsufficientData {
                required: self.min_rows,
                available,
            });
        }
        Ok(())
    }
}

fn check_alignment(points: &[PricePoint], frames: &[IndicatorFrame]) -> Result<(), ForecastError> {
    if points.len() != frames.len() {
        return Err(ForecastError::ShapeMismatch {
            what: "indicator frames",
            expected: points.len(),
            actual: frames.len(),
        });
    }
    Ok(())
}
