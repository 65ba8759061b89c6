//! Min-max scaling fitted once and reused.
//!
//! Bounds are learned from training rows and then applied unchanged to any
//! later row (evaluation, inference). They are never re-fitted on the data
//! being transformed.

use crate::domain::errors::ForecastError;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Observed range of a single column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub min: f64,
    pub max: f64,
}

impl ColumnBounds {
    /// Fits bounds over the values. `None` when there are no values.
    pub fn fit<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(Self { min, max })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// A constant column has no range to scale by.
    pub fn is_degenerate(&self) -> bool {
        self.range() == 0.0
    }

    pub fn normalize(&self, x: f64) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            (x - self.min) / self.range()
        }
    }

    pub fn denormalize(&self, scaled: f64) -> f64 {
        if self.is_degenerate() {
            self.min
        } else {
            self.min + scaled * self.range()
        }
    }
}

/// Per-column bounds for a feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    columns: Vec<ColumnBounds>,
}

impl NormalizationBounds {
    /// Fits one `ColumnBounds` per column of `rows`.
    pub fn fit(rows: &Array2<f64>) -> Result<Self, ForecastError> {
        if rows.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let columns = rows
            .axis_iter(Axis(1))
            .map(|col| ColumnBounds::fit(col.iter().copied()))
            .collect::<Option<Vec<_>>>()
            .ok_or(ForecastError::InsufficientData {
                required: 1,
                available: 0,
            })?;

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnBounds] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Scales one vector with the stored bounds.
    pub fn apply(&self, vector: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.check_width(vector.len())?;
        Ok(vector
            .iter()
            .zip(&self.columns)
            .map(|(x, b)| b.normalize(*x))
            .collect())
    }

    /// Scales every row of a matrix with the stored bounds.
    pub fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ForecastError> {
        self.check_width(rows.ncols())?;
        let mut scaled = rows.clone();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            for (x, b) in row.iter_mut().zip(&self.columns) {
                *x = b.normalize(*x);
            }
        }
        Ok(scaled)
    }

    /// Maps a scaled vector back to original units.
    pub fn invert(&self, scaled: ArrayView1<f64>) -> Result<Vec<f64>, ForecastError> {
        self.check_width(scaled.len())?;
        Ok(scaled
            .iter()
            .zip(&self.columns)
            .map(|(x, b)| b.denormalize(*x))
            .collect())
    }

    fn check_width(&self, actual: usize) -> Result<(), ForecastError> {
        if actual != self.columns.len() {
            return Err(ForecastError::ShapeMismatch {
                what: "normalization width",
                expected: self.columns.len(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_constant_column_normalizes_to_zero() {
        let rows = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let bounds = NormalizationBounds::fit(&rows).unwrap();
        let scaled = bounds.transform(&rows).unwrap();

        for v in scaled.column(0) {
            assert_eq!(*v, 0.0);
        }
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_round_trip_within_bounds() {
        let bounds = ColumnBounds {
            min: 12.5,
            max: 87.25,
        };
        for x in [12.5, 20.0, 33.3333, 50.0, 87.25] {
            let back = bounds.denormalize(bounds.normalize(x));
            assert!((back - x).abs() < 1e-9, "{} -> {}", x, back);
        }
    }

    #[test]
    fn test_apply_reuses_fitted_bounds() {
        let train = array![[0.0, 10.0], [10.0, 20.0]];
        let bounds = NormalizationBounds::fit(&train).unwrap();

        // Values outside the training range are not clipped and do not refit.
        let scaled = bounds.apply(&[20.0, 15.0]).unwrap();
        assert_eq!(scaled, vec![2.0, 0.5]);
        assert_eq!(bounds.columns()[0], ColumnBounds { min: 0.0, max: 10.0 });
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let bounds = NormalizationBounds::fit(&array![[1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(
            bounds.apply(&[1.0, 2.0]),
            Err(ForecastError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_invert_matches_columns() {
        let rows = array![[0.0, 100.0], [4.0, 200.0]];
        let bounds = NormalizationBounds::fit(&rows).unwrap();
        let scaled = bounds.apply(&[2.0, 150.0]).unwrap();
        let back = bounds.invert(ndarray::ArrayView1::from(&scaled[..])).unwrap();
        assert!((back[0] - 2.0).abs() < 1e-12);
        assert!((back[1] - 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_empty_is_insufficient() {
        let rows = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            NormalizationBounds::fit(&rows),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
