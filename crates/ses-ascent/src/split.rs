//! Seeded train/test partitioning.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{AscentResult, FitError};

/// Rows of one train/test partition, with the identifiers that went where.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_ids: Vec<String>,
    pub test_ids: Vec<String>,
}

/// Shuffles row indices with a seeded RNG and holds out the first
/// `ceil(n * test_size)` of them.
#[derive(Debug, Clone, Copy)]
pub struct TrainTestSplitter {
    test_size: f64,
    seed: u64,
}

impl TrainTestSplitter {
    pub fn new(test_size: f64, seed: u64) -> AscentResult<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(FitError::InvalidParameter(format!(
                "test_size {test_size} is outside (0, 1)"
            )));
        }
        Ok(Self { test_size, seed })
    }

    pub fn test_count(&self, n_samples: usize) -> usize {
        (n_samples as f64 * self.test_size).ceil() as usize
    }

    /// `(train, test)` row indices.
    pub fn indices(&self, n_samples: usize) -> AscentResult<(Vec<usize>, Vec<usize>)> {
        let n_test = self.test_count(n_samples);
        if n_test == 0 || n_test >= n_samples {
            return Err(FitError::EmptyData(format!(
                "{n_samples} rows cannot be split with test_size {}",
                self.test_size
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let train = indices.split_off(n_test);
        Ok((train, indices))
    }

    pub fn split(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        ids: &[String],
    ) -> AscentResult<TrainTestSplit> {
        let n = x.nrows();
        if y.len() != n || ids.len() != n {
            return Err(FitError::ShapeMismatch(format!(
                "{n} feature rows, {} targets, {} ids",
                y.len(),
                ids.len()
            )));
        }

        let (train, test) = self.indices(n)?;
        let pick =
            |rows: &[usize]| -> Vec<String> { rows.iter().map(|&r| ids[r].clone()).collect() };

        Ok(TrainTestSplit {
            x_train: x.select(Axis(0), &train),
            x_test: x.select(Axis(0), &test),
            y_train: y.select(Axis(0), &train),
            y_test: y.select(Axis(0), &test),
            train_ids: pick(&train),
            test_ids: pick(&test),
        })
    }
}
