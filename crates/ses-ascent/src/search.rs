//! Exhaustive grid search under k-fold cross-validation.

use std::time::{Duration, Instant};

use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::ensemble::ExtraTreesRegressor;
use crate::metrics::Scoring;
use crate::params::{ExtraTreesParams, HyperparameterGrid};
use crate::types::{AscentResult, FitError};

/// Contiguous, unshuffled k-fold splitter.
///
/// The first `n % k` folds get one extra row.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> AscentResult<Self> {
        if n_splits < 2 {
            return Err(FitError::InvalidParameter(format!(
                "k-fold needs at least 2 folds, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// `(train, test)` row indices for each fold.
    pub fn split(&self, n_samples: usize) -> AscentResult<Vec<(Vec<usize>, Vec<usize>)>> {
        if n_samples < self.n_splits {
            return Err(FitError::EmptyData(format!(
                "{n_samples} rows cannot make {} folds",
                self.n_splits
            )));
        }

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let indices: Vec<usize> = (0..n_samples).collect();

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = fold_size + usize::from(i < remainder);
            let end = start + size;

            let test = indices[start..end].to_vec();
            let mut train = Vec::with_capacity(n_samples - size);
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);
            folds.push((train, test));

            start = end;
        }
        Ok(folds)
    }
}

/// Cross-validation outcome of one grid point.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub params: ExtraTreesParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

impl CandidateScore {
    fn new(params: ExtraTreesParams, fold_scores: Vec<f64>) -> Self {
        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        Self {
            params,
            fold_scores,
            mean_score,
        }
    }

    pub fn std_score(&self) -> f64 {
        let n = self.fold_scores.len() as f64;
        let var = self
            .fold_scores
            .iter()
            .map(|s| (s - self.mean_score).powi(2))
            .sum::<f64>()
            / n;
        var.sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    /// Every grid point, in grid order.
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
    pub best_params: ExtraTreesParams,
    pub best_score: f64,
    /// The best configuration refit on all rows passed to the search.
    pub best_model: ExtraTreesRegressor,
    pub elapsed: Duration,
}

/// Scores every grid point with k-fold cross-validation and refits the
/// winner.
#[derive(Debug, Clone)]
pub struct GridSearchFitter {
    grid: HyperparameterGrid,
    n_folds: usize,
    scoring: Scoring,
    seed: u64,
}

impl GridSearchFitter {
    pub fn new(grid: HyperparameterGrid, n_folds: usize, scoring: Scoring, seed: u64) -> Self {
        Self {
            grid,
            n_folds,
            scoring,
            seed,
        }
    }

    pub fn grid(&self) -> &HyperparameterGrid {
        &self.grid
    }

    /// Run the search. Candidate × fold fits run in parallel; scores are
    /// gathered in grid order so the outcome depends only on the seed.
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> AscentResult<GridSearchResult> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(FitError::ShapeMismatch(format!(
                "{n_samples} rows but {} targets",
                y.len()
            )));
        }
        self.grid.validate_for(n_features)?;
        let folds = KFold::new(self.n_folds)?.split(n_samples)?;

        let points = self.grid.points();
        tracing::info!(
            candidates = points.len(),
            folds = folds.len(),
            fits = points.len() * folds.len(),
            scoring = %self.scoring,
            "Starting grid search"
        );

        let started = Instant::now();
        let jobs: Vec<(usize, usize)> = (0..points.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();

        let scores = jobs
            .par_iter()
            .map(|&(c, f)| {
                let (train, test) = &folds[f];
                self.score_fold(&points[c], x, y, train, test)
            })
            .collect::<AscentResult<Vec<f64>>>()?;

        let candidates: Vec<CandidateScore> = points
            .iter()
            .zip(scores.chunks(folds.len()))
            .map(|(params, fold_scores)| CandidateScore::new(*params, fold_scores.to_vec()))
            .collect();

        for (i, c) in candidates.iter().enumerate() {
            tracing::debug!(
                candidate = i,
                mean = c.mean_score,
                std = c.std_score(),
                params = %c.params,
                "candidate scored"
            );
        }

        let best_index = best_candidate(&candidates);
        let best = &candidates[best_index];
        tracing::info!(score = best.mean_score, params = %best.params, "Best candidate");

        let mut best_model = ExtraTreesRegressor::new(best.params, self.seed);
        best_model.fit(x, y)?;

        Ok(GridSearchResult {
            best_index,
            best_params: best.params,
            best_score: best.mean_score,
            candidates,
            best_model,
            elapsed: started.elapsed(),
        })
    }

    fn score_fold(
        &self,
        params: &ExtraTreesParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        train: &[usize],
        test: &[usize],
    ) -> AscentResult<f64> {
        let x_train = x.select(Axis(0), train);
        let y_train = y.select(Axis(0), train);
        let x_test = x.select(Axis(0), test);
        let y_test = y.select(Axis(0), test);

        let mut model = ExtraTreesRegressor::new(*params, self.seed);
        model.fit(x_train.view(), y_train.view())?;
        let predicted = model.predict(x_test.view())?;
        Ok(self.scoring.score(y_test.view(), predicted.view()))
    }
}

/// Index of the highest mean score; the earliest wins a tie and NaN never
/// wins.
fn best_candidate(candidates: &[CandidateScore]) -> usize {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        let current = candidates[best].mean_score;
        if c.mean_score > current || (current.is_nan() && !c.mean_score.is_nan()) {
            best = i;
        }
    }
    best
}
