//! Extra-trees ensemble: many randomized trees on the full sample, averaged.

use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::params::ExtraTreesParams;
use crate::tree::{normalize, ExtraTreeRegressor};
use crate::types::{AscentResult, FitError};

/// Extremely randomized trees regressor.
///
/// There is no bootstrap: every tree sees every training row, so the only
/// randomness is in the split draws. Tree `i` is seeded with `seed + i`.
#[derive(Debug, Clone)]
pub struct ExtraTreesRegressor {
    params: ExtraTreesParams,
    seed: u64,
    trees: Vec<ExtraTreeRegressor>,
    n_features: usize,
}

impl ExtraTreesRegressor {
    pub fn new(params: ExtraTreesParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn params(&self) -> &ExtraTreesParams {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit every tree in parallel. Refitting replaces the previous trees.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> AscentResult<()> {
        self.params.validate()?;
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(FitError::ShapeMismatch(format!(
                "{n_samples} rows but {} targets",
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(FitError::EmptyData("cannot fit on zero rows".into()));
        }
        self.params.max_features.resolve(n_features)?;

        let params = self.params;
        let seed = self.seed;
        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut tree = ExtraTreeRegressor::new()
                    .with_max_depth(params.max_depth)
                    .with_min_samples_leaf(params.min_samples_leaf)
                    .with_max_features(params.max_features)
                    .with_seed(seed.wrapping_add(i as u64));
                tree.fit(x, y)?;
                Ok(tree)
            })
            .collect::<AscentResult<Vec<_>>>()?;

        tracing::debug!(trees = trees.len(), rows = n_samples, %params, "ensemble fitted");
        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    /// Mean prediction over all trees.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> AscentResult<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(FitError::NotFitted);
        }

        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<AscentResult<Vec<_>>>()?;

        let mut total = Array1::<f64>::zeros(x.nrows());
        for prediction in &per_tree {
            total += prediction;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Mean decrease in impurity per feature, averaged over trees and
    /// normalized to sum to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        if !self.trees.is_empty() {
            let n = self.trees.len() as f64;
            total.iter_mut().for_each(|v| *v /= n);
        }
        normalize(&mut total);
        total
    }
}

/// Every model setting, as written to the fit log.
impl fmt::Display for ExtraTreesRegressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtraTreesRegressor(bootstrap=false, criterion=squared_error, {}, min_samples_split=2, random_state={})",
            self.params, self.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::MaxFeatures;
    use ndarray::{Array, Array2};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array::from_shape_fn((80, 3), |(r, c)| match c {
            0 => r as f64 / 80.0,
            1 => ((r * 7) % 13) as f64,
            _ => ((r * 3) % 5) as f64,
        });
        let y = x.column(0).mapv(|v| 3.0 * v);
        (x, y)
    }

    fn params(n_estimators: usize) -> ExtraTreesParams {
        ExtraTreesParams {
            n_estimators,
            ..ExtraTreesParams::default()
        }
    }

    #[test]
    fn test_fit_builds_one_tree_per_estimator() {
        let (x, y) = data();
        let mut model = ExtraTreesRegressor::new(params(7), 42);
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.n_trees(), 7);
        assert_eq!(model.predict(x.view()).unwrap().len(), 80);
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (x, y) = data();
        let run = || {
            let mut m = ExtraTreesRegressor::new(params(12), 42);
            m.fit(x.view(), y.view()).unwrap();
            (m.predict(x.view()).unwrap(), m.feature_importances())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_informative_feature_dominates_importance() {
        let (x, y) = data();
        let mut model = ExtraTreesRegressor::new(params(20), 1);
        model.fit(x.view(), y.view()).unwrap();

        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1] && imp[0] > imp[2]);
    }

    #[test]
    fn test_predict_before_fit() {
        let (x, _) = data();
        let model = ExtraTreesRegressor::new(params(3), 0);
        assert!(matches!(model.predict(x.view()), Err(FitError::NotFitted)));
    }

    #[test]
    fn test_invalid_params_fail_before_fitting() {
        let (x, y) = data();
        let mut model = ExtraTreesRegressor::new(
            ExtraTreesParams {
                max_features: MaxFeatures::Count(4),
                ..params(3)
            },
            0,
        );
        assert!(matches!(
            model.fit(x.view(), y.view()),
            Err(FitError::InvalidParameter(_))
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_display_lists_every_setting() {
        let model = ExtraTreesRegressor::new(params(160), 42);
        assert_eq!(
            model.to_string(),
            "ExtraTreesRegressor(bootstrap=false, criterion=squared_error, max_depth=None, \
             max_features=auto, min_samples_leaf=1, n_estimators=160, min_samples_split=2, \
             random_state=42)"
        );
    }
}
