//! A single extremely randomized regression tree.
//!
//! Splits are not searched exhaustively: at each node a random subset of
//! features is drawn, each gets one uniform random threshold between its
//! minimum and maximum over the node's samples, and the candidate with the
//! lowest summed squared error wins.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::params::MaxFeatures;
use crate::types::{AscentResult, FitError};

/// Nodes whose target variance is below this become leaves.
const MIN_VARIANCE: f64 = 1e-10;

/// Features spanning less than this over a node's samples are constant.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Leaf node, predicting the mean target of its training samples.
#[derive(Debug, Clone, Serialize)]
pub struct RegressionLeaf {
    pub value: f64,
    pub n_samples: usize,
}

/// Internal node. Samples with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, Serialize)]
pub struct RegressionSplit {
    pub feature: usize,
    pub threshold: f64,
    pub left: Box<TreeNode>,
    pub right: Box<TreeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub enum TreeNode {
    Split(RegressionSplit),
    Leaf(RegressionLeaf),
}

impl TreeNode {
    /// Leaves have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Split(s) => 1 + s.left.depth().max(s.right.depth()),
        }
    }

    /// Every leaf, left to right.
    pub fn leaves(&self) -> Vec<&RegressionLeaf> {
        match self {
            TreeNode::Leaf(leaf) => vec![leaf],
            TreeNode::Split(s) => {
                let mut leaves = s.left.leaves();
                leaves.extend(s.right.leaves());
                leaves
            }
        }
    }

    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf(leaf) => return leaf.value,
                TreeNode::Split(split) => {
                    node = if row[split.feature] <= split.threshold {
                        &split.left
                    } else {
                        &split.right
                    };
                }
            }
        }
    }
}

/// Extremely randomized regression tree.
#[derive(Debug, Clone)]
pub struct ExtraTreeRegressor {
    root: Option<TreeNode>,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    seed: u64,
    n_features: usize,
    importances: Vec<f64>,
}

impl ExtraTreeRegressor {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Auto,
            seed: 0,
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Grow the tree on `x` (samples × features) and `y`.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> AscentResult<()> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(FitError::ShapeMismatch(format!(
                "{n_samples} rows but {} targets",
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(FitError::EmptyData("cannot fit a tree on zero rows".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(FitError::InvalidParameter(
                "min_samples_leaf must be > 0".into(),
            ));
        }

        let mut builder = Builder {
            x,
            y,
            rng: StdRng::seed_from_u64(self.seed),
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            n_candidates: self.max_features.resolve(n_features)?,
            features: (0..n_features).collect(),
            importances: vec![0.0; n_features],
        };

        let mut samples: Vec<usize> = (0..n_samples).collect();
        let root = builder.build(&mut samples, 0);

        let mut importances = builder.importances;
        normalize(&mut importances);

        self.root = Some(root);
        self.n_features = n_features;
        self.importances = importances;
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> AscentResult<Array1<f64>> {
        let root = self.root.as_ref().ok_or(FitError::NotFitted)?;
        if x.ncols() != self.n_features {
            return Err(FitError::ShapeMismatch(format!(
                "tree was fitted on {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    /// Impurity decrease per feature, summing to 1 (all zero for a stump).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

impl Default for ExtraTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scale `values` to sum to 1. All-zero input is left as is.
pub(crate) fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

struct Builder<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    rng: StdRng,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    n_candidates: usize,
    /// Feature order, reshuffled in place at every node.
    features: Vec<usize>,
    importances: Vec<f64>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    /// Squared error of both children combined.
    impurity: f64,
}

impl Builder<'_> {
    fn build(&mut self, samples: &mut [usize], depth: usize) -> TreeNode {
        let n = samples.len();
        let (mean, sse) = self.target_stats(samples);
        let leaf = || {
            TreeNode::Leaf(RegressionLeaf {
                value: mean,
                n_samples: n,
            })
        };

        if n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || sse / n as f64 <= MIN_VARIANCE
        {
            return leaf();
        }

        let Some(best) = self.draw_split(samples) else {
            return leaf();
        };

        self.importances[best.feature] += (sse - best.impurity).max(0.0);

        let x = self.x;
        let mid = partition(samples, |i| x[[i, best.feature]] <= best.threshold);
        let (left, right) = samples.split_at_mut(mid);
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);

        TreeNode::Split(RegressionSplit {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Mean and sum of squared deviations of the node's targets.
    fn target_stats(&self, samples: &[usize]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&i| self.y[i]).sum::<f64>() / n;
        let sse = samples
            .iter()
            .map(|&i| (self.y[i] - mean).powi(2))
            .sum::<f64>();
        (mean, sse)
    }

    /// Draw features without replacement until `n_candidates` non-constant
    /// ones have been tried, one random threshold each.
    fn draw_split(&mut self, samples: &[usize]) -> Option<Candidate> {
        let n_features = self.features.len();
        let mut best: Option<Candidate> = None;
        let mut visited = 0;
        let mut drawn = 0;

        while visited < self.n_candidates && drawn < n_features {
            let pick = self.rng.gen_range(drawn..n_features);
            self.features.swap(drawn, pick);
            let feature = self.features[drawn];
            drawn += 1;

            let (lo, hi) = self.feature_range(samples, feature);
            let span = hi - lo;
            // An overflowing span cannot be sampled uniformly.
            if !span.is_finite() || span <= FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;

            let threshold = self.rng.gen_range(lo..hi);
            if let Some(candidate) = self.evaluate(samples, feature, threshold) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn feature_range(&self, samples: &[usize], feature: usize) -> (f64, f64) {
        samples
            .iter()
            .map(|&i| self.x[[i, feature]])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
    }

    fn evaluate(&self, samples: &[usize], feature: usize, threshold: f64) -> Option<Candidate> {
        let mut left = SideStats::default();
        let mut right = SideStats::default();
        for &i in samples {
            let side = if self.x[[i, feature]] <= threshold {
                &mut left
            } else {
                &mut right
            };
            side.push(self.y[i]);
        }

        if left.n < self.min_samples_leaf || right.n < self.min_samples_leaf {
            return None;
        }

        Some(Candidate {
            feature,
            threshold,
            impurity: left.sse() + right.sse(),
        })
    }
}

#[derive(Default)]
struct SideStats {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl SideStats {
    fn push(&mut self, v: f64) {
        self.n += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn sse(&self) -> f64 {
        (self.sum_sq - self.sum * self.sum / self.n as f64).max(0.0)
    }
}

/// Move samples matching `goes_left` to the front; returns how many did.
fn partition(samples: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for k in 0..samples.len() {
        if goes_left(samples[k]) {
            samples.swap(mid, k);
            mid += 1;
        }
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array2};

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array::from_shape_fn((20, 1), |(r, _)| r as f64);
        let y = Array::from_shape_fn(20, |r| if r < 10 { 0.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn test_fully_grown_tree_fits_training_data() {
        let (x, y) = step_data();
        let mut tree = ExtraTreeRegressor::new().with_seed(3);
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array::from_shape_fn((50, 2), |(r, c)| ((r * (c + 3)) % 17) as f64);
        let y = Array::from_shape_fn(50, |r| (r % 7) as f64);
        let mut tree = ExtraTreeRegressor::new().with_max_depth(Some(2)).with_seed(1);
        tree.fit(x.view(), y.view()).unwrap();
        assert!(tree.root().unwrap().depth() <= 2);
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let x = Array::from_shape_fn((40, 3), |(r, c)| ((r * 7 + c * 11) % 23) as f64);
        let y = Array::from_shape_fn(40, |r| (r as f64).sin());
        let mut tree = ExtraTreeRegressor::new().with_min_samples_leaf(5).with_seed(9);
        tree.fit(x.view(), y.view()).unwrap();

        let leaves = tree.root().unwrap().leaves();
        assert!(leaves.iter().all(|l| l.n_samples >= 5));
        assert_eq!(leaves.iter().map(|l| l.n_samples).sum::<usize>(), 40);
    }

    #[test]
    fn test_constant_target_is_a_single_leaf() {
        let x = Array::from_shape_fn((10, 2), |(r, c)| (r + c) as f64);
        let y = Array1::from_elem(10, 4.5);
        let mut tree = ExtraTreeRegressor::new();
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.root().unwrap().depth(), 0);
        assert!(tree.feature_importances().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_importances_ignore_constant_feature() {
        let x = Array::from_shape_fn((30, 2), |(r, c)| if c == 0 { r as f64 } else { 1.0 });
        let y = Array::from_shape_fn(30, |r| (r * r) as f64);
        let mut tree = ExtraTreeRegressor::new().with_seed(5);
        tree.fit(x.view(), y.view()).unwrap();

        let imp = tree.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(imp[1], 0.0);
    }

    #[test]
    fn test_unbounded_feature_span_is_never_split_on() {
        let x = Array::from_shape_fn((40, 3), |(r, c)| match c {
            0 => r as f64,
            1 => {
                if r % 2 == 0 {
                    f64::MAX
                } else {
                    -f64::MAX
                }
            }
            _ => {
                if r == 0 {
                    f64::INFINITY
                } else {
                    (r % 5) as f64
                }
            }
        });
        let y = Array::from_shape_fn(40, |r| if r < 20 { 0.0 } else { 1.0 });
        let mut tree = ExtraTreeRegressor::new().with_seed(9);
        tree.fit(x.view(), y.view()).unwrap();

        assert_eq!(tree.feature_importances()[1], 0.0);
        assert!(tree.predict(x.view()).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_same_seed_same_tree() {
        let x = Array::from_shape_fn((60, 4), |(r, c)| ((r * 13 + c * 5) % 29) as f64);
        let y = Array::from_shape_fn(60, |r| (r % 11) as f64);

        let fit = |seed| {
            let mut t = ExtraTreeRegressor::new()
                .with_max_features(MaxFeatures::Sqrt)
                .with_seed(seed);
            t.fit(x.view(), y.view()).unwrap();
            t.predict(x.view()).unwrap()
        };
        assert_eq!(fit(42), fit(42));
    }

    #[test]
    fn test_predict_errors() {
        let (x, y) = step_data();
        let tree = ExtraTreeRegressor::new();
        assert!(matches!(tree.predict(x.view()), Err(FitError::NotFitted)));

        let mut tree = ExtraTreeRegressor::new();
        tree.fit(x.view(), y.view()).unwrap();
        let wide = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            tree.predict(wide.view()),
            Err(FitError::ShapeMismatch(_))
        ));
    }
}
