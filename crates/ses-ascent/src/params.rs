//! Extra-trees hyperparameters and the search grid over them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AscentResult, FitError};

/// How many features each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaxFeaturesRepr", into = "MaxFeaturesRepr")]
pub enum MaxFeatures {
    /// Every feature.
    Auto,
    Sqrt,
    Log2,
    /// Share of the features, in (0, 1].
    Fraction(f64),
    Count(usize),
}

impl MaxFeatures {
    /// Number of candidate features out of `n_features`.
    pub fn resolve(&self, n_features: usize) -> AscentResult<usize> {
        if n_features == 0 {
            return Err(FitError::EmptyData("no features".into()));
        }
        let n = n_features as f64;
        let count = match *self {
            MaxFeatures::Auto => n_features,
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => {
                if !(f > 0.0 && f <= 1.0) {
                    return Err(FitError::InvalidParameter(format!(
                        "max_features fraction {f} is outside (0, 1]"
                    )));
                }
                (f * n).floor() as usize
            }
            MaxFeatures::Count(c) => {
                if c == 0 || c > n_features {
                    return Err(FitError::InvalidParameter(format!(
                        "max_features {c} is not in 1..={n_features}"
                    )));
                }
                c
            }
        };
        Ok(count.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Auto => f.write_str("auto"),
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::Fraction(v) => write!(f, "{v}"),
            MaxFeatures::Count(c) => write!(f, "{c}"),
        }
    }
}

/// JSON form: an integer count, a float fraction or a name.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxFeaturesRepr {
    Count(usize),
    Fraction(f64),
    Name(String),
}

impl TryFrom<MaxFeaturesRepr> for MaxFeatures {
    type Error = String;

    fn try_from(repr: MaxFeaturesRepr) -> Result<Self, Self::Error> {
        match repr {
            MaxFeaturesRepr::Count(c) => Ok(MaxFeatures::Count(c)),
            MaxFeaturesRepr::Fraction(f) => Ok(MaxFeatures::Fraction(f)),
            MaxFeaturesRepr::Name(name) => match name.as_str() {
                "auto" => Ok(MaxFeatures::Auto),
                "sqrt" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                other => Err(format!("unknown max_features '{other}'")),
            },
        }
    }
}

impl From<MaxFeatures> for MaxFeaturesRepr {
    fn from(value: MaxFeatures) -> Self {
        match value {
            MaxFeatures::Count(c) => MaxFeaturesRepr::Count(c),
            MaxFeatures::Fraction(f) => MaxFeaturesRepr::Fraction(f),
            other => MaxFeaturesRepr::Name(other.to_string()),
        }
    }
}

/// One point of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtraTreesParams {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub min_samples_leaf: usize,
    pub n_estimators: usize,
}

impl Default for ExtraTreesParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_features: MaxFeatures::Auto,
            min_samples_leaf: 1,
            n_estimators: 100,
        }
    }
}

impl ExtraTreesParams {
    /// Check the values that do not depend on the data.
    pub fn validate(&self) -> AscentResult<()> {
        if self.n_estimators == 0 {
            return Err(FitError::InvalidParameter("n_estimators must be > 0".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(FitError::InvalidParameter(
                "min_samples_leaf must be > 0".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(FitError::InvalidParameter("max_depth must be > 0".into()));
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(FitError::InvalidParameter(format!(
                    "max_features fraction {f} is outside (0, 1]"
                )));
            }
        }
        if self.max_features == MaxFeatures::Count(0) {
            return Err(FitError::InvalidParameter("max_features must be > 0".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ExtraTreesParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_depth={}, max_features={}, min_samples_leaf={}, n_estimators={}",
            DepthDisplay(self.max_depth),
            self.max_features,
            self.min_samples_leaf,
            self.n_estimators
        )
    }
}

struct DepthDisplay(Option<usize>);

impl fmt::Display for DepthDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, "{d}"),
            None => f.write_str("None"),
        }
    }
}

/// Candidate values per hyperparameter. The search space is their
/// cartesian product.
///
/// Fields are kept in alphabetical order, which is also the enumeration
/// order of [`HyperparameterGrid::points`]: the last field varies fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparameterGrid {
    pub max_depth: Vec<Option<usize>>,
    pub max_features: Vec<MaxFeatures>,
    pub min_samples_leaf: Vec<usize>,
    pub n_estimators: Vec<usize>,
}

impl Default for HyperparameterGrid {
    fn default() -> Self {
        Self {
            max_depth: vec![Some(10), Some(100), None],
            max_features: vec![
                MaxFeatures::Fraction(0.7),
                MaxFeatures::Fraction(0.85),
                MaxFeatures::Auto,
            ],
            min_samples_leaf: vec![1, 2, 4],
            n_estimators: vec![160, 180, 200, 1300, 1400, 1500],
        }
    }
}

impl HyperparameterGrid {
    /// A grid holding exactly one point.
    pub fn single(params: ExtraTreesParams) -> Self {
        Self {
            max_depth: vec![params.max_depth],
            max_features: vec![params.max_features],
            min_samples_leaf: vec![params.min_samples_leaf],
            n_estimators: vec![params.n_estimators],
        }
    }

    /// Number of permutations.
    pub fn len(&self) -> usize {
        self.max_depth.len()
            * self.max_features.len()
            * self.min_samples_leaf.len()
            * self.n_estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every point, `n_estimators` varying fastest.
    pub fn points(&self) -> Vec<ExtraTreesParams> {
        let mut points = Vec::with_capacity(self.len());
        for &max_depth in &self.max_depth {
            for &max_features in &self.max_features {
                for &min_samples_leaf in &self.min_samples_leaf {
                    for &n_estimators in &self.n_estimators {
                        points.push(ExtraTreesParams {
                            max_depth,
                            max_features,
                            min_samples_leaf,
                            n_estimators,
                        });
                    }
                }
            }
        }
        points
    }

    /// Reject empty candidate lists and invalid values.
    pub fn validate(&self) -> AscentResult<()> {
        let empty = [
            ("max_depth", self.max_depth.is_empty()),
            ("max_features", self.max_features.is_empty()),
            ("min_samples_leaf", self.min_samples_leaf.is_empty()),
            ("n_estimators", self.n_estimators.is_empty()),
        ];
        if let Some((name, _)) = empty.iter().find(|(_, is_empty)| *is_empty) {
            return Err(FitError::InvalidParameter(format!(
                "grid has no candidates for {name}"
            )));
        }
        self.points().iter().try_for_each(ExtraTreesParams::validate)
    }

    /// Reject `max_features` values that do not fit `n_features`.
    pub fn validate_for(&self, n_features: usize) -> AscentResult<()> {
        self.validate()?;
        for mf in &self.max_features {
            mf.resolve(n_features)?;
        }
        Ok(())
    }

    /// One line per parameter, for logs.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!("Estimators: {}", list(&self.n_estimators)),
            format!(
                "Depth: {}",
                list(&self.max_depth.iter().map(|d| DepthDisplay(*d)).collect::<Vec<_>>())
            ),
            format!("Minimum Samples Leaf: {}", list(&self.min_samples_leaf)),
            format!("Maximum Features: {}", list(&self.max_features)),
            format!("Number of permutations: {}", self.len()),
        ]
    }
}

fn list<T: fmt::Display>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
