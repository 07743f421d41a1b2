//! Regression metrics and cross-validation scoring.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::types::{AscentResult, FitError};

/// Coefficient of determination. A constant target scores 1 when predicted
/// exactly and 0 otherwise.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    degenerate_ratio(ss_res, ss_tot)
}

pub fn mean_squared_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let diff = &y_true - &y_pred;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

pub fn mean_absolute_error(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let diff = &y_true - &y_pred;
    diff.mapv(f64::abs).mean().unwrap_or(0.0)
}

/// `1 - Var(y_true - y_pred) / Var(y_true)`, with the same constant-target
/// rule as [`r2_score`].
pub fn explained_variance_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let residual = &y_true - &y_pred;
    let var_res = residual.var(0.0);
    let var_true = y_true.var(0.0);
    degenerate_ratio(var_res, var_true)
}

fn degenerate_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - numerator / denominator
    }
}

/// Cross-validation objective. Every variant is greater-is-better, so
/// error metrics are negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    NegMeanSquaredError,
    NegMeanAbsoluteError,
    R2,
}

impl Scoring {
    pub fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        match self {
            Scoring::NegMeanSquaredError => -mean_squared_error(y_true, y_pred),
            Scoring::NegMeanAbsoluteError => -mean_absolute_error(y_true, y_pred),
            Scoring::R2 => r2_score(y_true, y_pred),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scoring::NegMeanSquaredError => "neg_mean_squared_error",
            Scoring::NegMeanAbsoluteError => "neg_mean_absolute_error",
            Scoring::R2 => "r2",
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scoring {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neg_mean_squared_error" | "mse" => Ok(Scoring::NegMeanSquaredError),
            "neg_mean_absolute_error" | "mae" => Ok(Scoring::NegMeanAbsoluteError),
            "r2" => Ok(Scoring::R2),
            other => Err(format!(
                "unknown scoring '{other}' (expected neg_mean_squared_error, neg_mean_absolute_error or r2)"
            )),
        }
    }
}

/// Held-out quality of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionReport {
    pub r2: f64,
    pub mse: f64,
    pub mae: f64,
    pub explained_variance: f64,
}

impl RegressionReport {
    pub fn compute(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> AscentResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(FitError::ShapeMismatch(format!(
                "{} targets but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(FitError::EmptyData("no rows to evaluate".into()));
        }
        Ok(Self {
            r2: r2_score(y_true, y_pred),
            mse: mean_squared_error(y_true, y_pred),
            mae: mean_absolute_error(y_true, y_pred),
            explained_variance: explained_variance_score(y_true, y_pred),
        })
    }
}

impl fmt::Display for RegressionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "R2:        {:8.5}", self.r2)?;
        writeln!(f, "MSE:       {:8.5}", self.mse)?;
        writeln!(f, "MAE:       {:8.5}", self.mae)?;
        writeln!(f, "Expl. Var: {:8.5}", self.explained_variance)
    }
}
