//! Core types for the SES ascent fit: identifier-keyed tables and errors.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Numeric table keyed by a geographic-unit identifier (the first CSV column).
///
/// Used for both the feature tables and the score table. Immutable once
/// built, apart from the column drop/rename applied while loading scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    ids: Vec<String>,
    columns: Vec<String>,
    values: Array2<f64>,
    index: HashMap<String, usize>,
}

/// Predictor table for one census year.
pub type FeatureTable = Table;

/// Status scores, one row per identifier.
pub type ScoreTable = Table;

impl Table {
    /// Build a table. `values` must be `ids.len() × columns.len()`.
    pub fn new(ids: Vec<String>, columns: Vec<String>, values: Array2<f64>) -> AscentResult<Self> {
        if values.dim() != (ids.len(), columns.len()) {
            return Err(FitError::ShapeMismatch(format!(
                "{} ids × {} columns but values are {:?}",
                ids.len(),
                columns.len(),
                values.dim()
            )));
        }

        let mut index = HashMap::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), row).is_some() {
                return Err(FitError::DuplicateIdentifier(id.clone()));
            }
        }

        Ok(Self {
            ids,
            columns,
            values,
            index,
        })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, or `MissingColumn`.
    pub fn column(&self, name: &str) -> AscentResult<ArrayView1<'_, f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| FitError::MissingColumn(name.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Drop the named columns. Every name must be present.
    pub fn drop_columns(self, names: &[&str]) -> AscentResult<Self> {
        let mut keep: Vec<usize> = (0..self.columns.len()).collect();
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| FitError::MissingColumn(name.to_string()))?;
            keep.retain(|&k| k != idx);
        }

        let columns = keep.iter().map(|&k| self.columns[k].clone()).collect();
        let values = self.values.select(Axis(1), &keep);
        Ok(Self {
            columns,
            values,
            ..self
        })
    }

    /// Rename columns. Names that are not present are ignored.
    pub fn rename_columns(mut self, renames: &[(&str, &str)]) -> Self {
        for column in &mut self.columns {
            if let Some((_, to)) = renames.iter().find(|(from, _)| *from == column.as_str()) {
                *column = to.to_string();
            }
        }
        self
    }

    /// `column` of this table reordered to match `ids`.
    ///
    /// Every identifier must be present; a missing one is an error rather
    /// than a dropped row.
    pub fn aligned_column(&self, ids: &[String], column: &str) -> AscentResult<Array1<f64>> {
        let values = self.column(column)?;
        ids.iter()
            .map(|id| {
                self.row_of(id)
                    .map(|row| values[row])
                    .ok_or_else(|| FitError::MissingIdentifier(id.clone()))
            })
            .collect()
    }
}

/// Errors that can occur while loading, fitting or reporting.
#[derive(thiserror::Error, Debug)]
pub enum FitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Identifier not found in score table: {0}")]
    MissingIdentifier(String),

    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Invalid number '{value}' in {source_name}, row {row}, column '{column}'")]
    InvalidNumber {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Model is not fitted")]
    NotFitted,

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience result type.
pub type AscentResult<T> = Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Table {
        Table::new(
            vec!["E01".into(), "E02".into(), "E03".into()],
            vec!["a".into(), "b".into(), "c".into()],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        let err = Table::new(vec!["E01".into()], vec!["a".into(), "b".into()], array![[1.0]]);
        assert!(matches!(err, Err(FitError::ShapeMismatch(_))));
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let err = Table::new(
            vec!["E01".into(), "E01".into()],
            vec!["a".into()],
            array![[1.0], [2.0]],
        );
        assert!(matches!(err, Err(FitError::DuplicateIdentifier(id)) if id == "E01"));
    }

    #[test]
    fn test_drop_and_rename() {
        let table = sample()
            .drop_columns(&["b"])
            .unwrap()
            .rename_columns(&[("c", "C"), ("zz", "Z")]);
        assert_eq!(table.columns(), &["a".to_string(), "C".to_string()]);
        assert_eq!(table.values(), &array![[1.0, 3.0], [4.0, 6.0], [7.0, 9.0]]);
    }

    #[test]
    fn test_drop_missing_column_fails() {
        assert!(matches!(
            sample().drop_columns(&["RANK_01"]),
            Err(FitError::MissingColumn(c)) if c == "RANK_01"
        ));
    }

    #[test]
    fn test_aligned_column_follows_requested_order() {
        let table = sample();
        let ids = vec!["E03".to_string(), "E01".to_string()];
        assert_eq!(table.aligned_column(&ids, "b").unwrap(), array![8.0, 2.0]);
    }

    #[test]
    fn test_aligned_column_missing_id_is_an_error() {
        let ids = vec!["E01".to_string(), "E99".to_string()];
        assert!(matches!(
            sample().aligned_column(&ids, "a"),
            Err(FitError::MissingIdentifier(id)) if id == "E99"
        ));
    }
}
