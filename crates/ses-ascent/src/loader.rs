//! Gzip CSV loading for the feature and score tables.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ndarray::{Array1, Array2};

use crate::types::{AscentResult, FeatureTable, FitError, ScoreTable, Table};

/// Score columns renamed on load.
pub const SCORE_RENAMES: [(&str, &str); 6] = [
    ("SES_01", "SES 2001"),
    ("SES_11", "SES 2011"),
    ("SES_ASC", "SES Ascent 2001-2011"),
    ("SES_PR_01", "SES 2001 Percentile"),
    ("SES_PR_11", "SES 2011 Percentile"),
    ("SES_PR_ASC", "SES Percentile Ascent 2001-2011"),
];

/// Rank columns removed from the score table. Both must be present.
pub const DROPPED_SCORE_COLUMNS: [&str; 2] = ["RANK_01", "RANK_11"];

/// The regression target.
pub const ASCENT_COLUMN: &str = "SES Ascent 2001-2011";

/// Everything one fit reads from disk.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub scores: ScoreTable,
    pub features_2001: FeatureTable,
    pub features_2011: FeatureTable,
}

impl Dataset {
    /// The ascent score for each 2001 feature row, in feature-row order.
    pub fn ascent_target(&self) -> AscentResult<Array1<f64>> {
        self.scores
            .aligned_column(self.features_2001.ids(), ASCENT_COLUMN)
    }
}

/// Reads `<mode>-*.csv.gz` tables from one data directory.
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
    mode: String,
}

impl DataLoader {
    pub fn new(data_dir: impl Into<PathBuf>, mode: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            mode: mode.into(),
        }
    }

    pub fn scores_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-Scores.csv.gz", self.mode))
    }

    pub fn features_path(&self, year: u16) -> PathBuf {
        self.data_dir.join(format!(
            "{}-{year}-Data-Transformed_and_Scaled.csv.gz",
            self.mode
        ))
    }

    /// Score table with rank columns dropped and score columns renamed.
    pub fn load_scores(&self) -> AscentResult<ScoreTable> {
        prepare_scores(read_table(&self.scores_path())?)
    }

    pub fn load_features(&self, year: u16) -> AscentResult<FeatureTable> {
        read_table(&self.features_path(year))
    }

    /// Load scores and both feature tables. The feature tables must share
    /// the same predictor columns.
    pub fn load(&self) -> AscentResult<Dataset> {
        let scores = self.load_scores()?;
        tracing::info!(
            rows = scores.n_rows(),
            cols = scores.n_cols(),
            "Loaded scores from {}",
            self.scores_path().display()
        );

        let features_2001 = self.load_features(2001)?;
        let features_2011 = self.load_features(2011)?;
        if features_2001.columns() != features_2011.columns() {
            return Err(FitError::ShapeMismatch(format!(
                "2001 and 2011 feature tables have different columns ({} vs {})",
                features_2001.n_cols(),
                features_2011.n_cols()
            )));
        }
        tracing::info!(
            rows_2001 = features_2001.n_rows(),
            rows_2011 = features_2011.n_rows(),
            features = features_2001.n_cols(),
            "Loaded feature tables"
        );

        Ok(Dataset {
            scores,
            features_2001,
            features_2011,
        })
    }
}

/// Drop the rank columns and apply [`SCORE_RENAMES`].
pub fn prepare_scores(raw: Table) -> AscentResult<ScoreTable> {
    Ok(raw
        .drop_columns(&DROPPED_SCORE_COLUMNS)?
        .rename_columns(&SCORE_RENAMES))
}

/// Read a CSV table, gunzipping when the path ends in `.gz`.
pub fn read_table(path: &Path) -> AscentResult<Table> {
    let file = BufReader::new(File::open(path)?);
    let name = path.display().to_string();
    if path.extension().is_some_and(|ext| ext == "gz") {
        read_table_from(GzDecoder::new(file), &name)
    } else {
        read_table_from(file, &name)
    }
}

/// Parse a CSV whose first column is the identifier and whose remaining
/// columns are numeric.
pub fn read_table_from<R: Read>(reader: R, source_name: &str) -> AscentResult<Table> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    if headers.len() < 2 {
        return Err(FitError::EmptyData(format!(
            "{source_name} has no value columns"
        )));
    }
    let columns: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut ids = Vec::new();
    let mut data = Vec::new();
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        ids.push(record.get(0).unwrap_or_default().to_string());
        for (field, column) in record.iter().skip(1).zip(&columns) {
            let value = field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| FitError::InvalidNumber {
                    source_name: source_name.to_string(),
                    row: row + 1,
                    column: column.clone(),
                    value: field.to_string(),
                })?;
            data.push(value);
        }
    }

    if ids.is_empty() {
        return Err(FitError::EmptyData(format!("{source_name} has no rows")));
    }

    let values = Array2::from_shape_vec((ids.len(), columns.len()), data)
        .map_err(|e| FitError::ShapeMismatch(format!("{source_name}: {e}")))?;
    Table::new(ids, columns, values)
}
