//! Fit log and feature-importance output.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::pipeline::FitResult;
use crate::types::{AscentResult, FitError};

/// Separator opening every run in the fit log.
pub const RUN_SEPARATOR: &str = "########################";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Pair importances with column names, largest first. Equal importances
/// keep column order.
pub fn rank_importances(
    columns: &[String],
    importances: &[f64],
) -> AscentResult<Vec<FeatureImportance>> {
    if columns.len() != importances.len() {
        return Err(FitError::ShapeMismatch(format!(
            "{} columns but {} importances",
            columns.len(),
            importances.len()
        )));
    }
    let mut ranked: Vec<FeatureImportance> = columns
        .iter()
        .zip(importances)
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    Ok(ranked)
}

/// Write `feature,importance` rows as gzip CSV.
pub fn write_importances(path: &Path, ranked: &[FeatureImportance]) -> AscentResult<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    for row in ranked {
        writer.serialize(row)?;
    }
    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

/// Writes a finished fit to `<mode>-Fit.txt` (appended) and
/// `<mode>-Feature Importance.csv.gz` (replaced).
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    mode: String,
    top_features: usize,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, mode: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            mode: mode.into(),
            top_features: 5,
        }
    }

    pub fn with_top_features(mut self, top_features: usize) -> Self {
        self.top_features = top_features;
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}-Fit.txt", self.mode))
    }

    pub fn importance_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-Feature Importance.csv.gz", self.mode))
    }

    /// The log block for one run.
    pub fn render(&self, fit: &FitResult) -> String {
        let mut out = String::new();
        out.push_str(RUN_SEPARATOR);
        out.push('\n');
        out.push_str(&format!("Run: {}\n", fit.finished_at.to_rfc3339()));
        out.push_str(&format!("Mode: {}\n", self.mode));
        out.push_str(&format!(
            "Rows: {} train, {} test\n",
            fit.n_train, fit.n_test
        ));
        out.push_str("Params:\n");
        for line in fit.grid.summary() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!(
            "Best Cross-Validation score ({}): {}\n",
            fit.scoring, fit.best_score
        ));
        out.push_str(&format!(
            "Best parameters from Cross-Validation: {}\n\n",
            fit.best_params
        ));
        out.push_str("Full model configuration:\n");
        out.push_str(&format!("{}\n\n", fit.model));
        out.push_str("Tuned Extra Trees result:\n");
        out.push_str(&fit.test_report.to_string());
        out.push('\n');
        out.push_str(&self.render_top_features(fit));
        out
    }

    /// The largest importances as a small table.
    pub fn render_top_features(&self, fit: &FitResult) -> String {
        let mut out = format!("Feature Importances ({} Biggest):\n", self.top_features);
        let width = fit
            .importances
            .iter()
            .take(self.top_features)
            .map(|f| f.feature.len())
            .max()
            .unwrap_or(0)
            .max("feature".len());
        out.push_str(&format!("{:<width$}  importance\n", "feature"));
        for fi in fit.importances.iter().take(self.top_features) {
            out.push_str(&format!("{:<width$}  {:.6}\n", fi.feature, fi.importance));
        }
        out
    }

    /// Append the run to the log and rewrite the importance table.
    pub fn write(&self, fit: &FitResult) -> AscentResult<()> {
        fs::create_dir_all(&self.output_dir)?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        log.write_all(self.render(fit).as_bytes())?;
        tracing::info!("Appended fit log to {}", self.log_path().display());

        write_importances(&self.importance_path(), &fit.importances)?;
        tracing::info!(
            features = fit.importances.len(),
            "Wrote feature importances to {}",
            self.importance_path().display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rank_sorts_descending_and_is_stable() {
        let ranked =
            rank_importances(&names(&["a", "b", "c", "d"]), &[0.1, 0.4, 0.1, 0.4]).unwrap();
        let order: Vec<&str> = ranked.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_rank_length_mismatch() {
        assert!(matches!(
            rank_importances(&names(&["a"]), &[0.5, 0.5]),
            Err(FitError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_importances_written_as_gzip_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fi.csv.gz");
        let ranked = rank_importances(&names(&["x0", "x1"]), &[0.25, 0.75]).unwrap();
        write_importances(&path, &ranked).unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "feature,importance\nx1,0.75\nx0,0.25\n");
    }

    #[test]
    fn test_paths_follow_mode() {
        let writer = ReportWriter::new("/out", "Untransformed");
        assert_eq!(writer.log_path(), PathBuf::from("/out/Untransformed-Fit.txt"));
        assert_eq!(
            writer.importance_path(),
            PathBuf::from("/out/Untransformed-Feature Importance.csv.gz")
        );
    }
}
