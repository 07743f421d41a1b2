//! Fit configuration: JSON file, environment, defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::metrics::Scoring;
use crate::params::HyperparameterGrid;
use crate::types::{AscentResult, FitError};

pub const DEFAULT_MODE: &str = "Untransformed";
pub const DEFAULT_SEED: u64 = 42;
pub const CONFIG_ENV: &str = "SES_FIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Directory holding the `<mode>-*.csv.gz` inputs.
    pub data_dir: PathBuf,
    /// Directory receiving the fit log and importance table.
    pub output_dir: PathBuf,
    /// Input file prefix, e.g. `Untransformed` or `Transformed`.
    pub mode: String,
    pub seed: u64,
    pub test_size: f64,
    pub folds: usize,
    pub scoring: Scoring,
    pub grid: HyperparameterGrid,
    /// Rayon worker count; rayon's default when unset.
    pub threads: Option<usize>,
    /// Importances listed in the log.
    pub top_features: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data").join("analytical"),
            output_dir: PathBuf::from("data").join("analytical"),
            mode: DEFAULT_MODE.to_string(),
            seed: DEFAULT_SEED,
            test_size: 0.2,
            folds: 4,
            scoring: Scoring::default(),
            grid: HyperparameterGrid::default(),
            threads: None,
            top_features: 5,
        }
    }
}

impl FitConfig {
    pub fn load(path: &Path) -> AscentResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from the resolved config path, or defaults when there is none.
    pub fn resolve(explicit: Option<&str>) -> AscentResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::info!("Config: {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Checks that need no data. Run before anything is loaded.
    pub fn validate(&self) -> AscentResult<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(FitError::InvalidParameter(format!(
                "test_size {} is outside (0, 1)",
                self.test_size
            )));
        }
        if self.folds < 2 {
            return Err(FitError::InvalidParameter(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.threads == Some(0) {
            return Err(FitError::InvalidParameter("threads must be > 0".into()));
        }
        if self.mode.is_empty() {
            return Err(FitError::InvalidParameter("mode is empty".into()));
        }
        self.grid.validate()
    }
}

/// Resolve the config file path: explicit flag, then `SES_FIT_CONFIG`,
/// then `./ses-fit.json` if it exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from("ses-fit.json");
    cwd_config.exists().then_some(cwd_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = FitConfig::default();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.folds, 4);
        assert_eq!(cfg.test_size, 0.2);
        assert_eq!(cfg.scoring, Scoring::NegMeanSquaredError);
        assert_eq!(cfg.grid.len(), 162);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mode": "Transformed", "scoring": "r2", "grid": {{ "n_estimators": [10] }} }}"#
        )
        .unwrap();

        let cfg = FitConfig::load(file.path()).unwrap();
        assert_eq!(cfg.mode, "Transformed");
        assert_eq!(cfg.scoring, Scoring::R2);
        assert_eq!(cfg.grid.n_estimators, vec![10]);
        assert_eq!(cfg.grid.min_samples_leaf, vec![1, 2, 4]);
        assert_eq!(cfg.grid.len(), 27);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = FitConfig {
            folds: 1,
            ..FitConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FitError::InvalidParameter(_))));

        let cfg = FitConfig {
            test_size: 1.0,
            ..FitConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = FitConfig::default();
        cfg.grid.max_depth.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(
            resolve_config_path(Some("/etc/fit.json")),
            Some(PathBuf::from("/etc/fit.json"))
        );
    }
}
