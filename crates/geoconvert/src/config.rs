//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GeoconvertError, GeoconvertResult};
use crate::payload::Selections;

pub const DEFAULT_BASE_URL: &str = "http://geoconvert.mimas.ac.uk/application/";
pub const DEFAULT_START_PAGE: &str = "step1credentials.cfm";
pub const DEFAULT_LOOKUP_TABLE: &str = "LUT_LSOADZ0115jul_LSOADZ1115jul";

/// Everything a wizard walk needs apart from the file being converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub base_url: String,
    pub start_page: String,
    pub steps: StepSelections,
    /// Multipart field the upload is sent under.
    pub upload_field: String,
    /// CSS class marking download links on the results page.
    pub result_link_class: String,
    pub output_dir: PathBuf,
    /// Request timeout; reqwest's default when unset.
    pub timeout_ms: Option<u64>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            start_page: DEFAULT_START_PAGE.to_string(),
            steps: StepSelections::default(),
            upload_field: "useruploadfile".to_string(),
            result_link_class: "gresults".to_string(),
            output_dir: PathBuf::from("."),
            timeout_ms: None,
        }
    }
}

/// Selections for the steps that take any. Steps 5 and 7 always accept
/// the page defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSelections {
    /// step1: which service to use.
    pub function: Selections,
    /// step2: source geography.
    pub source: Selections,
    /// step3: target geography.
    pub target: Selections,
    /// step4: lookup table.
    pub lookup: Selections,
    /// step6: upload options.
    pub upload: Selections,
}

impl Default for StepSelections {
    fn default() -> Self {
        Self {
            function: Selections::new().with("functionbutton", "convert"),
            source: Selections::new().with("sourcetype", "lower"),
            target: Selections::new().with("targettype", "lower"),
            lookup: Selections::new().with("find_lut", DEFAULT_LOOKUP_TABLE),
            upload: Selections::new()
                .with("header", "yes")
                .with("delimiter", "comma"),
        }
    }
}

impl StepSelections {
    /// Look up a step by number (`step2`) or by name (`source`).
    pub fn step_mut(&mut self, step: &str) -> GeoconvertResult<&mut Selections> {
        match step {
            "step1" | "function" => Ok(&mut self.function),
            "step2" | "source" => Ok(&mut self.source),
            "step3" | "target" => Ok(&mut self.target),
            "step4" | "lookup" => Ok(&mut self.lookup),
            "step6" | "upload" => Ok(&mut self.upload),
            other => Err(GeoconvertError::UnknownStep(other.to_string())),
        }
    }
}

impl WizardConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> GeoconvertResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from the resolved config path, or defaults when there is none.
    pub fn resolve(explicit: Option<&str>) -> GeoconvertResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::info!("Config: {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply a `step.field=text` override, e.g. `step4.find_lut=LUT_OA01_OA11`.
    pub fn apply_override(&mut self, assignment: &str) -> GeoconvertResult<()> {
        let invalid = || GeoconvertError::InvalidOverride(assignment.to_string());
        let (key, text) = assignment.split_once('=').ok_or_else(invalid)?;
        let (step, field) = key.split_once('.').ok_or_else(invalid)?;
        if field.is_empty() {
            return Err(invalid());
        }
        self.steps.step_mut(step)?.set(field, text);
        Ok(())
    }
}

/// Resolve the config file path: explicit flag, then `GEOCONVERT_CONFIG`,
/// then `./geoconvert.json` if it exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var("GEOCONVERT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from("geoconvert.json");
    cwd_config.exists().then_some(cwd_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_lsoa_2001_to_2011() {
        let cfg = WizardConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.steps.source.get("sourcetype"), Some("lower"));
        assert_eq!(cfg.steps.target.get("targettype"), Some("lower"));
        assert_eq!(cfg.steps.lookup.get("find_lut"), Some(DEFAULT_LOOKUP_TABLE));
        assert_eq!(cfg.steps.upload.get("header"), Some("yes"));
        assert_eq!(cfg.steps.upload.get("delimiter"), Some("comma"));
    }

    #[test]
    fn test_apply_override_by_number_and_name() {
        let mut cfg = WizardConfig::default();
        cfg.apply_override("step2.sourcetype=output area").unwrap();
        cfg.apply_override("lookup.find_lut=LUT_OA").unwrap();
        assert_eq!(cfg.steps.source.get("sourcetype"), Some("output area"));
        assert_eq!(cfg.steps.lookup.get("find_lut"), Some("LUT_OA"));
    }

    #[test]
    fn test_apply_override_rejects_bad_input() {
        let mut cfg = WizardConfig::default();
        assert!(matches!(
            cfg.apply_override("step5.x=y"),
            Err(GeoconvertError::UnknownStep(s)) if s == "step5"
        ));
        assert!(matches!(
            cfg.apply_override("step2sourcetype=lower"),
            Err(GeoconvertError::InvalidOverride(_))
        ));
        assert!(matches!(
            cfg.apply_override("step2.sourcetype"),
            Err(GeoconvertError::InvalidOverride(_))
        ));
    }

    #[test]
    fn test_load_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "base_url": "http://localhost:9000/app/", "steps": {{ "target": {{ "targettype": "middle" }} }} }}"#
        )
        .unwrap();

        let cfg = WizardConfig::load(file.path()).unwrap();
        assert_eq!(cfg.base_url, "http://localhost:9000/app/");
        assert_eq!(cfg.steps.target.get("targettype"), Some("middle"));
        assert_eq!(cfg.steps.source.get("sourcetype"), Some("lower"));
        assert_eq!(cfg.upload_field, "useruploadfile");
    }

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(
            resolve_config_path(Some("/etc/geo.json")),
            Some(PathBuf::from("/etc/geo.json"))
        );
    }
}
