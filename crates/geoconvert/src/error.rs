//! Error types for the GeoConvert client.

use crate::walker::WizardStep;

/// All errors that can abort a wizard walk. None are recovered from.
#[derive(thiserror::Error, Debug)]
pub enum GeoconvertError {
    #[error("No <form> found in the current page")]
    MissingForm,

    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Form has no choice group named '{0}'")]
    UnknownGroup(String),

    #[error("No choice in group '{group}' matches '{wanted}' (available: {available:?})")]
    NoMatchingChoice {
        group: String,
        wanted: String,
        available: Vec<String>,
    },

    #[error("Step out of order: expected state {expected:?}, walker is at {actual:?}")]
    OutOfOrder {
        expected: WizardStep,
        actual: WizardStep,
    },

    #[error("Unknown wizard step '{0}'")]
    UnknownStep(String),

    #[error("Invalid override '{0}' (expected step.field=text)")]
    InvalidOverride(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Upload file has no usable name: {0}")]
    InvalidUpload(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type GeoconvertResult<T> = Result<T, GeoconvertError>;
