//! Client for the GeoConvert conversion wizard: walks the form steps,
//! uploads a file and downloads the converted results.

pub mod collector;
pub mod config;
pub mod dom;
pub mod error;
pub mod form;
pub mod payload;
pub mod session;
pub mod walker;

pub use collector::{DownloadedFile, ResultCollector, ResultLink};
pub use config::{StepSelections, WizardConfig};
pub use dom::{Node, Snapshot};
pub use error::{GeoconvertError, GeoconvertResult};
pub use form::{parse_form, Choice, ChoiceGroup, GroupKind, ParsedForm, SubmitControl};
pub use payload::{Payload, PayloadEntry, Selections};
pub use session::{Page, Session, Upload};
pub use walker::{SessionWalker, WizardStep};
