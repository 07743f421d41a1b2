//! SES ascent: grid-searched extra-trees regression of neighbourhood
//! socioeconomic-status ascent between the 2001 and 2011 censuses.

pub mod config;
pub mod ensemble;
pub mod loader;
pub mod metrics;
pub mod params;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod split;
pub mod tree;
pub mod types;

pub use config::FitConfig;
pub use ensemble::ExtraTreesRegressor;
pub use loader::{DataLoader, Dataset};
pub use metrics::{RegressionReport, Scoring};
pub use params::{ExtraTreesParams, HyperparameterGrid, MaxFeatures};
pub use pipeline::FitResult;
pub use report::{FeatureImportance, ReportWriter};
pub use search::{CandidateScore, GridSearchFitter, GridSearchResult, KFold};
pub use split::{TrainTestSplit, TrainTestSplitter};
pub use tree::ExtraTreeRegressor;
pub use types::{AscentResult, FeatureTable, FitError, ScoreTable, Table};
