//! End-to-end fit: load, split, search, evaluate, report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::FitConfig;
use crate::ensemble::ExtraTreesRegressor;
use crate::loader::DataLoader;
use crate::metrics::{RegressionReport, Scoring};
use crate::params::{ExtraTreesParams, HyperparameterGrid};
use crate::report::{rank_importances, FeatureImportance, ReportWriter};
use crate::search::{CandidateScore, GridSearchFitter};
use crate::split::TrainTestSplitter;
use crate::types::AscentResult;

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub grid: HyperparameterGrid,
    pub scoring: Scoring,
    pub candidates: Vec<CandidateScore>,
    pub best_params: ExtraTreesParams,
    pub best_score: f64,
    #[serde(skip)]
    pub model: ExtraTreesRegressor,
    /// Largest first.
    pub importances: Vec<FeatureImportance>,
    pub test_report: RegressionReport,
    pub n_train: usize,
    pub n_test: usize,
    pub search_time: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Run the fit described by `config` and write its reports.
pub fn run(config: &FitConfig) -> AscentResult<FitResult> {
    config.validate()?;
    match config.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()?
            .install(|| execute(config)),
        None => execute(config),
    }
}

fn execute(config: &FitConfig) -> AscentResult<FitResult> {
    let loader = DataLoader::new(&config.data_dir, &config.mode);
    let data = loader.load()?;
    let target = data.ascent_target()?;
    let features = &data.features_2001;
    config.grid.validate_for(features.n_cols())?;

    let splitter = TrainTestSplitter::new(config.test_size, config.seed)?;
    let split = splitter.split(features.values().view(), target.view(), features.ids())?;
    tracing::info!(
        train = split.y_train.len(),
        test = split.y_test.len(),
        seed = config.seed,
        "Split data"
    );

    for line in config.grid.summary() {
        tracing::info!("{line}");
    }

    let fitter = GridSearchFitter::new(
        config.grid.clone(),
        config.folds,
        config.scoring,
        config.seed,
    );
    let search = fitter.fit(split.x_train.view(), split.y_train.view())?;
    tracing::info!(
        "Execution complete in: {:.1}s",
        search.elapsed.as_secs_f64()
    );
    tracing::info!("Best score: {}", search.best_score);

    let model = search.best_model;
    let predicted = model.predict(split.x_test.view())?;
    let test_report = RegressionReport::compute(split.y_test.view(), predicted.view())?;
    let importances = rank_importances(features.columns(), &model.feature_importances())?;

    let fit = FitResult {
        grid: config.grid.clone(),
        scoring: config.scoring,
        candidates: search.candidates,
        best_params: search.best_params,
        best_score: search.best_score,
        model,
        importances,
        test_report,
        n_train: split.y_train.len(),
        n_test: split.y_test.len(),
        search_time: search.elapsed,
        finished_at: Utc::now(),
    };

    ReportWriter::new(&config.output_dir, &config.mode)
        .with_top_features(config.top_features)
        .write(&fit)?;

    Ok(fit)
}
