//! Grid search and end-to-end pipeline runs on synthetic data.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, Array1, Array2, Axis};

use ses_ascent::{
    pipeline, report::RUN_SEPARATOR, ExtraTreesParams, ExtraTreesRegressor, FitConfig, FitError,
    GridSearchFitter, HyperparameterGrid, KFold, MaxFeatures, Scoring,
};

// ─────────────────────── fixtures ───────────────────────

/// Three features; the target depends on the first only.
fn synthetic(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array::from_shape_fn((n, 3), |(r, c)| match c {
        0 => r as f64 / n as f64,
        1 => ((r * 7) % 13) as f64,
        _ => ((r * 3) % 5) as f64,
    });
    let y = x.column(0).mapv(|v| 3.0 * v);
    (x, y)
}

fn write_gz(path: &Path, body: &str) {
    let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
}

/// Write the three input tables for `n` units. Score rows are written in
/// reverse order so the target must be aligned by identifier.
fn write_inputs(dir: &Path, n: usize, skip_score_for: Option<usize>) {
    let (x, y) = synthetic(n);

    let mut features = String::from("LSOA01CD,x0,x1,x2\n");
    for r in 0..n {
        features.push_str(&format!(
            "E{r:05},{},{},{}\n",
            x[[r, 0]],
            x[[r, 1]],
            x[[r, 2]]
        ));
    }
    write_gz(
        &dir.join("Untransformed-2001-Data-Transformed_and_Scaled.csv.gz"),
        &features,
    );
    write_gz(
        &dir.join("Untransformed-2011-Data-Transformed_and_Scaled.csv.gz"),
        &features,
    );

    let mut scores =
        String::from("LSOA11CD,SES_01,SES_11,SES_ASC,SES_PR_01,SES_PR_11,SES_PR_ASC,RANK_01,RANK_11\n");
    for r in (0..n).rev() {
        if Some(r) == skip_score_for {
            continue;
        }
        scores.push_str(&format!("E{r:05},0,0,{},50,50,0,{r},{r}\n", y[r]));
    }
    write_gz(&dir.join("Untransformed-Scores.csv.gz"), &scores);
}

fn small_grid() -> HyperparameterGrid {
    HyperparameterGrid {
        max_depth: vec![Some(3), None],
        max_features: vec![MaxFeatures::Auto],
        min_samples_leaf: vec![1],
        n_estimators: vec![6],
    }
}

fn config_for(data: &Path, out: &Path) -> FitConfig {
    FitConfig {
        data_dir: data.to_path_buf(),
        output_dir: out.to_path_buf(),
        grid: small_grid(),
        threads: Some(2),
        ..FitConfig::default()
    }
}

// ─────────────────────── grid search ───────────────────────

#[test]
fn test_single_point_grid_scores_match_manual_cv() {
    let (x, y) = synthetic(100);
    let params = ExtraTreesParams {
        n_estimators: 8,
        ..ExtraTreesParams::default()
    };
    let fitter = GridSearchFitter::new(
        HyperparameterGrid::single(params),
        4,
        Scoring::default(),
        42,
    );
    let result = fitter.fit(x.view(), y.view()).unwrap();

    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.best_index, 0);
    assert_eq!(result.best_score, result.candidates[0].mean_score);

    let mut manual = Vec::new();
    for (train, test) in KFold::new(4).unwrap().split(100).unwrap() {
        assert_eq!(test.len(), 25);
        let mut model = ExtraTreesRegressor::new(params, 42);
        model
            .fit(
                x.select(Axis(0), &train).view(),
                y.select(Axis(0), &train).view(),
            )
            .unwrap();
        let predicted = model.predict(x.select(Axis(0), &test).view()).unwrap();
        manual.push(Scoring::default().score(y.select(Axis(0), &test).view(), predicted.view()));
    }
    assert_eq!(result.candidates[0].fold_scores, manual);
    let mean = manual.iter().sum::<f64>() / 4.0;
    assert!((result.best_score - mean).abs() < 1e-12);

    // The returned model is trained on every row passed to the search.
    let mut full = ExtraTreesRegressor::new(params, 42);
    full.fit(x.view(), y.view()).unwrap();
    assert_eq!(
        result.best_model.predict(x.view()).unwrap(),
        full.predict(x.view()).unwrap()
    );
}

#[test]
fn test_grid_search_is_deterministic() {
    let (x, y) = synthetic(60);
    let grid = HyperparameterGrid {
        max_depth: vec![Some(2), None],
        max_features: vec![MaxFeatures::Fraction(0.7), MaxFeatures::Auto],
        min_samples_leaf: vec![1, 4],
        n_estimators: vec![4],
    };

    let run = || {
        GridSearchFitter::new(grid.clone(), 4, Scoring::NegMeanAbsoluteError, 42)
            .fit(x.view(), y.view())
            .unwrap()
    };
    let a = run();
    let b = run();

    assert_eq!(a.best_index, b.best_index);
    assert_eq!(a.best_params, b.best_params);
    let scores = |r: &ses_ascent::GridSearchResult| -> Vec<Vec<f64>> {
        r.candidates.iter().map(|c| c.fold_scores.clone()).collect()
    };
    assert_eq!(scores(&a), scores(&b));
}

// ─────────────────────── pipeline ───────────────────────

#[test]
fn test_pipeline_writes_log_and_importances() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path(), 40, None);
    let config = config_for(data.path(), out.path());

    let fit = pipeline::run(&config).unwrap();
    assert_eq!(fit.n_test, 8);
    assert_eq!(fit.n_train, 32);
    assert_eq!(fit.candidates.len(), 2);
    assert_eq!(fit.importances[0].feature, "x0");
    assert!(fit.test_report.r2 > 0.5, "r2 = {}", fit.test_report.r2);

    let log_path = out.path().join("Untransformed-Fit.txt");
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with(RUN_SEPARATOR));
    assert!(log.contains("Best Cross-Validation score (neg_mean_squared_error): "));
    assert!(log.contains("Best parameters from Cross-Validation: "));
    assert!(log.contains("Tuned Extra Trees result:\nR2:"));
    assert!(log.contains("Feature Importances (5 Biggest):"));

    let mut table = String::new();
    GzDecoder::new(File::open(out.path().join("Untransformed-Feature Importance.csv.gz")).unwrap())
        .read_to_string(&mut table)
        .unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "feature,importance");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("x0,"));

    // A second run appends to the same log.
    pipeline::run(&config).unwrap();
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches(RUN_SEPARATOR).count(), 2);
}

#[test]
fn test_pipeline_is_reproducible() {
    let data = tempfile::tempdir().unwrap();
    write_inputs(data.path(), 40, None);
    let out_a = tempfile::tempdir().unwrap();
    let out_b = tempfile::tempdir().unwrap();

    let a = pipeline::run(&config_for(data.path(), out_a.path())).unwrap();
    let b = pipeline::run(&config_for(data.path(), out_b.path())).unwrap();
    assert_eq!(a.best_params, b.best_params);
    assert_eq!(a.best_score, b.best_score);
    assert_eq!(a.test_report, b.test_report);
    assert_eq!(a.importances, b.importances);
}

#[test]
fn test_missing_score_identifier_is_an_error() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path(), 20, Some(7));

    let err = pipeline::run(&config_for(data.path(), out.path())).unwrap_err();
    assert!(matches!(err, FitError::MissingIdentifier(id) if id == "E00007"));
}

#[test]
fn test_invalid_config_fails_before_loading() {
    let config = FitConfig {
        data_dir: "/nonexistent".into(),
        folds: 1,
        ..FitConfig::default()
    };
    assert!(matches!(
        pipeline::run(&config),
        Err(FitError::InvalidParameter(_))
    ));
}
