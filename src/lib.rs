#![allow(non_snake_case)]

pub mod classifier;
pub mod data;
pub mod error;
pub mod forest;
pub mod param;
pub mod utils;

use crate::classifier::{ClassifierConfig, GroupedForest};
use crate::data::{Data, UNKNOWN_CLASS};
use crate::error::{LincsError, Result};
use crate::utils::{compute_auc_from_value, compute_metrics_from_classes};
use log::{debug, info, warn};
use param::Param;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::time::Instant;

/// Class probabilities of one test sample
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub sample: String,
    pub proba: [f64; 2],
    pub predicted: u8,
    pub observed: u8,
}

/// Evaluation of a fitted grouped forest on the test set
#[derive(Debug, Clone)]
pub struct TestReport {
    pub predictions: Vec<Prediction>,
    /// Samples without enough measured cell lines to be scored
    pub skipped: Vec<String>,
    pub auc: f64,
    pub accuracy: f64,
    pub sensitivity: f64,
    pub specificity: f64,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub train_samples: usize,
    pub total_groups: usize,
    pub n_subensembles: usize,
    pub test: Option<TestReport>,
    pub execution_time: f64,
}

/// Loads the training set, fits a grouped forest and, when a test set is configured,
/// scores it and writes the prediction table.
pub fn run(param: &Param) -> Result<RunReport> {
    let start = Instant::now();

    // Load train data; unlabeled samples cannot be used for training
    let mut data = Data::new();
    data.load_data(&param.data.X, &param.data.y, param.data.features_in_rows)?;
    data.set_classes(param.data.classes.clone());
    let data = data.remove_class(UNKNOWN_CLASS);
    cinfo!(param.general.display_colorful, "\x1b[2;97m{:?}\x1b[0m", data);

    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .map_err(|e| LincsError::Configuration(format!("cannot build thread pool: {}", e)))?;

    let config = ClassifierConfig::from_param(param);
    debug!("{:?}", config);
    cinfo!(
        param.general.display_colorful,
        "Training grouped forest\n-----------------------------------------------------"
    );
    let mut model = GroupedForest::new(&config);
    pool.install(|| model.fit(&data.X, &data.y))?;
    cinfo!(
        param.general.display_colorful,
        "\x1b[1;93m{} sub-ensembles of {} trees trained over {} cell lines\x1b[0m",
        model.n_subensembles(),
        config.trees_per_subensemble,
        model.total_groups()
    );

    // Loading test data
    let test = if !param.data.Xtest.is_empty() {
        debug!("Loading test data...");
        let mut test_data = Data::new();
        test_data.load_data(&param.data.Xtest, &param.data.ytest, param.data.features_in_rows)?;
        test_data.set_classes(param.data.classes.clone());

        if !data.check_compatibility(&test_data) {
            return Err(LincsError::Data(
                "test features are not the same as train features".to_string(),
            ));
        }

        let report = pool.install(|| evaluate(&model, &test_data));
        cinfo!(
            param.general.display_colorful,
            "\x1b[1;96mTest: {} samples scored, {} skipped | AUC {:.3} | accuracy {:.3} | sensitivity {:.3} | specificity {:.3}\x1b[0m",
            report.predictions.len(),
            report.skipped.len(),
            report.auc,
            report.accuracy,
            report.sensitivity,
            report.specificity
        );

        if !param.output.predictions.is_empty() {
            write_predictions(&param.output.predictions, &report.predictions, &test_data)
                .map_err(std::io::Error::from)?;
            info!("Predictions written to {}", param.output.predictions);
        }

        Some(report)
    } else {
        None
    };

    let execution_time = start.elapsed().as_secs_f64();
    info!("Run completed in {:.2}s", execution_time);

    Ok(RunReport {
        train_samples: data.sample_len,
        total_groups: model.total_groups(),
        n_subensembles: model.n_subensembles(),
        test,
        execution_time,
    })
}

/// Scores every test sample; samples the model cannot score are reported and skipped.
/// Metrics are computed over the scored samples of class 0 or 1.
pub fn evaluate(model: &GroupedForest, test_data: &Data) -> TestReport {
    let outcomes: Vec<std::result::Result<Prediction, String>> = (0..test_data.sample_len)
        .into_par_iter()
        .map(|i| {
            let sample = &test_data.samples[i];
            match model.votes(&test_data.X[i]) {
                Ok(votes) => Ok(Prediction {
                    sample: sample.clone(),
                    proba: votes.proba(),
                    predicted: votes.class(),
                    observed: test_data.y[i],
                }),
                Err(e) => {
                    warn!("Sample {} skipped: {}", sample, e);
                    Err(sample.clone())
                }
            }
        })
        .collect();

    let mut predictions = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(prediction) => predictions.push(prediction),
            Err(sample) => skipped.push(sample),
        }
    }

    let scores: Vec<f64> = predictions.iter().map(|p| p.proba[1]).collect();
    let predicted: Vec<u8> = predictions.iter().map(|p| p.predicted).collect();
    let observed: Vec<u8> = predictions.iter().map(|p| p.observed).collect();
    let (accuracy, sensitivity, specificity) = compute_metrics_from_classes(&predicted, &observed);

    TestReport {
        auc: compute_auc_from_value(&scores, &observed),
        accuracy,
        sensitivity,
        specificity,
        predictions,
        skipped,
    }
}

/// Writes `sample, p0, p1, predicted, observed` as a tab-separated table
pub fn write_predictions(path: &str, predictions: &[Prediction], data: &Data) -> std::result::Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["sample", "p0", "p1", "predicted", "observed"])?;
    for prediction in predictions {
        let observed = if prediction.observed == UNKNOWN_CLASS {
            "NA".to_string()
        } else {
            data.class_name(prediction.observed)
        };
        writer.write_record([
            prediction.sample.clone(),
            format!("{:.6}", prediction.proba[0]),
            format!("{:.6}", prediction.proba[1]),
            data.class_name(prediction.predicted),
            observed,
        ])?;
    }
    writer.flush()?;
    Ok(())
}
