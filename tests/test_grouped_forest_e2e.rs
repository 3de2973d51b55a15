/// End-to-End Integration Test for the grouped forest
///
/// Trains on three cell lines with some unmeasured ones, scores a test set where one
/// sample keeps a single cell line, and checks the written prediction table.
///
/// Run with: cargo test --test test_grouped_forest_e2e -- --nocapture
use lincs_forest::error::LincsError;
use lincs_forest::param::{self, Param};
use lincs_forest::run;

fn create_params(predictions: &str) -> Param {
    let mut param = Param::default();

    param.general.seed = 42;
    param.general.thread_number = 2;
    param.general.display_colorful = false;

    param.data.X = "samples/tests/train_X.tsv".to_string();
    param.data.y = "samples/tests/train_y.tsv".to_string();
    param.data.Xtest = "samples/tests/test_X.tsv".to_string();
    param.data.ytest = "samples/tests/test_y.tsv".to_string();
    param.data.classes = vec!["resistant".to_string(), "sensitive".to_string()];

    param.forest.groups_per_subensemble = 2;
    param.forest.trees_per_subensemble = 15;

    param.output.predictions = predictions.to_string();
    param
}

fn temp_path(name: &str) -> String {
    std::env::temp_dir().join(name).to_str().unwrap().to_string()
}

#[test]
fn test_grouped_forest_e2e() {
    let output = temp_path("lincs_forest_e2e_predictions.tsv");
    let mut param = create_params(&output);
    param::validate(&mut param).expect("parameters should be valid");

    let report = run(&param).expect("run should succeed");

    assert_eq!(report.train_samples, 30);
    assert_eq!(report.total_groups, 3);
    assert_eq!(report.n_subensembles, 3, "three cell lines taken two by two");

    let test = report.test.expect("a test report should be produced");
    assert_eq!(test.skipped, vec!["test8".to_string()], "test8 only has one cell line measured");
    assert_eq!(test.predictions.len(), 7);
    for prediction in &test.predictions {
        assert!((prediction.proba[0] + prediction.proba[1] - 1.0).abs() < 1e-12);
        assert_eq!(prediction.predicted, prediction.observed, "classes are well separated for {}", prediction.sample);
    }
    assert_eq!(test.auc, 1.0);
    assert_eq!(test.accuracy, 1.0);

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "sample\tp0\tp1\tpredicted\tobserved");
    assert_eq!(lines.len(), 8);
    assert!(lines[1].starts_with("test1\t"));
    assert!(lines[1].ends_with("\tresistant\tresistant"));
    assert!(lines[4].starts_with("test4\t"), "a sample with two cell lines should still be scored");
    assert!(!content.contains("test8"));
    let _ = std::fs::remove_file(&output);
}

#[test]
fn test_grouped_forest_e2e_is_reproducible() {
    let first = run(&create_params("")).unwrap().test.unwrap();
    let second = run(&create_params("")).unwrap().test.unwrap();
    assert_eq!(first.predictions, second.predictions, "same seed should give the same probabilities");
}

#[test]
fn test_grouped_forest_e2e_rejects_low_coverage() {
    let mut param = create_params("");
    param.forest.groups_per_subensemble = 3;
    assert!(
        matches!(run(&param), Err(LincsError::Configuration(_))),
        "some training samples only have two cell lines measured"
    );
}

#[test]
fn test_grouped_forest_e2e_incompatible_test_set() {
    let mut param = create_params("");
    param.data.Xtest = "samples/tests/tiny_X.tsv".to_string();
    param.data.ytest = "samples/tests/tiny_y.tsv".to_string();
    assert!(matches!(run(&param), Err(LincsError::Data(_))));
}
