use crate::forest::MaxFeatures;
use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub forest: Forest,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "empty_string")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub X: String,
    #[serde(default = "empty_string")]
    pub y: String,
    #[serde(default = "empty_string")]
    pub Xtest: String,
    #[serde(default = "empty_string")]
    pub ytest: String,
    #[serde(default = "false_default")]
    pub features_in_rows: bool,
    #[serde(default = "class_names_default")]
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Forest {
    #[serde(default = "groups_per_subensemble_default")]
    pub groups_per_subensemble: usize,
    #[serde(default = "trees_per_subensemble_default")]
    pub trees_per_subensemble: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "max_features_default")]
    pub max_features: MaxFeatures,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Output {
    #[serde(default = "empty_string")]
    pub predictions: String,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Forest {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Output {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), String> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.general.thread_number == 0 {
        return Err("Invalid thread_number=0. At least one thread is required.".to_string());
    }

    if param.data.X.is_empty() || param.data.y.is_empty() {
        return Err("Both X and y must be provided.".to_string());
    }

    if (param.data.Xtest.is_empty() && !param.data.ytest.is_empty())
        || (!param.data.Xtest.is_empty() && param.data.ytest.is_empty())
    {
        return Err("Both Xtest and ytest must be provided together.".to_string());
    }

    if !param.output.predictions.is_empty() && param.data.Xtest.is_empty() {
        warn!("output.predictions is set without a test set: no prediction file will be written.");
    }

    if param.data.classes.len() > 0 && param.data.classes.len() < 2 {
        warn!("Only one class name provided, class names will be ignored.");
    }

    validate_forest(param)?;
    Ok(())
}

fn validate_forest(param: &mut Param) -> Result<(), String> {
    if param.forest.groups_per_subensemble == 0 {
        return Err("Invalid groups_per_subensemble=0. Must be >= 1.".to_string());
    }

    if param.forest.trees_per_subensemble == 0 {
        return Err("Invalid trees_per_subensemble=0. Must be >= 1.".to_string());
    }

    match param.forest.max_features {
        MaxFeatures::Count(0) => {
            return Err("Invalid max_features=Count(0). Must be >= 1.".to_string());
        }
        MaxFeatures::Fraction(f) if f <= 0.0 || f > 1.0 => {
            return Err(format!("Invalid max_features=Fraction({:.3}). Must be in range (0, 1].", f));
        }
        _ => {}
    }

    if param.forest.max_depth == Some(0) {
        warn!("max_depth=0: every tree will be a single leaf predicting the majority class.");
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    1
}
fn empty_string() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn false_default() -> bool {
    false
}
fn true_default() -> bool {
    true
}
fn one_default() -> usize {
    1
}
fn class_names_default() -> Vec<String> {
    Vec::new()
}
fn groups_per_subensemble_default() -> usize {
    2
}
fn trees_per_subensemble_default() -> usize {
    10
}
fn max_features_default() -> MaxFeatures {
    MaxFeatures::Sqrt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_param() -> Param {
        let mut param = Param::default();
        param.data.X = "X.tsv".to_string();
        param.data.y = "y.tsv".to_string();
        param
    }

    #[test]
    fn test_defaults() {
        let param = Param::default();
        assert_eq!(param.general.seed, 1);
        assert_eq!(param.general.thread_number, 1);
        assert!(param.general.display_colorful);
        assert_eq!(param.forest.groups_per_subensemble, 2);
        assert_eq!(param.forest.trees_per_subensemble, 10);
        assert_eq!(param.forest.max_depth, None, "trees should be unbounded by default");
        assert_eq!(param.forest.max_features, MaxFeatures::Sqrt);
        assert!(!param.data.features_in_rows);
        assert!(param.output.predictions.is_empty());
    }

    #[test]
    fn test_yaml_partial_sections() {
        let yaml = "
general:
  seed: 42
  thread_number: 4
data:
  X: train.tsv
  y: labels.tsv
forest:
  groups_per_subensemble: 3
  max_depth: 6
  max_features: Log2
";
        let param: Param = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(param.general.seed, 42);
        assert_eq!(param.general.log_level, "info", "missing fields should take their default");
        assert_eq!(param.data.X, "train.tsv");
        assert_eq!(param.forest.groups_per_subensemble, 3);
        assert_eq!(param.forest.trees_per_subensemble, 10);
        assert_eq!(param.forest.max_depth, Some(6));
        assert_eq!(param.forest.max_features, MaxFeatures::Log2);
        assert_eq!(param.output, Output::default());
    }

    #[test]
    fn test_validate_accepts_defaults_with_data() {
        let mut param = valid_param();
        assert!(validate(&mut param).is_ok());
    }

    #[test]
    fn test_validate_disables_colors_when_logging_to_file() {
        let mut param = valid_param();
        param.general.log_base = "run".to_string();
        validate(&mut param).unwrap();
        assert!(!param.general.display_colorful, "ANSI colors should not end up in log files");
    }

    #[test]
    fn test_validate_rejects_invalid_values() {
        let mut param = valid_param();
        param.forest.groups_per_subensemble = 0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.forest.trees_per_subensemble = 0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.general.thread_number = 0;
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.forest.max_features = MaxFeatures::Fraction(1.5);
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.forest.max_features = MaxFeatures::Count(0);
        assert!(validate(&mut param).is_err());

        let mut param = valid_param();
        param.data.y = "".to_string();
        assert!(validate(&mut param).is_err(), "training labels are mandatory");
    }

    #[test]
    fn test_validate_requires_test_files_together() {
        let mut param = valid_param();
        param.data.Xtest = "Xtest.tsv".to_string();
        assert!(validate(&mut param).is_err(), "Xtest without ytest should be rejected");

        param.data.ytest = "ytest.tsv".to_string();
        assert!(validate(&mut param).is_ok());
    }

    #[test]
    fn test_get_missing_file() {
        assert!(get("does/not/exist.yaml".to_string()).is_err());
    }
}
