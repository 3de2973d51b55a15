use crate::classifier::GROUP_WIDTH;
use crate::error::{LincsError, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Class assigned to samples without a usable label
pub const UNKNOWN_CLASS: u8 = 2;

/// Assay matrix (samples in rows, missing values as NaN) with its binary labels
#[derive(Clone)]
pub struct Data {
    pub X: Vec<Vec<f64>>,
    pub y: Vec<u8>,
    pub features: Vec<String>,
    pub samples: Vec<String>,
    pub feature_len: usize,
    pub sample_len: usize,
    pub classes: Vec<String>,
}

impl Data {
    /// Create a new `Data` instance with default values
    pub fn new() -> Data {
        Data {
            X: Vec::new(),
            y: Vec::new(),
            features: Vec::new(),
            samples: Vec::new(),
            feature_len: 0,
            sample_len: 0,
            classes: Vec::new(),
        }
    }

    /// Build a dataset from an in-memory matrix, naming features `cell{g}_{j}` and samples `sample{i}`
    pub fn from_matrix(X: Vec<Vec<f64>>, y: Vec<u8>) -> Data {
        let feature_len = X.first().map_or(0, |row| row.len());
        Data {
            features: (0..feature_len)
                .map(|j| format!("cell{}_{}", j / GROUP_WIDTH, j % GROUP_WIDTH))
                .collect(),
            samples: (0..X.len()).map(|i| format!("sample{}", i)).collect(),
            feature_len,
            sample_len: X.len(),
            X,
            y,
            classes: Vec::new(),
        }
    }

    /// Check if another dataset is compatible with the current one
    pub fn check_compatibility(&self, other: &Data) -> bool {
        self.features == other.features
    }

    /// Number of cell lines covered by the features
    pub fn group_count(&self) -> usize {
        self.feature_len / GROUP_WIDTH
    }

    /// Fraction of missing values in X
    pub fn missing_rate(&self) -> f64 {
        let total = self.feature_len * self.sample_len;
        if total == 0 {
            return 0.0;
        }
        let missing: usize = self.X.iter().map(|row| row.iter().filter(|v| v.is_nan()).count()).sum();
        missing as f64 / total as f64
    }

    /// Load the feature matrix only; every sample gets the unknown class.
    pub fn load_features(&mut self, X_path: &str, features_in_rows: bool) -> Result<()> {
        info!("Loading file {}...", X_path);
        let (row_names, column_names, values) = read_table(X_path)?;

        if features_in_rows {
            self.features = row_names;
            self.samples = column_names;
            self.X = (0..self.samples.len())
                .map(|i| values.iter().map(|row| row[i]).collect())
                .collect();
        } else {
            self.samples = row_names;
            self.features = column_names;
            self.X = values;
        }

        self.feature_len = self.features.len();
        self.sample_len = self.samples.len();
        self.y = vec![UNKNOWN_CLASS; self.sample_len];

        if self.feature_len % GROUP_WIDTH != 0 {
            warn!(
                "{} features is not a multiple of {}: the last cell line is incomplete.",
                self.feature_len, GROUP_WIDTH
            );
        }

        Ok(())
    }

    /// Load data from `X.tsv` and `y.tsv` files.
    ///
    /// X holds a header line of column names and one named row per line; tokens such as
    /// `NA`, `NaN` or empty cells are read as missing. y holds a header line then
    /// `sample<TAB>label` lines with labels 0, 1 or 2 (unknown).
    pub fn load_data(&mut self, X_path: &str, y_path: &str, features_in_rows: bool) -> Result<()> {
        self.load_features(X_path, features_in_rows)?;

        info!("Loading file {}...", y_path);
        let reader_y = BufReader::new(File::open(y_path)?);

        // Parse y.tsv and store target values
        let mut y_map = HashMap::new();
        for (line_number, line) in reader_y.lines().enumerate().skip(1) {
            let line = line?;
            let trimmed_line = line.trim_end_matches(['\n', '\r']);
            if trimmed_line.is_empty() {
                continue;
            }
            let mut fields = trimmed_line.split('\t');

            if let (Some(sample_name), Some(value)) = (fields.next(), fields.next()) {
                let target = match value.trim().parse::<u8>() {
                    Ok(target) if target <= UNKNOWN_CLASS => target,
                    _ => {
                        return Err(LincsError::Data(format!(
                            "{}:{}: invalid label {:?} for {} (expected 0, 1 or 2)",
                            y_path,
                            line_number + 1,
                            value,
                            sample_name
                        )))
                    }
                };
                y_map.insert(sample_name.to_string(), target);
            }
        }

        // Reorder `y` to match the order of `samples` from X.tsv
        self.y = self
            .samples
            .iter()
            .map(|sample_name| {
                *y_map.get(sample_name).unwrap_or_else(|| {
                    warn!("No y value available for {}. Setting y to 2 for this sample.", sample_name);
                    &UNKNOWN_CLASS
                })
            })
            .collect();

        Ok(())
    }

    pub fn set_classes(&mut self, classes: Vec<String>) {
        self.classes = classes;
    }

    /// Human readable name of a class, falling back to its number
    pub fn class_name(&self, class: u8) -> String {
        if self.classes.len() >= 2 && (class as usize) < self.classes.len() {
            self.classes[class as usize].clone()
        } else {
            class.to_string()
        }
    }

    /// filter Data for some samples (represented by a Vector of indices)
    pub fn subset(&self, samples: Vec<usize>) -> Data {
        Data {
            X: samples.iter().map(|&i| self.X[i].clone()).collect(),
            y: samples.iter().map(|&i| self.y[i]).collect(),
            features: self.features.clone(),
            samples: samples.iter().map(|&i| self.samples[i].clone()).collect(),
            feature_len: self.feature_len,
            sample_len: samples.len(),
            classes: self.classes.clone(),
        }
    }

    pub fn remove_class(&self, class_to_remove: u8) -> Data {
        let indices_to_keep: Vec<usize> = self
            .y
            .iter()
            .enumerate()
            .filter(|(_, &class)| class != class_to_remove)
            .map(|(index, _)| index)
            .collect();

        let removed = self.sample_len - indices_to_keep.len();
        if removed > 0 {
            warn!("Removing {} samples of class {:?}...", removed, class_to_remove);
        }

        self.subset(indices_to_keep)
    }
}

impl Default for Data {
    fn default() -> Self {
        Data::new()
    }
}

/// Reads a tab-separated table with a header line and row names in the first column
fn read_table(path: &str) -> Result<(Vec<String>, Vec<String>, Vec<Vec<f64>>)> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut first_line = String::new();
    reader.read_line(&mut first_line)?;
    let column_names: Vec<String> = first_line
        .trim_end_matches(['\n', '\r'])
        .split('\t')
        .skip(1)
        .map(String::from)
        .collect();

    let mut row_names = Vec::new();
    let mut values = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed_line = line.trim_end_matches(['\n', '\r']);
        if trimmed_line.is_empty() {
            continue;
        }
        let mut fields = trimmed_line.split('\t');

        // First field is the row name
        let name = fields.next().unwrap_or_default().to_string();
        let row: Vec<f64> = fields.map(parse_value).collect();
        if row.len() != column_names.len() {
            return Err(LincsError::Data(format!(
                "{}:{}: row {} has {} values but the header names {} columns",
                path,
                line_number + 2,
                name,
                row.len(),
                column_names.len()
            )));
        }
        row_names.push(name);
        values.push(row);
    }

    Ok((row_names, column_names, values))
}

/// Missing or unparsable cells become NaN
fn parse_value(token: &str) -> f64 {
    let token = token.trim();
    match token.to_ascii_lowercase().as_str() {
        "" | "na" | "n/a" | "nan" | "null" | "none" => f64::NAN,
        _ => token.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Cuts `text` to at most `max_chars` characters, ending with "..." when shortened
fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars - 3).collect::<String>())
    } else {
        text
    }
}

/// Implement a custom Display trait for Data
impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Features: {} ({} cell lines)   Samples: {}   Missing: {:.1}%",
            self.feature_len,
            self.group_count(),
            self.sample_len,
            100.0 * self.missing_rate()
        )?;

        let features_string = self.features.join("\t");
        let truncated_features = truncate(features_string, 100);
        writeln!(f, "X:                  {}", truncated_features)?;

        // Limit to the first 20 rows
        for (i, row) in self.X.iter().take(20).enumerate() {
            let row_display: String = row
                .iter()
                .map(|v| if v.is_nan() { "NA".to_string() } else { format!("{:.2}", v) })
                .collect::<Vec<_>>()
                .join("\t");
            let truncated_row = truncate(row_display, 80);
            writeln!(f, "{:<20} {}", self.samples[i], truncated_row)?;
        }

        writeln!(f, "\ny:")?;
        for (i, class) in self.y.iter().take(20).enumerate() {
            writeln!(f, "{}\t{}", self.samples[i], self.class_name(*class))?;
        }

        Ok(())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}
