use crate::error::{LincsError, Result};
use crate::forest::{EnsembleTrainer, ForestParams, MaxFeatures, TreeEnsemble};
use crate::param::Param;
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of consecutive features describing one cell line
pub const GROUP_WIDTH: usize = 4;

//-----------------------------------------------------------------------------
// Group subsets
//-----------------------------------------------------------------------------

/// Sorted, duplicate-free set of cell-line (group) indices used as a sub-ensemble key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupSubset(Vec<usize>);

impl GroupSubset {
    pub fn new(mut groups: Vec<usize>) -> GroupSubset {
        groups.sort_unstable();
        groups.dedup();
        GroupSubset(groups)
    }

    pub fn groups(&self) -> &[usize] {
        &self.0
    }

    /// Column positions covered by the subset, group by group
    pub fn feature_positions(&self) -> Vec<usize> {
        self.0
            .iter()
            .flat_map(|g| g * GROUP_WIDTH..(g + 1) * GROUP_WIDTH)
            .collect()
    }

    /// The sample restricted to the subset's columns, or None if one of them is missing
    fn extract(&self, sample: &[f64]) -> Option<Vec<f64>> {
        self.feature_positions()
            .into_iter()
            .map(|p| sample.get(p).copied().filter(|v| !v.is_nan()))
            .collect()
    }
}

impl fmt::Display for GroupSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

/// Indices of the groups whose values are all present in the sample, in increasing order.
/// A trailing partial group is ignored.
pub fn observed_groups(sample: &[f64]) -> Vec<usize> {
    sample
        .chunks_exact(GROUP_WIDTH)
        .enumerate()
        .filter(|(_, values)| values.iter().all(|v| !v.is_nan()))
        .map(|(g, _)| g)
        .collect()
}

/// Smallest number of fully observed groups over all samples (0 for an empty matrix)
pub fn min_observed_groups(X: &[Vec<f64>]) -> usize {
    X.iter().map(|sample| observed_groups(sample).len()).min().unwrap_or(0)
}

/// Every k-combination of `0..total_groups` in lexicographic order
pub fn enumerate_subsets(total_groups: usize, k: usize) -> Vec<GroupSubset> {
    (0..total_groups).combinations(k).map(GroupSubset).collect()
}

//-----------------------------------------------------------------------------
// Classifier
//-----------------------------------------------------------------------------

/// Hyperparameters of a grouped forest
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub groups_per_subensemble: usize,
    pub trees_per_subensemble: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub random_seed: u64,
}

impl ClassifierConfig {
    pub fn new(groups_per_subensemble: usize) -> ClassifierConfig {
        let forest = ForestParams::default();
        ClassifierConfig {
            groups_per_subensemble,
            trees_per_subensemble: forest.n_trees,
            max_depth: forest.max_depth,
            max_features: forest.max_features,
            random_seed: forest.seed,
        }
    }

    pub fn from_param(param: &Param) -> ClassifierConfig {
        ClassifierConfig {
            groups_per_subensemble: param.forest.groups_per_subensemble,
            trees_per_subensemble: param.forest.trees_per_subensemble,
            max_depth: param.forest.max_depth,
            max_features: param.forest.max_features,
            random_seed: param.general.seed,
        }
    }

    /// Every sub-ensemble gets the same seed
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.trees_per_subensemble,
            max_depth: self.max_depth,
            max_features: self.max_features,
            seed: self.random_seed,
        }
    }
}

/// Tree votes gathered for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Votes {
    /// Sub-ensembles consulted, in canonical order
    pub subsets: Vec<GroupSubset>,
    /// Trees voting for class 1
    pub positive: usize,
    /// Trees consulted
    pub total: usize,
}

impl Votes {
    /// [P(class 0), P(class 1)]
    pub fn proba(&self) -> [f64; 2] {
        let p = self.positive as f64 / self.total as f64;
        [1.0 - p, p]
    }

    /// Class with the most tree votes, 0 on an exact tie
    pub fn class(&self) -> u8 {
        if 2 * self.positive > self.total {
            1
        } else {
            0
        }
    }
}

/// Ensemble of per-cell-line-subset forests.
///
/// Features are grouped by cell line, `GROUP_WIDTH` consecutive columns per cell line.
/// `fit` trains one sub-ensemble per combination of `groups_per_subensemble` cell lines,
/// on the samples fully measured in those cell lines and on their columns only.
/// A query sample is scored by pooling the individual tree votes of every sub-ensemble
/// whose cell lines it fully covers.
pub struct GroupedForest<T: EnsembleTrainer = ForestParams> {
    groups_per_subensemble: usize,
    trainer: T,
    total_groups: usize,
    subensembles: Option<BTreeMap<GroupSubset, T::Ensemble>>,
}

impl GroupedForest<ForestParams> {
    pub fn new(config: &ClassifierConfig) -> Self {
        GroupedForest::with_trainer(config.groups_per_subensemble, config.forest_params())
    }
}

impl<T: EnsembleTrainer> GroupedForest<T> {
    pub fn with_trainer(groups_per_subensemble: usize, trainer: T) -> Self {
        GroupedForest {
            groups_per_subensemble,
            trainer,
            total_groups: 0,
            subensembles: None,
        }
    }

    pub fn groups_per_subensemble(&self) -> usize {
        self.groups_per_subensemble
    }

    pub fn is_fit(&self) -> bool {
        self.subensembles.is_some()
    }

    /// Number of cell lines seen at fit time
    pub fn total_groups(&self) -> usize {
        self.total_groups
    }

    pub fn n_subensembles(&self) -> usize {
        self.subensembles.as_ref().map_or(0, |m| m.len())
    }

    /// Trained subsets in canonical order (empty when not fit)
    pub fn subsets(&self) -> impl Iterator<Item = &GroupSubset> {
        self.subensembles.iter().flat_map(|m| m.keys())
    }

    pub fn subensemble(&self, subset: &GroupSubset) -> Option<&T::Ensemble> {
        self.subensembles.as_ref().and_then(|m| m.get(subset))
    }

    /// Trains one sub-ensemble per group subset, replacing any previous fit.
    ///
    /// The model is left unfit if any step fails.
    ///
    /// # Errors
    ///
    /// * `LincsError::Configuration` if `groups_per_subensemble` is 0, if the matrix is empty,
    ///   ragged or not a multiple of `GROUP_WIDTH` wide, if labels are misaligned or not binary,
    ///   or if some sample is fully observed in fewer groups than `groups_per_subensemble`
    /// * `LincsError::Training` if a subset has no complete row, or if the trainer fails
    pub fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        self.subensembles = None;
        self.total_groups = 0;

        let k = self.groups_per_subensemble;
        if k == 0 {
            return Err(LincsError::Configuration("groups_per_subensemble must be > 0".to_string()));
        }
        let width = check_matrix(X)?;
        if X.len() != y.len() {
            return Err(LincsError::Configuration(format!(
                "{} samples but {} labels",
                X.len(),
                y.len()
            )));
        }
        if let Some(label) = y.iter().find(|&&l| l > 1) {
            return Err(LincsError::Configuration(format!("label {} is not binary", label)));
        }

        // Global guard: every sample must cover at least k cell lines
        let min_observed = min_observed_groups(X);
        if min_observed < k {
            return Err(LincsError::Configuration(format!(
                "insufficient coverage: too much missing data for groups_per_subensemble = {} (some samples are only measured in {} cell lines)",
                k, min_observed
            )));
        }

        let total_groups = width / GROUP_WIDTH;
        let subsets = enumerate_subsets(total_groups, k);
        info!(
            "Training {} sub-ensembles ({} cell lines, {} per sub-ensemble) on {} samples",
            subsets.len(),
            total_groups,
            k,
            X.len()
        );

        let trained: Vec<(GroupSubset, T::Ensemble)> = subsets
            .into_par_iter()
            .map(|subset| {
                let (rows, labels): (Vec<Vec<f64>>, Vec<u8>) = X
                    .iter()
                    .zip(y.iter())
                    .filter_map(|(sample, &label)| subset.extract(sample).map(|row| (row, label)))
                    .unzip();
                if rows.is_empty() {
                    return Err(LincsError::Training(format!(
                        "empty training set: no sample is fully measured in cell lines {}",
                        subset
                    )));
                }
                debug!("Sub-ensemble {} trained on {} samples", subset, rows.len());
                let ensemble = self.trainer.train(&rows, &labels)?;
                Ok((subset, ensemble))
            })
            .collect::<Result<_>>()?;

        self.total_groups = total_groups;
        self.subensembles = Some(trained.into_iter().collect());
        Ok(())
    }

    /// Tree votes of every sub-ensemble the sample fully covers.
    ///
    /// # Errors
    ///
    /// `LincsError::Inference` if the model is not fit, if the sample does not have the
    /// width of the training matrix, or if fewer than `groups_per_subensemble` groups are observed.
    pub fn votes(&self, sample: &[f64]) -> Result<Votes> {
        let subensembles = self
            .subensembles
            .as_ref()
            .ok_or_else(|| LincsError::Inference("model is not fit".to_string()))?;

        let width = self.total_groups * GROUP_WIDTH;
        if sample.len() != width {
            return Err(LincsError::Inference(format!(
                "sample has {} features but the model was fit on {} ({} cell lines)",
                sample.len(),
                width,
                self.total_groups
            )));
        }

        let observed = observed_groups(sample);
        if observed.len() < self.groups_per_subensemble {
            return Err(LincsError::Inference(format!(
                "insufficient coverage: sample measured in {} cell lines, {} required",
                observed.len(),
                self.groups_per_subensemble
            )));
        }

        let mut votes = Votes {
            subsets: Vec::new(),
            positive: 0,
            total: 0,
        };
        for combination in observed.into_iter().combinations(self.groups_per_subensemble) {
            let subset = GroupSubset(combination);
            let ensemble = subensembles
                .get(&subset)
                .ok_or_else(|| LincsError::Inference(format!("unknown subset {}", subset)))?;
            let values = subset
                .extract(sample)
                .ok_or_else(|| LincsError::Inference(format!("missing values in subset {}", subset)))?;
            for vote in ensemble.tree_votes(&values) {
                votes.total += 1;
                if vote == 1 {
                    votes.positive += 1;
                }
            }
            votes.subsets.push(subset);
        }

        if votes.total == 0 {
            return Err(LincsError::Inference("selected sub-ensembles hold no tree".to_string()));
        }
        Ok(votes)
    }

    /// [P(class 0), P(class 1)] as the fraction of all selected trees voting each class
    pub fn predict_proba(&self, sample: &[f64]) -> Result<[f64; 2]> {
        Ok(self.votes(sample)?.proba())
    }

    /// Most probable class, 0 on an exact tie
    pub fn predict(&self, sample: &[f64]) -> Result<u8> {
        Ok(self.votes(sample)?.class())
    }

    /// Row-wise `predict_proba`; fails on the first row that cannot be scored
    pub fn predict_proba_batch(&self, X: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
        X.par_iter().map(|sample| self.predict_proba(sample)).collect()
    }

    /// Row-wise `predict`; fails on the first row that cannot be scored
    pub fn predict_batch(&self, X: &[Vec<f64>]) -> Result<Vec<u8>> {
        X.par_iter().map(|sample| self.predict(sample)).collect()
    }
}

/// Checks that X is non-empty, rectangular and a whole number of groups wide; returns the width.
fn check_matrix(X: &[Vec<f64>]) -> Result<usize> {
    let width = X
        .first()
        .map(|row| row.len())
        .ok_or_else(|| LincsError::Configuration("empty feature matrix".to_string()))?;
    if width == 0 || width % GROUP_WIDTH != 0 {
        return Err(LincsError::Configuration(format!(
            "{} features is not a positive multiple of {}",
            width, GROUP_WIDTH
        )));
    }
    if let Some(i) = X.iter().position(|row| row.len() != width) {
        return Err(LincsError::Configuration(format!(
            "sample {} has {} features, expected {}",
            i,
            X[i].len(),
            width
        )));
    }
    Ok(width)
}
