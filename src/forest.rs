use crate::error::{LincsError, Result};
use log::debug;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

//-----------------------------------------------------------------------------
// Tree-ensemble primitive
//-----------------------------------------------------------------------------

/// Number of candidate features drawn at each split
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// floor(sqrt(n_features))
    Sqrt,
    /// floor(log2(n_features))
    Log2,
    /// Every feature is a candidate (plain bagging)
    All,
    /// A fixed number of features
    Count(usize),
    /// A fraction of the features
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolves the rule against the number of available features, never below 1.
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(count) => *count,
            MaxFeatures::Fraction(fraction) => (fraction * n_features as f64) as usize,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// An ensemble whose individual trees can be queried one by one
pub trait TreeEnsemble: Send + Sync {
    fn n_trees(&self) -> usize;

    /// Binary prediction of every tree, in tree order
    fn tree_votes(&self, sample: &[f64]) -> Vec<u8>;
}

/// Something able to train a [`TreeEnsemble`] on complete rows
pub trait EnsembleTrainer: Sync {
    type Ensemble: TreeEnsemble;

    fn train(&self, rows: &[Vec<f64>], labels: &[u8]) -> Result<Self::Ensemble>;
}

/// Random forest hyperparameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 10,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
            seed: 1,
        }
    }
}

impl ForestParams {
    /// Grows `n_trees` Gini trees, each on a bootstrap sample of the rows.
    ///
    /// Tree `t` draws all its randomness from a ChaCha8 stream seeded with `seed + t`,
    /// so the forest does not depend on the rayon scheduling.
    ///
    /// # Errors
    ///
    /// Returns `LincsError::Training` if there are no rows, if rows and labels are
    /// misaligned, if a row is ragged or holds a missing value, if a label is not 0/1
    /// or if `n_trees` is 0.
    pub fn fit(&self, rows: &[Vec<f64>], labels: &[u8]) -> Result<RandomForest> {
        if rows.is_empty() {
            return Err(LincsError::Training("empty training set".to_string()));
        }
        if rows.len() != labels.len() {
            return Err(LincsError::Training(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if self.n_trees == 0 {
            return Err(LincsError::Training("n_trees must be > 0".to_string()));
        }
        let n_features = rows[0].len();
        if n_features == 0 {
            return Err(LincsError::Training("rows have no feature".to_string()));
        }
        if let Some(i) = rows.iter().position(|row| row.len() != n_features) {
            return Err(LincsError::Training(format!(
                "row {} has {} features, expected {}",
                i,
                rows[i].len(),
                n_features
            )));
        }
        if let Some(i) = rows.iter().position(|row| row.iter().any(|v| v.is_nan())) {
            return Err(LincsError::Training(format!("row {} holds a missing value", i)));
        }
        if let Some(label) = labels.iter().find(|&&l| l > 1) {
            return Err(LincsError::Training(format!("label {} is not binary", label)));
        }

        let max_features = self.max_features.resolve(n_features);
        let n_samples = rows.len();

        let trees: Vec<DecisionTree> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                DecisionTree::grow(rows, labels, bootstrap, max_features, self.max_depth, &mut rng)
            })
            .collect();

        debug!(
            "Forest of {} trees grown on {} samples x {} features (max_features={}): {} nodes, max depth {}",
            trees.len(),
            n_samples,
            n_features,
            max_features,
            trees.iter().map(|tree| tree.n_nodes()).sum::<usize>(),
            trees.iter().map(|tree| tree.depth()).max().unwrap_or(0)
        );

        Ok(RandomForest { trees, n_features })
    }
}

impl EnsembleTrainer for ForestParams {
    type Ensemble = RandomForest;

    fn train(&self, rows: &[Vec<f64>], labels: &[u8]) -> Result<RandomForest> {
        self.fit(rows, labels)
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl TreeEnsemble for RandomForest {
    fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn tree_votes(&self, sample: &[f64]) -> Vec<u8> {
        self.trees.iter().map(|tree| tree.predict(sample)).collect()
    }
}

//-----------------------------------------------------------------------------
// Decision tree
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        label: u8,
    },
}

/// Binary CART tree stored as a flat arena, root at index 0
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn grow(
        rows: &[Vec<f64>],
        labels: &[u8],
        indices: Vec<usize>,
        max_features: usize,
        max_depth: Option<usize>,
        rng: &mut ChaCha8Rng,
    ) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new() };
        tree.build(rows, labels, indices, max_features, max_depth, 0, rng);
        tree
    }

    fn build(
        &mut self,
        rows: &[Vec<f64>],
        labels: &[u8],
        indices: Vec<usize>,
        max_features: usize,
        max_depth: Option<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let positive = indices.iter().filter(|&&i| labels[i] == 1).count();
        let label = if 2 * positive > indices.len() { 1 } else { 0 };

        let depth_reached = max_depth.map_or(false, |max| depth >= max);
        let pure = positive == 0 || positive == indices.len();
        if depth_reached || pure || indices.len() < 2 {
            return self.push(Node::Leaf { label });
        }

        let Some((feature, threshold)) = best_split(rows, labels, &indices, max_features, rng) else {
            return self.push(Node::Leaf { label });
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| rows[i][feature] <= threshold);

        // placeholder until both children are known
        let node = self.push(Node::Leaf { label });
        let left = self.build(rows, labels, left_indices, max_features, max_depth, depth + 1, rng);
        let right = self.build(rows, labels, right_indices, max_features, max_depth, depth + 1, rng);
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn predict(&self, sample: &[f64]) -> u8 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { label } => return *label,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_from(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_from(nodes, *left).max(depth_from(nodes, *right)),
            }
        }
        depth_from(&self.nodes, 0)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

fn gini(positive: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positive as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Best (feature, threshold) over features drawn in random order, or None when every feature
/// is constant on `indices`.
///
/// Features are drawn without replacement until `max_features` non-constant ones have been
/// scored, so constant features never use up the draw. Any valid split is kept, including
/// one that leaves the impurity unchanged; ties keep the first feature drawn.
/// Thresholds are midpoints between consecutive distinct values.
fn best_split(
    rows: &[Vec<f64>],
    labels: &[u8],
    indices: &[usize],
    max_features: usize,
    rng: &mut ChaCha8Rng,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let n_features = rows[indices[0]].len();
    let total_positive = indices.iter().filter(|&&i| labels[i] == 1).count();

    let mut order: Vec<usize> = (0..n_features).collect();
    order.shuffle(rng);

    let mut best: Option<(usize, f64)> = None;
    let mut best_impurity = f64::INFINITY;
    let mut visited = 0;

    for feature in order {
        if visited == max_features {
            break;
        }

        let mut sorted: Vec<(f64, u8)> = indices.iter().map(|&i| (rows[i][feature], labels[i])).collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if sorted[0].0 == sorted[n - 1].0 {
            continue;
        }
        visited += 1;

        let mut left_positive = 0;
        for split in 1..n {
            if sorted[split - 1].1 == 1 {
                left_positive += 1;
            }
            if sorted[split - 1].0 == sorted[split].0 {
                continue;
            }
            let right_positive = total_positive - left_positive;
            let weighted = (split as f64 * gini(left_positive, split)
                + (n - split) as f64 * gini(right_positive, n - split))
                / n as f64;
            if weighted < best_impurity {
                best_impurity = weighted;
                let (low, high) = (sorted[split - 1].0, sorted[split].0);
                // adjacent floats can round the midpoint up to `high`
                let mut threshold = low + (high - low) / 2.0;
                if threshold >= high {
                    threshold = low;
                }
                best = Some((feature, threshold));
            }
        }
    }

    best
}
