//! The unlearning tree: recursive construction and prediction.

use crate::remover::{self, RemovalReport};
use crate::splitter::{choose_split, SplitStats};
use lethe_core::{DataError, Dataset};
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Empty training dataset")]
    EmptyTrainingSet,
    #[error("Empty candidate feature set")]
    EmptyFeatureSet,
    #[error("Tree has not been fitted")]
    NotFitted,
    #[error("Feature dimensions mismatch")]
    DimensionMismatch,
    #[error("Noise scale lambda must be positive and finite")]
    InvalidLambda,
    #[error("Invalid pruning parameters")]
    InvalidPruningParams,
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Prediction of a leaf that has lost all of its samples.
pub(crate) const EMPTY_LEAF_PREDICTION: f64 = 0.5;

/// Configuration for an unlearning tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlearningTreeConfig {
    /// Maximum depth of the tree (None = unbounded)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required on each side of a split
    pub min_samples_leaf: usize,
    /// Noise scale of the Gibbs distribution over split scores.
    /// Smaller values approach greedy selection, larger values approach
    /// uniform selection.
    pub lambda: f64,
    /// Random seed for split selection
    pub random_seed: Option<u64>,
}

impl Default for UnlearningTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.1,
            random_seed: None,
        }
    }
}

/// Node of a fitted tree.
///
/// Internal nodes keep the statistics and the uniform draw behind their
/// split decision so a removal can re-check the decision without
/// rescanning samples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Leaf {
        depth: usize,
        ids: Vec<usize>,
        n_samples: usize,
        n_positive: usize,
        prediction: f64,
    },
    Internal {
        depth: usize,
        feature: usize,
        draw: f64,
        stats: SplitStats,
        ids: Vec<usize>,
        n_samples: usize,
        n_positive: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn n_samples(&self) -> usize {
        match self {
            Node::Leaf { n_samples, .. } | Node::Internal { n_samples, .. } => *n_samples,
        }
    }

    pub(crate) fn ids(&self) -> &[usize] {
        match self {
            Node::Leaf { ids, .. } | Node::Internal { ids, .. } => ids,
        }
    }

    fn count_nodes(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Internal { left, right, .. } => 1 + left.count_nodes() + right.count_nodes(),
        }
    }

    fn count_leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Internal { left, right, .. } => left.count_leaves() + right.count_leaves(),
        }
    }

    fn subtree_depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { left, right, .. } => {
                1 + std::cmp::max(left.subtree_depth(), right.subtree_depth())
            }
        }
    }
}

pub(crate) fn leaf_prediction(n_samples: usize, n_positive: usize) -> f64 {
    if n_samples == 0 {
        EMPTY_LEAF_PREDICTION
    } else {
        n_positive as f64 / n_samples as f64
    }
}

pub(crate) fn new_leaf(depth: usize, ids: Vec<usize>, n_positive: usize) -> Node {
    let n_samples = ids.len();
    Node::Leaf {
        depth,
        ids,
        n_samples,
        n_positive,
        prediction: leaf_prediction(n_samples, n_positive),
    }
}

/// Recursively builds a subtree rooted at `depth` from the given ids and
/// candidate features. Also the retraining entry point for the remover.
pub(crate) fn build_node(
    data: &Dataset,
    ids: Vec<usize>,
    features: Vec<usize>,
    depth: usize,
    config: &UnlearningTreeConfig,
    rng: &mut StdRng,
) -> Node {
    let n_samples = ids.len();
    let n_positive = ids.iter().filter(|&&id| data.label(id) == 1).count();

    // Stopping criteria: too small, depth cap, pure, or nothing left to
    // split on.
    let at_depth_cap = config.max_depth.map_or(false, |cap| depth >= cap);
    if n_samples < config.min_samples_split
        || at_depth_cap
        || n_positive == 0
        || n_positive == n_samples
        || features.is_empty()
    {
        return new_leaf(depth, ids, n_positive);
    }

    match choose_split(
        data,
        &ids,
        &features,
        config.min_samples_leaf,
        config.lambda,
        rng,
    ) {
        None => new_leaf(depth, ids, n_positive),
        Some(split) => {
            let child_features: Vec<usize> = features
                .iter()
                .copied()
                .filter(|&f| f != split.feature)
                .collect();
            let left = build_node(
                data,
                split.left_ids,
                child_features.clone(),
                depth + 1,
                config,
                rng,
            );
            let right = build_node(data, split.right_ids, child_features, depth + 1, config, rng);
            Node::Internal {
                depth,
                feature: split.feature,
                draw: split.draw,
                stats: split.stats,
                ids,
                n_samples,
                n_positive,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
    }
}

fn predict_row(node: &Node, row: ArrayView1<u8>) -> f64 {
    match node {
        Node::Leaf { prediction, .. } => *prediction,
        Node::Internal {
            feature,
            left,
            right,
            ..
        } => {
            if row[*feature] == 0 {
                predict_row(left, row)
            } else {
                predict_row(right, row)
            }
        }
    }
}

/// Decision tree over binary features whose structure supports removing
/// training samples after the fact.
#[derive(Debug, Clone)]
pub struct UnlearningTree {
    pub(crate) config: UnlearningTreeConfig,
    pub(crate) root: Option<Box<Node>>,
    pub(crate) n_features: usize,
    pub(crate) rng: StdRng,
    pub(crate) metrics: RemovalReport,
}

impl UnlearningTree {
    /// Creates a new tree with the given configuration.
    pub fn new(config: UnlearningTreeConfig) -> Result<Self, TreeError> {
        if config.min_samples_split < 2 || config.min_samples_leaf < 1 {
            return Err(TreeError::InvalidPruningParams);
        }
        if !config.lambda.is_finite() || config.lambda <= 0.0 {
            return Err(TreeError::InvalidLambda);
        }

        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            root: None,
            n_features: 0,
            rng,
            metrics: RemovalReport::default(),
        })
    }

    /// Fits the tree on all live samples over all features.
    pub fn fit(&mut self, data: &Dataset) -> Result<(), TreeError> {
        self.fit_subset(data, data.valid_ids(), (0..data.n_features()).collect())
    }

    /// Fits the tree on explicit row and feature subsets. Used by the
    /// forest for bagging; ids must be live and in ascending order.
    pub(crate) fn fit_subset(
        &mut self,
        data: &Dataset,
        ids: Vec<usize>,
        features: Vec<usize>,
    ) -> Result<(), TreeError> {
        if ids.is_empty() {
            return Err(TreeError::EmptyTrainingSet);
        }
        if features.is_empty() {
            return Err(TreeError::EmptyFeatureSet);
        }

        self.n_features = data.n_features();
        self.metrics = RemovalReport::default();
        let root = build_node(data, ids, features, 0, &self.config, &mut self.rng);
        debug!(
            "fitted tree: {} nodes ({} leaves), depth {}",
            root.count_nodes(),
            root.count_leaves(),
            root.subtree_depth()
        );
        self.root = Some(Box::new(root));
        Ok(())
    }

    /// Predicts the positive-class probability for each row.
    pub fn predict(&self, x: ArrayView2<u8>) -> Result<Array1<f64>, TreeError> {
        let root = self.root.as_deref().ok_or(TreeError::NotFitted)?;
        if x.ncols() != self.n_features {
            return Err(TreeError::DimensionMismatch);
        }

        let mut predictions = Array1::zeros(x.nrows());
        for (i, row) in x.outer_iter().enumerate() {
            predictions[i] = predict_row(root, row);
        }
        Ok(predictions)
    }

    /// Removes a batch of training samples from the dataset and from this
    /// tree, rebuilding only the subtrees whose split decisions the
    /// removal invalidates.
    ///
    /// Validation happens before any mutation: on error both the dataset
    /// and the tree are unchanged.
    pub fn remove(&mut self, data: &mut Dataset, ids: &[usize]) -> Result<RemovalReport, TreeError> {
        if self.root.is_none() {
            return Err(TreeError::NotFitted);
        }
        data.mark_removed(ids)?;
        Ok(self.unlearn_marked(data, ids))
    }

    /// Applies an already-marked removal batch. Used by the forest, which
    /// marks ids once on the shared dataset for all of its trees.
    pub(crate) fn unlearn_marked(&mut self, data: &Dataset, ids: &[usize]) -> RemovalReport {
        let report = remover::unlearn(self, data, ids);
        self.metrics.merge(&report);
        report
    }

    /// Cumulative removal telemetry since the last clear.
    pub fn removal_metrics(&self) -> &RemovalReport {
        &self.metrics
    }

    pub fn clear_removal_metrics(&mut self) {
        self.metrics = RemovalReport::default();
    }

    /// Returns the depth of the tree.
    pub fn depth(&self) -> usize {
        self.root.as_deref().map_or(0, Node::subtree_depth)
    }

    /// Returns the number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.root.as_deref().map_or(0, Node::count_nodes)
    }

    /// Returns the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.root.as_deref().map_or(0, Node::count_leaves)
    }
}


#[cfg(test)]
#[path = "tree_test.rs"]
mod tests;
