//! Bagged ensemble of unlearning trees.
//!
//! The forest is an outer loop over independent trees: each member is
//! fitted on row and feature subsets drawn without replacement, and a
//! removal batch is marked once on the shared dataset before every tree
//! runs its own removal protocol. Trees whose row subset misses a removed
//! id simply ignore it.

use crate::remover::RemovalReport;
use crate::tree::{TreeError, UnlearningTree, UnlearningTreeConfig};
use lethe_core::Dataset;
use log::debug;
use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("Invalid number of trees")]
    InvalidTreeCount,
    #[error("Invalid subsample fraction")]
    InvalidSubsampleFraction,
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

/// Configuration for an unlearning forest.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlearningForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Configuration for individual trees
    pub tree_config: UnlearningTreeConfig,
    /// Fraction of live rows drawn without replacement for each tree
    pub sample_fraction: f64,
    /// Fraction of features drawn without replacement for each tree
    pub feature_fraction: f64,
    /// Random seed for subsampling and per-tree seeds
    pub random_seed: Option<u64>,
}

impl Default for UnlearningForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 10,
            tree_config: UnlearningTreeConfig::default(),
            sample_fraction: 1.0,
            feature_fraction: 1.0,
            random_seed: None,
        }
    }
}

/// Ensemble of independent unlearning trees over one shared dataset.
#[derive(Debug, Clone)]
pub struct UnlearningForest {
    config: UnlearningForestConfig,
    trees: Vec<UnlearningTree>,
}

impl UnlearningForest {
    /// Creates a new forest with the given configuration.
    pub fn new(config: UnlearningForestConfig) -> Result<Self, ForestError> {
        if config.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount);
        }
        for fraction in [config.sample_fraction, config.feature_fraction] {
            if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
                return Err(ForestError::InvalidSubsampleFraction);
            }
        }

        Ok(Self {
            config,
            trees: Vec::new(),
        })
    }

    /// Fits the forest to the live samples of the dataset.
    ///
    /// Per-tree seeds and subsets are derived sequentially from the
    /// forest RNG before any tree is built, so the result does not depend
    /// on parallel scheduling.
    pub fn fit(&mut self, data: &Dataset) -> Result<(), ForestError> {
        if data.n_valid() == 0 {
            return Err(TreeError::EmptyTrainingSet.into());
        }

        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let seeds: Vec<(u64, u64)> = (0..self.config.n_trees)
            .map(|_| (rng.gen(), rng.gen()))
            .collect();

        let config = self.config.clone();
        #[cfg(feature = "parallel")]
        let trees: Result<Vec<_>, TreeError> = seeds
            .par_iter()
            .map(|&(subset_seed, tree_seed)| build_member(data, &config, subset_seed, tree_seed))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let trees: Result<Vec<_>, TreeError> = seeds
            .iter()
            .map(|&(subset_seed, tree_seed)| build_member(data, &config, subset_seed, tree_seed))
            .collect();

        self.trees = trees?;
        debug!("fitted forest of {} trees", self.trees.len());
        Ok(())
    }

    /// Predicts the positive-class probability for each row, averaged
    /// over the member trees.
    pub fn predict_proba(&self, x: ArrayView2<u8>) -> Result<Array1<f64>, ForestError> {
        if self.trees.is_empty() {
            return Err(TreeError::NotFitted.into());
        }

        #[cfg(feature = "parallel")]
        let per_tree: Result<Vec<_>, TreeError> =
            self.trees.par_iter().map(|tree| tree.predict(x)).collect();
        #[cfg(not(feature = "parallel"))]
        let per_tree: Result<Vec<_>, TreeError> =
            self.trees.iter().map(|tree| tree.predict(x)).collect();

        let per_tree = per_tree?;
        let mut probabilities = Array1::<f64>::zeros(x.nrows());
        for prediction in &per_tree {
            probabilities += prediction;
        }
        probabilities /= self.trees.len() as f64;
        Ok(probabilities)
    }

    /// Predicts class labels by thresholding the averaged probability at
    /// 0.5.
    pub fn predict(&self, x: ArrayView2<u8>) -> Result<Array1<f64>, ForestError> {
        let probabilities = self.predict_proba(x)?;
        Ok(probabilities.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Removes a batch of training samples from the dataset and from
    /// every member tree. Returns the merged removal report.
    pub fn remove(
        &mut self,
        data: &mut Dataset,
        ids: &[usize],
    ) -> Result<RemovalReport, ForestError> {
        if self.trees.is_empty() {
            return Err(TreeError::NotFitted.into());
        }
        data.mark_removed(ids).map_err(TreeError::from)?;
        let data_ref: &Dataset = data;

        #[cfg(feature = "parallel")]
        let reports: Vec<RemovalReport> = self
            .trees
            .par_iter_mut()
            .map(|tree| tree.unlearn_marked(data_ref, ids))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let reports: Vec<RemovalReport> = self
            .trees
            .iter_mut()
            .map(|tree| tree.unlearn_marked(data_ref, ids))
            .collect();

        let mut merged = RemovalReport::default();
        for report in &reports {
            merged.merge(report);
        }
        Ok(merged)
    }

    /// Cumulative removal telemetry, merged over the member trees.
    pub fn removal_metrics(&self) -> RemovalReport {
        let mut merged = RemovalReport::default();
        for tree in &self.trees {
            merged.merge(tree.removal_metrics());
        }
        merged
    }

    pub fn clear_removal_metrics(&mut self) {
        for tree in &mut self.trees {
            tree.clear_removal_metrics();
        }
    }

    /// Returns the number of trees in the forest.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// The fitted member trees.
    pub fn trees(&self) -> &[UnlearningTree] {
        &self.trees
    }
}

fn build_member(
    data: &Dataset,
    config: &UnlearningForestConfig,
    subset_seed: u64,
    tree_seed: u64,
) -> Result<UnlearningTree, TreeError> {
    let mut subset_rng = StdRng::seed_from_u64(subset_seed);
    let ids = subsample(&data.valid_ids(), config.sample_fraction, &mut subset_rng);
    let all_features: Vec<usize> = (0..data.n_features()).collect();
    let features = subsample(&all_features, config.feature_fraction, &mut subset_rng);

    let tree_config = UnlearningTreeConfig {
        random_seed: Some(tree_seed),
        ..config.tree_config.clone()
    };
    let mut tree = UnlearningTree::new(tree_config)?;
    tree.fit_subset(data, ids, features)?;
    Ok(tree)
}

/// Draws `fraction` of `pool` without replacement, ascending.
fn subsample(pool: &[usize], fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    if fraction >= 1.0 {
        return pool.to_vec();
    }
    let amount = ((pool.len() as f64 * fraction).ceil() as usize).clamp(1, pool.len());
    let mut picked: Vec<usize> = index::sample(rng, pool.len(), amount)
        .iter()
        .map(|i| pool[i])
        .collect();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
#[path = "forest_test.rs"]
mod tests;
