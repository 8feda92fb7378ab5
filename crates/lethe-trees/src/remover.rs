//! Batch removal of training samples from a fitted tree.
//!
//! The descent walks the tree top-down along the paths the removed
//! samples took, updating each node's counts and sufficient statistics
//! before re-checking its split decision. A node whose stored draw still
//! selects the same feature keeps its subtree; the shallowest node whose
//! decision flips is rebuilt on its surviving samples, and the descent
//! never re-enters a rebuilt subtree.

use crate::splitter::{partition, replay_draw};
use crate::tree::{build_node, leaf_prediction, new_leaf, Node, UnlearningTree, UnlearningTreeConfig};
use lethe_core::Dataset;
use log::debug;
use rand::rngs::StdRng;
use std::mem;

/// Telemetry for removal calls.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct RemovalReport {
    /// Number of subtrees rebuilt because their split was invalidated
    pub n_retrains: usize,
    /// Depths of the rebuilt subtrees
    pub retrain_depths: Vec<usize>,
    /// Number of leaves whose prediction was recomputed
    pub n_leaf_updates: usize,
    /// Total samples fed into subtree rebuilds
    pub n_samples_retrained: usize,
}

impl RemovalReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: &RemovalReport) {
        self.n_retrains += other.n_retrains;
        self.retrain_depths.extend_from_slice(&other.retrain_depths);
        self.n_leaf_updates += other.n_leaf_updates;
        self.n_samples_retrained += other.n_samples_retrained;
    }
}

/// Outcome of visiting an internal node, decided after its counts have
/// been updated. Descent and leaf updates are handled in place.
enum Action {
    Collapse {
        depth: usize,
        ids: Vec<usize>,
    },
    Retrain {
        depth: usize,
        ids: Vec<usize>,
        features: Vec<usize>,
    },
}

/// Applies an already-marked removal batch to the tree.
///
/// The ids must have been validated and marked in the dataset by the
/// caller; ids that never routed through this tree are ignored.
pub(crate) fn unlearn(tree: &mut UnlearningTree, data: &Dataset, ids: &[usize]) -> RemovalReport {
    let mut report = RemovalReport::default();
    let Some(mut root) = tree.root.take() else {
        return report;
    };

    let mut removed = vec![false; data.n_samples()];
    for &id in ids {
        removed[id] = true;
    }
    let r_root: Vec<usize> = root
        .ids()
        .iter()
        .copied()
        .filter(|&id| removed[id])
        .collect();
    if !r_root.is_empty() {
        remove_from_node(
            &mut root,
            data,
            &r_root,
            &removed,
            &tree.config,
            &mut tree.rng,
            &mut report,
        );
    }

    tree.root = Some(root);
    report
}

/// Removes `r_ids` (a subset of the node's sample ids) from the subtree
/// rooted at `node`. Counter updates precede the validity check, which
/// precedes recursion; left child before right.
fn remove_from_node(
    node: &mut Node,
    data: &Dataset,
    r_ids: &[usize],
    removed: &[bool],
    config: &UnlearningTreeConfig,
    rng: &mut StdRng,
    report: &mut RemovalReport,
) {
    let action = match node {
        Node::Leaf {
            ids,
            n_samples,
            n_positive,
            prediction,
            ..
        } => {
            let removed_positive = r_ids.iter().filter(|&&id| data.label(id) == 1).count();
            *n_samples -= r_ids.len();
            *n_positive -= removed_positive;
            ids.retain(|&id| !removed[id]);
            *prediction = leaf_prediction(*n_samples, *n_positive);
            report.n_leaf_updates += 1;
            return;
        }
        Node::Internal {
            depth,
            feature,
            draw,
            stats,
            ids,
            n_samples,
            n_positive,
            left,
            right,
        } => {
            for &id in r_ids {
                stats.remove_sample(data, id);
            }
            let removed_positive = r_ids.iter().filter(|&&id| data.label(id) == 1).count();
            *n_samples -= r_ids.len();
            *n_positive -= removed_positive;
            ids.retain(|&id| !removed[id]);

            let structural_leaf = *n_samples < config.min_samples_split
                || *n_positive == 0
                || *n_positive == *n_samples;
            if structural_leaf {
                Action::Collapse {
                    depth: *depth,
                    ids: mem::take(ids),
                }
            } else {
                match replay_draw(stats, config.min_samples_leaf, config.lambda, *draw) {
                    None => Action::Collapse {
                        depth: *depth,
                        ids: mem::take(ids),
                    },
                    Some(choice) if choice == *feature => {
                        // Still valid: push the removal into the children,
                        // skipping a child none of the batch routed through.
                        let (left_r, right_r) = partition(data, r_ids, *feature);
                        if !left_r.is_empty() {
                            remove_from_node(left, data, &left_r, removed, config, rng, report);
                        }
                        if !right_r.is_empty() {
                            remove_from_node(right, data, &right_r, removed, config, rng, report);
                        }
                        return;
                    }
                    Some(_) => Action::Retrain {
                        depth: *depth,
                        ids: mem::take(ids),
                        features: stats.features().to_vec(),
                    },
                }
            }
        }
    };

    match action {
        Action::Collapse { depth, ids } => {
            let n_positive = ids.iter().filter(|&&id| data.label(id) == 1).count();
            debug!(
                "collapsing subtree at depth {depth} into a leaf over {} samples",
                ids.len()
            );
            *node = new_leaf(depth, ids, n_positive);
        }
        Action::Retrain { depth, ids, features } => {
            debug!("retraining subtree at depth {depth} on {} samples", ids.len());
            report.n_retrains += 1;
            report.retrain_depths.push(depth);
            report.n_samples_retrained += ids.len();
            *node = build_node(data, ids, features, depth, config, rng);
        }
    }
}

#[cfg(test)]
#[path = "remover_test.rs"]
mod tests;
