//! Randomized split selection over per-feature sufficient statistics.
//!
//! The splitter scores every candidate feature by the weighted Gini
//! impurity of the partition it induces, then samples the split feature
//! from a Gibbs distribution `exp(-score / lambda)` over the eligible
//! candidates. The uniform draw used for the selection is returned to the
//! caller so the decision can later be replayed against updated counts.

use lethe_core::Dataset;
use rand::Rng;

/// Per-feature counts on each side of a candidate split.
///
/// `features` lists the candidate feature set of a node; the four count
/// vectors are parallel to it. Left is the value-0 side. Together these
/// are sufficient to recompute every candidate's score without touching
/// the samples again.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStats {
    features: Vec<usize>,
    left_count: Vec<usize>,
    left_pos: Vec<usize>,
    right_count: Vec<usize>,
    right_pos: Vec<usize>,
}

impl SplitStats {
    fn zeroed(features: &[usize]) -> Self {
        let k = features.len();
        Self {
            features: features.to_vec(),
            left_count: vec![0; k],
            left_pos: vec![0; k],
            right_count: vec![0; k],
            right_pos: vec![0; k],
        }
    }

    /// Scans `ids` once per candidate feature and accumulates the counts.
    pub fn compute(data: &Dataset, ids: &[usize], features: &[usize]) -> Self {
        let mut stats = Self::zeroed(features);
        for &id in ids {
            stats.update_sample(data, id, 1);
        }
        stats
    }

    /// Removes one sample's contribution from every candidate's counts.
    pub fn remove_sample(&mut self, data: &Dataset, id: usize) {
        self.update_sample(data, id, -1);
    }

    fn update_sample(&mut self, data: &Dataset, id: usize, delta: isize) {
        let positive = data.label(id) == 1;
        for (slot, &feature) in self.features.iter().enumerate() {
            if data.feature(id, feature) == 0 {
                apply(&mut self.left_count[slot], delta);
                if positive {
                    apply(&mut self.left_pos[slot], delta);
                }
            } else {
                apply(&mut self.right_count[slot], delta);
                if positive {
                    apply(&mut self.right_pos[slot], delta);
                }
            }
        }
    }

    /// The candidate feature set, in selection order.
    pub fn features(&self) -> &[usize] {
        &self.features
    }

    pub fn n_candidates(&self) -> usize {
        self.features.len()
    }

    pub fn side_counts(&self, slot: usize) -> (usize, usize, usize, usize) {
        (
            self.left_count[slot],
            self.left_pos[slot],
            self.right_count[slot],
            self.right_pos[slot],
        )
    }

    /// Weighted Gini score of each candidate. Lower is better.
    pub fn scores(&self) -> Vec<f64> {
        (0..self.features.len())
            .map(|slot| {
                weighted_score(
                    self.left_count[slot],
                    self.left_pos[slot],
                    self.right_count[slot],
                    self.right_pos[slot],
                )
            })
            .collect()
    }

    /// Whether each candidate leaves at least `min_samples_leaf` samples
    /// on both sides.
    pub fn eligible(&self, min_samples_leaf: usize) -> Vec<bool> {
        (0..self.features.len())
            .map(|slot| {
                self.left_count[slot] >= min_samples_leaf
                    && self.right_count[slot] >= min_samples_leaf
            })
            .collect()
    }
}

fn apply(count: &mut usize, delta: isize) {
    if delta >= 0 {
        *count += delta as usize;
    } else {
        *count -= (-delta) as usize;
    }
}

/// Gini impurity of a group with `count` samples, `positive` of them
/// labeled 1. An empty group has impurity 0.
pub fn gini(count: usize, positive: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let p = positive as f64 / count as f64;
    let q = 1.0 - p;
    1.0 - p * p - q * q
}

/// Weighted Gini score of a candidate split.
pub fn weighted_score(
    left_count: usize,
    left_pos: usize,
    right_count: usize,
    right_pos: usize,
) -> f64 {
    let total = left_count + right_count;
    if total == 0 {
        return 0.0;
    }
    let wl = left_count as f64 / total as f64;
    let wr = right_count as f64 / total as f64;
    wl * gini(left_count, left_pos) + wr * gini(right_count, right_pos)
}

/// Gibbs weights `exp(-score / lambda)` over the eligible candidates.
///
/// The maximum exponent over the eligible set is subtracted before
/// exponentiation. Ineligible slots get weight 0.
pub fn gibbs_weights(scores: &[f64], eligible: &[bool], lambda: f64) -> Vec<f64> {
    let max_exponent = scores
        .iter()
        .zip(eligible)
        .filter(|&(_, &e)| e)
        .map(|(&score, _)| -score / lambda)
        .fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .zip(eligible)
        .map(|(&score, &e)| {
            if e {
                (-score / lambda - max_exponent).exp()
            } else {
                0.0
            }
        })
        .collect()
}

/// Maps a uniform draw in [0, 1) to a slot by inverse CDF over `weights`.
///
/// Slots are walked in order, so the mapping is deterministic for a given
/// weight vector. Returns `None` when every weight is zero.
pub fn pick_slot(weights: &[f64], draw: f64) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let target = draw * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (slot, &weight) in weights.iter().enumerate() {
        if weight > 0.0 {
            cumulative += weight;
            last = Some(slot);
            if target < cumulative {
                return Some(slot);
            }
        }
    }
    // Rounding can leave target a hair past the final cumulative sum.
    last
}

/// A committed split decision.
#[derive(Debug, Clone)]
pub struct Split {
    /// The selected feature, as a column index into the dataset.
    pub feature: usize,
    /// The uniform draw that selected it.
    pub draw: f64,
    pub left_ids: Vec<usize>,
    pub right_ids: Vec<usize>,
    pub stats: SplitStats,
}

/// Chooses a split feature for the node holding `ids`.
///
/// Returns `None` when no candidate leaves at least `min_samples_leaf`
/// samples on both sides; the caller turns the node into a leaf.
pub fn choose_split<R: Rng>(
    data: &Dataset,
    ids: &[usize],
    features: &[usize],
    min_samples_leaf: usize,
    lambda: f64,
    rng: &mut R,
) -> Option<Split> {
    let stats = SplitStats::compute(data, ids, features);
    let eligible = stats.eligible(min_samples_leaf);
    if !eligible.iter().any(|&e| e) {
        return None;
    }

    let weights = gibbs_weights(&stats.scores(), &eligible, lambda);
    let draw: f64 = rng.gen();
    let slot = pick_slot(&weights, draw)?;
    let feature = stats.features[slot];
    let (left_ids, right_ids) = partition(data, ids, feature);

    Some(Split {
        feature,
        draw,
        left_ids,
        right_ids,
        stats,
    })
}

/// Replays a stored draw against (updated) statistics.
///
/// Returns the feature the draw selects under the recomputed weights, or
/// `None` when no candidate is eligible any more. A node's split is still
/// valid iff the replay returns its chosen feature.
pub fn replay_draw(
    stats: &SplitStats,
    min_samples_leaf: usize,
    lambda: f64,
    draw: f64,
) -> Option<usize> {
    let eligible = stats.eligible(min_samples_leaf);
    if !eligible.iter().any(|&e| e) {
        return None;
    }
    let weights = gibbs_weights(&stats.scores(), &eligible, lambda);
    pick_slot(&weights, draw).map(|slot| stats.features[slot])
}

/// Splits `ids` by the value of `feature`, preserving order. Value 0 goes
/// left.
pub fn partition(data: &Dataset, ids: &[usize], feature: usize) -> (Vec<usize>, Vec<usize>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for &id in ids {
        if data.feature(id, feature) == 0 {
            left.push(id);
        } else {
            right.push(id);
        }
    }
    (left, right)
}

#[cfg(test)]
#[path = "splitter_test.rs"]
mod tests;
