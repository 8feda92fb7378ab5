/*!
Randomized decision trees with support for removing training samples
("machine unlearning") without rebuilding the whole model.

Each internal node stores the per-feature sufficient statistics and the
uniform draw that selected its split from a Gibbs distribution over noisy
Gini scores. Removing samples updates those statistics in place and replays
the stored draw: a node whose choice would not change keeps its subtree,
and only the shallowest invalidated node along each path is rebuilt.

# Components

- [`UnlearningTree`](tree::UnlearningTree): a single tree over binary
  features, with `fit`, `predict` and `remove`.
- [`UnlearningForest`](forest::UnlearningForest): a bagged ensemble of
  independent trees sharing one [`Dataset`](lethe_core::Dataset).
- [`splitter`]: noisy-Gini split selection over per-feature counts.
- [`remover`]: the removal descent and its [`RemovalReport`] telemetry.

# Usage Example

```rust,no_run
use lethe_core::Dataset;
use lethe_trees::{UnlearningTree, UnlearningTreeConfig};
use ndarray::{arr1, arr2};

let x = arr2(&[[0u8, 0], [0, 1], [1, 0], [1, 1]]);
let y = arr1(&[0u8, 0, 1, 1]);
let mut data = Dataset::new(x, y).expect("invalid dataset");

let mut tree = UnlearningTree::new(UnlearningTreeConfig::default()).expect("invalid config");
tree.fit(&data).expect("fit failed");

// Forget sample 3 without retraining the whole tree.
let report = tree.remove(&mut data, &[3]).expect("removal failed");
println!("retrained {} subtrees", report.n_retrains);
```

# Features
- `parallel`: enable per-tree parallelism in the forest using rayon
- `serde-support`: enable serialization of configuration and report types
*/

pub mod forest;
pub mod remover;
pub mod splitter;
pub mod tree;

pub use forest::{ForestError, UnlearningForest, UnlearningForestConfig};
pub use remover::RemovalReport;
pub use tree::{TreeError, UnlearningTree, UnlearningTreeConfig};
