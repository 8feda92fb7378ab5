use super::*;
use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array2};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

fn perfect_split_dataset() -> Dataset {
    let x = arr2(&[[0u8, 0], [0, 1], [1, 0], [1, 1]]);
    let y = arr1(&[0u8, 0, 1, 1]);
    Dataset::new(x, y).unwrap()
}

fn random_dataset(n: usize, d: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, d), |_| rng.gen_range(0..2u8));
    let y = (0..n).map(|_| rng.gen_range(0..2u8)).collect();
    Dataset::new(x, y).unwrap()
}

fn near_argmin_config() -> UnlearningTreeConfig {
    UnlearningTreeConfig {
        max_depth: Some(2),
        min_samples_split: 2,
        min_samples_leaf: 1,
        lambda: 1e-6,
        random_seed: Some(42),
    }
}

#[test]
fn test_tree_new() {
    let tree = UnlearningTree::new(UnlearningTreeConfig::default()).unwrap();
    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.node_count(), 0);
    assert_eq!(tree.leaf_count(), 0);
    assert_eq!(*tree.removal_metrics(), RemovalReport::default());
}

#[test]
fn test_tree_new_invalid_config() {
    let config = UnlearningTreeConfig {
        min_samples_split: 1,
        ..Default::default()
    };
    assert!(matches!(
        UnlearningTree::new(config),
        Err(TreeError::InvalidPruningParams)
    ));

    let config = UnlearningTreeConfig {
        min_samples_leaf: 0,
        ..Default::default()
    };
    assert!(matches!(
        UnlearningTree::new(config),
        Err(TreeError::InvalidPruningParams)
    ));

    for lambda in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let config = UnlearningTreeConfig {
            lambda,
            ..Default::default()
        };
        assert!(matches!(
            UnlearningTree::new(config),
            Err(TreeError::InvalidLambda)
        ));
    }
}

#[test]
fn test_fit_after_all_samples_removed() {
    let mut data = perfect_split_dataset();
    data.mark_removed(&[0, 1, 2, 3]).unwrap();
    let mut tree = UnlearningTree::new(UnlearningTreeConfig::default()).unwrap();
    assert!(matches!(
        tree.fit(&data),
        Err(TreeError::EmptyTrainingSet)
    ));
}

#[test]
fn test_predict_without_fit() {
    let tree = UnlearningTree::new(UnlearningTreeConfig::default()).unwrap();
    let x = arr2(&[[0u8, 1]]);
    assert!(matches!(tree.predict(x.view()), Err(TreeError::NotFitted)));
}

#[test]
fn test_predict_dimension_mismatch() {
    let data = perfect_split_dataset();
    let mut tree = UnlearningTree::new(near_argmin_config()).unwrap();
    tree.fit(&data).unwrap();

    let x = arr2(&[[0u8], [1]]);
    assert!(matches!(
        tree.predict(x.view()),
        Err(TreeError::DimensionMismatch)
    ));
}

#[test]
fn test_perfect_split() {
    let data = perfect_split_dataset();
    let mut tree = UnlearningTree::new(near_argmin_config()).unwrap();
    tree.fit(&data).unwrap();

    // Feature 0 separates the labels perfectly, so at near-argmin lambda
    // the root must pick it and both children are pure leaves.
    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.node_count(), 3);
    assert_eq!(tree.leaf_count(), 2);

    let predictions = tree.predict(data.x()).unwrap();
    assert_eq!(predictions, arr1(&[0.0, 0.0, 1.0, 1.0]));

    checks::check_invariants(&tree, &data);
}

#[test]
fn test_build_determinism() {
    let data = random_dataset(60, 5, 3);
    let config = UnlearningTreeConfig {
        lambda: 0.5,
        random_seed: Some(11),
        ..Default::default()
    };

    let mut first = UnlearningTree::new(config.clone()).unwrap();
    first.fit(&data).unwrap();
    let mut second = UnlearningTree::new(config).unwrap();
    second.fit(&data).unwrap();

    assert_eq!(first.root, second.root);
}

#[test]
fn test_depth_cap() {
    let data = perfect_split_dataset();
    let config = UnlearningTreeConfig {
        max_depth: Some(0),
        ..near_argmin_config()
    };
    let mut tree = UnlearningTree::new(config).unwrap();
    tree.fit(&data).unwrap();

    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.leaf_count(), 1);
    let predictions = tree.predict(data.x()).unwrap();
    assert_relative_eq!(predictions[0], 0.5);
}

#[test]
fn test_pure_labels_give_single_leaf() {
    let x = arr2(&[[0u8, 1], [1, 0], [1, 1]]);
    let y = arr1(&[0u8, 0, 0]);
    let data = Dataset::new(x, y).unwrap();
    let mut tree = UnlearningTree::new(near_argmin_config()).unwrap();
    tree.fit(&data).unwrap();

    assert_eq!(tree.node_count(), 1);
    let predictions = tree.predict(data.x()).unwrap();
    assert_eq!(predictions, arr1(&[0.0, 0.0, 0.0]));
}

#[test]
fn test_min_samples_split_stops_growth() {
    let data = perfect_split_dataset();
    let config = UnlearningTreeConfig {
        min_samples_split: 5,
        ..near_argmin_config()
    };
    let mut tree = UnlearningTree::new(config).unwrap();
    tree.fit(&data).unwrap();
    assert_eq!(tree.node_count(), 1);
}

#[test]
fn test_feature_set_shrinks_to_exhaustion() {
    // One feature: the root consumes it and both children must stop.
    let x = arr2(&[[0u8], [0], [1], [1]]);
    let y = arr1(&[0u8, 1, 1, 1]);
    let data = Dataset::new(x, y).unwrap();
    let mut tree = UnlearningTree::new(near_argmin_config()).unwrap();
    tree.fit(&data).unwrap();

    assert!(tree.depth() <= 1);
    checks::check_invariants(&tree, &data);
}

#[test]
fn test_invariants_on_noisy_build() {
    let data = random_dataset(80, 6, 17);
    let config = UnlearningTreeConfig {
        max_depth: Some(4),
        min_samples_split: 4,
        min_samples_leaf: 2,
        lambda: 0.5,
        random_seed: Some(5),
    };
    let mut tree = UnlearningTree::new(config).unwrap();
    tree.fit(&data).unwrap();

    assert!(tree.depth() <= 4);
    checks::check_invariants(&tree, &data);
}

#[test]
fn test_refit_resets_metrics() {
    let mut data = perfect_split_dataset();
    let mut tree = UnlearningTree::new(near_argmin_config()).unwrap();
    tree.fit(&data).unwrap();
    tree.remove(&mut data, &[3]).unwrap();
    assert_eq!(tree.removal_metrics().n_leaf_updates, 1);

    tree.fit(&data).unwrap();
    assert_eq!(*tree.removal_metrics(), RemovalReport::default());
}
