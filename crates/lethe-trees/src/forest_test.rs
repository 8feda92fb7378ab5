use super::*;
use ndarray::{arr1, arr2, Array2};
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

fn small_forest_config() -> UnlearningForestConfig {
    UnlearningForestConfig {
        n_trees: 5,
        tree_config: UnlearningTreeConfig {
            lambda: 1e-6,
            ..Default::default()
        },
        sample_fraction: 1.0,
        feature_fraction: 1.0,
        random_seed: Some(42),
    }
}

#[test]
fn test_forest_new_invalid_config() {
    let config = UnlearningForestConfig {
        n_trees: 0,
        ..small_forest_config()
    };
    assert!(matches!(
        UnlearningForest::new(config),
        Err(ForestError::InvalidTreeCount)
    ));

    for fraction in [0.0, -0.5, 1.5, f64::NAN] {
        let config = UnlearningForestConfig {
            sample_fraction: fraction,
            ..small_forest_config()
        };
        assert!(matches!(
            UnlearningForest::new(config),
            Err(ForestError::InvalidSubsampleFraction)
        ));
    }
}

#[test]
fn test_forest_predict_without_fit() {
    let forest = UnlearningForest::new(small_forest_config()).unwrap();
    let x = arr2(&[[0u8, 1]]);
    assert!(matches!(
        forest.predict_proba(x.view()),
        Err(ForestError::Tree(TreeError::NotFitted))
    ));
}

#[test]
fn test_forest_fit_and_predict() {
    let data = perfect_split_dataset();
    let mut forest = UnlearningForest::new(small_forest_config()).unwrap();
    forest.fit(&data).unwrap();
    assert_eq!(forest.n_trees(), 5);

    // Every member sees the full data at near-argmin lambda, so the
    // averaged probabilities reproduce the labels exactly.
    let probabilities = forest.predict_proba(data.x()).unwrap();
    assert_eq!(probabilities, arr1(&[0.0, 0.0, 1.0, 1.0]));
    let labels = forest.predict(data.x()).unwrap();
    assert_eq!(labels, arr1(&[0.0, 0.0, 1.0, 1.0]));
}

#[test]
fn test_forest_fit_determinism() {
    let data = random_dataset(50, 4, 13);
    let config = UnlearningForestConfig {
        n_trees: 4,
        tree_config: UnlearningTreeConfig {
            lambda: 0.5,
            ..Default::default()
        },
        sample_fraction: 0.8,
        feature_fraction: 0.75,
        random_seed: Some(99),
    };

    let mut first = UnlearningForest::new(config.clone()).unwrap();
    first.fit(&data).unwrap();
    let mut second = UnlearningForest::new(config).unwrap();
    second.fit(&data).unwrap();

    for (a, b) in first.trees().iter().zip(second.trees()) {
        assert_eq!(a.root, b.root);
    }
}

#[test]
fn test_forest_remove() {
    let mut data = perfect_split_dataset();
    let mut forest = UnlearningForest::new(small_forest_config()).unwrap();
    forest.fit(&data).unwrap();

    let report = forest.remove(&mut data, &[3]).unwrap();
    // All five members hold every row and keep their split, so each
    // updates one leaf.
    assert_eq!(report.n_retrains, 0);
    assert_eq!(report.n_leaf_updates, 5);
    assert_eq!(data.n_valid(), 3);
    assert_eq!(forest.removal_metrics(), report);

    let probabilities = forest.predict_proba(data.x()).unwrap();
    assert_eq!(probabilities[0], 0.0);
    assert_eq!(probabilities[2], 1.0);

    forest.clear_removal_metrics();
    assert_eq!(forest.removal_metrics(), RemovalReport::default());
}

#[test]
fn test_forest_remove_with_row_subsets() {
    let mut data = random_dataset(60, 5, 21);
    let config = UnlearningForestConfig {
        n_trees: 6,
        tree_config: UnlearningTreeConfig {
            lambda: 0.5,
            ..Default::default()
        },
        sample_fraction: 0.5,
        feature_fraction: 0.8,
        random_seed: Some(7),
    };
    let mut forest = UnlearningForest::new(config).unwrap();
    forest.fit(&data).unwrap();

    // Trees whose subset misses a removed id must simply ignore it.
    forest.remove(&mut data, &[0, 17, 33]).unwrap();
    assert_eq!(data.n_valid(), 57);

    let probabilities = forest.predict_proba(data.x()).unwrap();
    for &p in probabilities.iter() {
        assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn test_forest_remove_already_removed() {
    let mut data = perfect_split_dataset();
    let mut forest = UnlearningForest::new(small_forest_config()).unwrap();
    forest.fit(&data).unwrap();

    forest.remove(&mut data, &[2]).unwrap();
    let err = forest.remove(&mut data, &[2]).unwrap_err();
    assert!(matches!(
        err,
        ForestError::Tree(TreeError::Data(lethe_core::DataError::AlreadyRemoved(2)))
    ));
    assert_eq!(data.n_valid(), 3);
}

#[test]
fn test_subsample() {
    let pool: Vec<usize> = (10..20).collect();
    let mut rng = StdRng::seed_from_u64(3);

    assert_eq!(subsample(&pool, 1.0, &mut rng), pool);

    let half = subsample(&pool, 0.5, &mut rng);
    assert_eq!(half.len(), 5);
    assert!(half.windows(2).all(|w| w[0] < w[1]));
    assert!(half.iter().all(|id| pool.contains(id)));
}
