extern crate randcut;

use randcut::datagen::gaussian_mixture;
use randcut::{ForestBuilder, ForestError, RandomCutForest};

fn build(compact: bool, parallel: bool) -> RandomCutForest<f64> {
    ForestBuilder::new(3)
        .number_of_trees(10)
        .sample_size(64)
        .time_decay(0.001)
        .compact_enabled(compact)
        .parallel_execution_enabled(parallel)
        .thread_pool_size(2)
        .random_seed(99)
        .build_double()
        .unwrap()
}

parameterized_test::create! { forest_stays_consistent_under_churn, (compact, parallel), {
    let mut forest = build(compact, parallel);
    let data = gaussian_mixture(
        2000,
        &[vec![0.0, 0.0, 0.0], vec![4.0, 4.0, 4.0]],
        &[vec![1.0, 1.0, 1.0], vec![0.5, 0.5, 0.5]],
        &[0.7, 0.3],
        17,
    );
    for (i, point) in data.data.iter().enumerate() {
        forest.update(point).unwrap();
        if i % 250 == 249 {
            forest.audit().unwrap();
        }
    }
    forest.audit().unwrap();
    assert!(forest.samplers_full());
    assert_eq!(forest.total_updates(), 2000);
    assert!(forest.is_output_ready());
    // a well-trained forest scores its own data below an outlier
    let inlier = forest.anomaly_score(&[0.0, 0.0, 0.0]).unwrap();
    let outlier = forest.anomaly_score(&[40.0, -40.0, 40.0]).unwrap();
    assert!(outlier > inlier);
}}

forest_stays_consistent_under_churn! {
    pointer_sequential: (false, false),
    pointer_parallel: (false, true),
    compact_sequential: (true, false),
    compact_parallel: (true, true),
}

parameterized_test::create! { warm_up_returns_neutral_results, (compact, parallel), {
    let mut forest = build(compact, parallel);
    for point in gaussian_mixture(5, &[vec![0.0; 3]], &[vec![1.0; 3]], &[1.0], 3).data {
        forest.update(&point).unwrap();
    }
    assert!(!forest.is_output_ready());
    assert_eq!(forest.anomaly_score(&[9.0, 9.0, 9.0]).unwrap(), 0.0);
    assert_eq!(forest.approximate_anomaly_score(&[9.0, 9.0, 9.0]).unwrap(), 0.0);
    assert_eq!(forest.anomaly_attribution(&[9.0, 9.0, 9.0]).unwrap().total(), 0.0);
    assert_eq!(
        forest.impute_missing_values(&[1.0, 2.0, 3.0], &[2]).unwrap(),
        vec![1.0, 2.0, 3.0]
    );
    assert!(forest
        .near_neighbors_in_sample(&[0.0, 0.0, 0.0], Some(1.0))
        .unwrap()
        .is_empty());
}}

warm_up_returns_neutral_results! {
    pointer_sequential: (false, false),
    compact_parallel: (true, true),
}

#[test]
fn bad_arguments_fail_fast() {
    let mut forest = build(false, false);
    assert_eq!(
        forest.update(&[1.0, 2.0]),
        Err(ForestError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    );
    for point in gaussian_mixture(100, &[vec![0.0; 3]], &[vec![1.0; 3]], &[1.0], 7).data {
        forest.update(&point).unwrap();
    }
    assert!(matches!(
        forest.anomaly_score(&[1.0]),
        Err(ForestError::DimensionMismatch { .. })
    ));
    assert!(forest
        .impute_missing_values(&[0.0, 0.0, 0.0], &[7])
        .is_err());
    assert!(forest
        .impute_missing_values(&[0.0, 0.0, 0.0], &[1, 1])
        .is_err());
    assert!(forest
        .near_neighbors_in_sample(&[0.0, 0.0, 0.0], Some(-1.0))
        .is_err());
}

#[test]
fn partial_box_cache_matches_full_cache_semantics() {
    // uncached nodes recompute boxes by descending; results must agree
    let mut cached = ForestBuilder::new(3)
        .number_of_trees(10)
        .sample_size(64)
        .time_decay(0.001)
        .compact_enabled(true)
        .bounding_box_cache_fraction(1.0)
        .random_seed(55)
        .build_double()
        .unwrap();
    let mut sparse = ForestBuilder::new(3)
        .number_of_trees(10)
        .sample_size(64)
        .time_decay(0.001)
        .compact_enabled(true)
        .bounding_box_cache_fraction(0.2)
        .random_seed(55)
        .build_double()
        .unwrap();
    let data = gaussian_mixture(800, &[vec![0.0; 3]], &[vec![1.0; 3]], &[1.0], 9);
    for point in &data.data {
        cached.update(point).unwrap();
        sparse.update(point).unwrap();
    }
    cached.audit().unwrap();
    sparse.audit().unwrap();
    // identical seeds and identical structure: scores agree exactly
    for query in gaussian_mixture(20, &[vec![0.0; 3]], &[vec![2.0; 3]], &[1.0], 10).data {
        let a = cached.anomaly_score(&query).unwrap();
        let b = sparse.anomaly_score(&query).unwrap();
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
}

#[test]
fn single_precision_forest_runs_behind_the_tag() {
    use randcut::{AnyForest, Precision};
    let mut forest = ForestBuilder::new(2)
        .number_of_trees(15)
        .sample_size(128)
        .compact_enabled(true)
        .precision(Precision::Single)
        .time_decay(0.0005)
        .random_seed(71)
        .build()
        .unwrap();
    assert!(matches!(forest, AnyForest::Single(_)));
    let data = gaussian_mixture(500, &[vec![0.0, 0.0]], &[vec![1.0, 1.0]], &[1.0], 13);
    for point in &data.data {
        forest.update(point).unwrap();
    }
    assert!(forest.is_output_ready());
    let outlier = forest.anomaly_score(&[20.0, 20.0]).unwrap();
    let inlier = forest.anomaly_score(&[0.0, 0.0]).unwrap();
    assert!(outlier > 1.0 && inlier < outlier);
    let attribution = forest.anomaly_attribution(&[20.0, 20.0]).unwrap();
    assert!((attribution.total() - outlier).abs() < 1e-4);
}

#[test]
fn sampler_saturation_is_stable() {
    // capacity holds and every post-saturation admission evicts exactly once,
    // observable through the refcount audit staying balanced
    let mut forest = ForestBuilder::new(1)
        .number_of_trees(5)
        .sample_size(256)
        .time_decay(0.01)
        .random_seed(23)
        .build_double()
        .unwrap();
    for i in 0..10_000u64 {
        forest.update(&[(i % 97) as f64]).unwrap();
        if i == 256 {
            assert!(forest.samplers_full());
        }
        if i % 1000 == 999 {
            forest.audit().unwrap();
            assert!(forest.samplers_full());
        }
    }
    forest.audit().unwrap();
}
