extern crate randcut;

use randcut::datagen::gaussian_mixture;
use randcut::ForestBuilder;

/// Eight copies of one point collapse into a single leaf whose damped seen
/// score is exactly one half after normalization.
#[test]
fn duplicate_coalescing_caps_the_score() {
    for compact in [false, true] {
        let mut forest = ForestBuilder::new(2)
            .number_of_trees(1)
            .sample_size(8)
            .time_decay(0.0)
            .compact_enabled(compact)
            .random_seed(7)
            .build_double()
            .unwrap();
        for _ in 0..8 {
            forest.update(&[0.0, 0.0]).unwrap();
        }
        let score = forest.anomaly_score(&[0.0, 0.0]).unwrap();
        assert!(score > 0.45 && score <= 0.5 + 1e-9, "score was {}", score);
    }
}

fn trained_gaussian_forest(compact: bool) -> randcut::RandomCutForest<f64> {
    let mut forest = ForestBuilder::new(4)
        .number_of_trees(50)
        .sample_size(256)
        .time_decay(1e-5)
        .compact_enabled(compact)
        .random_seed(31)
        .build_double()
        .unwrap();
    let data = gaussian_mixture(512, &[vec![0.0; 4]], &[vec![1.0; 4]], &[1.0], 12);
    for point in &data.data {
        forest.update(point).unwrap();
    }
    forest
}

#[test]
fn isolated_point_scores_as_an_anomaly() {
    for compact in [false, true] {
        let forest = trained_gaussian_forest(compact);
        let outlier = forest.anomaly_score(&[10.0, 10.0, 10.0, 10.0]).unwrap();
        let inlier = forest.anomaly_score(&[0.1, -0.2, 0.0, 0.1]).unwrap();
        assert!(outlier > 1.0, "outlier scored {}", outlier);
        assert!(inlier < 1.0, "inlier scored {}", inlier);
    }
}

#[test]
fn attribution_sums_to_the_score() {
    let forest = trained_gaussian_forest(false);
    let queries = gaussian_mixture(100, &[vec![0.0; 4]], &[vec![2.0; 4]], &[1.0], 77);
    for query in &queries.data {
        let score = forest.anomaly_score(query).unwrap();
        let attribution = forest.anomaly_attribution(query).unwrap();
        assert!(
            (attribution.total() - score).abs() < 1e-6,
            "attribution total {} vs score {}",
            attribution.total(),
            score
        );
    }
}

#[test]
fn attribution_points_at_the_deviating_dimension() {
    let forest = trained_gaussian_forest(false);
    let attribution = forest.anomaly_attribution(&[0.0, 12.0, 0.0, 0.0]).unwrap();
    let on_axis = attribution.high[1];
    let elsewhere = attribution.total() - on_axis;
    assert!(on_axis > elsewhere, "high[1]={} rest={}", on_axis, elsewhere);
    // overshoot, not undershoot
    assert!(attribution.high[1] > attribution.low[1]);
}

/// The converging traversal stays within relative precision of the full
/// ensemble average.
#[test]
fn approximate_score_tracks_the_full_score() {
    let forest = trained_gaussian_forest(false);
    let queries = gaussian_mixture(20, &[vec![0.0; 4]], &[vec![1.5; 4]], &[1.0], 41);
    for query in &queries.data {
        let full = forest.anomaly_score(query).unwrap();
        let approximate = forest.approximate_anomaly_score(query).unwrap();
        assert!(
            (approximate - full).abs() <= 0.2 * full.max(0.1),
            "approximate {} vs full {}",
            approximate,
            full
        );
    }
    let attribution = forest
        .approximate_anomaly_attribution(&[8.0, 8.0, 8.0, 8.0])
        .unwrap();
    assert!(attribution.total() > 1.0);
}

#[test]
fn displacement_score_separates_the_same_outlier() {
    let forest = trained_gaussian_forest(false);
    let outlier = forest
        .displacement_score(&[10.0, 10.0, 10.0, 10.0])
        .unwrap();
    let inlier = forest.displacement_score(&[0.0, 0.0, 0.0, 0.0]).unwrap();
    assert!(outlier > inlier);
}

#[test]
fn density_is_higher_where_the_data_lives() {
    let forest = trained_gaussian_forest(false);
    let near = forest.simple_density(&[0.1, 0.0, -0.1, 0.0]).unwrap();
    let far = forest.simple_density(&[25.0, 25.0, 25.0, 25.0]).unwrap();
    assert!(near.value > 0.0);
    assert!(near.value > far.value);
    assert_eq!(near.directional.dimensions(), 4);
}
