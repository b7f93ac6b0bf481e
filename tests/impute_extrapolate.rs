extern crate randcut;

use std::f64::consts::PI;

use randcut::ForestBuilder;

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().sum::<f64>() / n;
    let mean_b: f64 = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a) * (x - mean_a);
        var_b += (y - mean_b) * (y - mean_b);
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Training on one period of `(t, sin t)` recovers the missing ordinate.
#[test]
fn imputes_the_missing_sine_value() {
    let mut forest = ForestBuilder::new(2)
        .number_of_trees(50)
        .sample_size(256)
        .time_decay(1e-5)
        .random_seed(19)
        .build_double()
        .unwrap();
    let samples = 2048;
    for i in 0..samples {
        let t = 2.0 * PI * i as f64 / samples as f64;
        forest.update(&[t, t.sin()]).unwrap();
    }
    let imputed = forest
        .impute_missing_values(&[PI / 2.0, 0.0], &[1])
        .unwrap();
    assert!(
        (imputed[1] - 1.0).abs() < 0.2,
        "imputed sin(pi/2) as {}",
        imputed[1]
    );
    assert!((imputed[0] - PI / 2.0).abs() < 1e-12);
}

#[test]
fn imputing_nothing_returns_the_input() {
    let mut forest = ForestBuilder::new(3)
        .number_of_trees(10)
        .sample_size(64)
        .random_seed(3)
        .build_double()
        .unwrap();
    for i in 0..200 {
        forest
            .update(&[i as f64, (i % 7) as f64, (i % 11) as f64])
            .unwrap();
    }
    let point = [5.0, 3.0, 8.0];
    assert_eq!(forest.impute_missing_values(&point, &[]).unwrap(), point);
}

#[test]
fn imputes_several_missing_values_to_a_plausible_point() {
    let mut forest = ForestBuilder::new(3)
        .number_of_trees(30)
        .sample_size(256)
        .time_decay(1e-5)
        .random_seed(29)
        .build_double()
        .unwrap();
    // tight cluster at (1, 2, 3)
    for i in 0..600 {
        let jitter = (i % 10) as f64 * 0.01;
        forest
            .update(&[1.0 + jitter, 2.0 - jitter, 3.0 + jitter])
            .unwrap();
    }
    let imputed = forest
        .impute_missing_values(&[0.0, 0.0, 3.0], &[0, 1])
        .unwrap();
    assert!((imputed[0] - 1.0).abs() < 0.3, "imputed {:?}", imputed);
    assert!((imputed[1] - 2.0).abs() < 0.3, "imputed {:?}", imputed);
    assert_eq!(imputed[2], 3.0);
}

/// Sliding forecast over a clean sinusoid follows the true continuation.
#[test]
fn sliding_forecast_follows_the_sinusoid() {
    let shingle_size = 8;
    let period = 32.0;
    let mut forest = ForestBuilder::new(shingle_size)
        .shingle_size(shingle_size)
        .number_of_trees(50)
        .sample_size(256)
        .time_decay(1e-5)
        .random_seed(47)
        .build_double()
        .unwrap();
    let wave = |t: usize| (2.0 * PI * t as f64 / period).sin();
    let total: usize = 2048;
    let mut shingle: Vec<f64> = Vec::new();
    for t in 0..total {
        shingle = (t.saturating_sub(shingle_size - 1)..=t).map(&wave).collect();
        if shingle.len() == shingle_size {
            forest.update(&shingle).unwrap();
        }
    }
    let horizon = 16;
    let forecast = forest
        .extrapolate(&shingle, horizon, 1, false, 0)
        .unwrap();
    let truth: Vec<f64> = (total..total + horizon).map(&wave).collect();
    let correlation = pearson(&forecast, &truth);
    assert!(
        correlation > 0.8,
        "forecast correlation was {} ({:?})",
        correlation,
        forecast
    );
}

#[test]
fn cyclic_forecast_walks_the_rotating_block() {
    let shingle_size = 4;
    let mut forest = ForestBuilder::new(shingle_size)
        .shingle_size(shingle_size)
        .cyclic_shingle_rotation(true)
        .compact_enabled(true)
        .number_of_trees(20)
        .sample_size(128)
        .time_decay(1e-5)
        .random_seed(53)
        .build_double()
        .unwrap();
    // period-four signal, so each ring position holds a stable value
    let cycle = [0.0, 1.0, 0.0, -1.0];
    let mut ring = [0.0f64; 4];
    for t in 0..1200 {
        ring[t % 4] = cycle[t % 4];
        if t >= 3 {
            forest.update(&ring.to_vec()).unwrap();
        }
    }
    // after t = 1199 the next position to overwrite is 1200 % 4 = 0
    let forecast = forest.extrapolate(&ring.to_vec(), 4, 1, true, 0).unwrap();
    for (i, value) in forecast.iter().enumerate() {
        assert!(
            (value - cycle[i]).abs() < 0.3,
            "step {} forecast {} expected {}",
            i,
            value,
            cycle[i]
        );
    }
}

#[test]
fn near_neighbors_report_sampled_points() {
    let mut forest = ForestBuilder::new(2)
        .number_of_trees(20)
        .sample_size(128)
        .time_decay(0.0)
        .store_sequence_indexes_enabled(true)
        .random_seed(61)
        .build_double()
        .unwrap();
    for i in 0..400 {
        let jitter = (i % 20) as f64 * 0.001;
        forest.update(&[1.0 + jitter, -1.0 - jitter]).unwrap();
    }
    let neighbors = forest
        .near_neighbors_in_sample(&[1.0, -1.0], Some(0.5))
        .unwrap();
    assert!(!neighbors.is_empty());
    assert!(neighbors[0].distance < 0.1);
    assert!(neighbors[0].count >= 1);
    assert!(!neighbors[0].sequence_indexes.is_empty());
    assert!(neighbors
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance));

    let none = forest
        .near_neighbors_in_sample(&[50.0, 50.0], Some(0.5))
        .unwrap();
    assert!(none.is_empty());
}
