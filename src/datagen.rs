//! Seeded synthetic data for tests and experimentation: cosine waves with
//! keyed anomalies and Gaussian mixtures.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

pub struct LabeledData {
    pub data: Vec<Vec<f64>>,
    /// Positions where an anomaly was injected.
    pub change_indices: Vec<usize>,
    /// The injected offsets, parallel to `change_indices`.
    pub changes: Vec<Vec<f64>>,
    /// Mixture component per point, when generated from a mixture.
    pub labels: Vec<usize>,
}

/// Cosine waves per dimension with small uniform noise and occasional large
/// injected deviations, recorded in `change_indices`/`changes`.
pub fn multi_cosine(
    num: usize,
    period: &[usize],
    amplitude: &[f64],
    noise: f64,
    seed: u64,
    base_dimension: usize,
) -> LabeledData {
    assert_eq!(period.len(), base_dimension, "need a period per dimension");
    assert_eq!(
        amplitude.len(),
        base_dimension,
        "need an amplitude per dimension"
    );
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut noise_rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(1));
    let phase: Vec<usize> = (0..base_dimension)
        .map(|i| rng.next_u64() as usize % period[i])
        .collect();

    let mut data = Vec::with_capacity(num);
    let mut change_indices = Vec::new();
    let mut changes = Vec::new();
    for i in 0..num {
        let mut element = vec![0.0; base_dimension];
        let inject = noise_rng.gen::<f64>() < 0.01;
        let mut change = vec![0.0; base_dimension];
        let mut used = false;
        for j in 0..base_dimension {
            element[j] = amplitude[j] * (2.0 * PI * (i + phase[j]) as f64 / period[j] as f64).cos()
                + noise * noise_rng.gen::<f64>();
            if inject && noise_rng.gen::<f64>() < 0.3 {
                let factor = 5.0 * (1.0 + noise_rng.gen::<f64>());
                let mut delta = factor * noise;
                if noise_rng.gen::<f64>() < 0.5 {
                    delta = -delta;
                }
                element[j] += delta;
                change[j] = delta;
                used = true;
            }
        }
        data.push(element);
        if used {
            change_indices.push(i);
            changes.push(change);
        }
    }
    LabeledData {
        data,
        change_indices,
        changes,
        labels: Vec::new(),
    }
}

/// Samples from a weighted mixture of axis-aligned Gaussians.
pub fn gaussian_mixture(
    num: usize,
    mean: &[Vec<f64>],
    scale: &[Vec<f64>],
    weight: &[f64],
    seed: u64,
) -> LabeledData {
    assert!(num > 0, "number of samples cannot be zero");
    assert!(!mean.is_empty(), "need at least one component");
    let base_dimension = mean[0].len();
    assert_eq!(mean.len(), scale.len(), "need a scale per mean");
    assert_eq!(weight.len(), mean.len(), "need a weight per mean");
    for i in 0..mean.len() {
        assert_eq!(mean[i].len(), base_dimension, "mismatched dimensions");
        assert_eq!(scale[i].len(), base_dimension, "mismatched dimensions");
        assert!(weight[i] >= 0.0, "weights cannot be negative");
    }
    let total: f64 = weight.iter().sum();

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(num);
    let mut labels = Vec::with_capacity(num);
    for _ in 0..num {
        let mut pick = total * rng.gen::<f64>();
        let mut component = 0;
        while pick > weight[component] && component + 1 < weight.len() {
            pick -= weight[component];
            component += 1;
        }
        data.push(gaussian_vector(&mean[component], &scale[component], &mut rng));
        labels.push(component);
    }
    LabeledData {
        data,
        change_indices: Vec::new(),
        changes: Vec::new(),
        labels,
    }
}

fn gaussian_vector(mean: &[f64], scale: &[f64], rng: &mut ChaCha20Rng) -> Vec<f64> {
    mean.iter()
        .zip(scale)
        .map(|(&m, &s)| m + s * gaussian(rng))
        .collect()
}

// Box-Muller, discarding the infinities ln() can produce
fn gaussian(rng: &mut ChaCha20Rng) -> f64 {
    let mut r = f64::sqrt(-2.0 * f64::ln(rng.gen::<f64>()));
    while r.is_infinite() {
        r = f64::sqrt(-2.0 * f64::ln(rng.gen::<f64>()));
    }
    if rng.gen::<f64>() < 0.5 {
        r * f64::cos(2.0 * PI * rng.gen::<f64>())
    } else {
        r * f64::sin(2.0 * PI * rng.gen::<f64>())
    }
}
