use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::errors::{ensure_arg, Result};
use crate::forest::{AnyForest, RandomCutForest};

/// Coordinate storage width. Scores are always computed in `f64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

/// Fully resolved forest configuration, produced by [`ForestBuilder`].
#[derive(Clone, Debug)]
pub struct ForestOptions {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub number_of_trees: usize,
    pub sample_size: usize,
    pub output_after: usize,
    pub time_decay: f64,
    pub store_sequence_indexes_enabled: bool,
    pub center_of_mass_enabled: bool,
    pub parallel_execution_enabled: bool,
    pub thread_pool_size: usize,
    pub compact_enabled: bool,
    pub precision: Precision,
    pub bounding_box_cache_fraction: f64,
    pub cyclic_shingle_rotation: bool,
    pub random_seed: u64,
}

/// Builder with the standard defaults: 50 trees of 256 samples, warm-up of a
/// quarter sample, time decay `1/(10·sample_size)`.
///
/// ```
/// use randcut::ForestBuilder;
///
/// let mut forest = ForestBuilder::new(2)
///     .number_of_trees(30)
///     .sample_size(128)
///     .random_seed(42)
///     .build()
///     .unwrap();
/// forest.update(&[0.0, 0.0]).unwrap();
/// ```
pub struct ForestBuilder {
    dimensions: usize,
    shingle_size: usize,
    number_of_trees: usize,
    sample_size: usize,
    output_after: Option<usize>,
    time_decay: Option<f64>,
    store_sequence_indexes_enabled: bool,
    center_of_mass_enabled: bool,
    parallel_execution_enabled: bool,
    thread_pool_size: Option<usize>,
    compact_enabled: bool,
    precision: Precision,
    bounding_box_cache_fraction: Option<f64>,
    cyclic_shingle_rotation: bool,
    random_seed: Option<u64>,
}

impl ForestBuilder {
    pub fn new(dimensions: usize) -> Self {
        ForestBuilder {
            dimensions,
            shingle_size: 1,
            number_of_trees: 50,
            sample_size: 256,
            output_after: None,
            time_decay: None,
            store_sequence_indexes_enabled: false,
            center_of_mass_enabled: false,
            parallel_execution_enabled: false,
            thread_pool_size: None,
            compact_enabled: false,
            precision: Precision::Double,
            bounding_box_cache_fraction: None,
            cyclic_shingle_rotation: false,
            random_seed: None,
        }
    }

    pub fn shingle_size(mut self, shingle_size: usize) -> Self {
        self.shingle_size = shingle_size;
        self
    }

    pub fn number_of_trees(mut self, number_of_trees: usize) -> Self {
        self.number_of_trees = number_of_trees;
        self
    }

    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn output_after(mut self, output_after: usize) -> Self {
        self.output_after = Some(output_after);
        self
    }

    pub fn time_decay(mut self, time_decay: f64) -> Self {
        self.time_decay = Some(time_decay);
        self
    }

    pub fn store_sequence_indexes_enabled(mut self, enabled: bool) -> Self {
        self.store_sequence_indexes_enabled = enabled;
        self
    }

    pub fn center_of_mass_enabled(mut self, enabled: bool) -> Self {
        self.center_of_mass_enabled = enabled;
        self
    }

    pub fn parallel_execution_enabled(mut self, enabled: bool) -> Self {
        self.parallel_execution_enabled = enabled;
        self
    }

    pub fn thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    pub fn compact_enabled(mut self, enabled: bool) -> Self {
        self.compact_enabled = enabled;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn bounding_box_cache_fraction(mut self, fraction: f64) -> Self {
        self.bounding_box_cache_fraction = Some(fraction);
        self
    }

    pub fn cyclic_shingle_rotation(mut self, enabled: bool) -> Self {
        self.cyclic_shingle_rotation = enabled;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Validates the configuration and resolves every default.
    pub fn options(&self) -> Result<ForestOptions> {
        ensure_arg(self.dimensions >= 1, "dimensions must be at least one")?;
        ensure_arg(self.shingle_size >= 1, "shingle size must be at least one")?;
        ensure_arg(
            self.dimensions % self.shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        ensure_arg(self.number_of_trees > 0, "need at least one tree")?;
        ensure_arg(self.sample_size > 1, "sample size must be at least two")?;
        let output_after = self
            .output_after
            .unwrap_or_else(|| (self.sample_size + 3) / 4);
        ensure_arg(
            output_after >= 1 && output_after <= self.sample_size,
            "output_after must lie in [1, sample_size]",
        )?;
        let time_decay = self
            .time_decay
            .unwrap_or(1.0 / (10.0 * self.sample_size as f64));
        ensure_arg(time_decay >= 0.0, "time decay cannot be negative")?;
        let bounding_box_cache_fraction = self.bounding_box_cache_fraction.unwrap_or(1.0);
        ensure_arg(
            (0.0..=1.0).contains(&bounding_box_cache_fraction),
            "bounding box cache fraction must lie in [0, 1]",
        )?;
        ensure_arg(
            bounding_box_cache_fraction >= 1.0 || self.compact_enabled,
            "a partial bounding box cache requires the compact representation",
        )?;
        ensure_arg(
            self.precision == Precision::Double || self.compact_enabled,
            "single precision requires the compact representation",
        )?;
        ensure_arg(
            !self.cyclic_shingle_rotation || self.shingle_size > 1,
            "cyclic rotation requires a shingle size above one",
        )?;
        let thread_pool_size = self.thread_pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        });
        ensure_arg(thread_pool_size >= 1, "thread pool needs at least one worker")?;
        let random_seed = self
            .random_seed
            .unwrap_or_else(|| ChaCha20Rng::from_entropy().next_u64());
        Ok(ForestOptions {
            dimensions: self.dimensions,
            shingle_size: self.shingle_size,
            number_of_trees: self.number_of_trees,
            sample_size: self.sample_size,
            output_after,
            time_decay,
            store_sequence_indexes_enabled: self.store_sequence_indexes_enabled,
            center_of_mass_enabled: self.center_of_mass_enabled,
            parallel_execution_enabled: self.parallel_execution_enabled,
            thread_pool_size,
            compact_enabled: self.compact_enabled,
            precision: self.precision,
            bounding_box_cache_fraction,
            cyclic_shingle_rotation: self.cyclic_shingle_rotation,
            random_seed,
        })
    }

    /// Builds a forest behind the precision tag.
    pub fn build(&self) -> Result<AnyForest> {
        let options = self.options()?;
        match options.precision {
            Precision::Single => Ok(AnyForest::Single(RandomCutForest::<f32>::from_options(
                options,
            )?)),
            Precision::Double => Ok(AnyForest::Double(RandomCutForest::<f64>::from_options(
                options,
            )?)),
        }
    }

    /// Builds a double-precision forest with its concrete type exposed.
    pub fn build_double(&self) -> Result<RandomCutForest<f64>> {
        let options = self.options()?;
        ensure_arg(
            options.precision == Precision::Double,
            "builder is configured for single precision",
        )?;
        RandomCutForest::from_options(options)
    }

    /// Builds a single-precision forest with its concrete type exposed.
    pub fn build_single(&self) -> Result<RandomCutForest<f32>> {
        let options = self.options()?;
        ensure_arg(
            options.precision == Precision::Single,
            "builder is configured for double precision",
        )?;
        RandomCutForest::from_options(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let options = ForestBuilder::new(4).random_seed(0).options().unwrap();
        assert_eq!(options.number_of_trees, 50);
        assert_eq!(options.sample_size, 256);
        assert_eq!(options.output_after, 64);
        assert!((options.time_decay - 1.0 / 2560.0).abs() < 1e-12);
        assert_eq!(options.bounding_box_cache_fraction, 1.0);
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(ForestBuilder::new(0).options().is_err());
        assert!(ForestBuilder::new(4).shingle_size(3).options().is_err());
        assert!(ForestBuilder::new(4).sample_size(1).options().is_err());
        assert!(ForestBuilder::new(4)
            .output_after(1000)
            .options()
            .is_err());
        assert!(ForestBuilder::new(4)
            .precision(Precision::Single)
            .options()
            .is_err());
        assert!(ForestBuilder::new(4)
            .bounding_box_cache_fraction(0.5)
            .options()
            .is_err());
        assert!(ForestBuilder::new(4)
            .cyclic_shingle_rotation(true)
            .options()
            .is_err());
    }

    #[test]
    fn compact_unlocks_single_precision_and_partial_cache() {
        let options = ForestBuilder::new(4)
            .compact_enabled(true)
            .precision(Precision::Single)
            .bounding_box_cache_fraction(0.25)
            .random_seed(1)
            .options()
            .unwrap();
        assert_eq!(options.precision, Precision::Single);
        assert_eq!(options.bounding_box_cache_fraction, 0.25);
    }
}
