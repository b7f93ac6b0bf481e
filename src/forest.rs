use std::cmp::Ordering;
use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;
use rayon::prelude::*;

use crate::accumulator::{ConvergingAccumulator, OneSidedAccumulator};
use crate::component::Component;
use crate::config::ForestOptions;
use crate::density::{DensityOutput, InterpolationMeasure};
use crate::divector::DiVector;
use crate::errors::{ensure_arg, ForestError, Result};
use crate::pointstore::PointStore;
use crate::sampler::TimeDecaySampler;
use crate::tree::{CompactTree, CutTree, PointerTree};
use crate::types::CoordFloat;
use crate::visitor::attribution::AnomalyAttributionVisitor;
use crate::visitor::impute::{Imputed, ImputeVisitor};
use crate::visitor::interpolation::InterpolationVisitor;
use crate::visitor::neighbor::NearNeighborVisitor;
use crate::visitor::score::AnomalyScoreVisitor;
use crate::visitor::{ScoringProfile, Visitor};

const APPROXIMATE_PRECISION: f64 = 0.1;

fn approximate_min_accepted(number_of_trees: usize) -> usize {
    (number_of_trees / 4).max(3).min(number_of_trees)
}

/// A near neighbor found in the forest's current sample.
#[derive(Clone, Debug)]
pub struct Neighbor<F: CoordFloat> {
    pub point: Vec<F>,
    pub distance: f64,
    /// Total mass over all trees that routed the query to this point.
    pub count: usize,
    /// Admission positions, populated when sequence retention is enabled.
    pub sequence_indexes: Vec<u64>,
}

/// Streaming random cut forest: an ensemble of `(sampler, tree)` components
/// over one shared, reference-counted point store.
///
/// `update` feeds one point through every component; queries traverse the
/// ensemble with the appropriate visitor and aggregate per-tree results.
/// Memory is bounded by the store capacity plus `number_of_trees ·
/// sample_size` tree nodes regardless of stream length.
pub struct RandomCutForest<F: CoordFloat> {
    options: ForestOptions,
    point_store: PointStore<F>,
    components: Vec<Component<F>>,
    sequence_index: u64,
    pool: Option<rayon::ThreadPool>,
}

impl<F: CoordFloat> RandomCutForest<F> {
    pub fn from_options(options: ForestOptions) -> Result<Self> {
        let store_capacity =
            (options.sample_size * options.number_of_trees + 1).max(2 * options.sample_size);
        let point_store = PointStore::new(
            options.dimensions,
            options.shingle_size,
            store_capacity,
            2 * options.sample_size,
            options.cyclic_shingle_rotation,
        )?;
        let mut rng = ChaCha20Rng::seed_from_u64(options.random_seed);
        let mut components = Vec::with_capacity(options.number_of_trees);
        for _ in 0..options.number_of_trees {
            let tree_seed = rng.next_u64();
            let sampler_seed = rng.next_u64();
            let tree = if options.compact_enabled {
                CutTree::Compact(CompactTree::new(
                    options.dimensions,
                    options.sample_size,
                    options.bounding_box_cache_fraction,
                    options.center_of_mass_enabled,
                    tree_seed,
                ))
            } else {
                CutTree::Pointer(PointerTree::new(tree_seed, options.center_of_mass_enabled))
            };
            let sampler =
                TimeDecaySampler::new(options.sample_size, options.time_decay, sampler_seed);
            components.push(Component::new(tree, sampler));
        }
        let pool = if options.parallel_execution_enabled {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(options.thread_pool_size)
                    .build()
                    .map_err(|_| ForestError::InvalidArgument {
                        msg: "unable to build the worker pool",
                    })?,
            )
        } else {
            None
        };
        Ok(RandomCutForest {
            options,
            point_store,
            components,
            sequence_index: 0,
            pool,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    pub fn number_of_trees(&self) -> usize {
        self.options.number_of_trees
    }

    pub fn sample_size(&self) -> usize {
        self.options.sample_size
    }

    pub fn total_updates(&self) -> u64 {
        self.sequence_index
    }

    pub fn is_output_ready(&self) -> bool {
        self.sequence_index >= self.options.output_after as u64
    }

    pub fn samplers_full(&self) -> bool {
        self.components
            .iter()
            .all(|component| component.sampler().is_full())
    }

    /// Estimated resident size in bytes.
    pub fn size_hint(&self) -> usize {
        self.point_store.size_hint()
            + self
                .components
                .iter()
                .map(Component::size_hint)
                .sum::<usize>()
            + std::mem::size_of::<RandomCutForest<F>>()
    }

    fn validate_query(&self, point: &[F]) -> Result<()> {
        if point.len() != self.options.dimensions {
            return Err(ForestError::DimensionMismatch {
                expected: self.options.dimensions,
                actual: point.len(),
            });
        }
        Ok(())
    }

    /// Feeds one point through every component and settles reference counts:
    /// the store's count of any handle ends equal to the number of samplers
    /// holding it.
    pub fn update(&mut self, point: &[F]) -> Result<()> {
        self.validate_query(point)?;
        let handle = self.point_store.add(point)?;
        let sequence_index = self.sequence_index;
        let results: Result<Vec<(Option<usize>, Option<usize>)>> = {
            let Self {
                components,
                point_store,
                pool,
                ..
            } = self;
            let point_store: &PointStore<F> = point_store;
            match pool {
                Some(pool) => pool.install(|| {
                    components
                        .par_iter_mut()
                        .map(|component| component.update(handle, sequence_index, point_store))
                        .collect()
                }),
                None => components
                    .iter_mut()
                    .map(|component| component.update(handle, sequence_index, point_store))
                    .collect(),
            }
        };
        self.point_store.adjust_counts(&results?)?;
        self.point_store.decrement_ref(handle)?;
        self.sequence_index += 1;
        Ok(())
    }

    fn traverse_one<V, R>(
        &self,
        component: &Component<F>,
        point: &[F],
        factory: &(impl Fn(usize) -> V + Sync),
    ) -> Result<R>
    where
        V: Visitor<F, Output = R>,
    {
        let mut visitor = factory(component.tree_mass());
        component
            .tree()
            .traverse(point, &self.point_store, &mut visitor)?;
        Ok(visitor.result())
    }

    /// Map over the ensemble (parallel when enabled), reduce with
    /// `accumulate`, then `finish` with the number of trees.
    fn traverse_reduce<V, R, S>(
        &self,
        point: &[F],
        factory: impl Fn(usize) -> V + Sync,
        initial: S,
        accumulate: fn(&R, &mut S),
        finish: fn(&mut S, usize),
    ) -> Result<S>
    where
        V: Visitor<F, Output = R>,
        R: Send,
    {
        let results: Result<Vec<R>> = match &self.pool {
            Some(pool) => pool.install(|| {
                self.components
                    .par_iter()
                    .map(|component| self.traverse_one(component, point, &factory))
                    .collect()
            }),
            None => self
                .components
                .iter()
                .map(|component| self.traverse_one(component, point, &factory))
                .collect(),
        };
        let mut answer = initial;
        for result in &results? {
            accumulate(result, &mut answer);
        }
        finish(&mut answer, self.components.len());
        Ok(answer)
    }

    /// Folds per-tree results in component order; the fold also receives the
    /// component index so callers can consult per-component state.
    fn traverse_collect<V, R, S>(
        &self,
        point: &[F],
        factory: impl Fn(usize) -> V + Sync,
        initial: S,
        mut fold: impl FnMut(&mut S, usize, R),
    ) -> Result<S>
    where
        V: Visitor<F, Output = R>,
    {
        let mut answer = initial;
        for (i, component) in self.components.iter().enumerate() {
            let result = self.traverse_one(component, point, &factory)?;
            fold(&mut answer, i, result);
        }
        Ok(answer)
    }

    /// Sequential-only walk: `consume` folds each per-tree result and returns
    /// true once its accumulator has converged. Returns the number of trees
    /// consumed.
    fn traverse_converging<V, R>(
        &self,
        point: &[F],
        factory: impl Fn(usize) -> V + Sync,
        consume: &mut dyn FnMut(R) -> bool,
    ) -> Result<usize>
    where
        V: Visitor<F, Output = R>,
    {
        let mut accepted = 0;
        for component in &self.components {
            let result = self.traverse_one(component, point, &factory)?;
            accepted += 1;
            if consume(result) {
                break;
            }
        }
        Ok(accepted)
    }

    fn score_with_profile(&self, point: &[F], profile: ScoringProfile) -> Result<f64> {
        self.validate_query(point)?;
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        fn add_to(value: &f64, sum: &mut f64) {
            *sum += *value;
        }
        fn divide(sum: &mut f64, count: usize) {
            *sum /= count as f64;
        }
        self.traverse_reduce(
            point,
            |tree_mass| AnomalyScoreVisitor::new(tree_mass, profile),
            0.0,
            add_to,
            divide,
        )
    }

    /// Mean anomaly score over all trees; near one for expected points,
    /// clearly above one for outliers. Zero until warm-up completes.
    pub fn anomaly_score(&self, point: &[F]) -> Result<f64> {
        self.score_with_profile(point, ScoringProfile::default())
    }

    /// Expected-displacement variant of the anomaly score.
    pub fn displacement_score(&self, point: &[F]) -> Result<f64> {
        self.score_with_profile(point, ScoringProfile::displacement())
    }

    /// Anomaly score with convergence-based early stopping: trees are visited
    /// sequentially and the walk stops once the running mean is stable within
    /// relative precision.
    pub fn approximate_anomaly_score(&self, point: &[F]) -> Result<f64> {
        self.validate_query(point)?;
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        let profile = ScoringProfile::default();
        let mut accumulator = OneSidedAccumulator::new(
            APPROXIMATE_PRECISION,
            approximate_min_accepted(self.options.number_of_trees),
            true,
        );
        let mut sum = 0.0;
        let accepted = self.traverse_converging(
            point,
            |tree_mass| AnomalyScoreVisitor::new(tree_mass, profile),
            &mut |score: f64| {
                sum += score;
                accumulator.accept(score);
                accumulator.is_converged()
            },
        )?;
        Ok(sum / accepted as f64)
    }

    /// Per-dimension, per-sign split of the anomaly score. The total over
    /// both sides tracks `anomaly_score` up to floating-point summation.
    pub fn anomaly_attribution(&self, point: &[F]) -> Result<DiVector> {
        self.validate_query(point)?;
        let dimensions = self.options.dimensions;
        if !self.is_output_ready() {
            return Ok(DiVector::empty(dimensions));
        }
        let profile = ScoringProfile::default();
        self.traverse_reduce(
            point,
            move |tree_mass| AnomalyAttributionVisitor::new(dimensions, tree_mass, profile),
            DiVector::empty(dimensions),
            |result: &DiVector, sum: &mut DiVector| sum.add(result),
            |sum: &mut DiVector, count: usize| sum.divide(count),
        )
    }

    /// Attribution with the same early stopping as
    /// `approximate_anomaly_score`, converging on the attribution total.
    pub fn approximate_anomaly_attribution(&self, point: &[F]) -> Result<DiVector> {
        self.validate_query(point)?;
        let dimensions = self.options.dimensions;
        if !self.is_output_ready() {
            return Ok(DiVector::empty(dimensions));
        }
        let profile = ScoringProfile::default();
        let mut accumulator = OneSidedAccumulator::new(
            APPROXIMATE_PRECISION,
            approximate_min_accepted(self.options.number_of_trees),
            true,
        );
        let mut sum = DiVector::empty(dimensions);
        let accepted = self.traverse_converging(
            point,
            move |tree_mass| AnomalyAttributionVisitor::new(dimensions, tree_mass, profile),
            &mut |result: DiVector| {
                accumulator.accept(result.total());
                sum.add(&result);
                accumulator.is_converged()
            },
        )?;
        sum.divide(accepted);
        Ok(sum)
    }

    /// Simple kernel-density estimate at the query point.
    pub fn simple_density(&self, point: &[F]) -> Result<DensityOutput> {
        self.validate_query(point)?;
        let dimensions = self.options.dimensions;
        if !self.is_output_ready() {
            return Ok(InterpolationMeasure::empty(dimensions, 0.0).finish());
        }
        let profile = ScoringProfile::default();
        let measure = self.traverse_reduce(
            point,
            move |tree_mass| InterpolationVisitor::new(dimensions, tree_mass, profile),
            InterpolationMeasure::empty(dimensions, 0.0),
            |result: &InterpolationMeasure, sum: &mut InterpolationMeasure| sum.add(result),
            |sum: &mut InterpolationMeasure, count: usize| sum.divide(count),
        )?;
        Ok(measure.finish())
    }

    fn impute_candidates(
        &self,
        point: &[F],
        missing: &[usize],
        centrality: f64,
    ) -> Result<Vec<Imputed<F>>> {
        let mut mask = vec![false; self.options.dimensions];
        for &index in missing {
            mask[index] = true;
        }
        let profile = ScoringProfile::default();
        let base_seed = self.options.random_seed;
        let mask = &mask;
        let run = |(i, component): (usize, &Component<F>)| -> Result<Imputed<F>> {
            let seed = base_seed.wrapping_add((i as u64 + 1).wrapping_mul(0x9E3779B97F4A7C15));
            let mut visitor =
                ImputeVisitor::new(missing, centrality, component.tree_mass(), profile, seed);
            component
                .tree()
                .traverse_multi(point, mask, &self.point_store, &mut visitor)?;
            Ok(Visitor::<F>::result(&visitor))
        };
        match &self.pool {
            Some(pool) => {
                pool.install(|| self.components.par_iter().enumerate().map(run).collect())
            }
            None => self.components.iter().enumerate().map(run).collect(),
        }
    }

    /// Fills the listed coordinates with values the forest considers typical
    /// given the rest of the point. One missing value takes the median of
    /// per-tree candidates; several take the full candidate at the 25th
    /// percentile of this forest's own anomaly score. A query with nothing
    /// missing (or during warm-up) returns a copy of the input.
    pub fn impute_missing_values(&self, point: &[F], missing_indexes: &[usize]) -> Result<Vec<F>> {
        self.validate_query(point)?;
        for &index in missing_indexes {
            ensure_arg(
                index < self.options.dimensions,
                "missing index out of range",
            )?;
        }
        let mut distinct = missing_indexes.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        ensure_arg(
            distinct.len() == missing_indexes.len(),
            "missing indexes must be distinct",
        )?;
        if missing_indexes.is_empty() || !self.is_output_ready() {
            return Ok(point.to_vec());
        }
        let candidates = self.impute_candidates(point, missing_indexes, 1.0)?;
        if missing_indexes.len() == 1 {
            let index = missing_indexes[0];
            let mut values: Vec<F> = candidates.iter().map(|c| c.point[index]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mut answer = point.to_vec();
            answer[index] = values[values.len() / 2];
            Ok(answer)
        } else {
            let mut scored: Vec<(f64, usize)> = Vec::with_capacity(candidates.len());
            for (i, candidate) in candidates.iter().enumerate() {
                scored.push((self.anomaly_score(&candidate.point)?, i));
            }
            scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            let chosen = scored[scored.len() / 4].1;
            Ok(candidates[chosen].point.clone())
        }
    }

    /// Forecasts `horizon` blocks beyond a fully observed shingle by repeated
    /// imputation: each step frees the oldest block (sliding shift, or the
    /// rotating block at `shingle_index` when cyclic), imputes it as the next
    /// observation and feeds it back into the shingle.
    pub fn extrapolate(
        &self,
        shingled_point: &[F],
        horizon: usize,
        block_size: usize,
        cyclic: bool,
        shingle_index: usize,
    ) -> Result<Vec<F>> {
        self.validate_query(shingled_point)?;
        ensure_arg(block_size >= 1, "block size must be at least one")?;
        ensure_arg(
            self.options.dimensions % block_size == 0,
            "block size must divide dimensions",
        )?;
        ensure_arg(
            block_size < self.options.dimensions,
            "a shingle must hold more than one block",
        )?;
        let dimensions = self.options.dimensions;
        let mut result = Vec::with_capacity(horizon * block_size);
        if !self.is_output_ready() {
            result.resize(horizon * block_size, F::zero());
            return Ok(result);
        }
        let mut shingle = shingled_point.to_vec();
        for step in 0..horizon {
            let missing: Vec<usize> = if cyclic {
                let offset = ((shingle_index + step) * block_size) % dimensions;
                (offset..offset + block_size).collect()
            } else {
                shingle.copy_within(block_size.., 0);
                (dimensions - block_size..dimensions).collect()
            };
            for &index in &missing {
                shingle[index] = F::zero();
            }
            let imputed = self.impute_missing_values(&shingle, &missing)?;
            for &index in &missing {
                result.push(imputed[index]);
                shingle[index] = imputed[index];
            }
        }
        Ok(result)
    }

    /// Mean per-dimension spread of the trees' root boxes, the fallback
    /// distance threshold for near-neighbor queries.
    fn default_neighbor_threshold(&self) -> f64 {
        let mut sum = 0.0;
        let mut trees = 0;
        for component in &self.components {
            if let Some(bbox) = component.tree().root_box(&self.point_store) {
                sum += bbox.range_sum() / self.options.dimensions as f64;
                trees += 1;
            }
        }
        if trees == 0 {
            0.0
        } else {
            sum / trees as f64
        }
    }

    /// Sampled points within `distance_threshold` (L2) of the query that some
    /// tree routed the query to, deduplicated across trees and sorted by
    /// distance. Without a threshold, the mean per-dimension spread of the
    /// root boxes is used.
    pub fn near_neighbors_in_sample(
        &self,
        point: &[F],
        distance_threshold: Option<f64>,
    ) -> Result<Vec<Neighbor<F>>> {
        self.validate_query(point)?;
        if !self.is_output_ready() {
            return Ok(Vec::new());
        }
        let threshold = distance_threshold.unwrap_or_else(|| self.default_neighbor_threshold());
        ensure_arg(threshold >= 0.0, "distance threshold cannot be negative")?;
        let keep_sequences = self.options.store_sequence_indexes_enabled;
        let found = self.traverse_collect(
            point,
            |_| NearNeighborVisitor::new(threshold),
            HashMap::<usize, Neighbor<F>>::new(),
            |found, i, candidate| {
                if let Some(candidate) = candidate {
                    let entry = found.entry(candidate.handle).or_insert_with(|| Neighbor {
                        point: candidate.point.clone(),
                        distance: candidate.distance,
                        count: 0,
                        sequence_indexes: Vec::new(),
                    });
                    entry.count += candidate.mass;
                    if keep_sequences {
                        entry
                            .sequence_indexes
                            .extend(self.components[i].sampler().sequences_for(candidate.handle));
                    }
                }
            },
        )?;
        let mut neighbors: Vec<Neighbor<F>> = found.into_values().collect();
        neighbors.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        Ok(neighbors)
    }

    /// Mass-weighted mean of the per-tree sample centers, when center-of-mass
    /// tracking is enabled.
    pub fn center_of_mass(&self) -> Option<Vec<F>> {
        if !self.options.center_of_mass_enabled {
            return None;
        }
        let mut sum = vec![0.0f64; self.options.dimensions];
        let mut total_mass = 0.0f64;
        for component in &self.components {
            let mass = component.tree_mass() as f64;
            let center = component.tree().center_of_mass(&self.point_store)?;
            for (s, c) in sum.iter_mut().zip(&center) {
                *s += c.as_f64() * mass;
            }
            total_mass += mass;
        }
        if total_mass == 0.0 {
            return None;
        }
        Some(
            sum.into_iter()
                .map(|s| <F as crate::types::CoordFloat>::from_f64(s / total_mass))
                .collect(),
        )
    }

    /// Verifies every tree's structural invariants and the refcount contract
    /// between samplers and the point store. Test and debugging hook; a
    /// failure is a bug.
    pub fn audit(&self) -> Result<()> {
        let mut held: HashMap<usize, usize> = HashMap::new();
        for component in &self.components {
            component.tree().audit(&self.point_store)?;
            for entry in component.sampler().entries() {
                *held.entry(entry.handle).or_insert(0) += 1;
            }
        }
        if self.point_store.live_count() != held.len() {
            return Err(ForestError::InconsistentState {
                msg: "point store holds handles no sampler references",
            });
        }
        for (handle, holders) in held {
            if self.point_store.ref_count(handle) != holders {
                return Err(ForestError::InconsistentState {
                    msg: "point store refcount does not match sampler holds",
                });
            }
        }
        Ok(())
    }
}

fn widen(point: &[f32]) -> Vec<f64> {
    point.iter().map(|&x| x as f64).collect()
}

fn narrow(point: &[f64]) -> Vec<f32> {
    point.iter().map(|&x| x as f32).collect()
}

/// Type-erased forest over the precision tag, for callers that pick the
/// coordinate width at run time. Points cross the boundary as `f64`.
pub enum AnyForest {
    Single(RandomCutForest<f32>),
    Double(RandomCutForest<f64>),
}

impl AnyForest {
    pub fn update(&mut self, point: &[f64]) -> Result<()> {
        match self {
            AnyForest::Single(forest) => forest.update(&narrow(point)),
            AnyForest::Double(forest) => forest.update(point),
        }
    }

    pub fn anomaly_score(&self, point: &[f64]) -> Result<f64> {
        match self {
            AnyForest::Single(forest) => forest.anomaly_score(&narrow(point)),
            AnyForest::Double(forest) => forest.anomaly_score(point),
        }
    }

    pub fn approximate_anomaly_score(&self, point: &[f64]) -> Result<f64> {
        match self {
            AnyForest::Single(forest) => forest.approximate_anomaly_score(&narrow(point)),
            AnyForest::Double(forest) => forest.approximate_anomaly_score(point),
        }
    }

    pub fn anomaly_attribution(&self, point: &[f64]) -> Result<DiVector> {
        match self {
            AnyForest::Single(forest) => forest.anomaly_attribution(&narrow(point)),
            AnyForest::Double(forest) => forest.anomaly_attribution(point),
        }
    }

    pub fn approximate_anomaly_attribution(&self, point: &[f64]) -> Result<DiVector> {
        match self {
            AnyForest::Single(forest) => forest.approximate_anomaly_attribution(&narrow(point)),
            AnyForest::Double(forest) => forest.approximate_anomaly_attribution(point),
        }
    }

    pub fn simple_density(&self, point: &[f64]) -> Result<DensityOutput> {
        match self {
            AnyForest::Single(forest) => forest.simple_density(&narrow(point)),
            AnyForest::Double(forest) => forest.simple_density(point),
        }
    }

    pub fn impute_missing_values(
        &self,
        point: &[f64],
        missing_indexes: &[usize],
    ) -> Result<Vec<f64>> {
        match self {
            AnyForest::Single(forest) => forest
                .impute_missing_values(&narrow(point), missing_indexes)
                .map(|p| widen(&p)),
            AnyForest::Double(forest) => forest.impute_missing_values(point, missing_indexes),
        }
    }

    pub fn extrapolate(
        &self,
        shingled_point: &[f64],
        horizon: usize,
        block_size: usize,
        cyclic: bool,
        shingle_index: usize,
    ) -> Result<Vec<f64>> {
        match self {
            AnyForest::Single(forest) => forest
                .extrapolate(
                    &narrow(shingled_point),
                    horizon,
                    block_size,
                    cyclic,
                    shingle_index,
                )
                .map(|p| widen(&p)),
            AnyForest::Double(forest) => {
                forest.extrapolate(shingled_point, horizon, block_size, cyclic, shingle_index)
            }
        }
    }

    pub fn near_neighbors_in_sample(
        &self,
        point: &[f64],
        distance_threshold: Option<f64>,
    ) -> Result<Vec<Neighbor<f64>>> {
        match self {
            AnyForest::Single(forest) => Ok(forest
                .near_neighbors_in_sample(&narrow(point), distance_threshold)?
                .into_iter()
                .map(|n| Neighbor {
                    point: widen(&n.point),
                    distance: n.distance,
                    count: n.count,
                    sequence_indexes: n.sequence_indexes,
                })
                .collect()),
            AnyForest::Double(forest) => forest.near_neighbors_in_sample(point, distance_threshold),
        }
    }

    pub fn is_output_ready(&self) -> bool {
        match self {
            AnyForest::Single(forest) => forest.is_output_ready(),
            AnyForest::Double(forest) => forest.is_output_ready(),
        }
    }

    pub fn samplers_full(&self) -> bool {
        match self {
            AnyForest::Single(forest) => forest.samplers_full(),
            AnyForest::Double(forest) => forest.samplers_full(),
        }
    }

    pub fn total_updates(&self) -> u64 {
        match self {
            AnyForest::Single(forest) => forest.total_updates(),
            AnyForest::Double(forest) => forest.total_updates(),
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            AnyForest::Single(forest) => forest.dimensions(),
            AnyForest::Double(forest) => forest.dimensions(),
        }
    }

    pub fn size_hint(&self) -> usize {
        match self {
            AnyForest::Single(forest) => forest.size_hint(),
            AnyForest::Double(forest) => forest.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ForestBuilder;
    use crate::datagen::gaussian_mixture;

    fn small_builder(compact: bool) -> ForestBuilder {
        ForestBuilder::new(3)
            .number_of_trees(7)
            .sample_size(32)
            .time_decay(0.002)
            .compact_enabled(compact)
            .random_seed(101)
    }

    #[test]
    fn tree_mass_tracks_admissions_before_saturation() {
        for compact in [false, true] {
            let mut forest = small_builder(compact).build_double().unwrap();
            let data = gaussian_mixture(
                40,
                &[vec![0.0, 0.0, 0.0]],
                &[vec![1.0, 1.0, 1.0]],
                &[1.0],
                5,
            );
            for (i, point) in data.data.iter().enumerate() {
                forest.update(point).unwrap();
                let expected = (i + 1).min(32);
                for component in &forest.components {
                    assert_eq!(component.tree_mass(), expected);
                    assert_eq!(component.sampler().size(), expected);
                }
            }
        }
    }

    #[test]
    fn refcounts_match_sampler_holds_throughout() {
        for compact in [false, true] {
            let mut forest = small_builder(compact).build_double().unwrap();
            let data = gaussian_mixture(
                600,
                &[vec![0.0, 0.0, 0.0]],
                &[vec![1.0, 1.0, 1.0]],
                &[1.0],
                6,
            );
            for (i, point) in data.data.iter().enumerate() {
                forest.update(point).unwrap();
                if i % 97 == 0 {
                    forest.audit().unwrap();
                }
            }
            forest.audit().unwrap();
            assert!(forest.samplers_full());
        }
    }

    #[test]
    fn duplicate_points_coalesce_into_one_leaf() {
        for compact in [false, true] {
            let mut forest = ForestBuilder::new(2)
                .number_of_trees(1)
                .sample_size(8)
                .time_decay(0.0)
                .compact_enabled(compact)
                .random_seed(11)
                .build_double()
                .unwrap();
            for _ in 0..8 {
                forest.update(&[0.0, 0.0]).unwrap();
            }
            assert_eq!(forest.components[0].tree_mass(), 8);
            // one content, one handle, held once per sampler slot occurrence
            assert_eq!(forest.point_store.live_count(), 1);
            forest.audit().unwrap();
        }
    }

    #[test]
    fn center_of_mass_tracks_the_sample_mean() {
        for compact in [false, true] {
            let mut forest = ForestBuilder::new(2)
                .number_of_trees(4)
                .sample_size(64)
                .time_decay(0.0)
                .center_of_mass_enabled(true)
                .compact_enabled(compact)
                .random_seed(13)
                .build_double()
                .unwrap();
            assert!(forest.center_of_mass().is_none());
            for i in 0..50 {
                let value = if i % 2 == 0 { 1.0 } else { 3.0 };
                forest.update(&[value, -value]).unwrap();
            }
            let center = forest.center_of_mass().unwrap();
            assert!((center[0] - 2.0).abs() < 1e-9);
            assert!((center[1] + 2.0).abs() < 1e-9);
        }
    }
}
