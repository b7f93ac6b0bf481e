use std::collections::HashMap;

use crate::boundingbox::BoundingBox;
use crate::cut::Cut;
use crate::errors::{ensure_state, Result};
use crate::indexmanager::IndexManager;
use crate::pointstore::PointStore;
use crate::types::CoordFloat;

/// Parallel arenas backing a compact random cut tree.
///
/// `capacity` is the number of leaves (the per-tree sample size). Node
/// indices encode the discriminant: values at or above `capacity` are leaves
/// for point handle `index − capacity`, values below are internal-node slots,
/// and `capacity − 1` is the null sentinel. A tree over `capacity` leaves
/// needs at most `capacity − 1` internal nodes, which is exactly the slot
/// range left under the sentinel.
///
/// Masses are stored directly for internal nodes; a leaf's mass is one unless
/// an entry in the duplicate side map says otherwise. A configurable fraction
/// of internal slots carries a materialized bounding box with its range sum;
/// the rest are recomputed by descending on demand. An optional per-slot
/// point-sum array supports center-of-mass queries.
pub(crate) struct NodeStore<F: CoordFloat> {
    capacity: usize,
    dimensions: usize,
    left: Vec<u32>,
    right: Vec<u32>,
    cut_dimension: Vec<u32>,
    cut_value: Vec<F>,
    mass: Vec<u32>,
    leaf_mass: HashMap<usize, usize>,
    slots: IndexManager,
    cache_limit: usize,
    box_min: Vec<F>,
    box_max: Vec<F>,
    range_sum: Vec<f64>,
    point_sum: Vec<F>,
    center_of_mass_enabled: bool,
}

impl<F: CoordFloat> NodeStore<F> {
    pub fn new(
        capacity: usize,
        dimensions: usize,
        bounding_box_cache_fraction: f64,
        center_of_mass_enabled: bool,
    ) -> Self {
        assert!(capacity > 1, "a compact tree needs at least two leaves");
        let internal_slots = capacity - 1;
        let cache_limit = (bounding_box_cache_fraction * internal_slots as f64).ceil() as usize;
        let cache_limit = cache_limit.min(internal_slots);
        let null = (capacity - 1) as u32;
        NodeStore {
            capacity,
            dimensions,
            left: vec![null; internal_slots],
            right: vec![null; internal_slots],
            cut_dimension: vec![u32::MAX; internal_slots],
            cut_value: vec![F::zero(); internal_slots],
            mass: vec![0; internal_slots],
            leaf_mass: HashMap::new(),
            slots: IndexManager::new(internal_slots),
            cache_limit,
            box_min: vec![F::zero(); cache_limit * dimensions],
            box_max: vec![F::zero(); cache_limit * dimensions],
            range_sum: vec![0.0; cache_limit],
            point_sum: if center_of_mass_enabled {
                vec![F::zero(); internal_slots * dimensions]
            } else {
                Vec::new()
            },
            center_of_mass_enabled,
        }
    }

    pub fn null(&self) -> usize {
        self.capacity - 1
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        index >= self.capacity
    }

    pub fn leaf_index(&self, handle: usize) -> usize {
        self.capacity + handle
    }

    pub fn leaf_handle(&self, index: usize) -> usize {
        debug_assert!(self.is_leaf(index));
        index - self.capacity
    }

    pub fn cut(&self, index: usize) -> (usize, F) {
        (self.cut_dimension[index] as usize, self.cut_value[index])
    }

    pub fn left(&self, index: usize) -> usize {
        self.left[index] as usize
    }

    pub fn right(&self, index: usize) -> usize {
        self.right[index] as usize
    }

    pub fn mass_of(&self, index: usize) -> usize {
        if self.is_leaf(index) {
            *self
                .leaf_mass
                .get(&self.leaf_handle(index))
                .unwrap_or(&1)
        } else {
            self.mass[index] as usize
        }
    }

    pub fn increase_leaf_mass(&mut self, index: usize) {
        let handle = self.leaf_handle(index);
        *self.leaf_mass.entry(handle).or_insert(1) += 1;
    }

    /// Decrements a leaf's mass and returns the remaining count; zero means
    /// the leaf itself must be removed.
    pub fn decrease_leaf_mass(&mut self, index: usize) -> usize {
        let handle = self.leaf_handle(index);
        match self.leaf_mass.remove(&handle) {
            Some(mass) if mass > 2 => {
                self.leaf_mass.insert(handle, mass - 1);
                mass - 1
            }
            Some(_) => 1,
            None => 0,
        }
    }

    /// Root-to-leaf descent along the cuts: `(node, sibling)` pairs starting
    /// at `(root, null)`.
    pub fn path_from(&self, root: usize, point: &[F]) -> Vec<(usize, usize)> {
        let mut path = vec![(root, self.null())];
        let mut node = root;
        while !self.is_leaf(node) {
            let (dimension, value) = self.cut(node);
            let (next, sibling) = if point[dimension] <= value {
                (self.left(node), self.right(node))
            } else {
                (self.right(node), self.left(node))
            };
            path.push((next, sibling));
            node = next;
        }
        path
    }

    pub fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if self.left(parent) == old {
            self.left[parent] = new as u32;
        } else {
            self.right[parent] = new as u32;
        }
    }

    /// Allocates an internal node joining `child` with a fresh leaf for
    /// `handle`, splicing it under `parent` when one exists.
    pub fn add_internal(
        &mut self,
        parent: usize,
        point: &[F],
        child: usize,
        handle: usize,
        cut: Cut<F>,
        child_box: &BoundingBox<F>,
        store: &PointStore<F>,
    ) -> Result<usize> {
        let slot = self.slots.take()?;
        self.cut_dimension[slot] = cut.dimension as u32;
        self.cut_value[slot] = cut.value;
        let leaf = self.leaf_index(handle) as u32;
        if cut.is_left_of(point) {
            self.left[slot] = leaf;
            self.right[slot] = child as u32;
        } else {
            self.left[slot] = child as u32;
            self.right[slot] = leaf as u32;
        }
        self.mass[slot] = (self.mass_of(child) + 1) as u32;
        if slot < self.cache_limit {
            let mut bbox = child_box.clone();
            bbox.add_point(point);
            self.write_box(slot, &bbox);
        }
        if self.center_of_mass_enabled {
            let mut sum = self.subtree_point_sum(child, store)?;
            for (s, &p) in sum.iter_mut().zip(point) {
                *s = *s + p;
            }
            self.point_sum[slot * self.dimensions..(slot + 1) * self.dimensions]
                .copy_from_slice(&sum);
        }
        if parent != self.null() {
            self.replace_child(parent, child, slot);
        }
        Ok(slot)
    }

    pub fn free_internal(&mut self, index: usize) -> Result<()> {
        let null = self.null() as u32;
        self.left[index] = null;
        self.right[index] = null;
        self.cut_dimension[index] = u32::MAX;
        self.cut_value[index] = F::zero();
        self.mass[index] = 0;
        if self.center_of_mass_enabled {
            for value in
                self.point_sum[index * self.dimensions..(index + 1) * self.dimensions].iter_mut()
            {
                *value = F::zero();
            }
        }
        self.slots.release(index)
    }

    fn write_box(&mut self, slot: usize, bbox: &BoundingBox<F>) {
        let base = slot * self.dimensions;
        self.box_min[base..base + self.dimensions].copy_from_slice(bbox.min_values());
        self.box_max[base..base + self.dimensions].copy_from_slice(bbox.max_values());
        self.range_sum[slot] = bbox.range_sum();
    }

    fn cached_box(&self, slot: usize) -> BoundingBox<F> {
        let base = slot * self.dimensions;
        BoundingBox::new(
            &self.box_min[base..base + self.dimensions],
            &self.box_max[base..base + self.dimensions],
        )
    }

    fn is_cached(&self, index: usize) -> bool {
        !self.is_leaf(index) && index < self.cache_limit
    }

    /// Grows a cached box to contain `point`; returns true when the box was
    /// already large enough, meaning no ancestor box can change either.
    fn add_point_to_cached_box(&mut self, slot: usize, point: &[F]) -> bool {
        let base = slot * self.dimensions;
        for (x, &y) in self.box_min[base..base + self.dimensions]
            .iter_mut()
            .zip(point)
        {
            if y < *x {
                *x = y;
            }
        }
        for (x, &y) in self.box_max[base..base + self.dimensions]
            .iter_mut()
            .zip(point)
        {
            if y > *x {
                *x = y;
            }
        }
        let new_sum: f64 = self.box_min[base..base + self.dimensions]
            .iter()
            .zip(&self.box_max[base..base + self.dimensions])
            .map(|(&lo, &hi)| hi.as_f64() - lo.as_f64())
            .sum();
        let unchanged = self.range_sum[slot] == new_sum;
        self.range_sum[slot] = new_sum;
        unchanged
    }

    fn strictly_contains(&self, slot: usize, point: &[F]) -> bool {
        let base = slot * self.dimensions;
        self.box_min[base..base + self.dimensions]
            .iter()
            .zip(point)
            .zip(&self.box_max[base..base + self.dimensions])
            .all(|((&lo, &v), &hi)| lo < v && v < hi)
    }

    /// The bounding box of the subtree at `index`: a cached copy when
    /// available, otherwise recomputed by descending.
    pub fn bounding_box(&self, index: usize, store: &PointStore<F>) -> Result<BoundingBox<F>> {
        if self.is_leaf(index) {
            let point = store.get(self.leaf_handle(index))?;
            return Ok(BoundingBox::from_point(&point));
        }
        if self.is_cached(index) {
            return Ok(self.cached_box(index));
        }
        let mut bbox = self.bounding_box(self.left(index), store)?;
        self.extend_with_subtree(&mut bbox, self.right(index), store)?;
        Ok(bbox)
    }

    /// Grows `bbox` with the box of the subtree at `index`, following cached
    /// boxes where present.
    pub fn extend_with_subtree(
        &self,
        bbox: &mut BoundingBox<F>,
        index: usize,
        store: &PointStore<F>,
    ) -> Result<()> {
        if self.is_leaf(index) {
            let point = store.get(self.leaf_handle(index))?;
            bbox.add_point(&point);
        } else if self.is_cached(index) {
            let base = index * self.dimensions;
            bbox.add_point(&self.box_min[base..base + self.dimensions]);
            bbox.add_point(&self.box_max[base..base + self.dimensions]);
        } else {
            self.extend_with_subtree(bbox, self.left(index), store)?;
            self.extend_with_subtree(bbox, self.right(index), store)?;
        }
        Ok(())
    }

    /// Walks the remaining root-side path after an insertion, bumping masses
    /// and growing cached boxes until one already contains the point.
    pub fn ancestors_after_add(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[F],
        mut box_resolved: bool,
    ) {
        while let Some((index, _)) = path.pop() {
            self.mass[index] += 1;
            if self.center_of_mass_enabled {
                let base = index * self.dimensions;
                for (s, &p) in self.point_sum[base..base + self.dimensions]
                    .iter_mut()
                    .zip(point)
                {
                    *s = *s + p;
                }
            }
            if !box_resolved && self.is_cached(index) {
                box_resolved = self.add_point_to_cached_box(index, point);
            }
        }
    }

    /// Walks the remaining root-side path after a deletion, dropping masses
    /// and rebuilding cached boxes until one strictly contains the removed
    /// point.
    pub fn ancestors_after_delete(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[F],
        store: &PointStore<F>,
        mut box_resolved: bool,
    ) -> Result<()> {
        while let Some((index, _)) = path.pop() {
            self.mass[index] -= 1;
            if self.center_of_mass_enabled {
                let base = index * self.dimensions;
                for (s, &p) in self.point_sum[base..base + self.dimensions]
                    .iter_mut()
                    .zip(point)
                {
                    *s = *s - p;
                }
            }
            if !box_resolved && self.is_cached(index) {
                if self.strictly_contains(index, point) {
                    box_resolved = true;
                } else {
                    let mut bbox = self.bounding_box(self.left(index), store)?;
                    self.extend_with_subtree(&mut bbox, self.right(index), store)?;
                    self.write_box(index, &bbox);
                }
            }
        }
        Ok(())
    }

    /// Sum of the points below `index`, weighted by leaf mass.
    pub fn subtree_point_sum(&self, index: usize, store: &PointStore<F>) -> Result<Vec<F>> {
        if self.is_leaf(index) {
            let mass = self.mass_of(index) as f64;
            let point = store.get(self.leaf_handle(index))?;
            return Ok(point
                .into_iter()
                .map(|x| <F as crate::types::CoordFloat>::from_f64(x.as_f64() * mass))
                .collect());
        }
        ensure_state(
            self.center_of_mass_enabled,
            "point sums are not being tracked",
        )?;
        let base = index * self.dimensions;
        Ok(self.point_sum[base..base + self.dimensions].to_vec())
    }

    pub fn audit_cached_box(&self, index: usize, expected: &BoundingBox<F>) -> Result<()> {
        if self.is_cached(index) {
            let cached = self.cached_box(index);
            ensure_state(
                cached.min_values() == expected.min_values()
                    && cached.max_values() == expected.max_values(),
                "cached bounding box is not minimal",
            )?;
        }
        Ok(())
    }

    pub fn size_hint(&self) -> usize {
        (self.left.capacity() + self.right.capacity() + self.cut_dimension.capacity())
            * std::mem::size_of::<u32>()
            + self.mass.capacity() * std::mem::size_of::<u32>()
            + (self.cut_value.capacity()
                + self.box_min.capacity()
                + self.box_max.capacity()
                + self.point_sum.capacity())
                * std::mem::size_of::<F>()
            + self.range_sum.capacity() * std::mem::size_of::<f64>()
            + self.slots.size_hint()
            + std::mem::size_of::<NodeStore<F>>()
    }
}
