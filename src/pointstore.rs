use log::debug;

use crate::errors::{ensure_arg, ensure_state, ForestError, Result};
use crate::indexmanager::IndexManager;
use crate::types::CoordFloat;

const FREE: usize = usize::MAX;

/// Reference-counted storage of fixed-dimension vectors, shared by every tree
/// in a forest.
///
/// Handles are opaque integers, stable while their reference count is
/// positive and recycled afterwards. Locations are tracked in units of
/// `base_dimension` coordinates so that consecutive shingled points can share
/// their overlap: when the tail of the most recently written point equals the
/// head of the new one bit-exactly, only the trailing block is appended. In
/// rotation mode (cyclic shingles) points are stored at block-aligned offsets
/// and unrotated on read.
pub struct PointStore<F: CoordFloat> {
    dimensions: usize,
    base_dimension: usize,
    rotation: bool,
    capacity: usize,
    store: Vec<F>,
    location: Vec<usize>,
    ref_count: Vec<u32>,
    start_free_region: usize,
    index_manager: IndexManager,
}

impl<F: CoordFloat> PointStore<F> {
    pub fn new(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        initial_capacity: usize,
        rotation: bool,
    ) -> Result<Self> {
        ensure_arg(dimensions > 0, "dimensions must be positive")?;
        ensure_arg(shingle_size > 0, "shingle size must be positive")?;
        ensure_arg(
            dimensions % shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        ensure_arg(capacity > 0, "capacity must be positive")?;
        ensure_arg(!rotation || shingle_size > 1, "rotation requires shingling")?;
        let initial = initial_capacity.clamp(1, capacity);
        Ok(PointStore {
            dimensions,
            base_dimension: dimensions / shingle_size,
            rotation,
            capacity,
            store: vec![F::zero(); initial * dimensions],
            location: vec![FREE; initial],
            ref_count: vec![0; initial],
            start_free_region: 0,
            index_manager: IndexManager::new(initial),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_rotation_enabled(&self) -> bool {
        self.rotation
    }

    /// Number of live handles.
    pub fn live_count(&self) -> usize {
        self.index_manager.used()
    }

    pub fn is_live(&self, handle: usize) -> bool {
        handle < self.ref_count.len() && self.ref_count[handle] > 0
    }

    pub fn ref_count(&self, handle: usize) -> usize {
        if handle < self.ref_count.len() {
            self.ref_count[handle] as usize
        } else {
            0
        }
    }

    fn max_store_len(&self) -> usize {
        // rotation padding can waste up to one shingle per point
        let factor = if self.rotation { 2 } else { 1 };
        factor * self.capacity * self.dimensions
    }

    /// Physical image of `point` rotated so that index 0 of storage holds
    /// logical coordinate `offset`.
    fn physical(&self, point: &[F], offset: usize) -> Vec<F> {
        if offset == 0 {
            return point.to_vec();
        }
        let mut out = vec![F::zero(); self.dimensions];
        for i in 0..self.dimensions {
            out[i] = point[(i + offset) % self.dimensions];
        }
        out
    }

    fn overlap_matches(&self, physical: &[F]) -> bool {
        let extra = self.dimensions - self.base_dimension;
        if extra == 0 || self.start_free_region < self.dimensions {
            return false;
        }
        let index = self.start_free_region - extra;
        if index % self.base_dimension != 0 {
            return false;
        }
        self.store[index..index + extra]
            .iter()
            .zip(&physical[..extra])
            .all(|(&a, &b)| a == b)
    }

    fn ensure_backing_space(&mut self) -> Result<()> {
        if self.start_free_region + self.dimensions <= self.store.len() {
            return Ok(());
        }
        self.compact()?;
        if self.start_free_region + self.dimensions <= self.store.len() {
            return Ok(());
        }
        let max_len = self.max_store_len();
        if self.start_free_region + self.dimensions > max_len {
            return Err(ForestError::ExhaustedCapacity {
                msg: "point store backing cannot grow further",
            });
        }
        let new_len = (self.store.len() * 2)
            .max(self.start_free_region + self.dimensions)
            .min(max_len);
        debug!("resizing point store backing to {} coordinates", new_len);
        self.store.resize(new_len, F::zero());
        Ok(())
    }

    fn ensure_slot_space(&mut self) -> Result<()> {
        if !self.index_manager.is_empty() {
            return Ok(());
        }
        if self.location.len() >= self.capacity {
            return Err(ForestError::ExhaustedCapacity {
                msg: "point store is full",
            });
        }
        let new_len = (self.location.len() * 2).min(self.capacity);
        self.location.resize(new_len, FREE);
        self.ref_count.resize(new_len, 0);
        self.index_manager.extend_capacity(new_len);
        Ok(())
    }

    /// Copies `point` into the store and returns a fresh handle with
    /// reference count one.
    pub fn add(&mut self, point: &[F]) -> Result<usize> {
        if point.len() != self.dimensions {
            return Err(ForestError::DimensionMismatch {
                expected: self.dimensions,
                actual: point.len(),
            });
        }
        self.ensure_backing_space()?;
        self.ensure_slot_space()?;
        let handle = self.index_manager.take()?;
        ensure_state(self.ref_count[handle] == 0, "allocated slot still referenced")?;
        self.ref_count[handle] = 1;

        let extra = self.dimensions - self.base_dimension;
        let overlap_offset = if self.rotation && self.start_free_region >= extra {
            (self.start_free_region - extra) % self.dimensions
        } else {
            0
        };
        let physical = if self.rotation {
            self.physical(point, overlap_offset)
        } else {
            point.to_vec()
        };
        if self.overlap_matches(&physical) {
            let index = self.start_free_region - extra;
            self.location[handle] = index / self.base_dimension;
            self.store[self.start_free_region..self.start_free_region + self.base_dimension]
                .copy_from_slice(&physical[extra..]);
            self.start_free_region += self.base_dimension;
        } else {
            let index = self.start_free_region;
            let physical = if self.rotation {
                self.physical(point, index % self.dimensions)
            } else {
                physical
            };
            self.location[handle] = index / self.base_dimension;
            self.store[index..index + self.dimensions].copy_from_slice(&physical);
            self.start_free_region += self.dimensions;
        }
        Ok(handle)
    }

    pub fn increment_ref(&mut self, handle: usize) -> Result<()> {
        if !self.is_live(handle) {
            return Err(ForestError::InvalidHandle { handle });
        }
        self.ref_count[handle] += 1;
        Ok(())
    }

    pub fn decrement_ref(&mut self, handle: usize) -> Result<()> {
        if !self.is_live(handle) {
            return Err(ForestError::InvalidHandle { handle });
        }
        self.ref_count[handle] -= 1;
        if self.ref_count[handle] == 0 {
            self.index_manager.release(handle)?;
            self.location[handle] = FREE;
        }
        Ok(())
    }

    /// Raw stored coordinates plus the rotation offset needed to read them in
    /// logical order.
    pub fn reference(&self, handle: usize) -> Result<(&[F], usize)> {
        if !self.is_live(handle) {
            return Err(ForestError::InvalidHandle { handle });
        }
        let start = self.location[handle] * self.base_dimension;
        let offset = if self.rotation {
            start % self.dimensions
        } else {
            0
        };
        Ok((&self.store[start..start + self.dimensions], offset))
    }

    /// Logical copy of the stored vector.
    pub fn get(&self, handle: usize) -> Result<Vec<F>> {
        let (reference, offset) = self.reference(handle)?;
        if offset == 0 {
            return Ok(reference.to_vec());
        }
        let mut out = vec![F::zero(); self.dimensions];
        for (i, &v) in reference.iter().enumerate() {
            out[(i + offset) % self.dimensions] = v;
        }
        Ok(out)
    }

    /// Bit-exact comparison of `point` (in logical order) against a stored
    /// vector. Coalescing in the trees depends on exact identity, not on
    /// tolerance comparison.
    pub fn point_equals(&self, handle: usize, point: &[F]) -> Result<bool> {
        if point.len() != self.dimensions {
            return Err(ForestError::DimensionMismatch {
                expected: self.dimensions,
                actual: point.len(),
            });
        }
        let (reference, offset) = self.reference(handle)?;
        Ok(reference
            .iter()
            .enumerate()
            .all(|(i, &v)| point[(i + offset) % self.dimensions] == v))
    }

    /// Applies the per-component refcount deltas of one forest update: one
    /// increment per admitted handle, one decrement per evicted handle.
    pub fn adjust_counts(&mut self, results: &[(Option<usize>, Option<usize>)]) -> Result<()> {
        for (inserted, evicted) in results {
            if let Some(handle) = inserted {
                self.increment_ref(*handle)?;
                if let Some(old) = evicted {
                    self.decrement_ref(*old)?;
                }
            }
        }
        Ok(())
    }

    /// Reclaims backing space by moving live blocks down in location order.
    /// Blocks that share storage stay merged; rotation alignment is preserved
    /// with zero padding.
    pub fn compact(&mut self) -> Result<()> {
        let mut reverse: Vec<(usize, usize)> = self
            .location
            .iter()
            .enumerate()
            .filter(|(_, &loc)| loc != FREE)
            .map(|(handle, &loc)| (loc, handle))
            .collect();
        reverse.sort_unstable();

        let mut fresh_start = 0;
        let mut next = 0;
        let end = reverse.len();
        while next < end {
            let mut block_start = reverse[next].0 * self.base_dimension;
            let mut block_end = block_start + self.dimensions;
            let mut absorbed = next + 1;
            while absorbed < end {
                let elem = reverse[absorbed].0 * self.base_dimension;
                if elem <= block_end {
                    absorbed += 1;
                    if block_end < elem + self.dimensions {
                        block_end = elem + self.dimensions;
                    }
                } else {
                    break;
                }
            }
            if self.rotation {
                while fresh_start % self.dimensions != block_start % self.dimensions {
                    self.store[fresh_start] = F::zero();
                    fresh_start += 1;
                }
            }
            while block_start < block_end {
                self.store[fresh_start] = self.store[block_start];
                if next < absorbed && block_start == reverse[next].0 * self.base_dimension {
                    self.location[reverse[next].1] = fresh_start / self.base_dimension;
                    next += 1;
                }
                fresh_start += 1;
                block_start += 1;
            }
            ensure_state(next == absorbed, "compaction missed a live location")?;
        }
        debug!(
            "compacted point store: {} -> {} coordinates in use",
            self.start_free_region, fresh_start
        );
        self.start_free_region = fresh_start;
        Ok(())
    }

    pub fn size_hint(&self) -> usize {
        self.store.capacity() * std::mem::size_of::<F>()
            + self.location.capacity() * std::mem::size_of::<usize>()
            + self.ref_count.capacity() * std::mem::size_of::<u32>()
            + self.index_manager.size_hint()
            + std::mem::size_of::<PointStore<F>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shingles(count: usize, base: usize, shingle: usize) -> Vec<Vec<f32>> {
        // sliding shingles over the sequence 0, 1, 2, ...
        (0..count)
            .map(|t| {
                (0..shingle * base)
                    .map(|i| (t * base + i) as f32)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn add_get_round_trip() {
        let mut store: PointStore<f64> = PointStore::new(3, 1, 16, 4, false).unwrap();
        let a = store.add(&[1.0, 2.0, 3.0]).unwrap();
        let b = store.add(&[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(store.get(a).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(store.get(b).unwrap(), vec![4.0, 5.0, 6.0]);
        assert!(store.point_equals(a, &[1.0, 2.0, 3.0]).unwrap());
        assert!(!store.point_equals(a, &[1.0, 2.0, 3.5]).unwrap());
    }

    #[test]
    fn ref_count_lifecycle() {
        let mut store: PointStore<f64> = PointStore::new(2, 1, 8, 2, false).unwrap();
        let h = store.add(&[1.0, 2.0]).unwrap();
        store.increment_ref(h).unwrap();
        store.decrement_ref(h).unwrap();
        assert!(store.is_live(h));
        store.decrement_ref(h).unwrap();
        assert!(!store.is_live(h));
        assert_eq!(
            store.get(h),
            Err(ForestError::InvalidHandle { handle: h })
        );
        assert_eq!(
            store.increment_ref(h),
            Err(ForestError::InvalidHandle { handle: h })
        );
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut store: PointStore<f64> = PointStore::new(3, 1, 8, 2, false).unwrap();
        assert_eq!(
            store.add(&[1.0, 2.0]),
            Err(ForestError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn shingle_overlap_shares_storage() {
        let base = 2;
        let shingle = 4;
        let mut store: PointStore<f32> = PointStore::new(base * shingle, shingle, 64, 8, false).unwrap();
        let points = shingles(10, base, shingle);
        let handles: Vec<usize> = points.iter().map(|p| store.add(p).unwrap()).collect();
        // first point takes a full shingle, every following one a single block
        assert_eq!(
            store.start_free_region,
            base * shingle + (points.len() - 1) * base
        );
        for (h, p) in handles.iter().zip(&points) {
            assert_eq!(&store.get(*h).unwrap(), p);
        }
    }

    #[test]
    fn compaction_preserves_live_points() {
        let mut store: PointStore<f64> = PointStore::new(2, 1, 128, 8, false).unwrap();
        let mut live = Vec::new();
        for i in 0..64 {
            let h = store.add(&[i as f64, -(i as f64)]).unwrap();
            if i % 3 == 0 {
                live.push((h, vec![i as f64, -(i as f64)]));
            } else {
                store.decrement_ref(h).unwrap();
            }
        }
        store.compact().unwrap();
        for (h, p) in &live {
            assert_eq!(&store.get(*h).unwrap(), p);
        }
    }

    #[test]
    fn rotation_shares_ring_snapshots() {
        // cyclic shingles: each point is the previous ring buffer with one
        // block overwritten at the rotating phase
        let shingle = 4;
        let mut store: PointStore<f32> = PointStore::new(shingle, shingle, 64, 8, true).unwrap();
        let mut ring: Vec<f32> = (0..shingle).map(|i| i as f32).collect();
        let mut points = vec![ring.clone()];
        for t in shingle..(shingle + 5) {
            ring[t % shingle] = t as f32;
            points.push(ring.clone());
        }
        let handles: Vec<usize> = points.iter().map(|p| store.add(p).unwrap()).collect();
        // first point takes a full shingle, every following snapshot one block
        assert_eq!(store.start_free_region, shingle + (points.len() - 1));
        for (h, p) in handles.iter().zip(&points) {
            assert_eq!(&store.get(*h).unwrap(), p);
            assert!(store.point_equals(*h, p).unwrap());
        }
    }

    #[test]
    fn exhaustion_reports_full() {
        let mut store: PointStore<f64> = PointStore::new(2, 1, 2, 2, false).unwrap();
        store.add(&[0.0, 0.0]).unwrap();
        store.add(&[1.0, 1.0]).unwrap();
        assert!(matches!(
            store.add(&[2.0, 2.0]),
            Err(ForestError::ExhaustedCapacity { .. })
        ));
    }
}
