use crate::errors::{ensure_arg, ForestError, Result};

/// Allocator of integer slots in `[0, capacity)`.
///
/// Free space is kept as a stack of disjoint inclusive intervals in two
/// parallel arrays with a watermark of the last interval in use. `take` pops
/// from the top interval; `release` extends the top interval when the returned
/// index is adjacent to it on either side and pushes a unit interval
/// otherwise. The representation may occasionally keep two intervals that a
/// full merge would coalesce; it never loses or duplicates an index.
#[derive(Clone)]
pub struct IndexManager {
    capacity: usize,
    last_in_use: usize,
    interval_start: Vec<usize>,
    interval_end: Vec<usize>,
}

impl IndexManager {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        IndexManager {
            capacity,
            last_in_use: 1,
            interval_start: vec![0],
            interval_end: vec![capacity - 1],
        }
    }

    /// Rebuilds a manager from an occupancy bitmap, used when restoring
    /// persisted state. Free runs become one interval each.
    pub fn from_occupied(capacity: usize, occupied: &[bool]) -> Result<Self> {
        ensure_arg(occupied.len() == capacity, "bitmap length must equal capacity")?;
        let mut manager = IndexManager {
            capacity,
            last_in_use: 0,
            interval_start: Vec::new(),
            interval_end: Vec::new(),
        };
        let mut run_start: Option<usize> = None;
        for (i, &used) in occupied.iter().enumerate() {
            match (used, run_start) {
                (false, None) => run_start = Some(i),
                (true, Some(start)) => {
                    manager.push_interval(start, i - 1);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            manager.push_interval(start, capacity - 1);
        }
        Ok(manager)
    }

    fn push_interval(&mut self, start: usize, end: usize) {
        if self.last_in_use < self.interval_start.len() {
            self.interval_start[self.last_in_use] = start;
            self.interval_end[self.last_in_use] = end;
        } else {
            self.interval_start.push(start);
            self.interval_end.push(end);
        }
        self.last_in_use += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.last_in_use == 0
    }

    /// Number of free indices remaining.
    pub fn available(&self) -> usize {
        (0..self.last_in_use)
            .map(|i| self.interval_end[i] - self.interval_start[i] + 1)
            .sum()
    }

    /// Number of indices currently vended.
    pub fn used(&self) -> usize {
        self.capacity - self.available()
    }

    /// Vends a free index, or fails when none remain.
    pub fn take(&mut self) -> Result<usize> {
        if self.is_empty() {
            return Err(ForestError::ExhaustedCapacity {
                msg: "no free indices left",
            });
        }
        let top = self.last_in_use - 1;
        let answer = self.interval_start[top];
        if answer == self.interval_end[top] {
            self.last_in_use -= 1;
        } else {
            self.interval_start[top] = answer + 1;
        }
        Ok(answer)
    }

    /// Returns an index to the free pool. Releasing an out-of-range or
    /// already-free index is a caller bug and fails fast.
    pub fn release(&mut self, index: usize) -> Result<()> {
        ensure_arg(index < self.capacity, "released index out of range")?;
        for i in 0..self.last_in_use {
            ensure_arg(
                index < self.interval_start[i] || index > self.interval_end[i],
                "released index is already free",
            )?;
        }
        if self.last_in_use != 0 {
            let top = self.last_in_use - 1;
            if self.interval_start[top] == index + 1 {
                self.interval_start[top] = index;
                return Ok(());
            }
            if self.interval_end[top] + 1 == index {
                self.interval_end[top] = index;
                return Ok(());
            }
        }
        self.push_interval(index, index);
        Ok(())
    }

    /// Appends `[capacity, new_capacity)` to the free pool.
    pub fn extend_capacity(&mut self, new_capacity: usize) {
        if new_capacity > self.capacity {
            let start = self.capacity;
            self.capacity = new_capacity;
            self.push_interval(start, new_capacity - 1);
        }
    }

    pub fn size_hint(&self) -> usize {
        self.interval_start.capacity() * 2 * std::mem::size_of::<usize>()
            + std::mem::size_of::<IndexManager>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use std::collections::HashSet;

    #[test]
    fn take_and_release_round_trip() {
        let mut manager = IndexManager::new(4);
        let a = manager.take().unwrap();
        let b = manager.take().unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.used(), 2);
        manager.release(a).unwrap();
        assert_eq!(manager.used(), 1);
        let c = manager.take().unwrap();
        assert_ne!(c, b);
    }

    #[test]
    fn exhaustion_fails() {
        let mut manager = IndexManager::new(2);
        manager.take().unwrap();
        manager.take().unwrap();
        assert_eq!(
            manager.take(),
            Err(ForestError::ExhaustedCapacity {
                msg: "no free indices left"
            })
        );
    }

    #[test]
    fn double_release_fails() {
        let mut manager = IndexManager::new(4);
        let a = manager.take().unwrap();
        manager.release(a).unwrap();
        assert!(manager.release(a).is_err());
        assert!(manager.release(100).is_err());
    }

    #[test]
    fn extend_capacity_adds_fresh_indices() {
        let mut manager = IndexManager::new(2);
        manager.take().unwrap();
        manager.take().unwrap();
        manager.extend_capacity(4);
        let vended: HashSet<usize> = (0..2).map(|_| manager.take().unwrap()).collect();
        assert_eq!(vended, HashSet::from([2, 3]));
    }

    #[test]
    fn from_occupied_reconstructs_free_runs() {
        let occupied = vec![true, false, false, true, false, true];
        let mut manager = IndexManager::from_occupied(6, &occupied).unwrap();
        assert_eq!(manager.used(), 3);
        let mut vended = HashSet::new();
        while !manager.is_empty() {
            vended.insert(manager.take().unwrap());
        }
        assert_eq!(vended, HashSet::from([1, 2, 4]));
    }

    // Soundness under a random schedule: no index vended twice, nothing lost.
    #[test]
    fn random_schedule_is_sound() {
        let capacity = 64;
        let mut manager = IndexManager::new(capacity);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut held: Vec<usize> = Vec::new();
        for _ in 0..10_000 {
            if held.is_empty() || (held.len() < capacity && rng.gen::<bool>()) {
                let index = manager.take().unwrap();
                assert!(!held.contains(&index), "index vended twice");
                held.push(index);
            } else {
                let position = rng.gen_range(0..held.len());
                let index = held.swap_remove(position);
                manager.release(index).unwrap();
            }
            assert_eq!(manager.used(), held.len());
        }
    }
}
