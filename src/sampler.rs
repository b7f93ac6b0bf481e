use log::warn;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// One reservoir slot: the stored handle, the stream position at admission
/// and the priority deciding its survival.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampledEntry {
    pub handle: usize,
    pub sequence_index: u64,
    pub weight_key: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct Evicted {
    pub handle: usize,
    pub sequence_index: u64,
    pub weight_key: f32,
}

/// Outcome of offering a stream position to the reservoir.
pub enum Offer {
    Reject,
    Admit { evicted: Option<Evicted> },
}

/// Weighted reservoir with exponential time decay.
///
/// Each offered stream position draws `weight_key = −λ·seq + ln(−ln U)`;
/// entries are kept in an array-backed max-heap on that key. While the
/// reservoir is not full every offer is admitted; afterwards an offer is
/// admitted exactly when its key beats (is below) the heap root, which is
/// evicted in exchange. Admission is two-phase — `offer` decides and evicts,
/// `confirm` records the handle the tree actually used, which can differ from
/// the offered one when the tree coalesced a duplicate.
pub struct TimeDecaySampler {
    capacity: usize,
    time_decay: f64,
    weights: Vec<f32>,
    handles: Vec<usize>,
    sequences: Vec<u64>,
    size: usize,
    pending: Option<(f32, u64)>,
    last_sequence: Option<u64>,
    rng: ChaCha20Rng,
}

impl TimeDecaySampler {
    pub fn new(capacity: usize, time_decay: f64, seed: u64) -> Self {
        assert!(capacity > 0, "sampler capacity must be positive");
        TimeDecaySampler {
            capacity,
            time_decay,
            weights: vec![0.0; capacity],
            handles: vec![usize::MAX; capacity],
            sequences: vec![0; capacity],
            size: 0,
            pending: None,
            last_sequence: None,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    fn weight_key(&mut self, sequence_index: u64) -> f32 {
        let mut u: f64 = self.rng.gen();
        if u <= 0.0 {
            u = f64::MIN_POSITIVE;
        }
        (f64::ln(-f64::ln(u)) - sequence_index as f64 * self.time_decay) as f32
    }

    /// Decides admission for the stream position `sequence_index`. On
    /// admission from a full reservoir the displaced entry is returned so the
    /// caller can delete it from its tree; the admission itself must be
    /// completed with `confirm`.
    pub fn offer(&mut self, sequence_index: u64) -> Offer {
        assert!(
            self.pending.is_none(),
            "offer called with an unconfirmed admission"
        );
        if let Some(last) = self.last_sequence {
            if sequence_index <= last {
                warn!(
                    "non-monotonic sequence index {} after {}",
                    sequence_index, last
                );
            }
        }
        self.last_sequence = Some(sequence_index);

        let weight = self.weight_key(sequence_index);
        if !self.is_full() {
            self.pending = Some((weight, sequence_index));
            return Offer::Admit { evicted: None };
        }
        if weight < self.weights[0] {
            let evicted = self.evict_max();
            self.pending = Some((weight, sequence_index));
            return Offer::Admit {
                evicted: Some(evicted),
            };
        }
        Offer::Reject
    }

    /// Completes an admission with the handle the tree stored.
    pub fn confirm(&mut self, handle: usize) {
        let (weight, sequence_index) = self
            .pending
            .take()
            .expect("confirm called without a pending admission");
        let mut current = self.size;
        self.size += 1;
        self.weights[current] = weight;
        self.handles[current] = handle;
        self.sequences[current] = sequence_index;
        while current > 0 {
            let parent = (current - 1) / 2;
            if self.weights[parent] < self.weights[current] {
                self.swap(parent, current);
                current = parent;
            } else {
                break;
            }
        }
    }

    /// Removes and returns the maximum-key entry. Usable repeatedly to shrink
    /// the reservoir.
    pub fn evict_max(&mut self) -> Evicted {
        assert!(self.size > 0, "evict from an empty sampler");
        let evicted = Evicted {
            handle: self.handles[0],
            sequence_index: self.sequences[0],
            weight_key: self.weights[0],
        };
        self.size -= 1;
        self.weights[0] = self.weights[self.size];
        self.handles[0] = self.handles[self.size];
        self.sequences[0] = self.sequences[self.size];
        self.sift_down(0);
        evicted
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.weights.swap(a, b);
        self.handles.swap(a, b);
        self.sequences.swap(a, b);
    }

    fn sift_down(&mut self, start: usize) {
        let mut current = start;
        while 2 * current + 1 < self.size {
            let mut largest = 2 * current + 1;
            let right = 2 * current + 2;
            if right < self.size && self.weights[right] > self.weights[largest] {
                largest = right;
            }
            if self.weights[largest] > self.weights[current] {
                self.swap(current, largest);
                current = largest;
            } else {
                break;
            }
        }
    }

    /// Entries in heap order: stable for re-initialization, meaningless for
    /// scoring.
    pub fn entries(&self) -> impl Iterator<Item = SampledEntry> + '_ {
        (0..self.size).map(|i| SampledEntry {
            handle: self.handles[i],
            sequence_index: self.sequences[i],
            weight_key: self.weights[i],
        })
    }

    /// Sequence indexes at which `handle` was admitted, for near-neighbor
    /// reporting.
    pub fn sequences_for(&self, handle: usize) -> Vec<u64> {
        (0..self.size)
            .filter(|&i| self.handles[i] == handle)
            .map(|i| self.sequences[i])
            .collect()
    }

    pub fn size_hint(&self) -> usize {
        self.weights.capacity() * std::mem::size_of::<f32>()
            + self.handles.capacity() * std::mem::size_of::<usize>()
            + self.sequences.capacity() * std::mem::size_of::<u64>()
            + std::mem::size_of::<TimeDecaySampler>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_unconditionally_until_full() {
        let mut sampler = TimeDecaySampler::new(8, 0.01, 7);
        for seq in 0..8 {
            match sampler.offer(seq) {
                Offer::Admit { evicted } => {
                    assert!(evicted.is_none());
                    sampler.confirm(seq as usize);
                }
                Offer::Reject => panic!("rejected before reaching capacity"),
            }
        }
        assert!(sampler.is_full());
    }

    #[test]
    fn full_reservoir_evicts_exactly_one_per_admission() {
        let capacity = 32;
        let mut sampler = TimeDecaySampler::new(capacity, 0.01, 11);
        let mut admissions = 0;
        for seq in 0..2000u64 {
            match sampler.offer(seq) {
                Offer::Admit { evicted } => {
                    if seq >= capacity as u64 {
                        assert!(evicted.is_some());
                    }
                    sampler.confirm(seq as usize);
                    admissions += 1;
                }
                Offer::Reject => {}
            }
            assert!(sampler.size() <= capacity);
            if seq >= capacity as u64 {
                assert_eq!(sampler.size(), capacity);
            }
        }
        assert!(admissions > capacity);
    }

    #[test]
    fn heap_order_is_maintained() {
        let mut sampler = TimeDecaySampler::new(64, 0.005, 3);
        for seq in 0..1000u64 {
            if let Offer::Admit { .. } = sampler.offer(seq) {
                sampler.confirm(seq as usize);
            }
        }
        let entries: Vec<SampledEntry> = sampler.entries().collect();
        for i in 0..entries.len() {
            for child in [2 * i + 1, 2 * i + 2] {
                if child < entries.len() {
                    assert!(entries[i].weight_key >= entries[child].weight_key);
                }
            }
        }
    }

    #[test]
    fn time_decay_biases_toward_recent_entries() {
        let mut sampler = TimeDecaySampler::new(64, 0.05, 19);
        for seq in 0..10_000u64 {
            if let Offer::Admit { .. } = sampler.offer(seq) {
                sampler.confirm(seq as usize);
            }
        }
        let mean_seq: f64 = sampler
            .entries()
            .map(|e| e.sequence_index as f64)
            .sum::<f64>()
            / sampler.size() as f64;
        assert!(mean_seq > 5_000.0);
    }

    #[test]
    fn sequences_are_reported_per_handle() {
        let mut sampler = TimeDecaySampler::new(8, 0.0, 23);
        for seq in 0..4u64 {
            if let Offer::Admit { .. } = sampler.offer(seq) {
                sampler.confirm(17);
            }
        }
        assert_eq!(sampler.sequences_for(17).len(), 4);
        assert!(sampler.sequences_for(99).is_empty());
    }
}
