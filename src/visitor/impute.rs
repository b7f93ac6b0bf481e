use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::types::{l1_distance, CoordFloat};
use crate::visitor::{MultiVisitor, NodeView, ScoringProfile, Visitor};

/// A per-tree imputation candidate: the query with missing coordinates filled
/// in, its anomaly rank under that tree, and the L1 distance from the leaf
/// that supplied the fill.
#[derive(Clone, Debug)]
pub struct Imputed<F: CoordFloat> {
    pub anomaly_rank: f64,
    pub point: Vec<F>,
    pub distance: f64,
}

#[derive(Clone)]
struct Branch<F: CoordFloat> {
    rank: f64,
    tiebreak: f64,
    frozen: bool,
    point: Vec<F>,
    distance: f64,
}

/// Branching visitor that imputes missing coordinates.
///
/// The traversal forks wherever the cut dimension is one of the missing
/// indexes; each branch fills the missing coordinates from the leaf it
/// reaches and scores the filled point like the anomaly score does. Branches
/// are compared by an adjusted rank mixing the normalized score with a
/// uniform tiebreak under `centrality`; the lower-ranked (more typical)
/// branch survives a combine. Once a branch's separation probability hits
/// zero its rank is frozen and propagates unchanged.
pub struct ImputeVisitor<F: CoordFloat> {
    missing: Vec<usize>,
    centrality: f64,
    tree_mass: usize,
    profile: ScoringProfile,
    rng: ChaCha20Rng,
    stack: Vec<Branch<F>>,
}

impl<F: CoordFloat> ImputeVisitor<F> {
    pub fn new(
        missing: &[usize],
        centrality: f64,
        tree_mass: usize,
        profile: ScoringProfile,
        seed: u64,
    ) -> Self {
        ImputeVisitor {
            missing: missing.to_vec(),
            centrality,
            tree_mass,
            profile,
            rng: ChaCha20Rng::seed_from_u64(seed),
            stack: Vec::new(),
        }
    }

    fn adjusted_rank(&self, branch: &Branch<F>) -> f64 {
        self.centrality * (self.profile.normalizer)(branch.rank, self.tree_mass)
            + (1.0 - self.centrality) * branch.tiebreak
    }
}

impl<F: CoordFloat> Visitor<F> for ImputeVisitor<F> {
    type Output = Imputed<F>;

    fn accept_leaf(&mut self, point: &[F], view: &NodeView<'_, F>) {
        let leaf_point = view.leaf_point.expect("traversal supplies the leaf point");
        let mut filled = point.to_vec();
        for &index in &self.missing {
            filled[index] = leaf_point[index];
        }
        let (rank, frozen) = if view.duplicate {
            (
                (self.profile.damp)(view.mass, self.tree_mass)
                    * (self.profile.score_seen)(view.depth, view.mass),
                true,
            )
        } else {
            ((self.profile.score_unseen)(view.depth, view.mass), false)
        };
        let distance = l1_distance(&filled, leaf_point);
        self.stack.push(Branch {
            rank,
            tiebreak: self.rng.gen(),
            frozen,
            point: filled,
            distance,
        });
    }

    fn accept(&mut self, _point: &[F], view: &NodeView<'_, F>) {
        if let Some(top) = self.stack.last_mut() {
            if top.frozen {
                return;
            }
            let probability = view.probability;
            if probability == 0.0 {
                top.frozen = true;
            } else {
                top.rank = (1.0 - probability) * top.rank
                    + probability * (self.profile.score_unseen)(view.depth, view.mass);
            }
        }
    }

    fn is_converged(&self) -> bool {
        self.stack.last().map_or(false, |branch| branch.frozen)
    }

    fn result(&self) -> Imputed<F> {
        assert_eq!(self.stack.len(), 1, "unbalanced impute traversal");
        let branch = &self.stack[0];
        Imputed {
            anomaly_rank: (self.profile.normalizer)(branch.rank, self.tree_mass),
            point: branch.point.clone(),
            distance: branch.distance,
        }
    }
}

impl<F: CoordFloat> MultiVisitor<F> for ImputeVisitor<F> {
    fn trigger(&self, cut_dimension: usize) -> bool {
        self.missing.contains(&cut_dimension)
    }

    fn new_copy(&mut self) -> Self {
        ImputeVisitor {
            missing: self.missing.clone(),
            centrality: self.centrality,
            tree_mass: self.tree_mass,
            profile: self.profile,
            rng: ChaCha20Rng::seed_from_u64(self.rng.next_u64()),
            stack: Vec::new(),
        }
    }

    fn combine(&mut self, mut other: Self) {
        let mine = self.stack.pop().expect("combine on an empty branch stack");
        let theirs = other
            .stack
            .pop()
            .expect("combined branch finished without a leaf");
        let frozen = mine.frozen || theirs.frozen;
        let mut chosen = if self.adjusted_rank(&mine) <= self.adjusted_rank(&theirs) {
            mine
        } else {
            theirs
        };
        chosen.frozen = frozen;
        self.stack.push(chosen);
    }
}
