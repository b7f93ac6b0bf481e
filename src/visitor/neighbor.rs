use crate::types::{l2_distance, CoordFloat};
use crate::visitor::{NodeView, Visitor};

/// The leaf one tree routed the query to, when it lies within the distance
/// threshold.
#[derive(Clone, Debug)]
pub struct NeighborCandidate<F: CoordFloat> {
    pub handle: usize,
    pub point: Vec<F>,
    pub distance: f64,
    pub mass: usize,
}

/// Reports the routed-to leaf as a near neighbor if its L2 distance is within
/// the threshold. Only the leaf matters, so the visitor converges right after
/// visiting it.
pub struct NearNeighborVisitor<F: CoordFloat> {
    threshold: f64,
    visited: bool,
    found: Option<NeighborCandidate<F>>,
}

impl<F: CoordFloat> NearNeighborVisitor<F> {
    pub fn new(threshold: f64) -> Self {
        NearNeighborVisitor {
            threshold,
            visited: false,
            found: None,
        }
    }
}

impl<F: CoordFloat> Visitor<F> for NearNeighborVisitor<F> {
    type Output = Option<NeighborCandidate<F>>;

    fn accept_leaf(&mut self, point: &[F], view: &NodeView<'_, F>) {
        self.visited = true;
        if let Some(leaf_point) = view.leaf_point {
            let distance = l2_distance(point, leaf_point);
            if distance <= self.threshold {
                self.found = Some(NeighborCandidate {
                    handle: view.leaf_handle,
                    point: leaf_point.to_vec(),
                    distance,
                    mass: view.mass,
                });
            }
        }
    }

    fn accept(&mut self, _point: &[F], _view: &NodeView<'_, F>) {}

    fn is_converged(&self) -> bool {
        self.visited
    }

    fn result(&self) -> Option<NeighborCandidate<F>> {
        self.found.clone()
    }
}
