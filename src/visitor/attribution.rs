use crate::divector::DiVector;
use crate::types::CoordFloat;
use crate::visitor::{NodeView, ScoringProfile, Visitor};

/// Splits the anomaly score into per-dimension, per-sign contributions.
///
/// The same interpolation as the scalar score runs on a `DiVector`: at every
/// step the separation probability is apportioned into the overshoot above
/// and the undershoot below the box in each dimension, so the vector's total
/// tracks the scalar score up to floating-point summation. A query equal to a
/// leaf keeps its damped seen score while the directional split continues
/// against the shadow box (the path with the query's own leaf excluded).
pub struct AnomalyAttributionVisitor {
    profile: ScoringProfile,
    tree_mass: usize,
    score: f64,
    converged: bool,
    hit_duplicate: bool,
    attribution: DiVector,
    scratch: DiVector,
}

impl AnomalyAttributionVisitor {
    pub fn new(dimensions: usize, tree_mass: usize, profile: ScoringProfile) -> Self {
        AnomalyAttributionVisitor {
            profile,
            tree_mass,
            score: 0.0,
            converged: false,
            hit_duplicate: false,
            attribution: DiVector::empty(dimensions),
            scratch: DiVector::empty(dimensions),
        }
    }
}

impl<F: CoordFloat> Visitor<F> for AnomalyAttributionVisitor {
    type Output = DiVector;

    fn accept_leaf(&mut self, point: &[F], view: &NodeView<'_, F>) {
        if view.duplicate {
            self.score = (self.profile.damp)(view.mass, self.tree_mass)
                * (self.profile.score_seen)(view.depth, view.mass);
            self.hit_duplicate = true;
        } else {
            self.score = (self.profile.score_unseen)(view.depth, view.mass);
            if let Some(bbox) = view.bounding_box {
                self.scratch.assign_separation(bbox, point);
                self.attribution.add_scaled(&self.scratch, self.score);
            }
        }
    }

    fn accept(&mut self, point: &[F], view: &NodeView<'_, F>) {
        if self.converged {
            return;
        }
        let bbox = if self.hit_duplicate {
            view.shadow_box
        } else {
            view.bounding_box
        };
        if let Some(bbox) = bbox {
            self.scratch.assign_separation(bbox, point);
            let probability = self.scratch.total();
            if probability == 0.0 {
                self.converged = true;
            } else {
                let new_value = (self.profile.score_unseen)(view.depth, view.mass);
                if !self.hit_duplicate {
                    self.score = (1.0 - probability) * self.score + probability * new_value;
                }
                self.attribution.scale(1.0 - probability);
                self.attribution.add_scaled(&self.scratch, new_value);
            }
        }
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.hit_duplicate
    }

    fn result(&self) -> DiVector {
        let normalized = (self.profile.normalizer)(self.score, self.tree_mass);
        let mut answer = self.attribution.clone();
        answer.normalize(normalized);
        answer
    }
}
