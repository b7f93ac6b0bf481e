use crate::density::InterpolationMeasure;
use crate::types::CoordFloat;
use crate::visitor::{NodeView, ScoringProfile, Visitor};

/// Collects the per-dimension interpolation measure used for density
/// estimates, alongside the usual score interpolation. A query equal to a
/// leaf switches to the shadow box so the estimate reflects the sample with
/// the query's own leaf left out.
pub struct InterpolationVisitor {
    profile: ScoringProfile,
    tree_mass: usize,
    score: f64,
    converged: bool,
    hit_duplicate: bool,
    measure: InterpolationMeasure,
}

impl InterpolationVisitor {
    pub fn new(dimensions: usize, tree_mass: usize, profile: ScoringProfile) -> Self {
        InterpolationVisitor {
            profile,
            tree_mass,
            score: 0.0,
            converged: false,
            hit_duplicate: false,
            measure: InterpolationMeasure::empty(dimensions, tree_mass as f64),
        }
    }
}

impl<F: CoordFloat> Visitor<F> for InterpolationVisitor {
    type Output = InterpolationMeasure;

    fn accept_leaf(&mut self, point: &[F], view: &NodeView<'_, F>) {
        if view.duplicate {
            self.score = (self.profile.damp)(view.mass, self.tree_mass)
                * (self.profile.score_seen)(view.depth, view.mass);
            self.hit_duplicate = true;
        } else {
            self.score = (self.profile.score_unseen)(view.depth, view.mass);
            if let Some(bbox) = view.bounding_box {
                self.measure.update(point, bbox, self.score);
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
            let new_value = (self.profile.score_unseen)(view.depth, view.mass);
            let probability = self.measure.update(point, bbox, new_value);
            if probability == 0.0 {
                self.converged = true;
            } else if !self.hit_duplicate {
                self.score = (1.0 - probability) * self.score + probability * new_value;
            }
        }
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.hit_duplicate
    }

    fn result(&self) -> InterpolationMeasure {
        let normalized = (self.profile.normalizer)(self.score, self.tree_mass);
        let mut answer = self.measure.clone();
        answer.measure.normalize(normalized);
        answer
    }
}
