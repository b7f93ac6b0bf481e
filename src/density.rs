use crate::boundingbox::BoundingBox;
use crate::divector::DiVector;
use crate::types::CoordFloat;

/// Per-dimension interpolation state gathered along tree traversals: a
/// directional measure, the directional distances to box faces, and the
/// probability mass spent in each direction. Together these support simple
/// kernel-density estimates without retaining the sample itself.
#[derive(Clone, Debug)]
pub struct InterpolationMeasure {
    pub measure: DiVector,
    pub distance: DiVector,
    pub probability_mass: DiVector,
    pub sample_size: f64,
}

impl InterpolationMeasure {
    pub fn empty(dimensions: usize, sample_size: f64) -> Self {
        InterpolationMeasure {
            measure: DiVector::empty(dimensions),
            distance: DiVector::empty(dimensions),
            probability_mass: DiVector::empty(dimensions),
            sample_size,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.measure.dimensions()
    }

    pub fn add(&mut self, other: &InterpolationMeasure) {
        self.measure.add(&other.measure);
        self.distance.add(&other.distance);
        self.probability_mass.add(&other.probability_mass);
        self.sample_size += other.sample_size;
    }

    pub fn divide(&mut self, count: usize) {
        let factor = 1.0 / count as f64;
        self.scale(factor);
        self.sample_size *= factor;
    }

    pub fn scale(&mut self, factor: f64) {
        self.measure.scale(factor);
        self.distance.scale(factor);
        self.probability_mass.scale(factor);
    }

    /// Folds one traversal step into the measure: scales prior state by the
    /// probability of no separation and adds the directional contributions of
    /// `point` falling outside `bbox`, weighted by `measure_value`. Returns
    /// the separation probability.
    pub fn update<F: CoordFloat>(
        &mut self,
        point: &[F],
        bbox: &BoundingBox<F>,
        measure_value: f64,
    ) -> f64 {
        let extension = bbox.extension_sum(point, None);
        if extension == 0.0 {
            return 0.0;
        }
        let new_range = extension + bbox.range_sum();
        let probability = extension / new_range;
        self.scale(1.0 - probability);
        for i in 0..point.len() {
            let v = point[i].as_f64();
            let lo = bbox.min_values()[i].as_f64();
            let hi = bbox.max_values()[i].as_f64();
            if v > hi {
                let t = (v - hi) / new_range;
                self.distance.high[i] += t * (v - lo);
                self.probability_mass.high[i] += t;
                self.measure.high[i] += measure_value * t;
            } else if v < lo {
                let t = (lo - v) / new_range;
                self.distance.low[i] += t * (hi - v);
                self.probability_mass.low[i] += t;
                self.measure.low[i] += measure_value * t;
            }
        }
        probability
    }

    /// Directional measure scaled by an inverse volume factor computed from
    /// the observed directional distances, raised to `manifold_dimension`.
    pub fn directional_measure(&self, threshold: f64, manifold_dimension: f64) -> DiVector {
        assert!(
            self.sample_size >= 0.0 && self.measure.total() >= 0.0,
            "cannot have negative samples or measure"
        );
        if self.sample_size == 0.0 || self.measure.total() == 0.0 {
            return DiVector::empty(self.dimensions());
        }
        let mut sum_of_factors = 0.0;
        for i in 0..self.dimensions() {
            let mass = self.probability_mass.high_low_sum(i);
            let mut t = if mass > 0.0 {
                self.distance.high_low_sum(i) / mass
            } else {
                0.0
            };
            if t > 0.0 {
                t = f64::exp(f64::ln(t) * manifold_dimension) * mass;
            }
            sum_of_factors += t;
        }
        let density_factor = 1.0 / (threshold + sum_of_factors);
        let mut answer = self.measure.clone();
        answer.scale(density_factor);
        answer
    }

    pub fn directional_density(&self) -> DiVector {
        self.directional_measure(1e-3, self.dimensions() as f64)
    }

    /// Finishes the measure into the user-facing density estimate.
    pub fn finish(&self) -> DensityOutput {
        let directional = self.directional_density();
        DensityOutput {
            value: directional.total(),
            directional,
        }
    }
}

/// A simple kernel-density estimate at a query point: a scalar value plus the
/// per-dimension, per-sign decomposition it was summed from.
#[derive(Clone, Debug)]
pub struct DensityOutput {
    pub value: f64,
    pub directional: DiVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates_directional_mass() {
        let mut measure = InterpolationMeasure::empty(2, 1.0);
        let bbox = BoundingBox::new(&[0.0f64, 0.0], &[1.0, 1.0]);
        let p = measure.update(&[2.0f64, 0.5], &bbox, 0.5);
        assert!(p > 0.0);
        assert!(measure.probability_mass.high[0] > 0.0);
        assert_eq!(measure.probability_mass.low[0], 0.0);
        assert_eq!(measure.probability_mass.high_low_sum(1), 0.0);
    }

    #[test]
    fn update_inside_box_is_neutral() {
        let mut measure = InterpolationMeasure::empty(2, 1.0);
        let bbox = BoundingBox::new(&[0.0f64, 0.0], &[1.0, 1.0]);
        let p = measure.update(&[0.5f64, 0.5], &bbox, 0.5);
        assert_eq!(p, 0.0);
        assert_eq!(measure.measure.total(), 0.0);
    }

    #[test]
    fn empty_measure_yields_zero_density() {
        let measure = InterpolationMeasure::empty(3, 0.0);
        assert_eq!(measure.finish().value, 0.0);
    }
}
