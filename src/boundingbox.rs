use crate::types::CoordFloat;

/// Axis-aligned minimum enclosing box of a point set, with a cached sum of
/// per-dimension ranges.
#[derive(Clone, Debug)]
pub struct BoundingBox<F: CoordFloat> {
    range_sum: f64,
    min_values: Vec<F>,
    max_values: Vec<F>,
}

impl<F: CoordFloat> BoundingBox<F> {
    pub fn new(first: &[F], second: &[F]) -> Self {
        debug_assert_eq!(first.len(), second.len());
        let min_values: Vec<F> = first
            .iter()
            .zip(second)
            .map(|(&x, &y)| if x < y { x } else { y })
            .collect();
        let max_values: Vec<F> = first
            .iter()
            .zip(second)
            .map(|(&x, &y)| if x > y { x } else { y })
            .collect();
        let range_sum = Self::compute_range_sum(&min_values, &max_values);
        BoundingBox {
            range_sum,
            min_values,
            max_values,
        }
    }

    pub fn from_point(point: &[F]) -> Self {
        BoundingBox {
            range_sum: 0.0,
            min_values: point.to_vec(),
            max_values: point.to_vec(),
        }
    }

    fn compute_range_sum(min_values: &[F], max_values: &[F]) -> f64 {
        min_values
            .iter()
            .zip(max_values)
            .map(|(&x, &y)| y.as_f64() - x.as_f64())
            .sum()
    }

    pub fn dimensions(&self) -> usize {
        self.min_values.len()
    }

    pub fn min_values(&self) -> &[F] {
        &self.min_values
    }

    pub fn max_values(&self) -> &[F] {
        &self.max_values
    }

    pub fn range_sum(&self) -> f64 {
        self.range_sum
    }

    pub fn range(&self, dimension: usize) -> f64 {
        self.max_values[dimension].as_f64() - self.min_values[dimension].as_f64()
    }

    pub fn contains(&self, point: &[F]) -> bool {
        self.min_values
            .iter()
            .zip(point)
            .zip(&self.max_values)
            .all(|((&lo, &v), &hi)| lo <= v && v <= hi)
    }

    /// Grows the box to contain `point`; returns true when the box (and hence
    /// its range sum) was already large enough.
    pub fn add_point(&mut self, point: &[F]) -> bool {
        self.add_ranges(point, point)
    }

    /// Grows the box to contain `other`; returns true when nothing changed.
    pub fn add_box(&mut self, other: &BoundingBox<F>) -> bool {
        self.add_ranges(&other.min_values, &other.max_values)
    }

    fn add_ranges(&mut self, min_values: &[F], max_values: &[F]) -> bool {
        let old_sum = self.range_sum;
        for (x, &y) in self.min_values.iter_mut().zip(min_values) {
            if y < *x {
                *x = y;
            }
        }
        for (x, &y) in self.max_values.iter_mut().zip(max_values) {
            if y > *x {
                *x = y;
            }
        }
        self.range_sum = Self::compute_range_sum(&self.min_values, &self.max_values);
        old_sum == self.range_sum
    }

    /// Probability that a random cut on the box grown by `point` separates
    /// `point` from the current contents.
    pub fn separation_probability(&self, point: &[F]) -> f64 {
        let extension = self.extension_sum(point, None);
        if extension == 0.0 {
            return 0.0;
        }
        if self.range_sum == 0.0 {
            return 1.0;
        }
        extension / (self.range_sum + extension)
    }

    /// Same as `separation_probability`, ignoring dimensions flagged in
    /// `missing`.
    pub fn separation_probability_masked(&self, point: &[F], missing: &[bool]) -> f64 {
        let extension = self.extension_sum(point, Some(missing));
        if extension == 0.0 {
            return 0.0;
        }
        if self.range_sum == 0.0 {
            return 1.0;
        }
        extension / (self.range_sum + extension)
    }

    /// Sum over dimensions of how far `point` falls outside the box.
    pub(crate) fn extension_sum(&self, point: &[F], missing: Option<&[bool]>) -> f64 {
        let mut sum = 0.0;
        for i in 0..self.min_values.len() {
            if let Some(mask) = missing {
                if mask[i] {
                    continue;
                }
            }
            let v = point[i].as_f64();
            let lo = self.min_values[i].as_f64();
            let hi = self.max_values[i].as_f64();
            if v < lo {
                sum += lo - v;
            } else if v > hi {
                sum += v - hi;
            }
        }
        sum
    }
}
