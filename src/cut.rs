use crate::boundingbox::BoundingBox;
use crate::types::CoordFloat;

/// A cut dimension and threshold partitioning a bounding box. Points with
/// coordinate less than or equal to the value belong to the left side.
#[derive(Clone, Copy, Debug)]
pub struct Cut<F: CoordFloat> {
    pub dimension: usize,
    pub value: F,
}

impl<F: CoordFloat> Cut<F> {
    pub fn new(dimension: usize, value: F) -> Self {
        Cut { dimension, value }
    }

    pub fn is_left_of(&self, point: &[F]) -> bool {
        point[self.dimension] <= self.value
    }

    /// Draws a random cut on `bbox` grown by `point`, the draw weighted by
    /// per-dimension range. `factor` is a uniform sample in `[0, 1)`.
    ///
    /// Returns `None` when `point` lies inside `bbox` (no cut can separate).
    /// Otherwise returns the cut together with whether it separates `point`
    /// from the original box contents.
    pub fn random_cut_and_separation(
        bbox: &BoundingBox<F>,
        factor: f64,
        point: &[F],
    ) -> Option<(Cut<F>, bool)> {
        let extension = bbox.extension_sum(point, None);
        if extension == 0.0 {
            return None;
        }
        let mut remainder = (extension + bbox.range_sum()) * factor;

        let dimensions = point.len();
        let mut dim = dimensions - 1;
        let mut cut_value = F::zero();
        for i in 0..dimensions {
            let lo = if point[i] < bbox.min_values()[i] {
                point[i]
            } else {
                bbox.min_values()[i]
            };
            let hi = if point[i] > bbox.max_values()[i] {
                point[i]
            } else {
                bbox.max_values()[i]
            };
            let gap = hi.as_f64() - lo.as_f64();
            if gap > remainder || i == dimensions - 1 {
                // precision lost in the conversion; clamp back inside the gap
                let mut value = <F as crate::types::CoordFloat>::from_f64(lo.as_f64() + remainder);
                if !(value > lo) || !(value < hi) {
                    value = lo;
                }
                dim = i;
                cut_value = value;
                break;
            }
            remainder -= gap;
        }

        let min_value = bbox.min_values()[dim];
        let max_value = bbox.max_values()[dim];
        let separation = (point[dim] <= cut_value && cut_value < min_value)
            || (max_value <= cut_value && cut_value < point[dim]);
        Some((Cut::new(dim, cut_value), separation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_inside_box_yields_no_cut() {
        let bbox = BoundingBox::new(&[0.0f64, 0.0], &[1.0, 1.0]);
        assert!(Cut::random_cut_and_separation(&bbox, 0.3, &[0.5, 0.5]).is_none());
    }

    #[test]
    fn cut_on_degenerate_box_always_separates() {
        let bbox = BoundingBox::from_point(&[0.0f64, 0.0]);
        for factor in [0.0, 0.25, 0.5, 0.99] {
            let (cut, separation) =
                Cut::random_cut_and_separation(&bbox, factor, &[3.0, 4.0]).unwrap();
            assert!(separation);
            assert!(cut.dimension < 2);
        }
    }

    #[test]
    fn cut_value_lies_within_merged_range() {
        let bbox = BoundingBox::new(&[0.0f64, 0.0], &[1.0, 2.0]);
        let point = [4.0f64, -1.0];
        for factor in [0.01, 0.3, 0.6, 0.95] {
            let (cut, _) = Cut::random_cut_and_separation(&bbox, factor, &point).unwrap();
            let lo = bbox.min_values()[cut.dimension].min(point[cut.dimension]);
            let hi = bbox.max_values()[cut.dimension].max(point[cut.dimension]);
            assert!(cut.value >= lo && cut.value < hi);
        }
    }
}
