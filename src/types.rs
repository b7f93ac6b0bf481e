use std::fmt::Debug;

use num::{Float, FromPrimitive};

/// Shorthand for the bounds a point coordinate type must satisfy.
///
/// Implemented for `f32` (single precision, used with the compact tree
/// back-end) and `f64` (double precision, the default). Score arithmetic is
/// always carried out in `f64`; these conversions are the only bridge between
/// stored coordinates and scores.
pub trait CoordFloat:
    Float + FromPrimitive + PartialOrd + Copy + Debug + Send + Sync + 'static
{
    fn as_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl CoordFloat for f32 {
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl CoordFloat for f64 {
    fn as_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// L1 distance between two equal-length vectors.
pub fn l1_distance<F: CoordFloat>(a: &[F], b: &[F]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x.as_f64() - y.as_f64()).abs())
        .sum()
}

/// L2 distance between two equal-length vectors.
pub fn l2_distance<F: CoordFloat>(a: &[F], b: &[F]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x.as_f64() - y.as_f64();
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
