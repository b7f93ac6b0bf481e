/// Early-stopping rule for sequential forest traversals: per-tree results are
/// fed in one at a time and the traversal stops once the accumulator reports
/// convergence.
pub trait ConvergingAccumulator {
    fn accept(&mut self, value: f64);
    fn is_converged(&self) -> bool;
    fn accepted(&self) -> usize;
}

/// One-sided Hoeffding-style convergence: after a minimum number of accepted
/// values, converge once the half-width of the deviation band around the
/// running mean falls within `precision` times the mean's magnitude. Only
/// deviations in the critical direction count, so a metric where high values
/// matter is not held open by harmless low outliers (and vice versa).
pub struct OneSidedAccumulator {
    precision: f64,
    min_accepted: usize,
    high_is_critical: bool,
    count: usize,
    sum: f64,
    deviation_sq_sum: f64,
}

impl OneSidedAccumulator {
    pub fn new(precision: f64, min_accepted: usize, high_is_critical: bool) -> Self {
        assert!(precision > 0.0, "precision must be positive");
        assert!(min_accepted > 0, "must accept at least one value");
        OneSidedAccumulator {
            precision,
            min_accepted,
            high_is_critical,
            count: 0,
            sum: 0.0,
            deviation_sq_sum: 0.0,
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl ConvergingAccumulator for OneSidedAccumulator {
    fn accept(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        let mean = self.mean();
        let deviation = if self.high_is_critical {
            (value - mean).max(0.0)
        } else {
            (mean - value).max(0.0)
        };
        self.deviation_sq_sum += deviation * deviation;
    }

    fn is_converged(&self) -> bool {
        if self.count < self.min_accepted {
            return false;
        }
        let half_width = self.deviation_sq_sum.sqrt() / self.count as f64;
        half_width <= self.precision * self.mean().abs().max(f64::MIN_POSITIVE)
    }

    fn accepted(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_stream_converges_at_minimum() {
        let mut acc = OneSidedAccumulator::new(0.1, 5, true);
        for _ in 0..4 {
            acc.accept(1.0);
            assert!(!acc.is_converged());
        }
        acc.accept(1.0);
        assert!(acc.is_converged());
        assert_eq!(acc.accepted(), 5);
    }

    #[test]
    fn noisy_stream_stays_open() {
        let mut acc = OneSidedAccumulator::new(0.01, 3, true);
        for i in 0..20 {
            acc.accept(if i % 2 == 0 { 0.1 } else { 10.0 });
        }
        assert!(!acc.is_converged());
    }

    #[test]
    fn low_critical_direction_ignores_high_outliers() {
        let mut high = OneSidedAccumulator::new(0.05, 5, true);
        let mut low = OneSidedAccumulator::new(0.05, 5, false);
        for i in 0..50 {
            let value = if i % 10 == 9 { 4.0 } else { 1.0 };
            high.accept(value);
            low.accept(value);
        }
        assert!(!high.is_converged());
        assert!(low.is_converged());
    }
}
