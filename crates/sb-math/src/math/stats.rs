//! Streaming error accumulators.
//!
//! Fidelity metrics fold millions of per-point residuals; these helpers keep
//! the running sums in f64 with compensated summation so that the reported
//! RMSE of a lossless round trip is exactly zero and lossy results do not
//! drift with cloud size.

use serde::{Deserialize, Serialize};

/// Kahan-compensated running sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum
    }
}

/// Accumulates absolute residuals and reports mean, RMSE and max.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    count: u64,
    abs_sum: KahanSum,
    sq_sum: KahanSum,
    max: f64,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one residual. Non-finite residuals are ignored and do not count.
    pub fn push(&mut self, residual: f64) {
        if !residual.is_finite() {
            return;
        }
        let abs = residual.abs();
        self.count += 1;
        self.abs_sum.add(abs);
        self.sq_sum.add(abs * abs);
        if abs > self.max {
            self.max = abs;
        }
    }

    /// Record the Euclidean distance between two equally sized vectors.
    pub fn push_distance(&mut self, a: &[f64], b: &[f64]) {
        let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
        self.push(sq.sqrt());
    }

    /// Merge another accumulator into this one.
    pub fn merge(&mut self, other: &ErrorStats) {
        self.count += other.count;
        self.abs_sum.add(other.abs_sum.value());
        self.sq_sum.add(other.sq_sum.value());
        if other.max > self.max {
            self.max = other.max;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean absolute residual, `None` when nothing was recorded.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.abs_sum.value() / self.count as f64)
    }

    /// Mean squared residual, `None` when nothing was recorded.
    pub fn mse(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sq_sum.value() / self.count as f64)
    }

    pub fn rmse(&self) -> Option<f64> {
        self.mse().map(f64::sqrt)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn empty_stats_report_none() {
        let stats = ErrorStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.rmse(), None);
        assert_eq!(stats.max(), None);
    }

    #[test]
    fn zero_residuals_are_exactly_zero() {
        let mut stats = ErrorStats::new();
        for _ in 0..10_000 {
            stats.push(0.0);
        }
        assert_eq!(stats.rmse(), Some(0.0));
        assert_eq!(stats.mean(), Some(0.0));
        assert_eq!(stats.max(), Some(0.0));
    }

    #[test]
    fn known_values() {
        let mut stats = ErrorStats::new();
        stats.push(3.0);
        stats.push(-4.0);
        assert!(approx_eq(stats.mean().unwrap(), 3.5, 1e-12));
        assert!(approx_eq(stats.rmse().unwrap(), 12.5f64.sqrt(), 1e-12));
        assert_eq!(stats.max(), Some(4.0));
    }

    #[test]
    fn non_finite_residuals_are_skipped() {
        let mut stats = ErrorStats::new();
        stats.push(f64::NAN);
        stats.push(f64::INFINITY);
        stats.push(1.0);
        assert_eq!(stats.count(), 1);
    }

    #[test]
    fn distance_is_euclidean() {
        let mut stats = ErrorStats::new();
        stats.push_distance(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]);
        assert_eq!(stats.max(), Some(5.0));
    }

    #[test]
    fn kahan_sum_resists_cancellation() {
        let mut sum = KahanSum::new();
        sum.add(1.0);
        for _ in 0..1_000_000 {
            sum.add(1e-16);
        }
        assert!(approx_eq(sum.value(), 1.0 + 1e-10, 1e-14));
    }

    proptest! {
        #[test]
        fn merge_matches_single_pass(
            left in prop::collection::vec(-1e3f64..1e3, 0..64),
            right in prop::collection::vec(-1e3f64..1e3, 0..64),
        ) {
            let mut merged = ErrorStats::new();
            let mut other = ErrorStats::new();
            let mut single = ErrorStats::new();
            for v in &left {
                merged.push(*v);
                single.push(*v);
            }
            for v in &right {
                other.push(*v);
                single.push(*v);
            }
            merged.merge(&other);
            prop_assert_eq!(merged.count(), single.count());
            if let (Some(a), Some(b)) = (merged.rmse(), single.rmse()) {
                prop_assert!((a - b).abs() <= 1e-9 * (1.0 + b));
            }
            prop_assert_eq!(merged.max(), single.max());
        }

        #[test]
        fn rmse_bounds_mean_and_max(values in prop::collection::vec(-1e3f64..1e3, 1..64)) {
            let mut stats = ErrorStats::new();
            for v in &values {
                stats.push(*v);
            }
            let mean = stats.mean().unwrap();
            let rmse = stats.rmse().unwrap();
            let max = stats.max().unwrap();
            prop_assert!(mean <= rmse + 1e-9);
            prop_assert!(rmse <= max + 1e-9);
        }
    }
}
