//! Position-bias estimation against ground-truth impact points.
//!
//! When simulation truth is available, each cluster yields one bias sample:
//! the offset between the true local impact point and the bounding-box
//! center estimate, in pitch units. Samples whose magnitude exceeds the
//! pattern's own span by more than the configured factor are rejected as
//! outliers; rejections, acceptances and truth-association misses are
//! counted exactly and reported at the end of the build.

use crate::pattern::ClusterPattern;
use log::debug;
use nalgebra::Point2;
use serde::Serialize;

/// One position-bias observation, pitch-normalized.
///
/// `Ignored` stands in wherever no usable truth exists: no truth record,
/// failed association, momentum below the filter, or a rejected outlier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BiasSample {
    Valid { d_row: f64, d_col: f64 },
    Ignored,
}

impl BiasSample {
    pub fn is_valid(&self) -> bool {
        matches!(self, BiasSample::Valid { .. })
    }
}

/// Exact per-category event counts reported by the estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BiasCounters {
    /// Samples accepted into the statistics.
    pub accepted: u64,
    /// Samples rejected by the span-bound outlier check.
    pub outliers: u64,
    /// Clusters whose truth association could not be resolved.
    pub truth_misses: u64,
}

/// Computes bias samples and applies the outlier bound.
#[derive(Clone, Debug)]
pub struct BiasEstimator {
    rejection_factor: f64,
    counters: BiasCounters,
}

impl BiasEstimator {
    /// `rejection_factor` of 0 (or below) disables outlier rejection.
    pub fn new(rejection_factor: f64) -> Self {
        Self {
            rejection_factor,
            counters: BiasCounters::default(),
        }
    }

    /// Bias of `truth` (local impact point, pitch units, as (row, col))
    /// against the pattern's bounding-box center.
    ///
    /// Spans are counted in pixels and deltas arrive pitch-normalized, so
    /// both sides of the outlier comparison are in pixel-pitch units.
    pub fn sample(&mut self, pattern: &ClusterPattern, truth: &Point2<f64>) -> BiasSample {
        let (center_row, center_col) = pattern.center();
        let d_row = truth.x - center_row;
        let d_col = truth.y - center_col;
        if self.rejection_factor > 0.0 {
            let row_bound = pattern.row_span() as f64 * self.rejection_factor;
            let col_bound = pattern.col_span() as f64 * self.rejection_factor;
            if d_row.abs() > row_bound || d_col.abs() > col_bound {
                self.counters.outliers += 1;
                debug!(
                    "bias sample rejected: |d_row|={:.3} bound={:.3}, |d_col|={:.3} bound={:.3}",
                    d_row.abs(),
                    row_bound,
                    d_col.abs(),
                    col_bound
                );
                return BiasSample::Ignored;
            }
        }
        self.counters.accepted += 1;
        BiasSample::Valid { d_row, d_col }
    }

    /// Records a cluster whose ground truth could not be matched.
    pub fn record_truth_miss(&mut self) {
        self.counters.truth_misses += 1;
    }

    pub fn counters(&self) -> &BiasCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_pattern(row_span: u8, col_span: u8) -> ClusterPattern {
        ClusterPattern::from_pixels(row_span, col_span, 0, 0, &[(0, 0)]).unwrap()
    }

    #[test]
    fn sample_is_offset_from_bounding_box_center() {
        let mut est = BiasEstimator::new(2.0);
        let p = unit_pattern(2, 4);
        // Center at (1.0, 2.0).
        let s = est.sample(&p, &Point2::new(1.25, 1.5));
        assert_eq!(
            s,
            BiasSample::Valid {
                d_row: 0.25,
                d_col: -0.5
            }
        );
        assert_eq!(est.counters().accepted, 1);
        assert_eq!(est.counters().outliers, 0);
    }

    #[test]
    fn outlier_is_rejected_and_counted_once() {
        // d_row = 10 x row_span with k = 2 must be ignored.
        let mut est = BiasEstimator::new(2.0);
        let p = unit_pattern(1, 1);
        let s = est.sample(&p, &Point2::new(0.5 + 10.0, 0.5));
        assert_eq!(s, BiasSample::Ignored);
        assert_eq!(est.counters().outliers, 1);
        assert_eq!(est.counters().accepted, 0);
    }

    #[test]
    fn zero_factor_disables_rejection() {
        let mut est = BiasEstimator::new(0.0);
        let p = unit_pattern(1, 1);
        let s = est.sample(&p, &Point2::new(1000.0, 1000.0));
        assert!(s.is_valid());
        assert_eq!(est.counters().outliers, 0);
    }

    #[test]
    fn outlier_bound_is_in_pitch_units() {
        // Span 3 px with k = 2 keeps |delta| up to 6 pitch units, inclusive
        // comparison is strict-greater as in the rejection rule.
        let mut est = BiasEstimator::new(2.0);
        let p = unit_pattern(3, 3);
        let center = p.center();
        assert!(est.sample(&p, &Point2::new(center.0 + 6.0, center.1)).is_valid());
        assert_eq!(
            est.sample(&p, &Point2::new(center.0 + 6.0 + 1e-9, center.1)),
            BiasSample::Ignored
        );
    }

    #[test]
    fn truth_misses_are_counted_separately() {
        let mut est = BiasEstimator::new(2.0);
        est.record_truth_miss();
        est.record_truth_miss();
        assert_eq!(
            *est.counters(),
            BiasCounters {
                accepted: 0,
                outliers: 0,
                truth_misses: 2
            }
        );
    }
}
