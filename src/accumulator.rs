//! Running per-topology statistics for one sub-dictionary stream.
//!
//! The accumulator maps pattern hashes to entries created lazily on first
//! observation. It is deliberately not thread-safe: each sub-dictionary
//! ("all", "signal", "noise") owns one instance fed from a single stream,
//! and independent instances never share state.

use crate::bias::BiasSample;
use crate::pattern::ClusterPattern;
use std::collections::HashMap;

/// Statistics for one distinct cluster shape.
#[derive(Clone, Debug)]
pub struct TopologyEntry {
    pattern: ClusterPattern,
    count: u64,
    bias_samples: u64,
    bias_row_sum: f64,
    bias_col_sum: f64,
    bias_row_sq_sum: f64,
    bias_col_sq_sum: f64,
}

impl TopologyEntry {
    fn new(pattern: ClusterPattern) -> Self {
        Self {
            pattern,
            count: 0,
            bias_samples: 0,
            bias_row_sum: 0.0,
            bias_col_sum: 0.0,
            bias_row_sq_sum: 0.0,
            bias_col_sq_sum: 0.0,
        }
    }

    fn observe(&mut self, bias: BiasSample) {
        self.count += 1;
        if let BiasSample::Valid { d_row, d_col } = bias {
            self.bias_samples += 1;
            self.bias_row_sum += d_row;
            self.bias_col_sum += d_col;
            self.bias_row_sq_sum += d_row * d_row;
            self.bias_col_sq_sum += d_col * d_col;
        }
    }

    pub fn pattern(&self) -> &ClusterPattern {
        &self.pattern
    }

    /// Observations of this shape; at least 1 for any entry in the table.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Valid bias samples folded into the sums.
    pub fn bias_samples(&self) -> u64 {
        self.bias_samples
    }

    pub fn bias_sums(&self) -> (f64, f64) {
        (self.bias_row_sum, self.bias_col_sum)
    }

    pub fn bias_sq_sums(&self) -> (f64, f64) {
        (self.bias_row_sq_sum, self.bias_col_sq_sum)
    }

    /// Mean bias per axis, or `None` when no valid sample was seen.
    pub fn mean_bias(&self) -> Option<(f64, f64)> {
        (self.bias_samples > 0).then(|| {
            let n = self.bias_samples as f64;
            (self.bias_row_sum / n, self.bias_col_sum / n)
        })
    }
}

/// Hash-keyed table of topology entries for one accumulation stream.
///
/// Entries with equal hash but differing masks are kept distinct: each
/// hash maps to a small bucket searched by full-mask compare, so a hash
/// collision can never merge two shapes.
#[derive(Clone, Debug, Default)]
pub struct TopologyAccumulator {
    table: HashMap<u64, Vec<TopologyEntry>>,
    total: u64,
}

impl TopologyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up or creates the entry for `pattern` and folds in one
    /// observation. Amortized O(1).
    pub fn account(&mut self, pattern: &ClusterPattern, bias: BiasSample) {
        let hash = pattern.topology_hash();
        let bucket = self.table.entry(hash).or_default();
        let entry = match bucket.iter().position(|e| e.pattern() == pattern) {
            Some(i) => &mut bucket[i],
            None => {
                bucket.push(TopologyEntry::new(pattern.clone()));
                bucket.last_mut().unwrap()
            }
        };
        entry.observe(bias);
        self.total += 1;
    }

    /// Sum of observation counts over all entries.
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of distinct shapes observed.
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterates (hash, entry) pairs in unspecified order; the grouping
    /// pass imposes its own deterministic ordering.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &TopologyEntry)> {
        self.table
            .iter()
            .flat_map(|(&hash, bucket)| bucket.iter().map(move |e| (hash, e)))
    }
}
