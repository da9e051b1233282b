//! Threshold partition of accumulated topologies into dictionary slots.
//!
//! Topologies whose empirical frequency reaches the retention threshold
//! keep their own slot; the rest are merged into one slot per shape class
//! so that every observed shape still maps to some valid ID. The tradeoff
//! bounds dictionary size against fidelity for rare shapes.

use crate::accumulator::{TopologyAccumulator, TopologyEntry};
use crate::dictionary::{Dictionary, ShapeClass, Slot, SlotStats};
use log::info;
use std::cmp::Reverse;
use std::collections::BTreeMap;

struct ClassAggregate<'a> {
    members: Vec<(u64, &'a TopologyEntry)>,
    count: u64,
    bias_samples: u64,
    bias_row_sum: f64,
    bias_col_sum: f64,
}

impl<'a> ClassAggregate<'a> {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            count: 0,
            bias_samples: 0,
            bias_row_sum: 0.0,
            bias_col_sum: 0.0,
        }
    }

    fn add(&mut self, hash: u64, entry: &'a TopologyEntry) {
        let (row_sum, col_sum) = entry.bias_sums();
        self.members.push((hash, entry));
        self.count += entry.count();
        self.bias_samples += entry.bias_samples();
        self.bias_row_sum += row_sum;
        self.bias_col_sum += col_sum;
    }

    /// Most frequent member; equal counts break toward the lower hash so
    /// repeated builds pick the same representative.
    fn representative(&self) -> (u64, &'a TopologyEntry) {
        *self
            .members
            .iter()
            .max_by_key(|(hash, entry)| (entry.count(), Reverse(*hash)))
            .unwrap()
    }
}

fn slot_stats(count: u64, bias_samples: u64, row_sum: f64, col_sum: f64) -> SlotStats {
    let (mean_d_row, mean_d_col) = if bias_samples > 0 {
        let n = bias_samples as f64;
        (row_sum / n, col_sum / n)
    } else {
        (0.0, 0.0)
    };
    SlotStats {
        count,
        bias_samples,
        mean_d_row,
        mean_d_col,
    }
}

/// Partitions the accumulated table into a finalized dictionary.
///
/// Slot IDs are assigned by descending count with ties broken by ascending
/// pattern hash, so identical statistics always produce an identical
/// dictionary. An empty table yields an empty dictionary, which callers
/// must handle explicitly.
pub fn build_dictionary(table: &TopologyAccumulator, threshold: f64) -> Dictionary {
    let total = table.total_count();
    if total == 0 {
        return Dictionary::default();
    }

    let mut slots: Vec<Slot> = Vec::new();
    // BTreeMap keeps class iteration deterministic independent of the
    // accumulation table's hash order.
    let mut rare: BTreeMap<ShapeClass, ClassAggregate> = BTreeMap::new();

    for (hash, entry) in table.entries() {
        let frequency = entry.count() as f64 / total as f64;
        if frequency >= threshold {
            let (row_sum, col_sum) = entry.bias_sums();
            slots.push(Slot::Individual {
                pattern: entry.pattern().clone(),
                hash,
                stats: slot_stats(entry.count(), entry.bias_samples(), row_sum, col_sum),
            });
        } else {
            rare.entry(ShapeClass::of(entry.pattern()))
                .or_insert_with(ClassAggregate::new)
                .add(hash, entry);
        }
    }

    let kept = slots.len();
    for (class, agg) in &rare {
        let (rep_hash, rep_entry) = agg.representative();
        let mut members: Vec<u64> = agg.members.iter().map(|&(h, _)| h).collect();
        members.sort_unstable();
        slots.push(Slot::Group {
            class: *class,
            representative: rep_entry.pattern().clone(),
            representative_hash: rep_hash,
            members,
            stats: slot_stats(
                agg.count,
                agg.bias_samples,
                agg.bias_row_sum,
                agg.bias_col_sum,
            ),
        });
    }

    slots.sort_by_key(|slot| (Reverse(slot.stats().count), slot.hash()));
    info!(
        "grouped {} topologies into {} slots ({} individual, {} groups), total count {}",
        table.len(),
        slots.len(),
        kept,
        rare.len(),
        total
    );
    Dictionary::from_slots(slots)
}
