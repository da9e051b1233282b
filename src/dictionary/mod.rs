//! The finalized topology dictionary: dense-ID slots plus lookup maps.
//!
//! A slot is either an individually-kept topology or a group standing in
//! for every rare topology of one shape class. Every pattern hash observed
//! during accumulation maps to exactly one slot, so downstream encoding can
//! always represent a cluster by a slot ID.

pub mod encode;

pub use encode::DictionaryDecodeError;

use crate::pattern::ClusterPattern;
use serde::Serialize;
use std::collections::HashMap;

/// Coarse bucket key for rare topologies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShapeClass {
    pub row_span: u8,
    pub col_span: u8,
    pub pixel_count: u16,
}

impl ShapeClass {
    pub fn of(pattern: &ClusterPattern) -> Self {
        Self {
            row_span: pattern.row_span(),
            col_span: pattern.col_span(),
            pixel_count: pattern.pixel_count(),
        }
    }
}

/// Statistics shared by both slot variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SlotStats {
    /// Aggregate observation count.
    pub count: u64,
    /// Valid bias samples behind the means.
    pub bias_samples: u64,
    /// Mean bias along the row axis, pitch units; 0 with no samples.
    pub mean_d_row: f64,
    /// Mean bias along the column axis, pitch units; 0 with no samples.
    pub mean_d_col: f64,
}

/// One dictionary slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// A topology frequent enough to keep on its own.
    Individual {
        pattern: ClusterPattern,
        hash: u64,
        stats: SlotStats,
    },
    /// All rare topologies of one shape class, represented by the most
    /// frequent member.
    Group {
        class: ShapeClass,
        representative: ClusterPattern,
        representative_hash: u64,
        /// Hashes of every member topology, sorted ascending.
        members: Vec<u64>,
        stats: SlotStats,
    },
}

impl Slot {
    pub fn is_group(&self) -> bool {
        matches!(self, Slot::Group { .. })
    }

    /// The pattern stored in the slot (the representative for groups).
    pub fn pattern(&self) -> &ClusterPattern {
        match self {
            Slot::Individual { pattern, .. } => pattern,
            Slot::Group { representative, .. } => representative,
        }
    }

    /// Hash of the stored pattern; used as the ordering tie-break.
    pub fn hash(&self) -> u64 {
        match self {
            Slot::Individual { hash, .. } => *hash,
            Slot::Group {
                representative_hash,
                ..
            } => *representative_hash,
        }
    }

    pub fn stats(&self) -> &SlotStats {
        match self {
            Slot::Individual { stats, .. } => stats,
            Slot::Group { stats, .. } => stats,
        }
    }

    /// Hashes resolving to this slot.
    pub fn member_hashes(&self) -> &[u64] {
        match self {
            Slot::Individual { hash, .. } => std::slice::from_ref(hash),
            Slot::Group { members, .. } => members,
        }
    }
}

/// Finalized dictionary. IDs are dense `[0, len)` in slot order.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    slots: Vec<Slot>,
    index: HashMap<u64, u32>,
}

impl Dictionary {
    /// Builds the hash index over `slots`. Slot order defines the IDs.
    pub fn from_slots(slots: Vec<Slot>) -> Self {
        let mut index = HashMap::new();
        for (id, slot) in slots.iter().enumerate() {
            for &hash in slot.member_hashes() {
                // First writer wins; duplicate member hashes only arise from
                // a full 64-bit hash collision between distinct masks.
                index.entry(hash).or_insert(id as u32);
            }
        }
        Self { slots, index }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Slot ID for an accumulated pattern hash. `None` means the hash was
    /// never observed during accumulation, which is a caller error.
    pub fn id_for(&self, hash: u64) -> Option<u32> {
        self.index.get(&hash).copied()
    }

    /// Stored pattern for a slot ID (representative for group slots).
    pub fn pattern_for(&self, id: u32) -> Option<&ClusterPattern> {
        self.slots.get(id as usize).map(Slot::pattern)
    }

    /// Whether the slot is a group; `None` for an out-of-range ID.
    pub fn is_group(&self, id: u32) -> Option<bool> {
        self.slots.get(id as usize).map(Slot::is_group)
    }

    /// Sum of slot counts; equals the accumulated total by construction.
    pub fn total_count(&self) -> u64 {
        self.slots.iter().map(|s| s.stats().count).sum()
    }
}

// Equality is over slot content only; the hash index is derived.
impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ClusterPattern;

    fn pat(pixels: &[(u8, u8)]) -> ClusterPattern {
        ClusterPattern::from_pixels(2, 2, 0, 0, pixels).unwrap()
    }

    fn stats(count: u64) -> SlotStats {
        SlotStats {
            count,
            ..Default::default()
        }
    }

    #[test]
    fn lookups_resolve_individuals_and_group_members() {
        let solo = pat(&[(0, 0)]);
        let rare_a = pat(&[(0, 1), (1, 0)]);
        let rare_b = pat(&[(0, 0), (1, 1)]);
        let dict = Dictionary::from_slots(vec![
            Slot::Individual {
                hash: solo.topology_hash(),
                pattern: solo.clone(),
                stats: stats(10),
            },
            Slot::Group {
                class: ShapeClass::of(&rare_a),
                representative: rare_a.clone(),
                representative_hash: rare_a.topology_hash(),
                members: vec![rare_a.topology_hash(), rare_b.topology_hash()],
                stats: stats(2),
            },
        ]);

        assert_eq!(dict.id_for(solo.topology_hash()), Some(0));
        assert_eq!(dict.id_for(rare_a.topology_hash()), Some(1));
        assert_eq!(dict.id_for(rare_b.topology_hash()), Some(1));
        assert_eq!(dict.id_for(0xdead_beef), None);
        assert_eq!(dict.is_group(0), Some(false));
        assert_eq!(dict.is_group(1), Some(true));
        assert_eq!(dict.is_group(2), None);
        assert_eq!(dict.pattern_for(1), Some(&rare_a));
        assert_eq!(dict.total_count(), 12);
    }

    #[test]
    fn empty_dictionary_is_well_formed() {
        let dict = Dictionary::default();
        assert!(dict.is_empty());
        assert_eq!(dict.id_for(0), None);
        assert_eq!(dict.pattern_for(0), None);
        assert_eq!(dict.total_count(), 0);
    }
}
