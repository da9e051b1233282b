#![doc = include_str!("../README.md")]

pub mod accumulator;
pub mod bias;
pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod dictionary;
pub mod grouping;
pub mod pattern;

// --- High-level re-exports -------------------------------------------------

// Main entry points: streaming builder + finalized dictionary.
pub use crate::builder::{BuildError, ClusterRecord, DictionaryBuilder, DictionarySet};
pub use crate::dictionary::{Dictionary, DictionaryDecodeError, Slot};
pub use crate::pattern::ClusterPattern;

/// Small prelude for quick experiments.
///
/// ```
/// use topology_dictionary::prelude::*;
///
/// let mut acc = TopologyAccumulator::new();
/// let cross = ClusterPattern::from_pixels(
///     3, 3, 0, 0,
///     &[(0, 1), (1, 0), (1, 1), (1, 2), (2, 1)],
/// ).unwrap();
/// acc.account(&cross, BiasSample::Ignored);
///
/// let dict = build_dictionary(&acc, 1e-6);
/// assert_eq!(dict.id_for(cross.topology_hash()), Some(0));
/// ```
pub mod prelude {
    pub use crate::accumulator::TopologyAccumulator;
    pub use crate::bias::{BiasEstimator, BiasSample};
    pub use crate::builder::{ClusterRecord, DictionaryBuilder, PatternSource, TruthRecord};
    pub use crate::config::BuilderConfig;
    pub use crate::grouping::build_dictionary;
    pub use crate::pattern::ClusterPattern;
    pub use crate::Dictionary;
}
