//! Report structures emitted at the end of a build, plus JSON output
//! helpers used by the demo driver.

use crate::bias::BiasCounters;
use crate::dictionary::Dictionary;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One bias sample kept with `save_delta_samples`, recorded before outlier
/// rejection: rejected deltas appear here but never in the statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DeltaSample {
    pub hash: u64,
    pub d_row: f64,
    pub d_col: f64,
}

/// Shape of one finalized dictionary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DictionarySummary {
    pub slots: usize,
    pub individual: usize,
    pub groups: usize,
    pub total_count: u64,
}

impl DictionarySummary {
    pub fn of(dict: &Dictionary) -> Self {
        let groups = dict.slots().iter().filter(|s| s.is_group()).count();
        Self {
            slots: dict.len(),
            individual: dict.len() - groups,
            groups,
            total_count: dict.total_count(),
        }
    }
}

/// End-of-build diagnostics covering all three sub-dictionaries.
#[derive(Clone, Debug, Serialize)]
pub struct BuildReport {
    /// Cluster records accumulated across all batches.
    pub records: u64,
    pub counters: BiasCounters,
    pub complete: DictionarySummary,
    pub signal: DictionarySummary,
    pub noise: DictionarySummary,
    pub latency_ms: f64,
}

/// Serializes a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON for {}: {e}", path.display()))?;
    fs::write(path, json).map_err(|e| format!("Failed to write JSON {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::TopologyAccumulator;
    use crate::bias::BiasSample;
    use crate::grouping::build_dictionary;
    use crate::pattern::ClusterPattern;

    #[test]
    fn summary_counts_individuals_and_groups() {
        let mut acc = TopologyAccumulator::new();
        let p1 = ClusterPattern::from_pixels(1, 1, 0, 0, &[(0, 0)]).unwrap();
        let p2 = ClusterPattern::from_pixels(2, 2, 0, 0, &[(0, 0), (1, 1)]).unwrap();
        for _ in 0..9 {
            acc.account(&p1, BiasSample::Ignored);
        }
        acc.account(&p2, BiasSample::Ignored);
        let summary = DictionarySummary::of(&build_dictionary(&acc, 0.5));
        assert_eq!(
            summary,
            DictionarySummary {
                slots: 2,
                individual: 1,
                groups: 1,
                total_count: 10
            }
        );
    }
}
