//! Streaming driver: feeds cluster records into the three sub-dictionary
//! accumulators and finalizes them into dictionaries.
//!
//! Records are prepared sequentially (pattern expansion plus bias
//! estimation), then fanned out to the complete/signal/noise accumulators
//! as parallel read-only passes over the prepared batch. Per-record truth
//! problems (association miss, outlier) are recovered locally and only
//! counted; batch-level inconsistencies abort the batch before anything
//! is accumulated.

use crate::accumulator::TopologyAccumulator;
use crate::bias::{BiasEstimator, BiasSample};
use crate::config::BuilderConfig;
use crate::diagnostics::{BuildReport, DeltaSample, DictionarySummary};
use crate::dictionary::Dictionary;
use crate::grouping::build_dictionary;
use crate::pattern::{ClusterPattern, CodecError};
use log::{info, warn};
use nalgebra::Point2;
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;

/// Where a record's pattern comes from.
#[derive(Clone, Debug, Deserialize)]
pub enum PatternSource {
    /// Raw canonical pattern bytes.
    Raw(Vec<u8>),
    /// Reference into a previously built dictionary. Group references
    /// expand to the group's representative pattern.
    Indexed(u32),
}

/// Simulation-truth attachment for one cluster.
#[derive(Clone, Debug, Deserialize)]
pub struct TruthRecord {
    /// Valid track label: signal cluster. Noise otherwise.
    pub is_signal: bool,
    /// True local impact point as (row, col), pitch units. `None` means
    /// the truth association failed.
    pub local: Option<Point2<f64>>,
    /// Track momentum, for the optional low-momentum filter.
    pub momentum: Option<f64>,
}

/// One cluster observation from the external reader.
#[derive(Clone, Debug, Deserialize)]
pub struct ClusterRecord {
    pub pattern: PatternSource,
    pub truth: Option<TruthRecord>,
}

/// Batch-level failures; nothing from the failing batch is accumulated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("record {record} references dictionary id {id} but no prior dictionary was provided")]
    MissingPriorDictionary { record: usize, id: u32 },
    #[error("record {record} references id {id} unknown to the prior dictionary")]
    UnknownPatternId { record: usize, id: u32 },
    #[error("record {record}: {source}")]
    Pattern {
        record: usize,
        #[source]
        source: CodecError,
    },
}

enum Stream {
    Signal,
    Noise,
}

struct Prepared {
    pattern: ClusterPattern,
    bias: BiasSample,
    stream: Option<Stream>,
}

/// Accumulates an event stream into complete/signal/noise sub-dictionaries
/// and finalizes them into a [`DictionarySet`].
pub struct DictionaryBuilder {
    config: BuilderConfig,
    prior: Option<Dictionary>,
    complete: TopologyAccumulator,
    signal: TopologyAccumulator,
    noise: TopologyAccumulator,
    estimator: BiasEstimator,
    delta_samples: Vec<DeltaSample>,
    records: u64,
    started: Instant,
}

/// Finalized output of one build.
#[derive(Clone, Debug)]
pub struct DictionarySet {
    pub complete: Dictionary,
    pub signal: Dictionary,
    pub noise: Dictionary,
    pub report: BuildReport,
    /// Per-sample diagnostics, populated only with `save_delta_samples`.
    pub delta_samples: Vec<DeltaSample>,
}

impl DictionaryBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        let estimator = BiasEstimator::new(config.outlier_rejection_factor);
        Self {
            config,
            prior: None,
            complete: TopologyAccumulator::new(),
            signal: TopologyAccumulator::new(),
            noise: TopologyAccumulator::new(),
            estimator,
            delta_samples: Vec::new(),
            records: 0,
            started: Instant::now(),
        }
    }

    /// Supplies the dictionary the input stream was encoded against, for
    /// transparent expansion of `PatternSource::Indexed` records.
    pub fn with_prior_dictionary(mut self, prior: Dictionary) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Processes one batch of cluster records sharing a truth context.
    ///
    /// On error the whole batch is dropped: preparation runs to completion
    /// before any accumulator is touched.
    pub fn process_batch(&mut self, records: &[ClusterRecord]) -> Result<(), BuildError> {
        let prepared = self.prepare(records)?;

        let (complete, signal, noise) = (&mut self.complete, &mut self.signal, &mut self.noise);
        rayon::join(
            || {
                for p in &prepared {
                    complete.account(&p.pattern, p.bias);
                }
            },
            || {
                rayon::join(
                    || {
                        for p in prepared.iter().filter(|p| matches!(p.stream, Some(Stream::Signal))) {
                            signal.account(&p.pattern, p.bias);
                        }
                    },
                    || {
                        for p in prepared.iter().filter(|p| matches!(p.stream, Some(Stream::Noise))) {
                            noise.account(&p.pattern, p.bias);
                        }
                    },
                )
            },
        );
        self.records += prepared.len() as u64;
        Ok(())
    }

    fn prepare(&mut self, records: &[ClusterRecord]) -> Result<Vec<Prepared>, BuildError> {
        let mut prepared = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let pattern = self.expand_pattern(i, &record.pattern)?;
            let mut bias = BiasSample::Ignored;
            let stream = match &record.truth {
                None => None,
                Some(truth) => {
                    if truth.is_signal {
                        bias = self.bias_for(&pattern, truth);
                        Some(Stream::Signal)
                    } else {
                        Some(Stream::Noise)
                    }
                }
            };
            prepared.push(Prepared {
                pattern,
                bias,
                stream,
            });
        }
        Ok(prepared)
    }

    fn expand_pattern(
        &self,
        record: usize,
        source: &PatternSource,
    ) -> Result<ClusterPattern, BuildError> {
        match source {
            PatternSource::Raw(bytes) => ClusterPattern::from_bytes(bytes)
                .map_err(|source| BuildError::Pattern { record, source }),
            PatternSource::Indexed(id) => {
                let prior = self
                    .prior
                    .as_ref()
                    .ok_or(BuildError::MissingPriorDictionary { record, id: *id })?;
                prior
                    .pattern_for(*id)
                    .cloned()
                    .ok_or(BuildError::UnknownPatternId { record, id: *id })
            }
        }
    }

    fn bias_for(&mut self, pattern: &ClusterPattern, truth: &TruthRecord) -> BiasSample {
        let Some(local) = truth.local else {
            self.estimator.record_truth_miss();
            return BiasSample::Ignored;
        };
        if self.config.min_momentum > 0.0
            && truth.momentum.is_none_or(|p| p < self.config.min_momentum)
        {
            return BiasSample::Ignored;
        }
        // Deltas are captured before the outlier decision: rejected samples
        // stay in the offline record, only the statistics exclude them.
        if self.config.save_delta_samples {
            let (center_row, center_col) = pattern.center();
            self.delta_samples.push(DeltaSample {
                hash: pattern.topology_hash(),
                d_row: local.x - center_row,
                d_col: local.y - center_col,
            });
        }
        self.estimator
            .sample(pattern, &Point2::new(local.x, local.y))
    }

    /// Groups each sub-dictionary and returns the finalized set.
    pub fn finalize(self) -> DictionarySet {
        let counters = *self.estimator.counters();
        info!(
            "accumulation done: {} records, {} accepted bias samples, {} outliers, {} truth misses",
            self.records, counters.accepted, counters.outliers, counters.truth_misses
        );

        info!("complete dictionary:");
        let complete = build_dictionary(&self.complete, self.config.probability_threshold);
        if complete.is_empty() {
            warn!("complete dictionary is empty: zero observations accumulated");
        }
        info!("signal dictionary:");
        let signal = build_dictionary(&self.signal, self.config.signal_threshold);
        info!("noise dictionary:");
        let noise = build_dictionary(&self.noise, self.config.noise_threshold);

        let report = BuildReport {
            records: self.records,
            counters,
            complete: DictionarySummary::of(&complete),
            signal: DictionarySummary::of(&signal),
            noise: DictionarySummary::of(&noise),
            latency_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };
        DictionarySet {
            complete,
            signal,
            noise,
            report,
            delta_samples: self.delta_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pattern: &ClusterPattern) -> PatternSource {
        PatternSource::Raw(pattern.to_bytes())
    }

    fn pat(pixels: &[(u8, u8)]) -> ClusterPattern {
        ClusterPattern::from_pixels(2, 2, 0, 0, pixels).unwrap()
    }

    #[test]
    fn indexed_record_without_prior_dictionary_aborts_the_batch() {
        let mut builder = DictionaryBuilder::new(BuilderConfig::default());
        let records = vec![
            ClusterRecord {
                pattern: raw(&pat(&[(0, 0)])),
                truth: None,
            },
            ClusterRecord {
                pattern: PatternSource::Indexed(3),
                truth: None,
            },
        ];
        let err = builder.process_batch(&records).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingPriorDictionary { record: 1, id: 3 }
        );
        // Nothing from the failed batch was accumulated.
        let set = builder.finalize();
        assert!(set.complete.is_empty());
        assert_eq!(set.report.records, 0);
    }

    #[test]
    fn malformed_raw_pattern_aborts_the_batch() {
        let mut builder = DictionaryBuilder::new(BuilderConfig::default());
        let records = vec![ClusterRecord {
            pattern: PatternSource::Raw(vec![1, 1]),
            truth: None,
        }];
        assert!(matches!(
            builder.process_batch(&records).unwrap_err(),
            BuildError::Pattern { record: 0, .. }
        ));
    }

    #[test]
    fn truth_splits_records_across_sub_dictionaries() {
        let mut builder = DictionaryBuilder::new(BuilderConfig::default());
        let p = pat(&[(0, 0), (1, 1)]);
        let records = vec![
            ClusterRecord {
                pattern: raw(&p),
                truth: Some(TruthRecord {
                    is_signal: true,
                    local: Some(Point2::new(1.0, 1.0)),
                    momentum: None,
                }),
            },
            ClusterRecord {
                pattern: raw(&p),
                truth: Some(TruthRecord {
                    is_signal: false,
                    local: None,
                    momentum: None,
                }),
            },
            ClusterRecord {
                pattern: raw(&p),
                truth: None,
            },
        ];
        builder.process_batch(&records).unwrap();
        let set = builder.finalize();
        assert_eq!(set.report.complete.total_count, 3);
        assert_eq!(set.report.signal.total_count, 1);
        assert_eq!(set.report.noise.total_count, 1);
    }

    #[test]
    fn momentum_filter_drops_the_sample_but_keeps_the_observation() {
        let config = BuilderConfig {
            min_momentum: 0.5,
            save_delta_samples: true,
            ..Default::default()
        };
        let mut builder = DictionaryBuilder::new(config);
        let p = pat(&[(0, 0)]);
        let truth = |momentum| {
            Some(TruthRecord {
                is_signal: true,
                local: Some(Point2::new(1.2, 0.8)),
                momentum,
            })
        };
        let records = vec![
            ClusterRecord {
                pattern: raw(&p),
                truth: truth(Some(0.1)),
            },
            ClusterRecord {
                pattern: raw(&p),
                truth: truth(Some(2.0)),
            },
        ];
        builder.process_batch(&records).unwrap();
        let set = builder.finalize();
        assert_eq!(set.report.complete.total_count, 2);
        assert_eq!(set.report.counters.accepted, 1);
        assert_eq!(set.delta_samples.len(), 1);
    }

    #[test]
    fn saved_deltas_include_rejected_outliers() {
        let config = BuilderConfig {
            save_delta_samples: true,
            outlier_rejection_factor: 2.0,
            ..Default::default()
        };
        let mut builder = DictionaryBuilder::new(config);
        let p = pat(&[(0, 0), (1, 1)]);
        let (center_row, center_col) = p.center();
        // d_row = 20 = 10 x row_span: rejected from the statistics, but the
        // delta record is still written for offline inspection.
        let records = vec![ClusterRecord {
            pattern: raw(&p),
            truth: Some(TruthRecord {
                is_signal: true,
                local: Some(Point2::new(center_row + 20.0, center_col)),
                momentum: None,
            }),
        }];
        builder.process_batch(&records).unwrap();
        let set = builder.finalize();
        assert_eq!(set.report.counters.outliers, 1);
        assert_eq!(set.report.counters.accepted, 0);
        assert_eq!(set.delta_samples.len(), 1);
        let d = set.delta_samples[0];
        assert_eq!(d.hash, p.topology_hash());
        assert!((d.d_row - 20.0).abs() < 1e-12);
        assert_eq!(d.d_col, 0.0);
        assert_eq!(set.complete.slots()[0].stats().bias_samples, 0);
    }

    #[test]
    fn failed_truth_association_is_counted_not_fatal() {
        let mut builder = DictionaryBuilder::new(BuilderConfig::default());
        let records = vec![ClusterRecord {
            pattern: raw(&pat(&[(0, 0)])),
            truth: Some(TruthRecord {
                is_signal: true,
                local: None,
                momentum: None,
            }),
        }];
        builder.process_batch(&records).unwrap();
        let set = builder.finalize();
        assert_eq!(set.report.counters.truth_misses, 1);
        assert_eq!(set.report.complete.total_count, 1);
    }
}
