//! Builder configuration: JSON config file plus a small CLI front end.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Knobs of the dictionary build itself.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Minimum empirical frequency for a topology to keep its own slot in
    /// the complete dictionary.
    pub probability_threshold: f64,
    /// Retention threshold for the signal-only dictionary.
    pub signal_threshold: f64,
    /// Retention threshold for the noise-only dictionary.
    pub noise_threshold: f64,
    /// Bias samples with |delta| above `factor * span` are discarded as
    /// outliers; 0 disables the check.
    pub outlier_rejection_factor: f64,
    /// Truth hits below this momentum contribute no bias sample; 0
    /// disables the filter.
    pub min_momentum: f64,
    /// Keep per-sample (hash, d_row, d_col) records for offline inspection.
    pub save_delta_samples: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 1e-6,
            signal_threshold: 1e-4,
            noise_threshold: 1e-4,
            outlier_rejection_factor: 2.0,
            min_momentum: 0.0,
            save_delta_samples: false,
        }
    }
}

/// Output destinations for the demo driver.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OutputConfig {
    /// Binary dictionary (complete stream).
    pub binary_out: Option<PathBuf>,
    /// Text dictionary (complete stream).
    pub text_out: Option<PathBuf>,
    /// JSON build report.
    pub report_out: Option<PathBuf>,
    /// JSON delta samples (needs `save_delta_samples`).
    pub deltas_out: Option<PathBuf>,
}

/// Full runtime configuration of the demo driver.
#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// JSON file holding the cluster record batches.
    pub records_path: PathBuf,
    /// Binary dictionary the input records were encoded against, if any.
    pub prior_dictionary: Option<PathBuf>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RuntimeConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}

/// Parses the demo CLI: a single config-file argument.
pub fn parse_cli(program: &str) -> Result<RuntimeConfig, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [arg] if arg == "-h" || arg == "--help" => Err(usage(program)),
        [path] => load_config(Path::new(path)),
        _ => Err(usage(program)),
    }
}

fn usage(program: &str) -> String {
    format!("Usage: {program} <config.json>")
}
