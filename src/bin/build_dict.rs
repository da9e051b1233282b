//! Demo driver: builds topology dictionaries from a JSON record file.
//!
//! The records file holds an array of batches, each an array of cluster
//! records (one batch per truth context). The complete dictionary is
//! written to the configured outputs; when truth is present, signal and
//! noise dictionaries land next to it with a tagged file stem.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use topology_dictionary::builder::{ClusterRecord, DictionaryBuilder, DictionarySet};
use topology_dictionary::config::{self, RuntimeConfig};
use topology_dictionary::diagnostics::write_json_file;
use topology_dictionary::Dictionary;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "build_dict".to_string());
    let config = config::parse_cli(&program)?;

    let batches = load_batches(&config.records_path)?;
    let mut builder = DictionaryBuilder::new(config.builder.clone());
    if let Some(path) = &config.prior_dictionary {
        builder = builder.with_prior_dictionary(load_prior(path)?);
    }

    for (i, batch) in batches.iter().enumerate() {
        println!("Processing batch {i} with {} clusters", batch.len());
        builder
            .process_batch(batch)
            .map_err(|e| format!("Batch {i} failed: {e}"))?;
    }

    let set = builder.finalize();
    print_summary(&set);
    write_outputs(&config, &set)
}

fn load_batches(path: &Path) -> Result<Vec<Vec<ClusterRecord>>, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read records {}: {e}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse records {}: {e}", path.display()))
}

fn load_prior(path: &Path) -> Result<Dictionary, String> {
    let bytes = fs::read(path)
        .map_err(|e| format!("Failed to read prior dictionary {}: {e}", path.display()))?;
    Dictionary::deserialize_binary(&bytes)
        .map_err(|e| format!("Failed to decode prior dictionary {}: {e}", path.display()))
}

fn print_summary(set: &DictionarySet) {
    let r = &set.report;
    println!(
        "Clusters: {} records, {} bias samples accepted (failed truth association {}); outliers {}",
        r.records, r.counters.accepted, r.counters.truth_misses, r.counters.outliers
    );
    for (name, s) in [
        ("complete", &r.complete),
        ("signal", &r.signal),
        ("noise", &r.noise),
    ] {
        println!(
            "  {name}: {} slots ({} individual, {} groups), total count {}",
            s.slots, s.individual, s.groups, s.total_count
        );
    }
    println!("Build took {:.1} ms", r.latency_ms);
}

fn write_outputs(config: &RuntimeConfig, set: &DictionarySet) -> Result<(), String> {
    let streams = [
        ("", &set.complete),
        ("signal", &set.signal),
        ("noise", &set.noise),
    ];
    if let Some(path) = &config.output.binary_out {
        for (tag, dict) in &streams {
            let path = tagged_path(path, tag);
            fs::write(&path, dict.serialize_binary())
                .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
            println!("Binary dictionary written to {}", path.display());
        }
    }
    if let Some(path) = &config.output.text_out {
        for (tag, dict) in &streams {
            let path = tagged_path(path, tag);
            fs::write(&path, dict.serialize_text())
                .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        }
    }
    if let Some(path) = &config.output.report_out {
        write_json_file(path, &set.report)?;
        println!("Build report written to {}", path.display());
    }
    if let Some(path) = &config.output.deltas_out {
        write_json_file(path, &set.delta_samples)?;
    }
    Ok(())
}

/// Inserts `tag` before the extension: `dict.bin` + `signal` -> `dict.signal.bin`.
fn tagged_path(path: &Path, tag: &str) -> PathBuf {
    if tag.is_empty() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("dict");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{tag}.{ext}"),
        None => format!("{stem}.{tag}"),
    };
    path.with_file_name(name)
}
