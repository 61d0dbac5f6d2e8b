//! Builds the consolidated dashboard summary from the stored series.
//!
//! A pure transform: the full results store is read, per-benchmark
//! baseline-relative speedup ratios and memory magnitudes are computed for the
//! reporting date, grouped by category, and one `summary.json` document is
//! rewritten from scratch.

use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;

use crate::{
    config::{BenchmarkConfig, Registry},
    output::BYTES_PER_MIB,
    store::{DateKey, ResultSeries, ResultsStore, SeriesKind},
};

/// File name of the summary document under the results root.
pub const SUMMARY_FILE: &str = "summary.json";

/// Four index-aligned sequences for one category: per-benchmark ratios (or
/// MiB magnitudes for `<category>_memory` buckets) and the benchmark names.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct CategoryBucket {
    /// No-JIT column: always 1.00 for timing buckets, raw MiB for memory.
    pub no_jit: Vec<f64>,
    /// YJIT column; 0.00 when the measurement is absent.
    pub yjit: Vec<f64>,
    /// ZJIT column; 0.00 when the measurement is absent.
    pub zjit: Vec<f64>,
    /// Benchmark names aligned with the value sequences.
    pub benchmarks: Vec<String>,
}

/// The full summary: category name (and its `_memory` twin) to bucket.
pub type DashboardDocument = BTreeMap<String, CategoryBucket>;

/// Rounds to two decimal places, half away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reporting date: the latest registry date present in the first benchmark's
/// series. Membership is probed against that one series only, so divergent
/// date coverage across benchmarks can skew the pick.
fn reporting_date(
    registry: &Registry,
    config: &BenchmarkConfig,
    times: &BTreeMap<String, ResultSeries>,
) -> Option<DateKey> {
    let probe = config.iter().next()?;
    let series = times.get(&probe.name)?;
    registry.dates().rev().find(|date| series.contains_key(date))
}

/// Computes the dashboard document for the latest reportable date.
///
/// Benchmarks without a no-JIT timing entry at the reporting date contribute
/// nothing to any bucket; absent YJIT/ZJIT measurements become an exact 0.00.
/// Memory buckets carry raw MiB magnitudes rather than ratios.
///
/// # Errors
///
/// Fails if any series file is corrupt or no registry date is present in the
/// probed series.
pub fn build(
    config: &BenchmarkConfig,
    registry: &Registry,
    store: &ResultsStore,
) -> anyhow::Result<DashboardDocument> {
    let mut times = BTreeMap::new();
    let mut memories = BTreeMap::new();
    for metadata in config.iter() {
        let time_series: ResultSeries = store.load(&metadata.name, SeriesKind::Times)?;
        let memory_series: ResultSeries = store.load(&metadata.name, SeriesKind::Memory)?;
        times.insert(metadata.name.clone(), time_series);
        memories.insert(metadata.name.clone(), memory_series);
    }

    let Some(date) = reporting_date(registry, config, &times) else {
        bail!("no registry date has stored results to report on");
    };
    log::info!("building dashboard summary for {date}");

    let mut document = DashboardDocument::new();
    for metadata in config.iter() {
        if let Some(&[Some(no_jit), yjit, zjit]) = times[&metadata.name].get(&date) {
            let bucket = document.entry(metadata.category.clone()).or_default();
            bucket.no_jit.push(1.0);
            bucket.yjit.push(yjit.map_or(0.0, |v| round2(no_jit / v)));
            bucket.zjit.push(zjit.map_or(0.0, |v| round2(no_jit / v)));
            bucket.benchmarks.push(metadata.name.clone());
        }

        if let Some(&[Some(no_jit), yjit, zjit]) = memories[&metadata.name].get(&date) {
            let bucket = document
                .entry(format!("{}_memory", metadata.category))
                .or_default();
            bucket.no_jit.push(round2(no_jit / BYTES_PER_MIB));
            bucket.yjit.push(yjit.map_or(0.0, |v| round2(v / BYTES_PER_MIB)));
            bucket.zjit.push(zjit.map_or(0.0, |v| round2(v / BYTES_PER_MIB)));
            bucket.benchmarks.push(metadata.name.clone());
        }
    }

    Ok(document)
}

/// Serializes the document to `summary.json` under the results root,
/// overwriting any prior summary.
///
/// # Errors
///
/// Fails if the results root cannot be created or the file cannot be written.
pub fn write(store: &ResultsStore, document: &DashboardDocument) -> anyhow::Result<PathBuf> {
    let path = store.root().join(SUMMARY_FILE);
    fs::create_dir_all(store.root()).context("could not create results directory")?;
    fs::write(&path, serde_json::to_string_pretty(document)?).context(format!(
        "could not write summary to {}",
        path.display()
    ))?;
    log::info!("wrote dashboard summary to {}", path.display());
    Ok(path)
}
