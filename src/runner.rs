//! Orchestration for running one benchmark against one historical build.
//!
//! Drives the three JIT configurations in fixed order inside the per-date
//! container, scrapes timing and peak-memory figures out of the harness
//! output, and persists both series. A single configuration's failure is
//! recorded as an absent measurement and never aborts the remaining
//! configurations.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    path::Path,
};

use anyhow::bail;
use bollard::Docker;

use crate::{
    config::{BenchmarkConfig, Registry},
    container::ContainerSession,
    output,
    store::{ConfigSlots, DateKey, ResultSeries, ResultsStore, SeriesKind},
};

/// In-container entry point of the benchmark harness.
pub const HARNESS: &str = "run_benchmarks.rb";

/// Interpreter execution modes compared against each other, in fixed slot
/// order [no-JIT, YJIT, ZJIT].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitConfig {
    /// Plain interpreter, the baseline every ratio is computed against.
    None,
    /// `--yjit`.
    Yjit,
    /// `--zjit`.
    Zjit,
}

impl JitConfig {
    /// All configurations in slot order.
    pub const ALL: [Self; 3] = [Self::None, Self::Yjit, Self::Zjit];

    /// The interpreter flag selecting this configuration, if any.
    #[must_use]
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Yjit => Some("--yjit"),
            Self::Zjit => Some("--zjit"),
        }
    }

    /// Key used for this configuration in stored ractor results.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::None => "baseline",
            Self::Yjit => "yjit",
            Self::Zjit => "zjit",
        }
    }
}

impl Display for JitConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no-jit"),
            Self::Yjit => write!(f, "yjit"),
            Self::Zjit => write!(f, "zjit"),
        }
    }
}

/// Resolves the build SHA for a date, or fails naming the valid range.
pub(crate) fn resolve_sha<'a>(registry: &'a Registry, date: DateKey) -> anyhow::Result<&'a str> {
    match registry.sha(date) {
        Some(sha) => Ok(sha),
        None => match registry.span() {
            Some((first, last)) => bail!(
                "no interpreter build recorded for {date}, valid dates range from {first} to {last}"
            ),
            None => bail!("the build registry is empty"),
        },
    }
}

/// The stored entry to report for a cache hit: the date's value when it is
/// already recorded and `force` is unset, in which case no container work
/// happens.
pub(crate) fn cache_hit<T>(series: &BTreeMap<DateKey, T>, date: DateKey, force: bool) -> Option<&T> {
    if force {
        None
    } else {
        series.get(&date)
    }
}

fn format_slots(slots: &ConfigSlots) -> String {
    slots
        .iter()
        .map(|slot| slot.map_or_else(|| "absent".to_string(), |v| v.to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs one benchmark against the build for `date` and records the results.
///
/// If `date` already has a stored entry and `force` is false, the stored
/// values are reported and no container work happens. Otherwise the per-date
/// container is acquired, each JIT configuration is executed in order, and the
/// merged entry replaces any prior one in both the time and memory series. The
/// container's working tree is reset and the container removed on every exit
/// path past acquisition.
///
/// # Errors
///
/// Fails on an unknown benchmark or date, Docker-level failures, or a store
/// that cannot be read or written. Per-configuration benchmark failures are
/// recorded as absent measurements instead.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    docker: &Docker,
    config: &BenchmarkConfig,
    registry: &Registry,
    store: &ResultsStore,
    workdir: &Path,
    benchmark: &str,
    date: DateKey,
    force: bool,
) -> anyhow::Result<()> {
    if config.get(benchmark).is_none() {
        bail!("unknown benchmark '{benchmark}', see `run --list` for configured benchmarks");
    }
    let sha = resolve_sha(registry, date)?;

    let mut times: ResultSeries = store.load(benchmark, SeriesKind::Times)?;
    if let Some(slots) = cache_hit(&times, date, force) {
        log::info!(
            "[{benchmark}] {date} already recorded: [{}]; use --force to rerun",
            format_slots(slots)
        );
        return Ok(());
    }
    let mut memory: ResultSeries = store.load(benchmark, SeriesKind::Memory)?;

    let session = ContainerSession::acquire(docker, date, sha, workdir).await?;
    let outcome = run_configs(&session, benchmark).await;
    session.reset_workdir().await;
    session.close().await;
    let (time_slots, mem_slots) = outcome?;

    times.insert(date, time_slots);
    memory.insert(date, mem_slots);
    store.save(benchmark, SeriesKind::Times, &times)?;
    store.save(benchmark, SeriesKind::Memory, &memory)?;
    log::info!(
        "[{benchmark}] recorded {date}: times [{}], memory [{}]",
        format_slots(&time_slots),
        format_slots(&mem_slots)
    );
    Ok(())
}

async fn run_configs(
    session: &ContainerSession,
    benchmark: &str,
) -> anyhow::Result<(ConfigSlots, ConfigSlots)> {
    let mut time_slots = ConfigSlots::default();
    let mut mem_slots = ConfigSlots::default();

    for (slot, jit) in JitConfig::ALL.into_iter().enumerate() {
        let mut cmd = vec!["ruby"];
        if let Some(flag) = jit.flag() {
            cmd.push(flag);
        }
        cmd.extend([HARNESS, benchmark]);

        log::info!("[{benchmark}] running {jit} configuration...");
        let out = session.exec(&cmd).await?;
        if !out.success() {
            log::warn!(
                "[{benchmark}] {jit} run exited with status {}, recording no measurement and continuing...",
                out.exit_code
            );
            continue;
        }
        log::trace!("[{benchmark}] {jit} output:\n{}", out.stdout);

        time_slots[slot] = output::parse_timing(&out.stdout, benchmark);
        match time_slots[slot] {
            Some(elapsed) => log::info!("[{benchmark}] {jit}: {elapsed}"),
            None => log::warn!("[{benchmark}] no timing line found in {jit} output"),
        }

        mem_slots[slot] = output::parse_peak_bytes(&out.stdout);
        if mem_slots[slot].is_none() {
            log::warn!("[{benchmark}] no MAXRSS/RSS figure found in {jit} output");
        }
    }

    Ok((time_slots, mem_slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn jit_configs_are_in_fixed_slot_order() {
        assert_eq!(
            JitConfig::ALL,
            [JitConfig::None, JitConfig::Yjit, JitConfig::Zjit]
        );
        assert_eq!(JitConfig::None.flag(), None);
        assert_eq!(JitConfig::Yjit.flag(), Some("--yjit"));
        assert_eq!(JitConfig::Zjit.flag(), Some("--zjit"));
        assert_eq!(JitConfig::None.key(), "baseline");
    }

    #[test]
    fn unknown_date_reports_the_valid_range() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"\"20250801\": sha1\n\"20250815\": sha2\n")
            .expect("write");
        let registry = Registry::load(file.path()).expect("load");

        let err = resolve_sha(&registry, "20250901".parse().expect("valid date"))
            .expect_err("date is not in the registry");
        let message = err.to_string();
        assert!(message.contains("20250801"));
        assert!(message.contains("20250815"));

        assert!(resolve_sha(&registry, "20250801".parse().expect("valid date")).is_ok());
    }

    #[test]
    fn stored_date_is_a_cache_hit_unless_forced() {
        let date: DateKey = "20250801".parse().expect("valid date");
        let other: DateKey = "20250815".parse().expect("valid date");
        let mut series = ResultSeries::new();
        series.insert(date, [Some(100.0), Some(50.0), Some(40.0)]);

        assert_eq!(
            cache_hit(&series, date, false),
            Some(&[Some(100.0), Some(50.0), Some(40.0)])
        );
        assert_eq!(cache_hit(&series, date, true), None);
        assert_eq!(cache_hit(&series, other, false), None);
    }
}
