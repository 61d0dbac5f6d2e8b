//! Runner variant for concurrency-structured (ractor) benchmarks.
//!
//! Same preconditions and idempotence as the plain runner, but each JIT
//! configuration produces grouped per-worker-count iteration timings instead
//! of a single scalar, and results live in their own namespace.

use std::{collections::BTreeMap, path::Path};

use anyhow::bail;
use bollard::Docker;

use crate::{
    config::{BenchmarkConfig, Registry},
    container::ContainerSession,
    output,
    runner::{cache_hit, resolve_sha, JitConfig, HARNESS},
    store::{DateKey, RactorGroups, RactorSeries, ResultsStore, SeriesKind},
};

/// Resolves the result namespace and harness invocation flag for a ractor
/// run: ractor-only benchmarks store to a disjoint namespace and are invoked
/// with a different category flag than plain ractor-compatible benchmarks.
fn select_mode(
    config: &BenchmarkConfig,
    benchmark: &str,
    only: bool,
) -> anyhow::Result<(SeriesKind, &'static str)> {
    if only {
        if !config.is_ractor_only(benchmark) {
            bail!("'{benchmark}' is not a ractor-only benchmark, see `run --list`");
        }
        Ok((SeriesKind::RactorOnly, "--ractor-only"))
    } else {
        let Some(metadata) = config.get(benchmark) else {
            bail!("unknown benchmark '{benchmark}', see `run --list` for configured benchmarks");
        };
        if !metadata.ractor {
            bail!("'{benchmark}' is not marked ractor-compatible");
        }
        Ok((SeriesKind::Ractor, "--ractor"))
    }
}

/// Runs the ractor variant of a benchmark against the build for `date`.
///
/// With `only` set, the benchmark must come from the ractor-only list and the
/// results go to the disjoint ractor-only namespace; otherwise the benchmark
/// must be a ractor-compatible plain benchmark. A configuration whose output
/// contains no iteration lines is recorded as absent for that configuration.
///
/// # Errors
///
/// Fails on an unknown or ractor-incompatible benchmark, an unknown date,
/// Docker-level failures, or a store that cannot be read or written.
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
    only: bool,
) -> anyhow::Result<()> {
    let (kind, mode_flag) = select_mode(config, benchmark, only)?;
    let sha = resolve_sha(registry, date)?;

    let mut series: RactorSeries = store.load(benchmark, kind)?;
    if let Some(configs) = cache_hit(&series, date, force) {
        log::info!(
            "[{benchmark}] {date} already recorded for configurations [{}]; use --force to rerun",
            configs.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        return Ok(());
    }

    let session = ContainerSession::acquire(docker, date, sha, workdir).await?;
    let outcome = run_configs(&session, benchmark, mode_flag).await;
    session.reset_workdir().await;
    session.close().await;
    let configs = outcome?;

    series.insert(date, configs);
    store.save(benchmark, kind, &series)?;
    log::info!("[{benchmark}] recorded ractor results for {date}");
    Ok(())
}

async fn run_configs(
    session: &ContainerSession,
    benchmark: &str,
    mode_flag: &str,
) -> anyhow::Result<BTreeMap<String, RactorGroups>> {
    let mut configs = BTreeMap::new();

    for jit in JitConfig::ALL {
        let mut cmd = vec!["ruby"];
        if let Some(flag) = jit.flag() {
            cmd.push(flag);
        }
        cmd.extend([HARNESS, mode_flag, benchmark]);

        log::info!("[{benchmark}] running {jit} ractor configuration...");
        let out = session.exec(&cmd).await?;
        if !out.success() {
            log::warn!(
                "[{benchmark}] {jit} ractor run exited with status {}, recording no result and continuing...",
                out.exit_code
            );
            continue;
        }

        match output::parse_ractor(&out.stdout) {
            Some(groups) => {
                let iterations: usize = groups.values().map(Vec::len).sum();
                log::info!(
                    "[{benchmark}] {jit}: {iterations} iterations across {} worker counts",
                    groups.len()
                );
                configs.insert(jit.key().to_string(), groups);
            }
            None => log::warn!("[{benchmark}] no ractor iteration lines in {jit} output"),
        }
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_config(yaml: &str) -> BenchmarkConfig {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(yaml.as_bytes()).expect("write");
        BenchmarkConfig::load(file.path()).expect("load config")
    }

    #[test]
    fn mode_selection_separates_the_two_namespaces() {
        let config = load_config(
            "benchmarks:\n  fib:\n    ractor: true\n  getivar:\nractor_only:\n  - ractor_matmul\n",
        );

        let (kind, flag) = select_mode(&config, "fib", false).expect("ractor-compatible");
        assert_eq!(kind, SeriesKind::Ractor);
        assert_eq!(flag, "--ractor");

        let (kind, flag) = select_mode(&config, "ractor_matmul", true).expect("ractor-only");
        assert_eq!(kind, SeriesKind::RactorOnly);
        assert_eq!(flag, "--ractor-only");
    }

    #[test]
    fn mode_selection_rejects_incompatible_benchmarks() {
        let config = load_config(
            "benchmarks:\n  fib:\n    ractor: true\n  getivar:\nractor_only:\n  - ractor_matmul\n",
        );

        assert!(select_mode(&config, "getivar", false).is_err());
        assert!(select_mode(&config, "ractor_matmul", false).is_err());
        assert!(select_mode(&config, "fib", true).is_err());
        assert!(select_mode(&config, "nonexistent", false).is_err());
    }

    #[test]
    fn stored_ractor_date_is_a_cache_hit_unless_forced() {
        let date: DateKey = "20250801".parse().expect("valid date");
        let mut groups = RactorGroups::new();
        groups.insert("4".to_string(), vec![350.0]);
        let mut series = RactorSeries::new();
        series.insert(date, BTreeMap::from([("yjit".to_string(), groups)]));

        let hit = cache_hit(&series, date, false).expect("stored entry");
        assert!(hit.contains_key("yjit"));
        assert_eq!(cache_hit(&series, date, true), None);
    }
}
