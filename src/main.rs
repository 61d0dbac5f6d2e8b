use std::path::PathBuf;

use anyhow::{bail, Context};
use bollard::Docker;
use clap::{Parser, Subcommand};

use ruby_history_bench::{dashboard, ractor, runner, BenchmarkConfig, DateKey, Registry, ResultsStore};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the benchmark metadata document
    #[arg(long, default_value = "benchmarks.yml")]
    benchmarks: PathBuf,

    /// Path to the historical build registry
    #[arg(long, default_value = "builds.yml")]
    builds: PathBuf,

    /// Path to the directory holding per-benchmark result series
    #[arg(long, default_value = "results")]
    results: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one benchmark against one historical interpreter build
    Run {
        /// Name of the benchmark to run
        benchmark: Option<String>,

        /// Historical build date to run against (YYYYMMDD)
        #[arg(short, long)]
        date: Option<String>,

        /// Rerun and overwrite an already recorded date
        #[arg(short, long)]
        force: bool,

        /// Run the ractor variant of the benchmark
        #[arg(short, long)]
        ractor: bool,

        /// Run a ractor-only benchmark (disjoint result namespace)
        #[arg(long)]
        ractor_only: bool,

        /// List configured benchmarks and exit
        #[arg(short, long)]
        list: bool,

        /// Path to the benchmark working tree mounted into the container
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Rebuild the consolidated dashboard summary from stored results
    Dashboard,
}

fn list_benchmarks(config: &BenchmarkConfig) {
    for metadata in config.iter() {
        println!(
            "{:<32} {:<12} {}",
            metadata.name,
            metadata.category,
            if metadata.ractor { "ractor" } else { "" }
        );
    }
    if !config.ractor_only().is_empty() {
        println!("\nractor-only:");
        for name in config.ractor_only() {
            println!("  {name}");
        }
    }
}

async fn connect_docker() -> anyhow::Result<Docker> {
    log::info!("attempting to connect to Docker daemon...");
    let docker =
        Docker::connect_with_local_defaults().context("could not connect to Docker daemon")?;
    let version = docker
        .version()
        .await
        .context("could not get Docker version")?;
    log::info!(
        "connected to Docker daemon with version {} (api: {}, os/arch: {}/{})",
        version.version.as_ref().unwrap_or(&"unknown".to_string()),
        version
            .api_version
            .as_ref()
            .unwrap_or(&"unknown".to_string()),
        version.os.as_ref().unwrap_or(&"unknown".to_string()),
        version.arch.as_ref().unwrap_or(&"unknown".to_string()),
    );
    Ok(docker)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();
    env_logger::init();

    let args = Args::parse();

    let config = BenchmarkConfig::load(&args.benchmarks)?;

    match args.command {
        Command::Run { list: true, .. } => {
            list_benchmarks(&config);
            Ok(())
        }
        Command::Run {
            benchmark,
            date,
            force,
            ractor: use_ractor,
            ractor_only,
            workdir,
            ..
        } => {
            let Some(benchmark) = benchmark else {
                bail!("missing benchmark name, see `run --list` for configured benchmarks");
            };
            let Some(date) = date else {
                bail!("missing --date (YYYYMMDD)");
            };
            let date: DateKey = date.parse()?;
            let workdir = workdir
                .canonicalize()
                .context("could not canonicalize working tree path")?;

            let registry = Registry::load(&args.builds)?;
            let store = ResultsStore::new(&args.results);
            let docker = connect_docker().await?;

            if use_ractor || ractor_only {
                ractor::run(
                    &docker,
                    &config,
                    &registry,
                    &store,
                    &workdir,
                    &benchmark,
                    date,
                    force,
                    ractor_only,
                )
                .await
            } else {
                runner::run(
                    &docker, &config, &registry, &store, &workdir, &benchmark, date, force,
                )
                .await
            }
            .map_err(|err| {
                log::error!("{err:#}");
                err
            })
        }
        Command::Dashboard => {
            let registry = Registry::load(&args.builds)?;
            let store = ResultsStore::new(&args.results);
            let document = dashboard::build(&config, &registry, &store)?;
            dashboard::write(&store, &document)?;
            Ok(())
        }
    }
}
