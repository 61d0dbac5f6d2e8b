//! Historical benchmarking harness for Ruby JIT configurations.
//!
//! ruby-history-bench runs Ruby interpreter benchmarks against historical builds
//! (identified by a YYYYMMDD date mapped to a commit SHA), executing them inside
//! Docker containers under three JIT configurations (no-JIT, YJIT, and ZJIT). Raw
//! harness output is scraped for timing and peak-memory figures, results are
//! persisted as per-benchmark time-series files, and a consolidated dashboard
//! summary can be rebuilt from the stored series at any time.
//!
//! # Usage
//! The crate is primarily designed to be used as an executable. Refer to the
//! output of the `--help` flag for the full interface:
//! ```console
//! $ ruby-history-bench run activerecord --date 20250801
//! $ ruby-history-bench dashboard
//! ```
//!
//! ## As a library
//! ```no_run
//! use bollard::Docker;
//! use ruby_history_bench::{runner, BenchmarkConfig, Registry, ResultsStore};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = BenchmarkConfig::load("benchmarks.yml".as_ref())?;
//! let registry = Registry::load("builds.yml".as_ref())?;
//! let store = ResultsStore::new("results");
//!
//! let docker = Docker::connect_with_local_defaults().expect("could not connect to Docker daemon");
//! runner::run(
//!     &docker,
//!     &config,
//!     &registry,
//!     &store,
//!     ".".as_ref(),
//!     "activerecord",
//!     "20250801".parse()?,
//!     false,
//! )
//! .await?;
//! #     Ok(())
//! # }
//! ```
//!
//! # Data flow
//! Runner(s) write per-benchmark series files under the results root; the
//! dashboard builder reads the full set of series plus the benchmark metadata
//! and rewrites one `summary.json`. The two never run concurrently against the
//! same data: invocations are expected to be serial, date-then-rerun.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

pub mod config;
pub mod container;
pub mod dashboard;
pub mod output;
pub mod ractor;
pub mod runner;
pub mod store;

pub use config::{BenchmarkConfig, BenchmarkMetadata, Registry};
pub use store::{DateKey, ResultsStore, SeriesKind};
