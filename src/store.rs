//! Per-benchmark time-series persistence.
//!
//! Each benchmark owns a small set of line-oriented series files under a results
//! root: elapsed times, a `_memory` twin holding byte counts, and (for
//! concurrency benchmarks) a `_ractor` or `_ractor_only` namespace. Every file
//! maps a [`DateKey`] to one JSON value per line:
//!
//! ```text
//! 20250801: [100.0, 50.0, 40.0]
//! 20250815: [98.5, null, 39.2]
//! ```
//!
//! Files are rewritten in full, sorted ascending by date, on every update. The
//! write goes through a sibling temporary file and a rename so a partial write
//! can never corrupt previously stored dates.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// One measurement slot per JIT configuration, in fixed [no-JIT, YJIT, ZJIT]
/// order. `None` is a missing measurement, distinct from a genuine `0.0`.
pub type ConfigSlots = [Option<f64>; 3];

/// Scalar series: date to one measurement per JIT configuration.
pub type ResultSeries = BTreeMap<DateKey, ConfigSlots>;

/// Grouped ractor iteration timings: worker-count label to elapsed times in
/// milliseconds, per-label iteration order preserved.
pub type RactorGroups = BTreeMap<String, Vec<f64>>;

/// Ractor series: date to configuration name (`baseline`/`yjit`/`zjit`) to
/// grouped timings. Configurations whose output produced no iteration lines
/// are absent from the inner map.
pub type RactorSeries = BTreeMap<DateKey, BTreeMap<String, RactorGroups>>;

/// Error raised for a date key that is not a valid YYYYMMDD calendar date.
#[derive(Debug, Error)]
#[error("invalid date key '{0}' (expected YYYYMMDD)")]
pub struct DateKeyError(String);

/// An 8-digit YYYYMMDD calendar date identifying a historical interpreter
/// build. Orders chronologically.
///
/// # Examples
///
/// ```
/// use ruby_history_bench::DateKey;
///
/// let date: DateKey = "20250801".parse().expect("valid date");
///
/// assert_eq!(date.to_string(), "20250801");
/// assert!("20250230".parse::<DateKey>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(u32);

impl Display for DateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 8
            && s.bytes().all(|b| b.is_ascii_digit())
            && NaiveDate::parse_from_str(s, "%Y%m%d").is_ok()
        {
            Ok(Self(s.parse().map_err(|_| DateKeyError(s.to_string()))?))
        } else {
            Err(DateKeyError(s.to_string()))
        }
    }
}

/// Errors from reading or writing series files. A corrupt file aborts the
/// operation; there is no partial-tolerant parsing.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("could not access series file {path}: {source}")]
    Io {
        /// Path of the file being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A line did not have the `YYYYMMDD: <value>` shape.
    #[error("malformed line {line} in series file {path}")]
    MalformedLine {
        /// Path of the corrupt file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
    },
    /// The value half of a line was not valid JSON of the expected shape.
    #[error("invalid value on line {line} in series file {path}: {source}")]
    Value {
        /// Path of the corrupt file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A series entry could not be serialized.
    #[error("could not serialize series entry for {path}: {source}")]
    Serialize {
        /// Path of the file being written.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Which of a benchmark's series files to address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesKind {
    /// Elapsed-time measurements.
    Times,
    /// Peak-memory measurements in bytes.
    Memory,
    /// Ractor results in the namespace shared with plain benchmarks.
    Ractor,
    /// Ractor results for ractor-only benchmarks, a disjoint namespace.
    RactorOnly,
}

impl SeriesKind {
    fn file_name(self, benchmark: &str) -> String {
        match self {
            Self::Times => format!("{benchmark}.yml"),
            Self::Memory => format!("{benchmark}_memory.yml"),
            Self::Ractor => format!("{benchmark}_ractor.yml"),
            Self::RactorOnly => format!("{benchmark}_ractor_only.yml"),
        }
    }
}

/// Handle on the directory holding all per-benchmark series files.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    root: PathBuf,
}

impl ResultsStore {
    /// Creates a store rooted at the given directory. The directory is created
    /// lazily on the first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding the series files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one benchmark's series file of the given kind.
    #[must_use]
    pub fn path(&self, benchmark: &str, kind: SeriesKind) -> PathBuf {
        self.root.join(kind.file_name(benchmark))
    }

    /// Loads a series, yielding an empty mapping if the backing file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file exists but cannot be read or any
    /// line of it cannot be parsed.
    pub fn load<T: DeserializeOwned>(
        &self,
        benchmark: &str,
        kind: SeriesKind,
    ) -> Result<BTreeMap<DateKey, T>, StoreError> {
        let path = self.path(benchmark, kind);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StoreError::Io { path, source: err }),
        };

        let mut series = BTreeMap::new();
        for (idx, line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(StoreError::MalformedLine {
                    path: path.clone(),
                    line: line_no,
                });
            };
            let date: DateKey = key.trim().parse().map_err(|_| StoreError::MalformedLine {
                path: path.clone(),
                line: line_no,
            })?;
            let value: T =
                serde_json::from_str(value.trim()).map_err(|source| StoreError::Value {
                    path: path.clone(),
                    line: line_no,
                    source,
                })?;
            series.insert(date, value);
        }
        Ok(series)
    }

    /// Serializes the full series, sorted ascending by date, replacing the
    /// file contents atomically through a sibling temporary file.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if an entry cannot be serialized or the file
    /// cannot be written.
    pub fn save<T: Serialize>(
        &self,
        benchmark: &str,
        kind: SeriesKind,
        series: &BTreeMap<DateKey, T>,
    ) -> Result<(), StoreError> {
        let path = self.path(benchmark, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut contents = String::new();
        for (date, value) in series {
            let value = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
                path: path.clone(),
                source,
            })?;
            contents.push_str(&format!("{date}: {value}\n"));
        }

        let tmp = path.with_extension("yml.tmp");
        fs::write(&tmp, contents).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateKey {
        s.parse().expect("valid date key")
    }

    #[test]
    fn date_key_rejects_non_calendar_dates() {
        assert!("20250801".parse::<DateKey>().is_ok());
        assert!("20250230".parse::<DateKey>().is_err());
        assert!("2025081".parse::<DateKey>().is_err());
        assert!("2025-08-01".parse::<DateKey>().is_err());
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultsStore::new(dir.path());
        let series: ResultSeries = store.load("absent", SeriesKind::Times).expect("load");
        assert!(series.is_empty());
    }

    #[test]
    fn round_trip_preserves_entries_and_ascending_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultsStore::new(dir.path());

        let mut series = ResultSeries::new();
        series.insert(date("20250815"), [Some(98.5), None, Some(39.2)]);
        series.insert(date("20250801"), [Some(100.0), Some(50.0), Some(40.0)]);
        store.save("foo", SeriesKind::Times, &series).expect("save");

        let loaded: ResultSeries = store.load("foo", SeriesKind::Times).expect("load");
        assert_eq!(loaded, series);

        let raw = fs::read_to_string(store.path("foo", SeriesKind::Times)).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], "20250801: [100.0,50.0,40.0]");
        assert_eq!(lines[1], "20250815: [98.5,null,39.2]");
    }

    #[test]
    fn ractor_series_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultsStore::new(dir.path());

        let mut groups = RactorGroups::new();
        groups.insert("4".to_string(), vec![350.0, 352.5]);
        let mut series = RactorSeries::new();
        series.insert(
            date("20250801"),
            BTreeMap::from([("yjit".to_string(), groups)]),
        );
        store.save("rbench", SeriesKind::Ractor, &series).expect("save");

        let loaded: RactorSeries = store.load("rbench", SeriesKind::Ractor).expect("load");
        assert_eq!(loaded, series);
    }

    #[test]
    fn corrupt_line_aborts_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultsStore::new(dir.path());
        fs::write(
            store.path("foo", SeriesKind::Times),
            "20250801 [100.0,50.0,40.0]\n",
        )
        .expect("write");

        let result: Result<ResultSeries, _> = store.load("foo", SeriesKind::Times);
        assert!(matches!(result, Err(StoreError::MalformedLine { line: 1, .. })));
    }

    #[test]
    fn save_overwrites_only_the_addressed_date() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultsStore::new(dir.path());

        let mut series = ResultSeries::new();
        series.insert(date("20250801"), [Some(100.0), Some(50.0), Some(40.0)]);
        store.save("foo", SeriesKind::Times, &series).expect("save");

        let mut series: ResultSeries = store.load("foo", SeriesKind::Times).expect("load");
        series.insert(date("20250815"), [Some(97.0), None, None]);
        store.save("foo", SeriesKind::Times, &series).expect("save");

        let loaded: ResultSeries = store.load("foo", SeriesKind::Times).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded[&date("20250801")],
            [Some(100.0), Some(50.0), Some(40.0)]
        );
    }
}
