//! Static configuration documents: benchmark metadata and the historical
//! build registry.
//!
//! Both documents are read-only inputs, parsed into typed structs at load time.
//! Unrecognized fields and malformed date keys fail fast with a descriptive
//! error rather than being carried along loosely.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::store::DateKey;

/// Category assigned to benchmarks that do not declare one.
pub const DEFAULT_CATEGORY: &str = "other";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    category: Option<String>,
    #[serde(default)]
    ractor: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    benchmarks: BTreeMap<String, Option<RawEntry>>,
    #[serde(default)]
    ractor_only: Vec<String>,
}

/// Identity and tags of one configured benchmark. Immutable per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkMetadata {
    /// Benchmark name, possibly path-qualified (`micro/fib`).
    pub name: String,
    /// Dashboard category tag.
    pub category: String,
    /// Whether the benchmark also runs under the Ractor runner.
    pub ractor: bool,
}

/// The full benchmark metadata document.
#[derive(Debug)]
pub struct BenchmarkConfig {
    benchmarks: BTreeMap<String, BenchmarkMetadata>,
    ractor_only: Vec<String>,
}

impl BenchmarkConfig {
    /// Loads and validates the metadata document at the given path.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, unrecognized fields, or duplicate
    /// ractor-only names.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).context(format!(
            "could not read benchmark metadata from {}",
            path.display()
        ))?;
        let raw: RawConfig = serde_yaml::from_str(&contents).context(format!(
            "could not parse benchmark metadata in {}",
            path.display()
        ))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> anyhow::Result<Self> {
        let benchmarks = raw
            .benchmarks
            .into_iter()
            .map(|(name, entry)| {
                let entry = entry.unwrap_or(RawEntry {
                    category: None,
                    ractor: false,
                });
                let metadata = BenchmarkMetadata {
                    name: name.clone(),
                    category: entry
                        .category
                        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                    ractor: entry.ractor,
                };
                (name, metadata)
            })
            .collect::<BTreeMap<_, _>>();

        let mut seen = BTreeSet::new();
        for name in &raw.ractor_only {
            if !seen.insert(name.clone()) {
                bail!("duplicate ractor-only benchmark '{name}'");
            }
            if benchmarks.contains_key(name) {
                bail!("benchmark '{name}' is listed both as plain and ractor-only");
            }
        }

        Ok(Self {
            benchmarks,
            ractor_only: raw.ractor_only,
        })
    }

    /// Looks up one benchmark by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BenchmarkMetadata> {
        self.benchmarks.get(name)
    }

    /// All configured benchmarks, sorted by name ascending.
    pub fn iter(&self) -> impl Iterator<Item = &BenchmarkMetadata> {
        self.benchmarks.values()
    }

    /// Names of benchmarks that run exclusively under the Ractor runner.
    #[must_use]
    pub fn ractor_only(&self) -> &[String] {
        &self.ractor_only
    }

    /// Whether the given name is a ractor-only benchmark.
    #[must_use]
    pub fn is_ractor_only(&self, name: &str) -> bool {
        self.ractor_only.iter().any(|n| n == name)
    }
}

/// Mapping from date to the commit SHA of the interpreter build for that date;
/// the set of valid dates a benchmark may be run against.
#[derive(Debug)]
pub struct Registry {
    builds: BTreeMap<DateKey, String>,
}

impl Registry {
    /// Loads and validates the registry document at the given path.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, non-calendar date keys, or empty build
    /// identifiers.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).context(format!(
            "could not read build registry from {}",
            path.display()
        ))?;
        let raw: BTreeMap<String, String> = serde_yaml::from_str(&contents).context(format!(
            "could not parse build registry in {}",
            path.display()
        ))?;

        let mut builds = BTreeMap::new();
        for (key, sha) in raw {
            let date: DateKey = key
                .parse()
                .context(format!("invalid date key '{key}' in build registry"))?;
            if sha.trim().is_empty() {
                bail!("empty build identifier for date {date} in build registry");
            }
            builds.insert(date, sha);
        }
        Ok(Self { builds })
    }

    /// The build identifier recorded for a date, if any.
    #[must_use]
    pub fn sha(&self, date: DateKey) -> Option<&str> {
        self.builds.get(&date).map(String::as_str)
    }

    /// The earliest and latest recorded dates.
    #[must_use]
    pub fn span(&self) -> Option<(DateKey, DateKey)> {
        let first = self.builds.keys().next()?;
        let last = self.builds.keys().next_back()?;
        Some((*first, *last))
    }

    /// All recorded dates, ascending.
    pub fn dates(&self) -> impl DoubleEndedIterator<Item = DateKey> + '_ {
        self.builds.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn category_defaults_to_other() {
        let file = write_temp(
            "benchmarks:\n  activerecord:\n    category: headline\n    ractor: true\n  erubi:\n",
        );
        let config = BenchmarkConfig::load(file.path()).expect("load");

        let activerecord = config.get("activerecord").expect("present");
        assert_eq!(activerecord.category, "headline");
        assert!(activerecord.ractor);

        let erubi = config.get("erubi").expect("present");
        assert_eq!(erubi.category, DEFAULT_CATEGORY);
        assert!(!erubi.ractor);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_temp("benchmarks:\n  foo:\n    categry: oops\n");
        assert!(BenchmarkConfig::load(file.path()).is_err());
    }

    #[test]
    fn ractor_only_names_are_disjoint_from_plain_benchmarks() {
        let file = write_temp("benchmarks:\n  foo:\nractor_only:\n  - foo\n");
        assert!(BenchmarkConfig::load(file.path()).is_err());

        let file = write_temp("benchmarks:\n  foo:\nractor_only:\n  - rbench\n");
        let config = BenchmarkConfig::load(file.path()).expect("load");
        assert!(config.is_ractor_only("rbench"));
        assert!(!config.is_ractor_only("foo"));
    }

    #[test]
    fn registry_rejects_invalid_dates() {
        let file = write_temp("\"20250801\": abc123\n\"20250231\": def456\n");
        assert!(Registry::load(file.path()).is_err());
    }

    #[test]
    fn registry_span_and_lookup() {
        let file = write_temp("\"20250801\": sha1\n\"20250815\": sha2\n");
        let registry = Registry::load(file.path()).expect("load");

        let date: DateKey = "20250801".parse().expect("valid");
        assert_eq!(registry.sha(date), Some("sha1"));
        let (lo, hi) = registry.span().expect("non-empty");
        assert_eq!(lo.to_string(), "20250801");
        assert_eq!(hi.to_string(), "20250815");
    }
}
