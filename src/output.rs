//! Parsing of raw benchmark harness output.
//!
//! Everything downstream of the container boundary is free text scraped with
//! fixed patterns, so all of the scraping lives behind this module: the rest of
//! the crate never touches the raw format. The patterns are an external
//! contract — stored series and the dashboard depend on exactly these
//! semantics:
//!
//! - timing: the last line whose prefix is the benchmark's short name, second
//!   whitespace-separated token;
//! - peak memory: a `MAXRSS: <n>MiB` figure, preferred over `RSS: <n>MiB`;
//! - ractor iterations: lines of the shape `<workers> #<iteration>: <ms>ms`,
//!   grouped by worker count.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::RactorGroups;

/// Bytes per mebibyte, the unit the harness reports memory in.
pub const BYTES_PER_MIB: f64 = 1_048_576.0;

static MAXRSS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bMAXRSS:\s*([0-9]+(?:\.[0-9]+)?)\s*MiB").expect("valid pattern"));
static RSS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bRSS:\s*([0-9]+(?:\.[0-9]+)?)\s*MiB").expect("valid pattern"));
static RACTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\d+) #(\d+): ([0-9]+(?:\.[0-9]+)?)ms\s*$").expect("valid pattern"));

/// The segment of a benchmark name after the last path separator, if any.
#[must_use]
pub fn short_name(benchmark: &str) -> &str {
    benchmark
        .rfind('/')
        .map_or(benchmark, |idx| &benchmark[idx + 1..])
}

/// Extracts the elapsed-time figure for a benchmark from raw harness output.
///
/// Scans lines in reverse order for the first whose prefix matches the
/// benchmark's short name and parses the second whitespace-separated token.
/// Returns `None` when no line matches or the token is not numeric.
#[must_use]
pub fn parse_timing(stdout: &str, benchmark: &str) -> Option<f64> {
    let short = short_name(benchmark);
    stdout
        .lines()
        .rev()
        .find(|line| line.starts_with(short))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|token| token.parse().ok())
}

/// Extracts the peak resident set size from raw harness output, in bytes.
///
/// The harness reports mebibytes; a `MAXRSS:` figure is preferred over a plain
/// `RSS:` figure when both are present. Returns `None` when neither appears.
#[must_use]
pub fn parse_peak_bytes(stdout: &str) -> Option<f64> {
    MAXRSS_RE
        .captures(stdout)
        .or_else(|| RSS_RE.captures(stdout))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|mib| mib * BYTES_PER_MIB)
}

/// Groups ractor iteration lines by worker-count label.
///
/// Lines matching `<workers> #<iteration>: <elapsed>ms` are collected into an
/// ordered list of elapsed times per label. Output containing zero matching
/// lines yields `None`, not an empty mapping.
#[must_use]
pub fn parse_ractor(stdout: &str) -> Option<RactorGroups> {
    let mut groups = RactorGroups::new();
    for caps in RACTOR_RE.captures_iter(stdout) {
        let Ok(elapsed) = caps[3].parse::<f64>() else {
            continue;
        };
        groups.entry(caps[1].to_string()).or_default().push(elapsed);
    }
    if groups.is_empty() {
        None
    } else {
        Some(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_is_the_segment_after_the_last_separator() {
        assert_eq!(short_name("fib"), "fib");
        assert_eq!(short_name("micro/fib"), "fib");
        assert_eq!(short_name("suites/micro/fib"), "fib");
    }

    #[test]
    fn timing_takes_second_token_of_last_matching_line() {
        let stdout = "warming up...\nfoo  110.2  1\nsome chatter\nfoo  100.5  2\n";
        assert_eq!(parse_timing(stdout, "foo"), Some(100.5));
    }

    #[test]
    fn timing_matches_on_short_name() {
        let stdout = "fib  42.0  1\n";
        assert_eq!(parse_timing(stdout, "micro/fib"), Some(42.0));
        assert_eq!(parse_timing(stdout, "fib"), Some(42.0));
    }

    #[test]
    fn timing_is_absent_without_a_matching_line() {
        assert_eq!(parse_timing("all chatter, no numbers\n", "foo"), None);
        assert_eq!(parse_timing("foo not-a-number x\n", "foo"), None);
    }

    #[test]
    fn maxrss_is_preferred_over_rss() {
        let stdout = "RSS: 100.0MiB\nMAXRSS: 150.0MiB\n";
        assert_eq!(parse_peak_bytes(stdout), Some(150.0 * BYTES_PER_MIB));
    }

    #[test]
    fn rss_is_used_when_maxrss_is_absent() {
        assert_eq!(
            parse_peak_bytes("RSS: 100.0MiB\n"),
            Some(100.0 * BYTES_PER_MIB)
        );
        assert_eq!(parse_peak_bytes("no memory figures here\n"), None);
    }

    #[test]
    fn ractor_lines_group_by_worker_count() {
        let stdout = "4 #1: 340.5ms\n4 #2: 350ms\n8 #1: 210ms\nnoise line\n";
        let groups = parse_ractor(stdout).expect("matching lines");
        assert_eq!(groups["4"], vec![340.5, 350.0]);
        assert_eq!(groups["8"], vec![210.0]);
    }

    #[test]
    fn ractor_output_without_matches_is_absent() {
        assert_eq!(parse_ractor("nothing matching at all\n"), None);
    }
}
