//! Grammar of the runner's incremental statistics lines.
//!
//! The runner reports cumulative statistics on stderr, one line per
//! report:
//!
//! ```text
//! 2500 3:1400 4:1077 >100:23
//! ```
//!
//! reads as 2500 samples so far, an iteration histogram (1400 decodes
//! finished at iteration 3, 1077 at 4), and 23 failures that hit the
//! iteration cap of 100. The grammar:
//!
//! ```text
//! line  := tests (SP field)*
//! tests := INT                cumulative sample count
//! field := INT ':' INT        iteration histogram entry
//!        | '>' INT ':' INT    failure marker (cap : failures)
//! ```
//!
//! The failure marker comes last and only when failures occurred; its
//! absence on a well-formed line means every sample so far decoded.
//! Anything not led by an integer is noise: the runner prints its
//! parameter banner on startup, and partial flushes can truncate a line.

use crate::cache::SampleCounts;

/// Lazily-compiled token patterns for the statistics grammar.
mod stat_patterns {
    use once_cell::sync::Lazy;
    use regex::Regex;

    /// Failure marker token: `>cap:failures`.
    pub static FAILURE_MARKER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^>([0-9]+):([0-9]+)$").expect("Invalid failure marker regex"));
}

/// One parsed statistics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    /// Cumulative samples attempted.
    pub tests: u64,
    /// Cumulative samples that hit the iteration cap.
    pub failures: u64,
}

impl ProgressReport {
    pub fn counts(&self) -> SampleCounts {
        SampleCounts::new(self.tests, self.failures)
    }
}

/// Parse one stderr line into a statistics report.
///
/// Returns `None` for noise. A well-formed line without a failure marker
/// reports zero failures. Should a line carry several markers, the last
/// one wins, matching the runner's append-only output order.
pub fn parse_progress(line: &str) -> Option<ProgressReport> {
    let mut tokens = line.split_ascii_whitespace();
    let tests: u64 = tokens.next()?.parse().ok()?;
    let mut failures = 0;
    for token in tokens {
        if let Some(caps) = stat_patterns::FAILURE_MARKER.captures(token) {
            failures = caps[2].parse().ok()?;
        }
    }
    Some(ProgressReport { tests, failures })
}
