//! In-memory cache of measured failure rates, keyed by TTL curve.
//!
//! Distinct coefficient pairs frequently collapse to the same integer
//! curve, and measuring one curve can take minutes of sampling, so every
//! completed session's tally is stored under the curve it measured.
//! Entries live for one tuning run.
//!
//! A stored tally stands in for a fresh session only when it is precise
//! enough on its own terms: linear Wilson width under the precision knob
//! and more than the minimum sample count. Anything else (a pruned
//! session, a truncated stream) is kept as a stale hint and overwritten
//! by the next measurement of the same curve.

use std::collections::HashMap;

use crate::config::TuningOptions;
use crate::ttl::TtlCurve;
use crate::wilson::wilson;

/// Cumulative sampling tally for one curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleCounts {
    /// Samples attempted.
    pub tests: u64,
    /// Samples that hit the iteration cap.
    pub failures: u64,
}

impl SampleCounts {
    pub fn new(tests: u64, failures: u64) -> Self {
        Self { tests, failures }
    }

    /// Observed failure proportion.
    ///
    /// An empty tally reports 0.0 by convention; it can never satisfy
    /// the authority check, so it is always re-measured before anything
    /// depends on it.
    pub fn ratio(&self) -> f64 {
        if self.tests == 0 {
            0.0
        } else {
            self.failures as f64 / self.tests as f64
        }
    }
}

/// Hit/miss/store accounting for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

/// Cache of completed sampling sessions.
#[derive(Debug, Default)]
pub struct DfrCache {
    entries: HashMap<TtlCurve, SampleCounts>,
    stats: CacheStats,
}

impl DfrCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a tally precise enough to stand in for a fresh session.
    pub fn authoritative(
        &mut self,
        curve: &TtlCurve,
        options: &TuningOptions,
    ) -> Option<SampleCounts> {
        if let Some(counts) = self.entries.get(curve) {
            let interval = wilson(counts.ratio(), counts.tests, options.coverage);
            if interval.width() < options.precision && counts.tests > options.min_tests {
                self.stats.hits += 1;
                return Some(*counts);
            }
        }
        self.stats.misses += 1;
        None
    }

    /// Store a completed session's tally, replacing any earlier one.
    pub fn insert(&mut self, curve: TtlCurve, counts: SampleCounts) {
        self.stats.stores += 1;
        self.entries.insert(curve, counts);
    }

    pub fn get(&self, curve: &TtlCurve) -> Option<&SampleCounts> {
        self.entries.get(curve)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
