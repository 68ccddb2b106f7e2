//! The adaptive sampling session.
//!
//! One session watches one runner's statistics stream and decides, line
//! by line, whether the failure-rate estimate is good enough, provably
//! too bad, or still worth waiting for:
//!
//! 1. Noise (echoed through) and empty tallies: wait, soft restart,
//!    read again.
//! 2. Bounds without information (the vacuous interval's zero lower
//!    bound): the same backoff.
//! 3. Lower bound above the global pruning bound: the candidate cannot
//!    beat the best measured one. Stop immediately, precision be damned.
//! 4. Interval narrower than `precision` decades with more than
//!    `min_tests` samples: converged. A strictly better upper bound
//!    tightens the pruning bound for every later session.
//! 5. Otherwise: backoff and keep sampling.
//!
//! Tallies are cumulative within a session, so the decision line alone
//! carries the session's final tally. After a stop request the stream
//! is drained, keeping a report that races with termination from
//! changing the tally.

use anyhow::Result;
use std::thread;

use crate::cache::SampleCounts;
use crate::config::TuningOptions;
use crate::interrupt;
use crate::trial::process::TrialStream;
use crate::trial::protocol::parse_progress;
use crate::wilson::wilson;

/// How a sampling session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The estimate reached the requested precision.
    Converged,
    /// The candidate is provably worse than the pruning bound.
    Pruned,
    /// The runner closed its stream before any decision.
    Exhausted,
}

/// Final state of one sampling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub counts: SampleCounts,
}

impl SessionReport {
    fn new(outcome: SessionOutcome, counts: SampleCounts) -> Self {
        Self { outcome, counts }
    }
}

/// Supervise one sampling session to its decision.
///
/// `prune_bound` is the smallest converged upper bound seen so far in
/// this run; a converged session that improves on it writes through.
pub fn run_session<S: TrialStream>(
    stream: &mut S,
    options: &TuningOptions,
    prune_bound: &mut f64,
) -> Result<SessionReport> {
    let mut last = SampleCounts::default();
    loop {
        interrupt::check()?;
        let line = match stream.next_line()? {
            Some(line) => line,
            None => {
                interrupt::check()?;
                return Ok(SessionReport::new(SessionOutcome::Exhausted, last));
            }
        };
        let report = match parse_progress(&line) {
            Some(report) => report,
            None => {
                // Echo what the runner had to say, banner and all.
                eprintln!("{}", line);
                backoff(stream, options)?;
                continue;
            }
        };
        if report.tests == 0 {
            backoff(stream, options)?;
            continue;
        }

        let counts = report.counts();
        last = counts;
        let interval = wilson(counts.ratio(), counts.tests, options.coverage);
        if interval.untrustworthy() {
            backoff(stream, options)?;
            continue;
        }
        let width = interval.log_width();
        eprintln!("{} {:?}", line, width);

        if interval.lower > *prune_bound {
            conclude(stream)?;
            return Ok(SessionReport::new(SessionOutcome::Pruned, counts));
        }
        if width < options.precision && counts.tests > options.min_tests {
            if interval.upper < *prune_bound {
                *prune_bound = interval.upper;
            }
            conclude(stream)?;
            return Ok(SessionReport::new(SessionOutcome::Converged, counts));
        }
        backoff(stream, options)?;
    }
}

/// Wait out the runner, then ask for fresh statistics.
fn backoff<S: TrialStream>(stream: &mut S, options: &TuningOptions) -> Result<()> {
    thread::sleep(options.wait);
    stream.continue_sampling()
}

/// Stop the runner and discard reports racing with termination.
fn conclude<S: TrialStream>(stream: &mut S) -> Result<()> {
    stream.request_stop()?;
    while stream.next_line()?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::process::ScriptedStream;
    use std::time::Duration;

    fn knobs(precision: f64, min_tests: u64) -> TuningOptions {
        TuningOptions {
            precision,
            min_tests,
            wait: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_converges_on_third_informative_line() {
        // Log-scale widths of the three tallies at 95% coverage:
        // 0.637, 0.474, 0.342. Only the third beats 0.4 decades.
        let mut stream = ScriptedStream::new([
            "-DINDEX=2 -DBLOCK_LENGTH=10163",
            "500 2:300 3:195 >100:5",
            "1200 2:700 3:489 >100:11",
            "2500 2:1400 3:1077 >100:23",
        ]);
        let mut bound = 1.0;
        let report = run_session(&mut stream, &knobs(0.4, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Converged);
        assert_eq!(report.counts, SampleCounts::new(2500, 23));
        // The converged upper bound becomes the global pruning bound.
        assert!((bound - 0.01400661203264179).abs() < 1e-6);
        // One backoff per banner/inconclusive line, one stop at the end.
        assert_eq!(stream.soft_restarts, 3);
        assert_eq!(stream.stop_requests, 1);
    }

    #[test]
    fn test_converges_at_default_precision() {
        // 0.079 decades at (50000, 460) beats the default 0.1.
        let mut stream = ScriptedStream::new([
            "2500 2:1400 3:1077 >100:23",
            "50000 2:30000 3:19540 >100:460",
        ]);
        let mut bound = 1.0;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Converged);
        assert_eq!(report.counts, SampleCounts::new(50000, 460));
        assert!((bound - 0.010085825499136773).abs() < 1e-6);
    }

    #[test]
    fn test_prunes_below_min_tests() {
        // Lower bound 0.385 at (200, 90) towers over the pruning bound,
        // so the session ends after one line with 200 < 1000 samples.
        let mut stream = ScriptedStream::new(["200 5:110 >100:90"]);
        let mut bound = 0.05;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Pruned);
        assert_eq!(report.counts, SampleCounts::new(200, 90));
        assert_eq!(bound, 0.05);
        assert_eq!(stream.soft_restarts, 0);
        assert_eq!(stream.stop_requests, 1);
    }

    #[test]
    fn test_prune_wins_over_convergence() {
        // (2000, 900) satisfies the convergence test (0.042 decades,
        // above min tests) while provably losing to the bound; pruning
        // is checked first and must not touch the bound.
        let mut stream = ScriptedStream::new(["2000 5:1100 >100:900"]);
        let mut bound = 0.05;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Pruned);
        assert_eq!(bound, 0.05);
    }

    #[test]
    fn test_converged_never_worsens_the_bound() {
        // Upper bound 0.014 of the converging line sits above 0.012.
        let mut stream = ScriptedStream::new(["2500 2:1400 3:1077 >100:23"]);
        let mut bound = 0.012;
        let report = run_session(&mut stream, &knobs(0.4, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Converged);
        assert_eq!(bound, 0.012);
    }

    #[test]
    fn test_exhausted_carries_last_counts() {
        let mut stream = ScriptedStream::new(["500 2:300 3:195 >100:5"]);
        let mut bound = 1.0;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Exhausted);
        assert_eq!(report.counts, SampleCounts::new(500, 5));
        assert_eq!(stream.soft_restarts, 1);
        assert_eq!(stream.stop_requests, 0);
    }

    #[test]
    fn test_exhausted_empty_stream_reports_nothing() {
        let mut stream = ScriptedStream::new(Vec::<String>::new());
        let mut bound = 1.0;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Exhausted);
        assert_eq!(report.counts, SampleCounts::default());
    }

    #[test]
    fn test_zero_tally_line_backs_off() {
        let mut stream = ScriptedStream::new(["0", "200 5:110 >100:90"]);
        let mut bound = 0.05;
        let report = run_session(&mut stream, &knobs(0.1, 1000), &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Pruned);
        assert_eq!(stream.soft_restarts, 1);
    }

    #[test]
    fn test_untrustworthy_bounds_back_off() {
        // At 50% coverage the single-sample tally yields the vacuous
        // interval; the session must keep sampling, not decide.
        let mut stream = ScriptedStream::new(["1 >100:1"]);
        let mut bound = 1.0;
        let options = TuningOptions {
            coverage: 0.5,
            wait: Duration::ZERO,
            ..Default::default()
        };
        let report = run_session(&mut stream, &options, &mut bound).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Exhausted);
        assert_eq!(report.counts, SampleCounts::new(1, 1));
        assert_eq!(stream.soft_restarts, 1);
    }
}
