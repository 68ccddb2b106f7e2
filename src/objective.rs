//! The objective function: one candidate in, one measured DFR out.
//!
//! Wraps the whole per-candidate pipeline behind `argmin`'s
//! [`CostFunction`]: TTL curve generation, cache consult, rebuild,
//! launch, adaptive supervision, cache write-back. The solver only ever
//! sees a `Vec<f64>` parameter and an `f64` cost.
//!
//! `cost` takes `&self` while an evaluation mutates the cache, the
//! pruning bound, and the backend; one `RefCell` carries that state,
//! which is sound in this strictly single-session design.

use anyhow::{Context, Result};
use argmin::core::CostFunction;
use serde::Serialize;
use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::cache::{DfrCache, SampleCounts};
use crate::config::{DecoderParams, TuningOptions};
use crate::interrupt;
use crate::trial::process::TrialBackend;
use crate::trial::supervisor::{run_session, SessionOutcome};
use crate::ttl::{CoeffPair, TtlCurve};

/// One line of the evaluation history, serialized as JSONL.
#[derive(Debug, Serialize)]
pub struct EvalRecord {
    pub a: f64,
    pub b: f64,
    pub dfr: f64,
    pub tests: u64,
    pub failures: u64,
    pub cached: bool,
    pub outcome: &'static str,
}

/// Mutable run state shared across evaluations.
#[derive(Debug)]
struct RunState<B> {
    backend: B,
    cache: DfrCache,
    prune_bound: f64,
    history: Option<File>,
}

/// DFR objective over TTL coefficient pairs.
pub struct DfrObjective<B> {
    state: RefCell<RunState<B>>,
    params: DecoderParams,
    options: TuningOptions,
}

impl<B: TrialBackend> DfrObjective<B> {
    pub fn new(backend: B, params: DecoderParams, options: TuningOptions) -> Self {
        Self {
            state: RefCell::new(RunState {
                backend,
                cache: DfrCache::new(),
                prune_bound: 1.0,
                history: None,
            }),
            params,
            options,
        }
    }

    /// Append evaluation records to `path`, one JSON object per line.
    pub fn with_history(self, path: &Path) -> Result<Self> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open history file {}", path.display()))?;
        self.state.borrow_mut().history = Some(file);
        Ok(self)
    }

    /// Tear down into the backend, the cache, and the final pruning
    /// bound.
    pub fn into_parts(self) -> (B, DfrCache, f64) {
        let state = self.state.into_inner();
        (state.backend, state.cache, state.prune_bound)
    }

    /// Measure (or recall) the failure rate for one coefficient pair.
    pub fn evaluate(&self, coeffs: &CoeffPair) -> Result<f64> {
        interrupt::check()?;
        let curve = TtlCurve::generate(coeffs, self.params.ttl_domain(), self.params.ttl_saturate);

        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        if let Some(counts) = state.cache.authoritative(&curve, &self.options) {
            let dfr = counts.ratio();
            report(&mut state.history, coeffs, dfr, counts, true, "cached")?;
            return Ok(dfr);
        }

        state.backend.prepare(coeffs)?;
        let mut stream = state.backend.launch()?;
        let session = run_session(&mut stream, &self.options, &mut state.prune_bound)?;
        drop(stream);

        let counts = session.counts;
        state.cache.insert(curve, counts);
        let dfr = counts.ratio();
        report(
            &mut state.history,
            coeffs,
            dfr,
            counts,
            false,
            outcome_name(session.outcome),
        )?;
        Ok(dfr)
    }
}

/// Print the result row and separator, and append the history record.
fn report(
    history: &mut Option<File>,
    coeffs: &CoeffPair,
    dfr: f64,
    counts: SampleCounts,
    cached: bool,
    outcome: &'static str,
) -> Result<()> {
    println!(
        "{:?} {:?} {:?} {} {}",
        coeffs.a, coeffs.b, dfr, counts.tests, counts.failures
    );
    println!("{}", "-".repeat(80));
    if let Some(file) = history.as_mut() {
        let record = EvalRecord {
            a: coeffs.a,
            b: coeffs.b,
            dfr,
            tests: counts.tests,
            failures: counts.failures,
            cached,
            outcome,
        };
        let line = serde_json::to_string(&record).context("Failed to serialize history record")?;
        writeln!(file, "{}", line).context("Failed to append history record")?;
    }
    Ok(())
}

fn outcome_name(outcome: SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Converged => "converged",
        SessionOutcome::Pruned => "pruned",
        SessionOutcome::Exhausted => "exhausted",
    }
}

impl<B: TrialBackend> CostFunction for DfrObjective<B> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let coeffs = CoeffPair::from_slice(param)
            .context("Objective expects a two-dimensional parameter")?;
        self.evaluate(&coeffs)
    }
}

/// Borrowed form, so the caller keeps the objective after the solver
/// consumes its problem.
impl<B: TrialBackend> CostFunction for &DfrObjective<B> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        <DfrObjective<B> as CostFunction>::cost(self, param)
    }
}
