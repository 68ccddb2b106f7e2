//! Simplex search over the two TTL coefficients.
//!
//! Wires a [`DfrObjective`](crate::objective::DfrObjective) (or any
//! other two-dimensional cost function) into `argmin`'s adaptive
//! Nelder-Mead solver. The initial simplex is random: three vertices
//! around a fixed seed point, each dimension perturbed independently
//! and uniformly within its own spread.

use anyhow::{Context, Result};
use argmin::core::{CostFunction, Executor, State, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use rand::Rng;

use crate::config::TuningOptions;
use crate::ttl::CoeffPair;

/// Center of the initial simplex, a curve known to decode acceptably.
pub const SEED_POINT: [f64; 2] = [1.0, 1.5];

/// Per-dimension half-width of the uniform perturbation around the seed.
pub const SEED_SPREAD: [f64; 2] = [0.75, 0.95];

/// Result of a completed tuning run.
#[derive(Debug, Clone)]
pub struct TuneOutcome {
    /// Best coefficient pair found.
    pub coeffs: CoeffPair,
    /// Failure rate measured at the best pair.
    pub dfr: f64,
    /// Solver iterations performed.
    pub iterations: u64,
    /// How the solver stopped.
    pub termination: TerminationStatus,
}

/// Draw the three starting vertices around [`SEED_POINT`].
pub fn initial_simplex<R: Rng>(rng: &mut R) -> Vec<Vec<f64>> {
    (0..=SEED_POINT.len())
        .map(|_| {
            SEED_POINT
                .iter()
                .zip(SEED_SPREAD.iter())
                .map(|(&center, &spread)| center + rng.gen_range(-spread..=spread))
                .collect()
        })
        .collect()
}

/// Minimize `objective` from the given starting simplex.
///
/// Runs the adaptive Nelder-Mead solver until the sample standard
/// deviation of the vertex costs drops below `options.sd_tolerance` or
/// `options.max_iters` is reached.
pub fn run_simplex<O>(
    objective: O,
    simplex: Vec<Vec<f64>>,
    options: &TuningOptions,
) -> Result<TuneOutcome>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    let solver = NelderMead::new(simplex).with_sd_tolerance(options.sd_tolerance)?;
    let optimizer =
        Executor::new(objective, solver).configure(|state| state.max_iters(options.max_iters));

    let mut result = optimizer.run()?.state().clone();
    let iterations = result.get_iter();
    let termination = result.get_termination_status().clone();
    let dfr = result.get_best_cost();
    let best = result
        .take_best_param()
        .context("Simplex search finished without a best vertex")?;
    let coeffs = CoeffPair::from_slice(&best)
        .context("Simplex search returned a vertex of unexpected dimension")?;

    Ok(TuneOutcome {
        coeffs,
        dfr,
        iterations,
        termination,
    })
}

/// Full tuning run: draw the starting simplex and minimize.
pub fn tune<O, R>(objective: O, rng: &mut R, options: &TuningOptions) -> Result<TuneOutcome>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
    R: Rng,
{
    run_simplex(objective, initial_simplex(rng), options)
}
