//! Wilson score intervals for decoding failure proportions.
//!
//! The estimator consumes a cumulative `(tests, failures)` tally and
//! produces a two-sided confidence interval for the underlying failure
//! probability. The closed form is the continuity-corrected Wilson score
//! interval:
//!
//! ```text
//! z  = sqrt(2) * erf_inv(coverage)
//! d- = z^2 - 1/n + 4*n*p*(1-p) + (4p - 2)
//! d+ = z^2 - 1/n + 4*n*p*(1-p) - (4p - 2)
//! w- = (2*n*p + z^2 - z*sqrt(d-) + 1) / (2*(n + z^2))
//! w+ = (2*n*p + z^2 + z*sqrt(d+) + 1) / (2*(n + z^2))
//! ```
//!
//! A tally with no information, either zero samples or a proportion so
//! extreme that a discriminant goes negative at the requested coverage,
//! falls back to the vacuous interval `(0, 1)`.

use statrs::function::erf::erf_inv;
use std::f64::consts::SQRT_2;

/// A two-sided confidence interval on a failure probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WilsonInterval {
    pub lower: f64,
    pub upper: f64,
}

impl WilsonInterval {
    /// The vacuous no-information interval.
    pub const VACUOUS: Self = Self {
        lower: 0.0,
        upper: 1.0,
    };

    /// Linear width, the measure cached tallies are judged by.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Width in decades, the adaptive loop's convergence measure.
    ///
    /// Callers must reject intervals with a non-positive bound first;
    /// the log of a zero bound carries no information.
    pub fn log_width(&self) -> f64 {
        self.upper.log10() - self.lower.log10()
    }

    /// True when either bound carries no usable information.
    pub fn untrustworthy(&self) -> bool {
        self.lower <= 0.0 || self.upper <= 0.0
    }
}

/// Standard normal quantile matching a two-sided coverage probability.
pub fn coverage_quantile(coverage: f64) -> f64 {
    SQRT_2 * erf_inv(coverage)
}

/// Continuity-corrected Wilson score interval for `failures/tests`.
///
/// Returns [`WilsonInterval::VACUOUS`] when `tests` is zero or when a
/// discriminant goes negative. Bounds are clamped into `[0, 1]`.
pub fn wilson(proportion: f64, tests: u64, coverage: f64) -> WilsonInterval {
    if tests == 0 {
        return WilsonInterval::VACUOUS;
    }
    let n = tests as f64;
    let p = proportion;
    let z = coverage_quantile(coverage);
    let z2 = z * z;

    let spread = z2 - 1.0 / n + 4.0 * n * p * (1.0 - p);
    let skew = 4.0 * p - 2.0;
    let disc_lower = spread + skew;
    let disc_upper = spread - skew;
    if disc_lower < 0.0 || disc_upper < 0.0 {
        return WilsonInterval::VACUOUS;
    }

    let base = 2.0 * n * p + z2 + 1.0;
    let denom = 2.0 * (n + z2);
    WilsonInterval {
        lower: ((base - z * disc_lower.sqrt()) / denom).max(0.0),
        upper: ((base + z * disc_upper.sqrt()) / denom).min(1.0),
    }
}
