//! ttltune - Adaptive TTL coefficient tuner for a QC-MDPC decoder
//!
//! Searches the two coefficients of the decoder's TTL threshold curve
//! for the pair with the lowest decoding failure rate. The objective is
//! not a formula: each candidate is measured by rebuilding the decoder
//! with the curve compiled in, running it, and reading its failure
//! tallies until a Wilson confidence interval on the failure rate is
//! narrow enough to trust, or wide enough to prove the candidate worse
//! than the best one seen.
//!
//! # Architecture
//!
//! ```text
//! Simplex Search → Objective → Cache → Build + Run → Supervision
//!       ↓             ↓          ↓          ↓             ↓
//!    argmin       CostFunction  TTL      make +       Wilson CI
//!   Nelder-Mead    over (a,b)  curve    signals     stop/prune/wait
//! ```
//!
//! # Sampling Strategies
//!
//! - One decoder process at a time, read line-by-line from stderr
//! - Process-group signals for continue/stop/interrupt control
//! - Pruning against a global upper confidence bound
//! - Curve-keyed cache so aliasing coefficient pairs share a run

pub mod cache;
pub mod config;
pub mod interrupt;
pub mod objective;
pub mod search;
pub mod trial;
pub mod ttl;
pub mod wilson;

// Re-export core types
pub use cache::{DfrCache, SampleCounts};
pub use config::{Config, DecoderParams, TuningOptions};
pub use objective::DfrObjective;
pub use search::TuneOutcome;
pub use ttl::{CoeffPair, TtlCurve};
pub use wilson::{wilson, WilsonInterval};
