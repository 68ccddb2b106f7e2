//! ttltune CLI - TTL coefficient tuning for a QC-MDPC decoder
//!
//! This is the command-line entry point for ttltune. It orchestrates the
//! full tuning loop:
//!
//! 1. Parameter Setup: decoder parameters from argv, knobs from ttltune.toml
//! 2. Candidate Build: recompile the decoder with the candidate curve baked in
//! 3. Sampling: stream failure tallies from the decoder's stderr
//! 4. Estimation: Wilson confidence interval on the running failure rate
//! 5. Decision: converge, prune against the global bound, or keep sampling
//! 6. Search: adaptive Nelder-Mead over the two curve coefficients
//!
//! Design philosophy:
//! - One decoder process at a time, never orphaned (process-group signals)
//! - Trust the statistics, not a fixed sample count
//! - Cache by the curve the decoder actually sees, not by raw coefficients
//! - Keep stdout clean: result rows only, diagnostics on stderr

use anyhow::{bail, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ttltune::config::{Config, DecoderParams, TuningOptions};
use ttltune::interrupt::{self, Interrupted};
use ttltune::objective::DfrObjective;
use ttltune::search;
use ttltune::trial::MakeBackend;

/// Find the TTL curve coefficients with the lowest decoding failure rate
///
/// ttltune drives a QC-MDPC decoder through an adaptive simplex search.
/// Each candidate pair (a, b) is compiled into the decoder as its TTL
/// threshold curve, the decoder is run, and its failure tallies are
/// sampled until a Wilson confidence interval is narrow enough to trust
/// or the candidate is provably worse than the best one found so far.
///
/// Examples:
///   ttltune 2 10163 71 134 0 30                # BIKE level 1 round 3
///   ttltune 2 10163 71 134 0 30 -T 8           # forward -T 8 to the decoder
///   ttltune --seed 7 --precision 0.05 -- 2 10163 71 134 0 30
#[derive(Parser, Debug)]
#[command(name = "ttltune")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    /// Parameter-set index compiled into the decoder
    #[arg(value_name = "INDEX")]
    pub index: u32,

    /// Circulant block length in bits
    #[arg(value_name = "BLOCK_LENGTH")]
    pub block_length: u32,

    /// Column weight of a circulant block
    ///
    /// The TTL curve is defined on counter values 0..=BLOCK_WEIGHT/2.
    #[arg(value_name = "BLOCK_WEIGHT")]
    pub block_weight: u32,

    /// Weight of the sampled error patterns
    #[arg(value_name = "ERROR_WEIGHT")]
    pub error_weight: u32,

    /// Structural variant switch
    #[arg(value_name = "OUROBOROS", value_parser = clap::value_parser!(u8).range(0..=1))]
    pub ouroboros: u8,

    /// Upper clamp for generated TTL values
    #[arg(value_name = "TTL_SATURATE", value_parser = clap::value_parser!(u32).range(1..))]
    pub ttl_saturate: u32,

    /// Extra options forwarded verbatim to the decoder
    ///
    /// Everything after the sixth positional goes to the decoder, hyphens
    /// included, so tuner flags must come before the positionals:
    ///   ttltune --seed 7 2 10163 71 134 0 30 -T 8
    #[arg(value_name = "RUNNER_ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub runner_args: Vec<String>,

    /// Decoder source directory
    ///
    /// Where make runs and where ttltune.toml is looked up.
    /// Defaults to the current directory.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Decoder executable to rebuild and run
    ///
    /// Resolved relative to --root unless absolute. The default matches
    /// the AVX2 build of the reference decoder.
    #[arg(long, default_value = "./qcmdpc_decoder_avx2")]
    pub program: PathBuf,

    /// Seconds to sleep before each soft restart
    ///
    /// Applied whenever a session has to keep sampling: after noise,
    /// after a zero tally and after an interval that is still too wide.
    #[arg(long, value_name = "SECS")]
    pub wait_time: Option<f64>,

    /// Minimum sample count before an estimate may converge
    #[arg(long, value_name = "N")]
    pub min_tests: Option<u64>,

    /// Two-sided coverage probability of the confidence intervals
    ///
    /// Must lie strictly between 0 and 1. Higher coverage means wider
    /// intervals and therefore longer sampling sessions.
    #[arg(long)]
    pub coverage: Option<f64>,

    /// Interval width (in decades) below which an estimate converges
    #[arg(long)]
    pub precision: Option<f64>,

    /// Vertex cost standard deviation at which the simplex stops
    #[arg(long)]
    pub sd_tolerance: Option<f64>,

    /// Iteration cap for the simplex search
    #[arg(long, value_name = "N")]
    pub max_iters: Option<u64>,

    /// Seed for the starting simplex
    ///
    /// The three starting vertices are drawn at random around a fixed
    /// center. Fixing the seed makes a run reproducible up to the
    /// decoder's own sampling noise.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Append per-evaluation JSON records to this file
    ///
    /// One object per line: coefficients, measured DFR, sample counts,
    /// whether the cache answered and how the session ended.
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Verbose output
    ///
    /// Shows the resolved configuration up front and a summary of the
    /// search (iterations, cache traffic, best confirmed bound) at the
    /// end. All of it goes to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(error) = run(&cli) {
        if error.downcast_ref::<Interrupted>().is_some() {
            eprintln!("Interrupted.");
            std::process::exit(130);
        }
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

/// Overlay command-line knobs on the configured baseline.
fn merge_options(base: TuningOptions, cli: &Cli) -> Result<TuningOptions> {
    let mut options = base;
    if let Some(secs) = cli.wait_time {
        if !secs.is_finite() || secs < 0.0 {
            bail!("--wait-time must be a non-negative number of seconds");
        }
        options.wait = Duration::from_secs_f64(secs);
    }
    if let Some(min_tests) = cli.min_tests {
        options.min_tests = min_tests;
    }
    if let Some(coverage) = cli.coverage {
        if !(coverage > 0.0 && coverage < 1.0) {
            bail!("--coverage must lie strictly between 0 and 1");
        }
        options.coverage = coverage;
    }
    if let Some(precision) = cli.precision {
        if !(precision > 0.0) {
            bail!("--precision must be positive");
        }
        options.precision = precision;
    }
    if let Some(sd_tolerance) = cli.sd_tolerance {
        if !(sd_tolerance > 0.0) {
            bail!("--sd-tolerance must be positive");
        }
        options.sd_tolerance = sd_tolerance;
    }
    if let Some(max_iters) = cli.max_iters {
        options.max_iters = max_iters;
    }
    Ok(options)
}

fn run(cli: &Cli) -> Result<()> {
    let start = Instant::now();

    let root = cli.root.canonicalize().map_err(|e| {
        anyhow::anyhow!(
            "Failed to resolve root path '{}': {}",
            cli.root.display(),
            e
        )
    })?;

    // Load configuration from ttltune.toml, then overlay CLI flags
    let file_config = Config::load(&root);
    let options = merge_options(file_config.options(), cli)?;

    let params = DecoderParams {
        index: cli.index,
        block_length: cli.block_length,
        block_weight: cli.block_weight,
        error_weight: cli.error_weight,
        ouroboros: cli.ouroboros,
        ttl_saturate: cli.ttl_saturate,
    };

    // From here on a Ctrl-C must reach the decoder's process group too
    interrupt::install()?;

    if cli.verbose {
        eprintln!("🎛️  ttltune v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("📂 Decoder root: {}", root.display());
        eprintln!("{}", file_config.display_summary());
        eprintln!(
            "   Runner: {} -q {}",
            cli.program.display(),
            cli.runner_args.join(" ")
        );
    }

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let backend = MakeBackend::new(
        root,
        cli.program.clone(),
        params,
        cli.runner_args.clone(),
    );
    let mut objective = DfrObjective::new(backend, params, options);
    if let Some(path) = &cli.history {
        objective = objective.with_history(path)?;
    }

    let outcome = search::tune(&objective, &mut rng, &options)?;

    if cli.verbose {
        let (_, cache, bound) = objective.into_parts();
        let stats = cache.stats();
        eprintln!(
            "✓ Simplex done: {} iterations, {:?} ({:.2?})",
            outcome.iterations,
            outcome.termination,
            start.elapsed()
        );
        eprintln!(
            "✓ Cache: {} curves, {} hits / {} misses / {} stores",
            cache.len(),
            stats.hits,
            stats.misses,
            stats.stores
        );
        eprintln!("✓ Best DFR: {:?}  Confirmed upper bound: {:?}", outcome.dfr, bound);
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // The one line meant for reuse: paste into EXTRA to pin the curve
    println!(
        "-DTTL_COEFF0={:?} -DTTL_COEFF1={:?}",
        outcome.coeffs.a, outcome.coeffs.b
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONALS: &[&str] = &["ttltune", "2", "10163", "71", "134", "0", "30"];

    #[test]
    fn test_cli_parse_minimal() {
        let cli = Cli::parse_from(POSITIONALS);
        assert_eq!(cli.index, 2);
        assert_eq!(cli.block_length, 10163);
        assert_eq!(cli.block_weight, 71);
        assert_eq!(cli.error_weight, 134);
        assert_eq!(cli.ouroboros, 0);
        assert_eq!(cli.ttl_saturate, 30);
        assert!(cli.runner_args.is_empty());
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.program, PathBuf::from("./qcmdpc_decoder_avx2"));
        assert!(cli.seed.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_requires_all_positionals() {
        let result = Cli::try_parse_from(["ttltune", "2", "10163", "71"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_out_of_range_variant_switch() {
        let result = Cli::try_parse_from(["ttltune", "2", "10163", "71", "134", "2", "30"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_zero_saturation() {
        let result = Cli::try_parse_from(["ttltune", "2", "10163", "71", "134", "0", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_forwards_trailing_decoder_options() {
        let mut args: Vec<&str> = POSITIONALS.to_vec();
        args.extend(["-T", "8", "--rng", "xoroshiro"]);
        let cli = Cli::parse_from(args);
        assert_eq!(cli.runner_args, vec!["-T", "8", "--rng", "xoroshiro"]);
    }

    #[test]
    fn test_cli_parse_tuner_flags_before_positionals() {
        let cli = Cli::parse_from([
            "ttltune",
            "--root",
            "/tmp/decoder",
            "--program",
            "./qcmdpc_decoder",
            "--seed",
            "7",
            "--history",
            "runs.jsonl",
            "2",
            "10163",
            "71",
            "134",
            "0",
            "30",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/decoder"));
        assert_eq!(cli.program, PathBuf::from("./qcmdpc_decoder"));
        assert_eq!(cli.seed, Some(7));
        assert_eq!(cli.history, Some(PathBuf::from("runs.jsonl")));
    }

    #[test]
    fn test_merge_keeps_defaults_without_flags() {
        let cli = Cli::parse_from(POSITIONALS);
        let options = merge_options(TuningOptions::default(), &cli).unwrap();
        assert_eq!(options.coverage, 0.95);
        assert_eq!(options.precision, 0.1);
        assert_eq!(options.min_tests, 1000);
        assert_eq!(options.wait, Duration::from_secs(5));
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let cli = Cli::parse_from([
            "ttltune",
            "--wait-time",
            "0.5",
            "--min-tests",
            "2000",
            "--coverage",
            "0.99",
            "--precision",
            "0.05",
            "--sd-tolerance",
            "1e-5",
            "--max-iters",
            "100",
            "2",
            "10163",
            "71",
            "134",
            "0",
            "30",
        ]);
        let options = merge_options(TuningOptions::default(), &cli).unwrap();
        assert_eq!(options.wait, Duration::from_millis(500));
        assert_eq!(options.min_tests, 2000);
        assert_eq!(options.coverage, 0.99);
        assert_eq!(options.precision, 0.05);
        assert_eq!(options.sd_tolerance, 1e-5);
        assert_eq!(options.max_iters, 100);
    }

    #[test]
    fn test_merge_rejects_negative_wait() {
        let mut args = vec!["ttltune", "--wait-time=-1"];
        args.extend(&POSITIONALS[1..]);
        let cli = Cli::parse_from(args);
        assert!(merge_options(TuningOptions::default(), &cli).is_err());
    }

    #[test]
    fn test_merge_rejects_degenerate_coverage() {
        let mut args = vec!["ttltune", "--coverage", "1.0"];
        args.extend(&POSITIONALS[1..]);
        let cli = Cli::parse_from(args);
        assert!(merge_options(TuningOptions::default(), &cli).is_err());
    }
}
