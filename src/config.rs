//! Decoder invocation parameters and tuning knobs.
//!
//! The decoder parameters are fixed for one tuning run and become
//! preprocessor defines in the rebuild of every candidate. The knobs of
//! the adaptive loop resolve in three layers: built-in defaults, an
//! optional `ttltune.toml` next to the decoder sources, then
//! command-line flags.
//!
//! ## Example
//!
//! ```toml
//! [tuning]
//! coverage = 0.99
//! precision = 0.05
//! min-tests = 10000
//! wait-secs = 2.0
//! sd-tolerance = 1e-5
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ttl::CoeffPair;

/// Object files that bake in the candidate defines and must be rebuilt
/// with `-B` for every candidate.
pub const PARAM_OBJECTS: &[&str] = &["decoder.o", "qcmdpc_decoder.o", "threshold.o"];

/// Decoder invocation parameters, fixed for one tuning run.
#[derive(Debug, Clone, Copy)]
pub struct DecoderParams {
    /// Parameter-set index selecting the compiled-in scheme.
    pub index: u32,
    /// Circulant block length in bits.
    pub block_length: u32,
    /// Column weight of a block.
    pub block_weight: u32,
    /// Weight of the sampled error patterns.
    pub error_weight: u32,
    /// Structural variant switch (0 or 1).
    pub ouroboros: u8,
    /// Upper clamp for generated TTL values.
    pub ttl_saturate: u32,
}

impl DecoderParams {
    /// Number of entries in a TTL curve: counters run `0..=block_weight/2`.
    pub fn ttl_domain(&self) -> usize {
        (self.block_weight / 2) as usize + 1
    }

    /// The `EXTRA` define string handed to the rebuild of one candidate.
    pub fn extra_defines(&self, coeffs: &CoeffPair) -> String {
        format!(
            "-DINDEX={} -DBLOCK_LENGTH={} -DBLOCK_WEIGHT={} -DERROR_WEIGHT={} \
             -DOUROBOROS={} -DTTL_SATURATE={} -DTTL_COEFF0={:?} -DTTL_COEFF1={:?}",
            self.index,
            self.block_length,
            self.block_weight,
            self.error_weight,
            self.ouroboros,
            self.ttl_saturate,
            coeffs.a,
            coeffs.b,
        )
    }
}

/// Knobs of the adaptive sampling loop and the simplex search.
#[derive(Debug, Clone, Copy)]
pub struct TuningOptions {
    /// Two-sided coverage probability of the confidence intervals.
    pub coverage: f64,
    /// Convergence precision: decades of interval width in the live
    /// loop, linear width for cached tallies.
    pub precision: f64,
    /// Minimum sample count before a session may converge.
    pub min_tests: u64,
    /// Backoff between a stalled report and the next soft restart.
    pub wait: Duration,
    /// Sample standard deviation of vertex costs at which the simplex
    /// stops.
    pub sd_tolerance: f64,
    /// Iteration cap for the simplex search.
    pub max_iters: u64,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            coverage: 0.95,
            precision: 0.1,
            min_tests: 1000,
            wait: Duration::from_secs(5),
            sd_tolerance: 1e-4,
            max_iters: 400,
        }
    }
}

/// Knob overrides as deserialized from the `[tuning]` table.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawTuning {
    coverage: Option<f64>,
    precision: Option<f64>,
    min_tests: Option<u64>,
    wait_secs: Option<f64>,
    sd_tolerance: Option<f64>,
    max_iters: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    tuning: Option<RawTuning>,
}

/// Resolved configuration file state.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Source file for this config (for display).
    pub source: Option<PathBuf>,

    options: TuningOptions,
}

impl Config {
    /// Load configuration from the decoder root.
    ///
    /// Reads `ttltune.toml` beside the decoder sources when present,
    /// defaults otherwise. An unreadable or malformed file falls back to
    /// the defaults.
    pub fn load(root: &Path) -> Self {
        let path = root.join("ttltune.toml");
        if path.exists() {
            if let Some(config) = Self::load_toml(&path) {
                return config;
            }
        }
        Self::default()
    }

    fn load_toml(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let raw: RawConfig = toml::from_str(&content).ok()?;
        Some(Self::from_raw(raw, path.to_path_buf()))
    }

    fn from_raw(raw: RawConfig, source: PathBuf) -> Self {
        let tuning = raw.tuning.unwrap_or_default();
        let defaults = TuningOptions::default();
        Self {
            source: Some(source),
            options: TuningOptions {
                coverage: tuning.coverage.unwrap_or(defaults.coverage),
                precision: tuning.precision.unwrap_or(defaults.precision),
                min_tests: tuning.min_tests.unwrap_or(defaults.min_tests),
                wait: tuning
                    .wait_secs
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(Duration::from_secs_f64)
                    .unwrap_or(defaults.wait),
                sd_tolerance: tuning.sd_tolerance.unwrap_or(defaults.sd_tolerance),
                max_iters: tuning.max_iters.unwrap_or(defaults.max_iters),
            },
        }
    }

    /// Knobs after applying the config file over the defaults.
    pub fn options(&self) -> TuningOptions {
        self.options
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref source) = self.source {
            lines.push(format!("   Config: {}", source.display()));
        } else {
            lines.push("   Config: (defaults)".to_string());
        }
        let o = &self.options;
        lines.push(format!(
            "   Coverage: {}  Precision: {}  Min tests: {}",
            o.coverage, o.precision, o.min_tests
        ));
        lines.push(format!(
            "   Wait: {:.1}s  Sd tolerance: {}  Max iters: {}",
            o.wait.as_secs_f64(),
            o.sd_tolerance,
            o.max_iters
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert!(config.source.is_none());
        assert_eq!(config.options().min_tests, 1000);
        assert_eq!(config.options().wait, Duration::from_secs(5));
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ttltune.toml"),
            "[tuning]\nprecision = 0.05\nmin-tests = 10000\nwait-secs = 0.5\n",
        )
        .unwrap();
        let options = Config::load(dir.path()).options();
        assert_eq!(options.precision, 0.05);
        assert_eq!(options.min_tests, 10000);
        assert_eq!(options.wait, Duration::from_millis(500));
        // Untouched knobs keep their defaults.
        assert_eq!(options.coverage, 0.95);
        assert_eq!(options.max_iters, 400);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ttltune.toml"), "not [valid toml").unwrap();
        let config = Config::load(dir.path());
        assert!(config.source.is_none());
        assert_eq!(config.options().precision, 0.1);
    }

    #[test]
    fn test_negative_wait_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ttltune.toml"),
            "[tuning]\nwait-secs = -3.0\n",
        )
        .unwrap();
        assert_eq!(
            Config::load(dir.path()).options().wait,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_ttl_domain_is_inclusive() {
        let params = DecoderParams {
            index: 2,
            block_length: 10163,
            block_weight: 71,
            error_weight: 134,
            ouroboros: 0,
            ttl_saturate: 30,
        };
        assert_eq!(params.ttl_domain(), 36);
    }

    #[test]
    fn test_extra_defines_format() {
        let params = DecoderParams {
            index: 2,
            block_length: 10163,
            block_weight: 71,
            error_weight: 134,
            ouroboros: 0,
            ttl_saturate: 30,
        };
        let defines = params.extra_defines(&CoeffPair::new(1.0, 1.5));
        assert_eq!(
            defines,
            "-DINDEX=2 -DBLOCK_LENGTH=10163 -DBLOCK_WEIGHT=71 -DERROR_WEIGHT=134 \
             -DOUROBOROS=0 -DTTL_SATURATE=30 -DTTL_COEFF0=1.0 -DTTL_COEFF1=1.5"
        );
    }
}
