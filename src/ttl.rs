//! TTL curve generation from affine coefficients.
//!
//! A candidate pair `(a, b)` defines the per-counter TTL lookup curve
//!
//! ```text
//! t(i) = clamp(floor(a*i + b), 1, saturate)    for i = 0 ..= block_weight/2
//! ```
//!
//! The domain is inclusive, so a block weight of 71 yields 36 entries.
//! The decoder is compiled against the integer curve, not the raw
//! coefficients, which makes the curve the natural identity for caching:
//! nearby coefficient pairs frequently alias to the same curve, and the
//! same curve must never be measured twice.

/// A candidate coefficient pair `(a, b)`.
///
/// The optimizer moves `Vec<f64>` parameter vectors around; this is the
/// typed view the rest of the pipeline works with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoeffPair {
    /// Slope of the affine TTL curve.
    pub a: f64,
    /// Intercept of the affine TTL curve.
    pub b: f64,
}

impl CoeffPair {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// View a two-element parameter vector as a coefficient pair.
    pub fn from_slice(param: &[f64]) -> Option<Self> {
        match param {
            [a, b] => Some(Self { a: *a, b: *b }),
            _ => None,
        }
    }
}

/// A generated TTL lookup curve, the cache identity for its results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TtlCurve(Vec<u32>);

impl TtlCurve {
    /// Generate the curve for `coeffs` over `domain_len` counter values.
    ///
    /// Every entry is clamped into `[1, saturate]`. A non-finite affine
    /// value clamps like any other out-of-range one, so the curve stays
    /// well formed even for degenerate coefficients.
    pub fn generate(coeffs: &CoeffPair, domain_len: usize, saturate: u32) -> Self {
        let values = (0..domain_len)
            .map(|i| {
                let raw = (coeffs.a * i as f64 + coeffs.b).floor();
                if raw.is_nan() || raw < 1.0 {
                    1
                } else if raw > saturate as f64 {
                    saturate
                } else {
                    raw as u32
                }
            })
            .collect();
        Self(values)
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
