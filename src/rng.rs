//! Deterministic seeded randomness for simulation runs.
//!
//! Everything random inside a run flows from one of these streams, so a run
//! is a pure function of its seed string. The generator is Mulberry32 and the
//! string-to-seed hash is fixed bit-for-bit, which keeps timelines comparable
//! across independent implementations of the same simulator.
//!
//! This module intentionally does **not** use the `rand` crate: the whole
//! point is a pinned, portable sequence. `rand` is reserved for the
//! orchestration layer's genuinely non-deterministic modes.

/// 32-bit modular multiply (the low 32 bits of the product).
#[inline]
fn imul(a: u32, b: u32) -> u32 {
    a.wrapping_mul(b)
}

/// Hash an arbitrary seed string to a 32-bit generator state.
///
/// Starts from `1779033703 ^ len`, then per code point multiplies by
/// `3432918353` and rotates left by 13. Two equal strings always map to the
/// same state, on every platform.
#[must_use]
pub fn hash_seed(seed: &str) -> u32 {
    let mut h: u32 = 1779033703 ^ (seed.chars().count() as u32);
    for c in seed.chars() {
        h = imul(h ^ (c as u32), 3432918353);
        h = h.rotate_left(13);
    }
    h
}

/// 32-bit FNV-1a over a byte string.
///
/// Used for the frequency-sketch lanes and the forecast model's hashed
/// bucket features. Non-cryptographic; stability is the only requirement.
#[must_use]
pub fn fnv1a32(s: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for b in s.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(16777619);
    }
    h
}

/// Mulberry32 pseudo-random generator.
///
/// Yields `f64` uniforms in `[0, 1)` with a 32-bit state. Small, fast, and
/// byte-portable; statistical quality is more than enough for synthetic
/// traffic and Bernoulli trials.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    /// Create a generator from a raw 32-bit state.
    #[must_use]
    pub fn new(state: u32) -> Self {
        Self { state }
    }

    /// Create a generator from a seed string via [`hash_seed`].
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        Self::new(hash_seed(seed))
    }

    /// Derive an independent stream for a named sub-concern.
    ///
    /// Forked streams are seeded from `hash(seed + "|" + label)`, so e.g.
    /// the weather synthesizer consumes its own sequence and inserting an
    /// extra draw in one subsystem cannot shift every other subsystem.
    #[must_use]
    pub fn fork(seed: &str, label: &str) -> Self {
        Self::from_seed(&format!("{seed}|{label}"))
    }

    /// Next uniform in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B79F5);
        let mut t = self.state;
        t = imul(t ^ (t >> 15), t | 1);
        t ^= t.wrapping_add(imul(t ^ (t >> 7), t | 61));
        f64::from(t ^ (t >> 14)) / 4294967296.0
    }

    /// Uniform in `[lo, hi)`.
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next() * (hi - lo)
    }

    /// Uniform integer in `[0, n)`. `n` must be nonzero.
    pub fn index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        let i = (self.next() * n as f64) as usize;
        i.min(n - 1)
    }

    /// Exponential draw with the given mean, via inversion (`-mean * ln(u)`).
    ///
    /// `u = 0` is nudged to the smallest subnormal-free value so the log is
    /// finite.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        let u = self.next().max(f64::MIN_POSITIVE);
        -mean * u.ln()
    }

    /// Normal draw via Box-Muller.
    ///
    /// Always consumes exactly two uniforms, so callers interleaving other
    /// draws keep a predictable stream position.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next().max(f64::MIN_POSITIVE);
        let u2 = self.next();
        let mag = (-2.0 * u1.ln()).sqrt();
        mean + std_dev * mag * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Poisson draw via Knuth's multiplicative method.
    ///
    /// The number of uniforms consumed depends on the draw itself; this is
    /// fine because the query stage is the only consumer.
    pub fn poisson(&mut self, lambda: f64) -> u64 {
        if lambda <= 0.0 {
            return 0;
        }
        let l = (-lambda).exp();
        let mut k: u64 = 0;
        let mut p = 1.0;
        loop {
            k += 1;
            p *= self.next();
            if p <= l {
                break;
            }
        }
        k - 1
    }
}
