//! Count-min frequency sketch with periodic aging.
//!
//! Shared by the TinyLFU admission policy (victim/candidate comparison) and
//! available to the forecast model's hashed features. Counters are small and
//! saturating; an aging pass halves everything once enough increments have
//! accumulated, so long-dead keys decay instead of pinning their estimate
//! forever.
//!
//! Aging is a pure function of the increment sequence — no clocks, no
//! randomness — which keeps sketch state reproducible across runs.

use crate::error::ConfigError;
use crate::rng::fnv1a32;

/// Offset applied per lane to derive `depth` hash variants from one base
/// FNV-1a hash. Any odd constant works; this one is fixed for portability.
const LANE_STEP: u32 = 0x9E37_79B9;

/// Saturation ceiling for the 8-bit counters.
const COUNTER_MAX: u8 = u8::MAX;

/// Count-min sketch over string keys.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrequencySketch {
    width: usize,
    depth: usize,
    counters: Vec<u8>,
    sample_size: u64,
    increments: u64,
    aging_resets: u64,
}

impl FrequencySketch {
    /// Create a sketch with `width` counters per lane (must be a nonzero
    /// power of two) and `depth` lanes. `sample_size` is the number of
    /// increments between aging passes.
    pub fn new(width: usize, depth: usize, sample_size: u64) -> Result<Self, ConfigError> {
        if width == 0 || !width.is_power_of_two() {
            return Err(ConfigError::InvalidSketchWidth(width));
        }
        if depth == 0 {
            return Err(ConfigError::InvalidSketchDepth);
        }
        Ok(Self {
            width,
            depth,
            counters: vec![0; width * depth],
            sample_size: sample_size.max(1),
            increments: 0,
            aging_resets: 0,
        })
    }

    /// Sketch sized for roughly `expected_keys` distinct keys: width is the
    /// next power of two at or above `4 * expected_keys`, depth 4, aging
    /// every `10 * expected_keys` increments.
    pub fn for_expected_keys(expected_keys: usize) -> Self {
        let width = (expected_keys.max(1) * 4).next_power_of_two();
        let sample = (expected_keys.max(1) as u64) * 10;
        // Parameters are valid by construction.
        Self::new(width, 4, sample).expect("derived sketch parameters are valid")
    }

    fn lane_index(&self, base: u32, lane: usize) -> usize {
        let h = base.wrapping_add(LANE_STEP.wrapping_mul(lane as u32));
        (h as usize) & (self.width - 1)
    }

    /// Record one occurrence of `key`.
    ///
    /// Saturated lanes are left untouched. When the increment budget is
    /// exhausted, every counter is halved in place before the next call.
    pub fn increment(&mut self, key: &str) {
        let base = fnv1a32(key);
        for lane in 0..self.depth {
            let idx = lane * self.width + self.lane_index(base, lane);
            if self.counters[idx] < COUNTER_MAX {
                self.counters[idx] += 1;
            }
        }
        self.increments += 1;
        if self.increments >= self.sample_size {
            self.age();
        }
    }

    /// Estimated occurrence count of `key` (minimum over lanes).
    ///
    /// Never under-counts below saturation; may over-count on collisions.
    #[must_use]
    pub fn estimate(&self, key: &str) -> u32 {
        let base = fnv1a32(key);
        let mut min = u32::from(COUNTER_MAX);
        for lane in 0..self.depth {
            let idx = lane * self.width + self.lane_index(base, lane);
            min = min.min(u32::from(self.counters[idx]));
        }
        min
    }

    /// Halve every counter and reset the increment budget.
    fn age(&mut self) {
        for c in &mut self.counters {
            *c >>= 1;
        }
        self.increments = 0;
        self.aging_resets += 1;
    }

    /// Increments recorded since the last aging pass.
    #[must_use]
    pub fn increments_since_aging(&self) -> u64 {
        self.increments
    }

    /// Number of aging passes so far.
    #[must_use]
    pub fn aging_resets(&self) -> u64 {
        self.aging_resets
    }
}
