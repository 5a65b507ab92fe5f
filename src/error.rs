//! Configuration-error taxonomy.
//!
//! Only *caller* mistakes are surfaced as [`ConfigError`]; internal
//! postcondition failures are bugs and assert instead.

use thiserror::Error;

/// Invalid run or batch options, rejected before any work happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("seed string must not be empty")]
    EmptySeed,

    #[error("cache size must be >= 1, got {0}")]
    InvalidCacheSize(usize),

    #[error("unknown scenario: {0:?}")]
    UnknownScenario(String),

    #[error("unknown policy: {0:?}")]
    UnknownPolicy(String),

    #[error("baseline reliability must be in [0, 1], got {0}")]
    InvalidReliability(f64),

    #[error("horizon must be >= 1 second, got {0}")]
    InvalidHorizon(u64),

    #[error("target alert count must be >= 1, got {0}")]
    InvalidAlertTarget(usize),

    #[error("query rate per minute must be finite and >= 0, got {0}")]
    InvalidQueryRate(f64),

    #[error("replicates must be >= 1, got {0}")]
    InvalidReplicates(usize),

    #[error("sketch width must be a nonzero power of two, got {0}")]
    InvalidSketchWidth(usize),

    #[error("sketch depth must be >= 1")]
    InvalidSketchDepth,
}
