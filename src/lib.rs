//! `alertsim`: deterministic discrete-event simulation of priority-aware
//! emergency-alert caching.
//!
//! This crate answers questions like "which cache replacement discipline
//! keeps the most actionable alerts on a constrained device when the network
//! is bad?" by simulating a stream of geographically scoped alerts delivered
//! over an unreliable link, cached under one of four policies, queried, and
//! optionally surfaced as rate-limited push notifications.
//!
//! Goals:
//! - **Deterministic by default**: a run is a pure function of its options;
//!   the same seed string yields byte-identical timelines, metrics, and
//!   learner weights.
//! - **Policies as values**: the four disciplines are one sum type with a
//!   uniform put/get surface, so comparisons swap policies without glue.
//! - **Batch-friendly**: the orchestrator sweeps seeds, cache sizes, and
//!   reliabilities, aggregates mean/stdev, and emits CSV-ready records.
//!
//! Included policies:
//! - `Lru`: recency only.
//! - `TtlOnly`: insertion-ordered FIFO with lazy expiry.
//! - `PriorityFresh`: severity + urgency + freshness scoring, optionally
//!   boosted by the online Priority Forecast model.
//! - `PafTinyLfu`: frequency-sketch admission over a recency base.
//!
//! Non-goals:
//! - No real network or geography; the plane and its regions are synthetic.
//! - No persistence format; run records are plain serializable values handed
//!   to an opaque sink.

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod rng;
pub use rng::*;

mod sketch;
pub use sketch::*;

mod environment;
pub use environment::*;

mod history;
pub use history::*;

mod scenario;
pub use scenario::*;

mod stream;
pub use stream::*;

mod policy;
pub use policy::*;

mod pf;
pub use pf::*;

mod metrics;
pub use metrics::*;

mod engine;
pub use engine::*;

mod batch;
pub use batch::*;

mod export;
pub use export::*;

pub const ALERTSIM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kind of hazard an alert describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    Flood,
    Shelter,
    Other,
}

impl EventType {
    /// Stable wire/display name, used in thread keys and exports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Flood => "Flood",
            EventType::Shelter => "Shelter",
            EventType::Other => "Other",
        }
    }

    /// Baseline payload size in bytes before severity scaling.
    #[must_use]
    pub fn base_size_bytes(&self) -> u32 {
        match self {
            EventType::Flood => 1800,
            EventType::Shelter => 1200,
            EventType::Other => 900,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CAP-style severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Extreme,
    Unknown,
}

impl Severity {
    /// Weight used by priority-aware eviction and query selection.
    #[must_use]
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Extreme => 4.0,
            Severity::Severe => 3.0,
            Severity::Moderate => 2.0,
            Severity::Minor => 1.0,
            Severity::Unknown => 2.0,
        }
    }

    /// Payload-size multiplier for synthesized alerts.
    #[must_use]
    pub fn size_multiplier(&self) -> f64 {
        match self {
            Severity::Extreme => 1.3,
            Severity::Severe => 1.15,
            _ => 1.0,
        }
    }
}

/// CAP-style urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Urgency {
    Immediate,
    Expected,
    Future,
    Past,
    Unknown,
}

impl Urgency {
    /// Weight used by priority-aware eviction and query selection.
    #[must_use]
    pub fn weight(&self) -> f64 {
        match self {
            Urgency::Immediate => 3.0,
            Urgency::Expected => 2.0,
            Urgency::Future => 1.5,
            Urgency::Past => 0.5,
            Urgency::Unknown => 1.5,
        }
    }
}

/// A single time-bounded emergency alert.
///
/// Alerts sharing a `thread_key` are updates in one logical incident thread;
/// `update_no` counts position within the thread, starting at 1.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alert {
    pub id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub urgency: Urgency,
    /// Seconds since simulation start.
    pub issued_at: u64,
    /// Lifetime in seconds; the alert expires at `issued_at + ttl_sec`.
    pub ttl_sec: u64,
    pub headline: Option<String>,
    pub instruction: Option<String>,
    pub sender: Option<String>,
    pub region_id: String,
    pub size_bytes: Option<u32>,
    pub thread_key: String,
    pub update_no: u32,
}

impl Alert {
    /// Whether the alert is expired at wall time `now` (inclusive at the
    /// expiry instant).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.issued_at + self.ttl_sec
    }

    /// Freshness `exp(-age / ttl)` in `(0, 1]` while live, `0.0` once
    /// expired.
    #[must_use]
    pub fn freshness(&self, now: u64) -> f64 {
        if self.is_expired(now) {
            return 0.0;
        }
        let age = now.saturating_sub(self.issued_at) as f64;
        (-age / self.ttl_sec as f64).exp()
    }

    /// Immediate urgency or Severe/Extreme severity: worth acting on first
    /// and allowed to bypass the push probability threshold.
    #[must_use]
    pub fn is_high_impact(&self) -> bool {
        self.urgency == Urgency::Immediate
            || matches!(self.severity, Severity::Severe | Severity::Extreme)
    }

    /// Weight used when queries sample the cache: urgency x severity x
    /// freshness at `now`.
    #[must_use]
    pub fn query_weight(&self, now: u64) -> f64 {
        self.urgency.weight() * self.severity.weight() * self.freshness(now)
    }
}
