//! Run metrics, timeline samples, per-region stats, and batch aggregation.
//!
//! Metric names on the wire are camelCase to stay compatible with the
//! plotting tooling's CSV vocabulary; in Rust they are ordinary snake_case
//! fields. Aggregation folds replicate results in run order (left fold), so
//! aggregate values are reproducible bit-for-bit.

use std::collections::BTreeMap;

/// Final per-run metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Metrics {
    /// hits / (hits + misses); 0 when nothing was queried.
    pub cache_hit_rate: f64,
    /// delivered / target alert count.
    pub delivery_rate: f64,
    /// Mean freshness observed on hits.
    pub avg_freshness: f64,
    /// Fraction of hits that returned a zero-freshness alert.
    pub stale_access_rate: f64,
    /// duplicate deliveries / deliveries.
    pub redundancy_index: f64,
    /// Threads whose first retrieval was actionable / threads retrieved.
    pub actionability_first_ratio: f64,
    /// Threads first retrieved within the scenario SLA / threads.
    pub timeliness_consistency: f64,
    pub pushes_sent: u64,
    /// Suppressed pushes / deliveries.
    pub push_suppress_rate: f64,
    /// Duplicate pushes / pushes sent.
    pub push_duplicate_rate: f64,
    /// Threads first pushed within the SLA / threads pushed.
    pub push_timely_first_ratio: f64,
}

impl Metrics {
    /// Metric keys in export order. This is the aggregation key list and the
    /// CSV column order.
    pub const KEYS: [&'static str; 11] = [
        "cacheHitRate",
        "deliveryRate",
        "avgFreshness",
        "staleAccessRate",
        "redundancyIndex",
        "actionabilityFirstRatio",
        "timelinessConsistency",
        "pushesSent",
        "pushSuppressRate",
        "pushDuplicateRate",
        "pushTimelyFirstRatio",
    ];

    /// Value for a key from [`Metrics::KEYS`].
    ///
    /// Panics on unknown keys: key lists are compile-time constants, so a
    /// miss is a bug.
    #[must_use]
    pub fn value(&self, key: &str) -> f64 {
        match key {
            "cacheHitRate" => self.cache_hit_rate,
            "deliveryRate" => self.delivery_rate,
            "avgFreshness" => self.avg_freshness,
            "staleAccessRate" => self.stale_access_rate,
            "redundancyIndex" => self.redundancy_index,
            "actionabilityFirstRatio" => self.actionability_first_ratio,
            "timelinessConsistency" => self.timeliness_consistency,
            "pushesSent" => self.pushes_sent as f64,
            "pushSuppressRate" => self.push_suppress_rate,
            "pushDuplicateRate" => self.push_duplicate_rate,
            "pushTimelyFirstRatio" => self.push_timely_first_ratio,
            other => panic!("unknown metric key: {other}"),
        }
    }
}

/// One per-second timeline point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Sample {
    pub time: u64,
    pub cache_size: usize,
    /// Cumulative query hits up to and including this second.
    pub hits: u64,
    /// Cumulative query misses up to and including this second.
    pub misses: u64,
}

impl Sample {
    /// Hit rate up to this sample; 0 before the first query.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-region delivery/retrieval counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RegionStats {
    pub delivered: u64,
    pub dropped: u64,
    pub first_retrievals: u64,
    /// Sum of (first retrieval time - issue time) over first retrievals.
    pub first_lat_sum: f64,
    /// `first_lat_sum / first_retrievals`, 0 when nothing was retrieved.
    pub avg_first_retrieval_latency: f64,
}

impl RegionStats {
    /// Recompute the derived average from the raw counters.
    pub fn finalize(&mut self) {
        self.avg_first_retrieval_latency = if self.first_retrievals == 0 {
            0.0
        } else {
            self.first_lat_sum / self.first_retrievals as f64
        };
    }
}

/// Mean and Bessel-corrected sample standard deviation of one metric over a
/// batch of runs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl MetricStats {
    /// Left-fold mean and sample stdev (`n - 1`); stdev is 0 for `n < 2`.
    #[must_use]
    pub fn from_samples(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        if n < 2 {
            return Self { mean, std_dev: 0.0 };
        }
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Self {
            mean,
            std_dev: var.sqrt(),
        }
    }
}

/// Aggregate every metric key over a list of per-run metrics.
#[must_use]
pub fn aggregate_metrics(runs: &[Metrics]) -> BTreeMap<String, MetricStats> {
    let mut out = BTreeMap::new();
    for key in Metrics::KEYS {
        let values: Vec<f64> = runs.iter().map(|m| m.value(key)).collect();
        out.insert(key.to_string(), MetricStats::from_samples(&values));
    }
    out
}
