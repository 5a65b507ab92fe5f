//! CSV export and the persisted-record seam.
//!
//! Column vocabulary is pinned to the downstream plotting tooling: camelCase
//! metric names, `policy,time,cacheSize,hits,misses,hitRate` timelines, and
//! `device,` / `network,` prefix columns for sweep files. Rows are plain
//! string building; values use Rust's shortest-round-trip float formatting.
//!
//! Persistence itself is out of scope: the orchestrator only produces
//! [`RunRecord`] values and hands them to any [`RecordSink`].

use std::collections::BTreeMap;

use crate::batch::{
    CombinedComparison, DeviceComparison, MultiPolicyComparison, NetworkComparison,
    ReplicatedBatch, SeedMode,
};
use crate::engine::RunResult;
use crate::metrics::Metrics;

/// Header for a single-run timeline CSV.
pub const TIMELINE_HEADER: &str = "time,cacheSize,hits,misses,hitRate";

fn metric_columns() -> String {
    Metrics::KEYS.join(",")
}

fn metric_values(m: &Metrics) -> String {
    Metrics::KEYS
        .iter()
        .map(|k| m.value(k).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Single-run timeline: `time,cacheSize,hits,misses,hitRate`.
#[must_use]
pub fn timeline_csv(result: &RunResult) -> String {
    let mut out = String::from(TIMELINE_HEADER);
    out.push('\n');
    for s in &result.timeline {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            s.time,
            s.cache_size,
            s.hits,
            s.misses,
            s.hit_rate()
        ));
    }
    out
}

/// Multi-policy timeline: every run's timeline, prefixed by the policy name.
#[must_use]
pub fn multi_policy_timeline_csv(comparison: &MultiPolicyComparison) -> String {
    let mut out = format!("policy,{TIMELINE_HEADER}\n");
    for run in &comparison.runs {
        for s in &run.timeline {
            out.push_str(&format!(
                "{},{},{},{},{},{}\n",
                run.options.policy,
                s.time,
                s.cache_size,
                s.hits,
                s.misses,
                s.hit_rate()
            ));
        }
    }
    out
}

fn summary_row(run: &RunResult) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        run.options.policy,
        run.seed,
        run.scenario,
        run.options.cache_size,
        run.options.alert_target,
        run.baseline_reliability,
        run.options.horizon_sec,
        run.options.query_rate_per_min,
        metric_values(&run.metrics)
    )
}

fn summary_header() -> String {
    format!(
        "policy,seed,scenario,cacheSize,alerts,reliability,durationSec,queryRatePerMin,{}",
        metric_columns()
    )
}

/// Multi-policy summary: one row per policy with all metrics.
#[must_use]
pub fn multi_policy_csv(comparison: &MultiPolicyComparison) -> String {
    let mut out = summary_header();
    out.push('\n');
    for run in &comparison.runs {
        out.push_str(&summary_row(run));
        out.push('\n');
    }
    out
}

/// Device sweep: multi-policy rows with a leading `device` (cache size).
#[must_use]
pub fn device_csv(device: &DeviceComparison) -> String {
    let mut out = format!("device,{}\n", summary_header());
    for cell in &device.cells {
        for run in &cell.comparison.runs {
            out.push_str(&format!("{},{}\n", cell.cache_size, summary_row(run)));
        }
    }
    out
}

/// Network sweep: multi-policy rows with a leading `network` (reliability).
#[must_use]
pub fn network_csv(network: &NetworkComparison) -> String {
    let mut out = format!("network,{}\n", summary_header());
    for cell in &network.cells {
        for run in &cell.comparison.runs {
            out.push_str(&format!("{},{}\n", cell.reliability, summary_row(run)));
        }
    }
    out
}

/// Combined sweep: multi-policy rows with leading `device,network` columns.
#[must_use]
pub fn combined_csv(combined: &CombinedComparison) -> String {
    let mut out = format!("device,network,{}\n", summary_header());
    for cell in &combined.cells {
        for run in &cell.comparison.runs {
            out.push_str(&format!(
                "{},{},{}\n",
                cell.cache_size,
                cell.reliability,
                summary_row(run)
            ));
        }
    }
    out
}

/// One persisted run record. Opaque to the engine; the sink decides the
/// storage format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RunRecord {
    pub id: String,
    pub scenario: String,
    pub policy: String,
    pub seed: String,
    /// Caller-supplied wall-clock stamp (the core has no clock).
    pub timestamp: u64,
    pub metrics: Metrics,
    pub samples_count: usize,
    pub full_results: Option<RunResult>,
    pub batch_id: Option<String>,
    pub seed_mode: Option<SeedMode>,
    pub replicate_index: Option<usize>,
    pub replicates: Option<usize>,
}

impl RunRecord {
    /// Build a standalone record from a run result.
    #[must_use]
    pub fn from_result(result: &RunResult, id: &str, timestamp: u64, full: bool) -> Self {
        Self {
            id: id.to_string(),
            scenario: result.scenario.clone(),
            policy: result.options.policy.clone(),
            seed: result.seed.clone(),
            timestamp,
            metrics: result.metrics,
            samples_count: result.timeline.len(),
            full_results: if full { Some(result.clone()) } else { None },
            batch_id: None,
            seed_mode: None,
            replicate_index: None,
            replicates: None,
        }
    }
}

/// Anything that can accept run records. Duplicate ids overwrite.
pub trait RecordSink {
    fn put(&mut self, record: RunRecord);
}

/// In-memory sink, mainly for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: BTreeMap<String, RunRecord>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RunRecord> {
        self.records.get(id)
    }
}

impl RecordSink for MemorySink {
    fn put(&mut self, record: RunRecord) {
        self.records.insert(record.id.clone(), record);
    }
}

/// Emit one record per replicate of a batch, tagged with the batch id,
/// seed mode, and replicate position.
pub fn persist_replicated(
    batch: &ReplicatedBatch,
    batch_id: &str,
    timestamp: u64,
    sink: &mut dyn RecordSink,
) {
    let replicates = batch.runs.len();
    for (i, run) in batch.runs.iter().enumerate() {
        let mut record =
            RunRecord::from_result(run, &format!("{batch_id}-{i}"), timestamp, false);
        record.batch_id = Some(batch_id.to_string());
        record.seed_mode = Some(batch.seed_mode);
        record.replicate_index = Some(i);
        record.replicates = Some(replicates);
        sink.put(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{run_multi_policy, run_replicated_batch};
    use crate::engine::{run_simulation, RunOptions};

    fn options(seed: &str) -> RunOptions {
        RunOptions {
            seed: seed.to_string(),
            alert_target: 40,
            horizon_sec: 180,
            cache_size: 32,
            ..RunOptions::default()
        }
    }

    #[test]
    fn timeline_csv_has_header_and_one_row_per_second() {
        let result = run_simulation(&options("csv-1")).unwrap();
        let csv = timeline_csv(&result);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,cacheSize,hits,misses,hitRate");
        assert_eq!(lines.len(), 1 + 180);
        assert!(lines[1].starts_with("0,"));
    }

    #[test]
    fn multi_policy_csv_rows_cover_every_policy() {
        let comparison = run_multi_policy(&options("csv-2")).unwrap();
        let csv = multi_policy_csv(&comparison);
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0]
            .starts_with("policy,seed,scenario,cacheSize,alerts,reliability,durationSec,queryRatePerMin,cacheHitRate"));
        assert_eq!(lines.len(), 1 + 4);
        assert!(lines[1].starts_with("LRU,csv-2,Urban,32,40,"));
        assert!(lines[4].starts_with("PAFTinyLFU,"));
        // 8 context columns + 11 metric columns.
        assert_eq!(lines[1].split(',').count(), 19);
    }

    #[test]
    fn multi_policy_timeline_prefixes_the_policy() {
        let comparison = run_multi_policy(&options("csv-3")).unwrap();
        let csv = multi_policy_timeline_csv(&comparison);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "policy,time,cacheSize,hits,misses,hitRate");
        assert_eq!(lines.len(), 1 + 4 * 180);
        assert!(lines[1].starts_with("LRU,0,"));
    }

    #[test]
    fn sink_overwrites_duplicate_ids() {
        let result = run_simulation(&options("csv-4")).unwrap();
        let mut sink = MemorySink::new();
        sink.put(RunRecord::from_result(&result, "run-1", 1, false));
        sink.put(RunRecord::from_result(&result, "run-1", 2, false));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("run-1").unwrap().timestamp, 2);
    }

    #[test]
    fn persist_replicated_tags_batch_metadata() {
        let batch = run_replicated_batch(
            &options("csv-5"),
            2,
            crate::batch::SeedMode::DeterministicJitter,
        )
        .unwrap();
        let mut sink = MemorySink::new();
        persist_replicated(&batch, "batch-9", 42, &mut sink);
        assert_eq!(sink.len(), 2);
        let rec = sink.get("batch-9-0").unwrap();
        assert_eq!(rec.batch_id.as_deref(), Some("batch-9"));
        assert_eq!(rec.replicate_index, Some(0));
        assert_eq!(rec.replicates, Some(2));
        assert_eq!(rec.seed, "csv-5#1");
        assert_eq!(rec.samples_count, 180);
        assert!(rec.full_results.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn records_serialize_with_camel_case_keys() {
        let result = run_simulation(&options("csv-6")).unwrap();
        let record = RunRecord::from_result(&result, "run-x", 7, false);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "run-x");
        assert!(json["metrics"]["cacheHitRate"].is_number());
        assert!(json["samplesCount"].is_number());
        let back: RunRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
