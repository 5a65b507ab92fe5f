//! Batch orchestration: replicated runs, policy comparisons, device and
//! network sweeps, and randomized scans.
//!
//! Runs are pure functions of `(options, seed)`, so the orchestrator owns
//! the only impure concerns: randomized seed derivation (OS entropy via
//! `rand`) and tracing events between runs. Per-cell failures are captured
//! in the report rather than aborting the batch.

use std::collections::BTreeMap;

use rand::Rng;

use crate::engine::{run_simulation, PfOptions, RunOptions, RunResult};
use crate::error::ConfigError;
use crate::metrics::{aggregate_metrics, MetricStats};
use crate::policy::{EvictionWeights, PolicyKind};
use crate::scenario::Scenario;

/// Cache sizes swept by the device comparison.
pub const DEVICE_CACHE_SIZES: [usize; 5] = [32, 128, 256, 512, 1024];

/// Baseline reliabilities swept by the network comparison.
pub const NETWORK_RELIABILITIES: [f64; 8] = [1.0, 0.95, 0.9, 0.85, 0.7, 0.6, 0.5, 0.3];

/// How replicate seeds are derived from the base seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeedMode {
    /// Every replicate uses the base seed unchanged.
    Fixed,
    /// Replicate `i` uses `base#i` (1-based); reproducible across machines.
    DeterministicJitter,
    /// Replicate `i` uses `base#<uuid-v4>`; fresh entropy per replicate.
    Randomized,
}

/// A batch cell that failed configuration, noted instead of aborting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchFailure {
    /// Which cell failed (seed, policy, or sweep value).
    pub label: String,
    pub error: String,
}

/// Result of a replicated batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicatedBatch {
    /// Discriminator: `"replicatedBatch"`.
    pub kind: String,
    pub seed_mode: SeedMode,
    /// Derived per-replicate seeds, in run order.
    pub seeds: Vec<String>,
    pub runs: Vec<RunResult>,
    /// Mean and sample stdev per metric key, over successful runs.
    pub aggregate: BTreeMap<String, MetricStats>,
    pub failures: Vec<BatchFailure>,
}

/// Result of running the same options under all four policies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiPolicyComparison {
    /// Discriminator: `"multiPolicy"`.
    pub kind: String,
    pub seed: String,
    pub scenario: String,
    /// One run per policy, in `PolicyKind::ALL` order.
    pub runs: Vec<RunResult>,
    pub failures: Vec<BatchFailure>,
}

/// One cache-size cell of a device comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceCell {
    pub cache_size: usize,
    pub comparison: MultiPolicyComparison,
}

/// Result of sweeping cache sizes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceComparison {
    /// Discriminator: `"deviceComparison"`.
    pub kind: String,
    pub cells: Vec<DeviceCell>,
}

/// One reliability cell of a network comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkCell {
    pub reliability: f64,
    pub comparison: MultiPolicyComparison,
}

/// Result of sweeping baseline reliabilities.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkComparison {
    /// Discriminator: `"networkComparison"`.
    pub kind: String,
    pub cells: Vec<NetworkCell>,
}

/// One (cache size, reliability) cell of the combined sweep.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombinedCell {
    pub cache_size: usize,
    pub reliability: f64,
    pub comparison: MultiPolicyComparison,
}

/// Result of the device x network Cartesian sweep.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombinedComparison {
    /// Discriminator: `"combinedComparison"`.
    pub kind: String,
    pub cells: Vec<CombinedCell>,
}

/// Result of a randomized option scan.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RandomizedScan {
    /// Discriminator: `"randomizedScan"`.
    pub kind: String,
    pub runs: Vec<RunResult>,
    pub failures: Vec<BatchFailure>,
}

/// Derive the replicate seed for index `i` (0-based).
fn replicate_seed<R: Rng>(base: &str, mode: SeedMode, i: usize, rng: &mut R) -> String {
    match mode {
        SeedMode::Fixed => base.to_string(),
        SeedMode::DeterministicJitter => format!("{base}#{}", i + 1),
        SeedMode::Randomized => format!("{base}#{}", uuid_v4(rng)),
    }
}

/// Format 16 random bytes as a version-4 UUID.
fn uuid_v4<R: Rng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Run `replicates` copies of `base`, deriving seeds per `seed_mode`, and
/// aggregate the metric keys over the successful runs.
pub fn run_replicated_batch(
    base: &RunOptions,
    replicates: usize,
    seed_mode: SeedMode,
) -> Result<ReplicatedBatch, ConfigError> {
    if replicates == 0 {
        return Err(ConfigError::InvalidReplicates(replicates));
    }
    base.validate()?;

    let mut entropy = rand::rng();
    let mut seeds = Vec::with_capacity(replicates);
    let mut runs = Vec::with_capacity(replicates);
    let mut failures = Vec::new();
    for i in 0..replicates {
        let seed = replicate_seed(&base.seed, seed_mode, i, &mut entropy);
        seeds.push(seed.clone());
        let mut options = base.clone();
        options.seed = seed.clone();
        match run_simulation(&options) {
            Ok(result) => {
                tracing::debug!(seed = %seed, replicate = i, "replicate finished");
                runs.push(result);
            }
            Err(e) => {
                tracing::warn!(seed = %seed, error = %e, "replicate failed");
                failures.push(BatchFailure {
                    label: seed,
                    error: e.to_string(),
                });
            }
        }
    }

    let metrics: Vec<_> = runs.iter().map(|r| r.metrics).collect();
    let aggregate = aggregate_metrics(&metrics);
    tracing::info!(
        replicates,
        failed = failures.len(),
        "replicated batch finished"
    );
    Ok(ReplicatedBatch {
        kind: "replicatedBatch".to_string(),
        seed_mode,
        seeds,
        runs,
        aggregate,
        failures,
    })
}

/// Run `base` once per policy (deterministic seed, `PolicyKind::ALL` order).
pub fn run_multi_policy(base: &RunOptions) -> Result<MultiPolicyComparison, ConfigError> {
    validate_ignoring_policy(base)?;
    let mut runs = Vec::with_capacity(PolicyKind::ALL.len());
    let mut failures = Vec::new();
    for kind in PolicyKind::ALL {
        let mut options = base.clone();
        options.policy = kind.as_str().to_string();
        match run_simulation(&options) {
            Ok(result) => runs.push(result),
            Err(e) => failures.push(BatchFailure {
                label: kind.as_str().to_string(),
                error: e.to_string(),
            }),
        }
    }
    tracing::info!(seed = %base.seed, failed = failures.len(), "multi-policy comparison finished");
    Ok(MultiPolicyComparison {
        kind: "multiPolicy".to_string(),
        seed: base.seed.clone(),
        scenario: base.scenario.clone(),
        runs,
        failures,
    })
}

// Validate everything except the policy name, which the comparison replaces.
fn validate_ignoring_policy(base: &RunOptions) -> Result<(), ConfigError> {
    let mut probe = base.clone();
    probe.policy = PolicyKind::Lru.as_str().to_string();
    probe.validate().map(|_| ())
}

/// Multi-policy comparison at each device cache size.
pub fn run_device_comparison(base: &RunOptions) -> Result<DeviceComparison, ConfigError> {
    let mut cells = Vec::with_capacity(DEVICE_CACHE_SIZES.len());
    for cache_size in DEVICE_CACHE_SIZES {
        let mut options = base.clone();
        options.cache_size = cache_size;
        cells.push(DeviceCell {
            cache_size,
            comparison: run_multi_policy(&options)?,
        });
    }
    Ok(DeviceComparison {
        kind: "deviceComparison".to_string(),
        cells,
    })
}

/// Multi-policy comparison at each network reliability.
pub fn run_network_comparison(base: &RunOptions) -> Result<NetworkComparison, ConfigError> {
    let mut cells = Vec::with_capacity(NETWORK_RELIABILITIES.len());
    for reliability in NETWORK_RELIABILITIES {
        let mut options = base.clone();
        options.baseline_reliability = reliability;
        cells.push(NetworkCell {
            reliability,
            comparison: run_multi_policy(&options)?,
        });
    }
    Ok(NetworkComparison {
        kind: "networkComparison".to_string(),
        cells,
    })
}

/// Multi-policy comparison over the device x network Cartesian product.
pub fn run_combined_comparison(base: &RunOptions) -> Result<CombinedComparison, ConfigError> {
    let mut cells = Vec::with_capacity(DEVICE_CACHE_SIZES.len() * NETWORK_RELIABILITIES.len());
    for cache_size in DEVICE_CACHE_SIZES {
        for reliability in NETWORK_RELIABILITIES {
            let mut options = base.clone();
            options.cache_size = cache_size;
            options.baseline_reliability = reliability;
            cells.push(CombinedCell {
                cache_size,
                reliability,
                comparison: run_multi_policy(&options)?,
            });
        }
    }
    Ok(CombinedComparison {
        kind: "combinedComparison".to_string(),
        cells,
    })
}

/// Draw one fully randomized option set within the documented ranges.
fn random_options<R: Rng>(rng: &mut R) -> RunOptions {
    let names = Scenario::names();
    let scenario = names[rng.random_range(0..names.len())];
    let cache_size = [16, 32, 64, 128, 256, 512, 1024, 2048][rng.random_range(0..8)];
    let policy = PolicyKind::ALL[rng.random_range(0..PolicyKind::ALL.len())];

    let mut options = RunOptions {
        scenario: scenario.to_string(),
        policy: policy.as_str().to_string(),
        cache_size,
        alert_target: rng.random_range(80..=2000),
        baseline_reliability: rng.random_range(0.3..=1.0),
        horizon_sec: rng.random_range(300..=3600),
        query_rate_per_min: rng.random_range(10.0..=300.0),
        seed: format!("rnd-{}", uuid_v4(rng)),
        ..RunOptions::default()
    };
    if policy == PolicyKind::PriorityFresh {
        options.pf = Some(PfOptions {
            weights: EvictionWeights {
                severity: rng.random_range(0.0..=5.0),
                urgency: rng.random_range(0.0..=6.0),
                freshness: rng.random_range(0.0..=6.0),
            },
            ..PfOptions::default()
        });
    }
    if rng.random_bool(0.6) {
        options.push.rate_limit_per_min = rng.random_range(4..=20);
        options.push.dedup_window_sec = [30, 60, 120][rng.random_range(0..3)];
        options.push.threshold = rng.random_range(0.3..=0.95);
    }
    options
}

/// Run `count` freshly randomized configurations (OS entropy).
///
/// Each drawn configuration is itself a deterministic run of its drawn seed;
/// only the draw is random.
pub fn run_randomized_scan(count: usize) -> RandomizedScan {
    run_randomized_scan_with(count, &mut rand::rng())
}

/// Randomized scan over a caller-supplied entropy source (testable variant).
pub fn run_randomized_scan_with<R: Rng>(count: usize, rng: &mut R) -> RandomizedScan {
    let mut runs = Vec::with_capacity(count);
    let mut failures = Vec::new();
    for _ in 0..count {
        let options = random_options(rng);
        match run_simulation(&options) {
            Ok(result) => runs.push(result),
            Err(e) => failures.push(BatchFailure {
                label: options.seed.clone(),
                error: e.to_string(),
            }),
        }
    }
    tracing::info!(count, failed = failures.len(), "randomized scan finished");
    RandomizedScan {
        kind: "randomizedScan".to_string(),
        runs,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_options(seed: &str) -> RunOptions {
        RunOptions {
            seed: seed.to_string(),
            alert_target: 60,
            horizon_sec: 240,
            cache_size: 32,
            ..RunOptions::default()
        }
    }

    #[test]
    fn replicates_must_be_positive() {
        assert!(matches!(
            run_replicated_batch(&small_options("b"), 0, SeedMode::Fixed),
            Err(ConfigError::InvalidReplicates(0))
        ));
    }

    #[test]
    fn deterministic_jitter_derives_numbered_seeds() {
        let batch =
            run_replicated_batch(&small_options("b"), 3, SeedMode::DeterministicJitter).unwrap();
        assert_eq!(batch.seeds, vec!["b#1", "b#2", "b#3"]);
        assert_eq!(batch.runs.len(), 3);
        assert!(batch.failures.is_empty());
        for (seed, run) in batch.seeds.iter().zip(&batch.runs) {
            assert_eq!(&run.seed, seed);
        }
    }

    #[test]
    fn fixed_mode_repeats_the_base_seed_and_collapses_stdev() {
        let batch = run_replicated_batch(&small_options("fx"), 3, SeedMode::Fixed).unwrap();
        assert!(batch.seeds.iter().all(|s| s == "fx"));
        assert_eq!(batch.runs[0], batch.runs[1]);
        assert_eq!(batch.runs[1], batch.runs[2]);
        for stats in batch.aggregate.values() {
            // Identical runs: spread is zero up to fold rounding.
            assert!(stats.std_dev < 1e-9, "{}", stats.std_dev);
        }
    }

    #[test]
    fn single_replicate_has_zero_stdev() {
        let batch =
            run_replicated_batch(&small_options("one"), 1, SeedMode::DeterministicJitter).unwrap();
        for stats in batch.aggregate.values() {
            assert_eq!(stats.std_dev, 0.0);
        }
    }

    #[test]
    fn jitter_aggregate_stdev_is_nonnegative() {
        let batch =
            run_replicated_batch(&small_options("agg"), 3, SeedMode::DeterministicJitter).unwrap();
        for stats in batch.aggregate.values() {
            assert!(stats.std_dev >= 0.0);
        }
    }

    #[test]
    fn randomized_mode_produces_distinct_uuid_seeds() {
        let batch = run_replicated_batch(&small_options("r"), 3, SeedMode::Randomized).unwrap();
        assert_eq!(batch.seeds.len(), 3);
        let mut unique = batch.seeds.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        for seed in &batch.seeds {
            assert!(seed.starts_with("r#"));
            // 8-4-4-4-12 hex with the v4 marker.
            let uuid = &seed[2..];
            assert_eq!(uuid.len(), 36);
            assert_eq!(&uuid[14..15], "4");
        }
    }

    #[test]
    fn multi_policy_runs_in_canonical_order_with_shared_stream() {
        let comparison = run_multi_policy(&small_options("baseline")).unwrap();
        assert_eq!(comparison.kind, "multiPolicy");
        let names: Vec<&str> = comparison
            .runs
            .iter()
            .map(|r| r.options.policy.as_str())
            .collect();
        assert_eq!(names, vec!["LRU", "TTLOnly", "PriorityFresh", "PAFTinyLFU"]);
        for run in &comparison.runs {
            assert_eq!(run.seed, "baseline");
            assert_eq!(run.issued_alerts, comparison.runs[0].issued_alerts);
        }
    }

    #[test]
    fn device_comparison_sweeps_the_fixed_sizes() {
        let device = run_device_comparison(&small_options("dev")).unwrap();
        let sizes: Vec<usize> = device.cells.iter().map(|c| c.cache_size).collect();
        assert_eq!(sizes, DEVICE_CACHE_SIZES.to_vec());
        for cell in &device.cells {
            for run in &cell.comparison.runs {
                assert_eq!(run.options.cache_size, cell.cache_size);
            }
        }
    }

    #[test]
    fn combined_comparison_is_the_cartesian_product() {
        let combined = run_combined_comparison(&small_options("combo")).unwrap();
        assert_eq!(
            combined.cells.len(),
            DEVICE_CACHE_SIZES.len() * NETWORK_RELIABILITIES.len()
        );
        // First cell pins both sweep values.
        assert_eq!(combined.cells[0].cache_size, DEVICE_CACHE_SIZES[0]);
        assert_eq!(combined.cells[0].reliability, NETWORK_RELIABILITIES[0]);
    }

    #[test]
    fn randomized_scan_draws_valid_options() {
        let mut rng = StdRng::seed_from_u64(7);
        let scan = run_randomized_scan_with(4, &mut rng);
        assert_eq!(scan.kind, "randomizedScan");
        assert_eq!(scan.runs.len(), 4);
        assert!(scan.failures.is_empty());
        for run in &scan.runs {
            let o = &run.options;
            assert!(o.alert_target >= 80 && o.alert_target <= 2000);
            assert!((0.3..=1.0).contains(&o.baseline_reliability));
            assert!(o.horizon_sec >= 300 && o.horizon_sec <= 3600);
            assert!(o.query_rate_per_min >= 10.0 && o.query_rate_per_min <= 300.0);
            assert!(run.seed.starts_with("rnd-"));
        }
    }

    #[test]
    fn invalid_base_options_fail_fast_without_side_effects() {
        let mut bad = small_options("bad");
        bad.scenario = "Lunar".to_string();
        assert!(run_replicated_batch(&bad, 2, SeedMode::Fixed).is_err());
        assert!(run_multi_policy(&bad).is_err());
        assert!(run_device_comparison(&bad).is_err());
    }
}
