//! Orchestrator-level behavior: comparison ordering, replicate seed
//! derivation, aggregation, and the CSV/record seams.

use alertsim::{
    combined_csv, device_csv, multi_policy_csv, network_csv, persist_replicated,
    run_combined_comparison, run_device_comparison, run_multi_policy, run_network_comparison,
    run_replicated_batch, MemorySink, Metrics, RunOptions, SeedMode, DEVICE_CACHE_SIZES,
    NETWORK_RELIABILITIES,
};

fn base_options(seed: &str) -> RunOptions {
    RunOptions {
        seed: seed.to_string(),
        alert_target: 80,
        horizon_sec: 300,
        cache_size: 48,
        ..RunOptions::default()
    }
}

#[test]
fn multi_policy_emits_four_runs_in_policy_order_with_identical_streams() {
    let comparison = run_multi_policy(&base_options("baseline")).unwrap();
    assert_eq!(comparison.runs.len(), 4);
    let order: Vec<&str> = comparison
        .runs
        .iter()
        .map(|r| r.options.policy.as_str())
        .collect();
    assert_eq!(order, ["LRU", "TTLOnly", "PriorityFresh", "PAFTinyLFU"]);
    for run in &comparison.runs {
        assert_eq!(run.seed, "baseline");
        assert_eq!(
            run.issued_alerts, comparison.runs[0].issued_alerts,
            "all policies must see the same alert stream"
        );
        assert_eq!(run.environment, comparison.runs[0].environment);
    }
}

#[test]
fn deterministic_jitter_seeds_and_aggregate_spread() {
    let batch =
        run_replicated_batch(&base_options("b"), 3, SeedMode::DeterministicJitter).unwrap();
    assert_eq!(batch.kind, "replicatedBatch");
    assert_eq!(batch.seeds, ["b#1", "b#2", "b#3"]);
    assert!(batch.failures.is_empty());
    for key in Metrics::KEYS {
        let stats = &batch.aggregate[key];
        assert!(stats.std_dev >= 0.0, "{key}");
        assert!(stats.mean.is_finite(), "{key}");
    }

    let single =
        run_replicated_batch(&base_options("b"), 1, SeedMode::DeterministicJitter).unwrap();
    for key in Metrics::KEYS {
        assert_eq!(single.aggregate[key].std_dev, 0.0, "{key}");
    }
}

#[test]
fn replicated_batches_with_the_same_base_are_reproducible() {
    let a = run_replicated_batch(&base_options("rep"), 2, SeedMode::DeterministicJitter).unwrap();
    let b = run_replicated_batch(&base_options("rep"), 2, SeedMode::DeterministicJitter).unwrap();
    assert_eq!(a, b);
}

#[test]
fn device_and_network_sweeps_cover_their_grids() {
    let device = run_device_comparison(&base_options("dev")).unwrap();
    assert_eq!(device.cells.len(), DEVICE_CACHE_SIZES.len());

    let network = run_network_comparison(&base_options("net")).unwrap();
    assert_eq!(network.cells.len(), NETWORK_RELIABILITIES.len());
    for (cell, expected) in network.cells.iter().zip(NETWORK_RELIABILITIES) {
        assert_eq!(cell.reliability, expected);
        for run in &cell.comparison.runs {
            assert_eq!(run.baseline_reliability, expected);
        }
    }
}

#[test]
fn csv_exports_carry_the_sweep_prefix_columns() {
    let options = base_options("csv");

    let multi = run_multi_policy(&options).unwrap();
    let csv = multi_policy_csv(&multi);
    assert!(csv.starts_with("policy,seed,scenario,cacheSize,alerts,reliability,durationSec,queryRatePerMin,cacheHitRate,"));
    assert!(csv.contains("pushTimelyFirstRatio"));

    let device = run_device_comparison(&options).unwrap();
    let csv = device_csv(&device);
    assert!(csv.starts_with("device,policy,"));
    assert_eq!(csv.lines().count(), 1 + DEVICE_CACHE_SIZES.len() * 4);

    let network = run_network_comparison(&options).unwrap();
    let csv = network_csv(&network);
    assert!(csv.starts_with("network,policy,"));
    assert_eq!(csv.lines().count(), 1 + NETWORK_RELIABILITIES.len() * 4);
}

#[test]
fn combined_sweep_prefixes_both_dimensions() {
    // Shrink the work: one scenario, small run, full grid is 40 cells x 4
    // policies, each short.
    let mut options = base_options("combined");
    options.alert_target = 30;
    options.horizon_sec = 120;
    let combined = run_combined_comparison(&options).unwrap();
    assert_eq!(
        combined.cells.len(),
        DEVICE_CACHE_SIZES.len() * NETWORK_RELIABILITIES.len()
    );
    let csv = combined_csv(&combined);
    assert!(csv.starts_with("device,network,policy,"));
    let first_row = csv.lines().nth(1).unwrap();
    assert!(first_row.starts_with("32,1,LRU,"));
}

#[test]
fn replicated_records_land_in_the_sink_once_per_replicate() {
    let batch =
        run_replicated_batch(&base_options("persist"), 3, SeedMode::DeterministicJitter).unwrap();
    let mut sink = MemorySink::new();
    persist_replicated(&batch, "batch-1", 1_700_000_000_000, &mut sink);
    assert_eq!(sink.len(), 3);
    for i in 0..3 {
        let record = sink.get(&format!("batch-1-{i}")).unwrap();
        assert_eq!(record.seed, format!("persist#{}", i + 1));
        assert_eq!(record.replicate_index, Some(i));
        assert_eq!(record.replicates, Some(3));
        assert_eq!(record.seed_mode, Some(SeedMode::DeterministicJitter));
        assert_eq!(record.samples_count, 300);
    }

    // Re-persisting overwrites instead of duplicating.
    persist_replicated(&batch, "batch-1", 1_700_000_000_001, &mut sink);
    assert_eq!(sink.len(), 3);
    assert_eq!(sink.get("batch-1-0").unwrap().timestamp, 1_700_000_000_001);
}
