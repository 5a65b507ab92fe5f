//! Property tests for the cache policies and the frequency sketch.

use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;

use alertsim::{
    synthesize_alert_stream, Alert, CachePolicy, Environment, EventType, FrequencySketch,
    Mulberry32, PolicyKind, Scenario, Severity, Urgency,
};

fn mk_alert(id: &str, issued_at: u64, ttl_sec: u64, sev: Severity, urg: Urgency) -> Rc<Alert> {
    Rc::new(Alert {
        id: id.to_string(),
        event_type: EventType::Flood,
        severity: sev,
        urgency: urg,
        issued_at,
        ttl_sec,
        headline: None,
        instruction: None,
        sender: None,
        region_id: "region-0".to_string(),
        size_bytes: None,
        thread_key: format!("Flood:region-0:{id}"),
        update_no: 1,
    })
}

proptest! {
    // Contracts (a)-(d): capacity bound, miss on absent ids, live round
    // trips, expiry. Exercised under arbitrary interleavings of puts and
    // gets with drifting time.
    #[test]
    fn policy_contracts_hold_under_random_workloads(
        kind_idx in 0usize..4,
        capacity in 1usize..16,
        ops in proptest::collection::vec(
            (0u8..2u8, 0usize..24, 120u64..2000, 1u64..40),
            1..150,
        ),
    ) {
        let kind = PolicyKind::ALL[kind_idx];
        let mut p = CachePolicy::new(kind, capacity).unwrap();
        let mut now = 0u64;
        for (op, id_idx, ttl, dt) in ops {
            now += dt;
            let id = format!("a{id_idx}");
            if op == 0 {
                let sev = if id_idx % 3 == 0 { Severity::Severe } else { Severity::Minor };
                let urg = if id_idx % 2 == 0 { Urgency::Immediate } else { Urgency::Past };
                p.put(mk_alert(&id, now, ttl, sev, urg), now, None);
            } else if let Some(a) = p.get(&id, now) {
                prop_assert_eq!(a.id.as_str(), id.as_str());
                prop_assert!(!a.is_expired(now));
            }
            prop_assert!(p.len() <= capacity, "{} exceeded capacity", kind);
            for e in p.entries(now) {
                prop_assert!(!e.is_expired(now), "{} enumerated an expired entry", kind);
            }
        }
        prop_assert_eq!(p.get("zz-not-inserted", now), None);
        // Advance far past every possible expiry.
        now += 10_000;
        prop_assert!(p.entries(now).is_empty());
    }

    // Sketch lower bound: estimates never undercount while counters are
    // far from saturation and no aging pass runs.
    #[test]
    fn sketch_never_undercounts(
        inserts in proptest::collection::vec(0usize..30, 1..250),
    ) {
        let mut sketch = FrequencySketch::new(2048, 4, 1_000_000).unwrap();
        let mut truth: BTreeMap<usize, u32> = BTreeMap::new();
        for k in &inserts {
            sketch.increment(&format!("key-{k}"));
            *truth.entry(*k).or_insert(0) += 1;
        }
        for (k, count) in truth {
            let est = sketch.estimate(&format!("key-{k}"));
            prop_assert!(est >= count, "key-{k}: est {est} < true {count}");
        }
    }
}

// Contract (e): PriorityFresh never evicts a strictly higher-scoring entry
// while a strictly lower-scoring one stays. Replays a workload and checks
// every eviction against independently recomputed scores.
#[test]
fn priority_fresh_always_evicts_a_minimal_score() {
    fn score(a: &Alert, now: u64) -> f64 {
        let age = now.saturating_sub(a.issued_at) as f64;
        2.0 * a.severity.weight() + 3.0 * a.urgency.weight() + 4.0 * (-age / 600.0).exp()
    }

    let severities = [
        Severity::Minor,
        Severity::Moderate,
        Severity::Severe,
        Severity::Extreme,
        Severity::Unknown,
    ];
    let urgencies = [
        Urgency::Immediate,
        Urgency::Expected,
        Urgency::Future,
        Urgency::Past,
        Urgency::Unknown,
    ];

    let capacity = 6;
    let mut p = CachePolicy::new(PolicyKind::PriorityFresh, capacity).unwrap();

    for i in 0..60u64 {
        let now = i * 37;
        let id = format!("a{i}");
        let alert = mk_alert(
            &id,
            now,
            50_000,
            severities[(i as usize) % severities.len()],
            urgencies[(i as usize * 3) % urgencies.len()],
        );

        let before: Vec<Rc<Alert>> = p.entries(now);
        let was_full = before.len() >= capacity;
        p.put(alert, now, None);

        if was_full {
            let after_ids: Vec<String> = p.entries(now).iter().map(|a| a.id.clone()).collect();
            let evicted: Vec<&Rc<Alert>> = before
                .iter()
                .filter(|a| !after_ids.contains(&a.id))
                .collect();
            assert_eq!(evicted.len(), 1, "exactly one eviction per overflow");
            let evicted_score = score(evicted[0], now);
            let min_before = before
                .iter()
                .map(|a| score(a, now))
                .fold(f64::INFINITY, f64::min);
            assert!(
                evicted_score <= min_before + 1e-12,
                "evicted {} (score {evicted_score}) but min was {min_before}",
                evicted[0].id
            );
        }
    }
}

// Replay a realistic suburban stream through the TinyLFU cache: every
// admission into a full cache must satisfy the sketch comparison against
// the entry it displaced.
#[test]
fn tinylfu_admissions_never_beat_the_sketch() {
    let mut env_rng = Mulberry32::fork("s#1", "env");
    let env = Environment::generate(&mut env_rng, 960.0, 540.0, 12);
    let scenario = Scenario::suburban();
    let mut rng = Mulberry32::from_seed("s#1");
    let alerts = synthesize_alert_stream(&mut rng, &scenario, &env, 300, 1200);
    assert!(alerts.len() > 100, "stream should be substantial");

    let capacity = 64;
    let mut p = CachePolicy::new(PolicyKind::PafTinyLfu, capacity).unwrap();

    for alert in alerts {
        let now = alert.issued_at;
        let rc = Rc::new(alert);
        let before: Vec<Rc<Alert>> = p.entries(now);
        let was_full = before.len() >= capacity;
        let was_present = before.iter().any(|a| a.id == rc.id);

        p.put(rc.clone(), now, None);
        assert!(p.len() <= capacity);

        if was_full && !was_present {
            let after_ids: Vec<String> = p.entries(now).iter().map(|a| a.id.clone()).collect();
            if after_ids.contains(&rc.id) {
                // Admitted: whoever left must not have had a higher estimate.
                let evicted: Vec<&Rc<Alert>> = before
                    .iter()
                    .filter(|a| !after_ids.contains(&a.id))
                    .collect();
                assert_eq!(evicted.len(), 1);
                let CachePolicy::PafTinyLfu(inner) = &p else {
                    unreachable!()
                };
                let candidate_est = inner.sketch().estimate(&rc.thread_key);
                let victim_est = inner.sketch().estimate(&evicted[0].thread_key);
                assert!(
                    candidate_est >= victim_est,
                    "admitted {} (est {candidate_est}) over {} (est {victim_est})",
                    rc.id,
                    evicted[0].id
                );
            }
        }
    }
}
