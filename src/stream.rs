//! Synthetic alert stream generation.
//!
//! Arrivals follow an exponential inter-arrival process whose rate tracks
//! the scenario's active segment, TTLs come from a Box-Muller normal, and
//! severity draws are biased by the issuing region's hazard class. Alerts in
//! the same `(event, region[, salt])` thread share a thread key and count
//! update numbers from 1.
//!
//! The stream is fully materialized (a run tops out at a few thousand
//! alerts) and its enumeration order is the issue order.

use std::collections::BTreeMap;

use crate::environment::Environment;
use crate::rng::Mulberry32;
use crate::scenario::Scenario;
use crate::{Alert, EventType, Severity, Urgency};

/// Synthesize at most `max_alerts` alerts over `horizon_sec` seconds.
///
/// Draw order per alert is fixed (TTL pair, region, severity, urgency,
/// event type, thread decision) and is part of the determinism contract.
pub fn synthesize_alert_stream(
    rng: &mut Mulberry32,
    scenario: &Scenario,
    env: &Environment,
    max_alerts: usize,
    horizon_sec: u64,
) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = Vec::new();
    let mut thread_counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut t: u64 = 0;

    loop {
        let segment = scenario.active_segment(t);
        let rate_per_min = scenario.base_alert_rate_per_min * segment.alert_rate_mul;
        let mean_gap_sec = 60.0 / rate_per_min.max(f64::MIN_POSITIVE);
        let gap = rng.exponential(mean_gap_sec).round().max(1.0) as u64;
        t += gap;
        if t >= horizon_sec || alerts.len() >= max_alerts {
            break;
        }

        let ttl_sec = rng
            .normal(scenario.mean_ttl_sec, scenario.mean_ttl_sec * 0.25)
            .round()
            .max(120.0) as u64;

        let region = &env.regions[rng.index(env.regions.len())];
        let severity = draw_severity(rng, region.severity.bias());
        let urgency = draw_urgency(rng);
        let event_type = draw_event_type(rng);

        let base_key = format!("{}:{}", event_type, region.id);
        let thread_key = if rng.next() < 0.3 {
            // Update to the ongoing thread for this event/region pair.
            base_key
        } else if rng.next() < 0.4 {
            let salt = (rng.next() * 1000.0).floor() as u32;
            format!("{base_key}:{salt}")
        } else {
            base_key
        };
        let update_no = {
            let c = thread_counts.entry(thread_key.clone()).or_insert(0);
            *c += 1;
            *c
        };

        let size_bytes =
            (f64::from(event_type.base_size_bytes()) * severity.size_multiplier()).round() as u32;

        let id = format!("alert-{}", alerts.len());
        alerts.push(Alert {
            id,
            event_type,
            severity,
            urgency,
            issued_at: t,
            ttl_sec,
            headline: Some(format!("{severity:?} {event_type} alert")),
            instruction: if urgency == Urgency::Immediate {
                Some("Act on local guidance immediately".to_string())
            } else {
                None
            },
            sender: Some("sim-origin".to_string()),
            region_id: region.id.clone(),
            size_bytes: Some(size_bytes),
            thread_key,
            update_no,
        });
    }

    alerts
}

fn draw_severity(rng: &mut Mulberry32, region_bias: f64) -> Severity {
    let u = rng.next();
    let mut edge = 0.05;
    if u < edge {
        return Severity::Unknown;
    }
    edge += 0.20 + region_bias;
    if u < edge {
        return Severity::Extreme;
    }
    edge += 0.35 + 0.5 * region_bias;
    if u < edge {
        return Severity::Severe;
    }
    edge += 0.30;
    if u < edge {
        return Severity::Moderate;
    }
    Severity::Minor
}

fn draw_urgency(rng: &mut Mulberry32) -> Urgency {
    let u = rng.next();
    if u < 0.45 {
        Urgency::Immediate
    } else if u < 0.85 {
        Urgency::Expected
    } else if u < 0.95 {
        Urgency::Future
    } else if u < 0.98 {
        Urgency::Past
    } else {
        Urgency::Unknown
    }
}

fn draw_event_type(rng: &mut Mulberry32) -> EventType {
    let u = rng.next();
    if u < 0.70 {
        EventType::Flood
    } else if u < 0.85 {
        EventType::Shelter
    } else {
        EventType::Other
    }
}
