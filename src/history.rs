//! Per-region weather and anomaly history synthesis.
//!
//! Both synthesizers consume dedicated stream forks (`|weather`,
//! `|anomaly`) and draw in a fixed per-region order, so the records
//! bit-match across runs and across subsystem changes elsewhere. The draw
//! order below is part of the determinism contract:
//!
//! - weather, per region: flood frequency, rainfall mean, rainfall
//!   volatility, drainage, shelter demand (5 uniforms);
//! - anomaly, per region: base accuracy, false-alarm noise, diversion gate,
//!   diversion noise, lead-time jitter, underestimation, overestimation,
//!   trend gate, trend magnitude (9 uniforms).

use std::collections::BTreeMap;

use crate::environment::{Environment, RegionSeverity};
use crate::rng::Mulberry32;

/// Synthesized flood/rainfall climate for one region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeatherRecord {
    /// Fraction of seasons with at least one flood event, `[0, 1]`.
    pub flood_frequency: f64,
    /// Mean seasonal rainfall in millimetres, `[10, 160]`.
    pub rainfall_mean_mm: f64,
    /// Relative rainfall variability, `[0, 1]`.
    pub rainfall_volatility: f64,
    /// Drainage capacity score, `[0, 1]` (higher drains better).
    pub drainage_score: f64,
    /// Historical shelter demand index, `[0, 1]`.
    pub shelter_demand_index: f64,
}

/// Synthesized forecasting-track-record stats for one region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnomalyRecord {
    pub false_alarm_rate: f64,
    pub last_minute_diversion_rate: f64,
    pub historical_accuracy: f64,
    pub typical_lead_time_sec: f64,
    pub underestimation_rate: f64,
    pub overestimation_rate: f64,
    /// Recent accuracy drift, roughly `[0.75, 1.25]` around flat 1.0.
    pub accuracy_trend: f64,
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn flood_bias(severity: RegionSeverity) -> f64 {
    match severity {
        RegionSeverity::Moderate => 0.0,
        RegionSeverity::Severe => 0.15,
        RegionSeverity::Extreme => 0.3,
    }
}

/// Median warning lead time by region class; harsher regions get less.
fn base_lead_time_sec(severity: RegionSeverity) -> f64 {
    match severity {
        RegionSeverity::Moderate => 1800.0,
        RegionSeverity::Severe => 1200.0,
        RegionSeverity::Extreme => 900.0,
    }
}

/// Draw a weather record per region, keyed by region id.
pub fn synthesize_weather(
    rng: &mut Mulberry32,
    env: &Environment,
) -> BTreeMap<String, WeatherRecord> {
    let mut out = BTreeMap::new();
    for region in &env.regions {
        let flood_frequency =
            clip01(0.25 + flood_bias(region.severity) + (rng.next() - 0.5) * 0.2);
        let rainfall_mean_mm =
            (80.0 + (rng.next() - 0.5) * 40.0 + flood_frequency * 45.0).clamp(10.0, 160.0);
        let rainfall_volatility =
            clip01(0.3 + (rng.next() - 0.5) * 0.2 + region.severity.level() * 0.3);
        let drainage_score =
            clip01(0.5 + (region.local_factor - 1.0) * 0.4 + (rng.next() - 0.5) * 0.3);
        let shelter_demand_index =
            clip01(0.35 + flood_frequency * 0.5 + (rng.next() - 0.5) * 0.2);
        out.insert(
            region.id.clone(),
            WeatherRecord {
                flood_frequency,
                rainfall_mean_mm,
                rainfall_volatility,
                drainage_score,
                shelter_demand_index,
            },
        );
    }
    out
}

/// Draw an anomaly record per region, keyed by region id.
pub fn synthesize_anomalies(
    rng: &mut Mulberry32,
    env: &Environment,
) -> BTreeMap<String, AnomalyRecord> {
    let mut out = BTreeMap::new();
    for region in &env.regions {
        let base_accuracy =
            (0.65 + (region.local_factor - 1.0) * 0.15 + (rng.next() - 0.5) * 0.2)
                .clamp(0.3, 0.95);
        // Low-accuracy regions cry wolf more often.
        let false_alarm_rate =
            clip01(0.08 + (1.0 - base_accuracy) * 0.25 + (rng.next() - 0.5) * 0.08);
        let topographic = rng.next() < 0.3;
        let last_minute_diversion_rate = clip01(
            0.05 + (rng.next() - 0.5) * 0.06 + if topographic { 0.15 } else { 0.0 },
        );
        let historical_accuracy = clip01(
            base_accuracy - 0.3 * false_alarm_rate - 0.2 * last_minute_diversion_rate,
        );
        let typical_lead_time_sec =
            base_lead_time_sec(region.severity) * (0.75 + rng.next() * 0.5);
        let underestimation_rate = clip01(0.12 + (rng.next() - 0.5) * 0.12);
        let overestimation_rate = clip01(0.12 + (rng.next() - 0.5) * 0.12);
        let gate = rng.next();
        let magnitude = rng.next();
        let accuracy_trend = if gate < 0.15 {
            1.1 + magnitude * 0.15
        } else if gate < 0.3 {
            0.9 - magnitude * 0.15
        } else {
            0.95 + magnitude * 0.1
        };
        out.insert(
            region.id.clone(),
            AnomalyRecord {
                false_alarm_rate,
                last_minute_diversion_rate,
                historical_accuracy,
                typical_lead_time_sec,
                underestimation_rate,
                overestimation_rate,
                accuracy_trend,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn fixtures(seed: &str) -> (Environment, BTreeMap<String, WeatherRecord>, BTreeMap<String, AnomalyRecord>) {
        let mut env_rng = Mulberry32::fork(seed, "env");
        let env = Environment::generate(&mut env_rng, 960.0, 540.0, 12);
        let mut w_rng = Mulberry32::fork(seed, "weather");
        let weather = synthesize_weather(&mut w_rng, &env);
        let mut a_rng = Mulberry32::fork(seed, "anomaly");
        let anomalies = synthesize_anomalies(&mut a_rng, &env);
        (env, weather, anomalies)
    }

    #[test]
    fn synthesis_is_deterministic() {
        let (_, w1, a1) = fixtures("hist");
        let (_, w2, a2) = fixtures("hist");
        assert_eq!(w1, w2);
        assert_eq!(a1, a2);
    }

    #[test]
    fn every_region_gets_both_records() {
        let (env, weather, anomalies) = fixtures("cover");
        for r in &env.regions {
            assert!(weather.contains_key(&r.id));
            assert!(anomalies.contains_key(&r.id));
        }
    }

    #[test]
    fn weather_values_stay_in_documented_ranges() {
        let (_, weather, _) = fixtures("ranges-w");
        for w in weather.values() {
            assert!((0.0..=1.0).contains(&w.flood_frequency));
            assert!((10.0..=160.0).contains(&w.rainfall_mean_mm));
            assert!((0.0..=1.0).contains(&w.rainfall_volatility));
            assert!((0.0..=1.0).contains(&w.drainage_score));
            assert!((0.0..=1.0).contains(&w.shelter_demand_index));
        }
    }

    #[test]
    fn anomaly_values_stay_in_documented_ranges() {
        let (_, _, anomalies) = fixtures("ranges-a");
        for a in anomalies.values() {
            assert!((0.0..=1.0).contains(&a.false_alarm_rate));
            assert!((0.0..=1.0).contains(&a.last_minute_diversion_rate));
            assert!((0.0..=1.0).contains(&a.historical_accuracy));
            assert!(a.typical_lead_time_sec > 0.0);
            assert!((0.0..=1.0).contains(&a.underestimation_rate));
            assert!((0.0..=1.0).contains(&a.overestimation_rate));
            assert!((0.75..=1.25).contains(&a.accuracy_trend), "{}", a.accuracy_trend);
        }
    }

    #[test]
    fn weather_and_anomaly_streams_are_independent() {
        // Same env, same seed: consuming the weather stream must not change
        // the anomaly records.
        let mut env_rng = Mulberry32::fork("indep", "env");
        let env = Environment::generate(&mut env_rng, 960.0, 540.0, 8);

        let mut a_rng = Mulberry32::fork("indep", "anomaly");
        let direct = synthesize_anomalies(&mut a_rng, &env);

        let mut w_rng = Mulberry32::fork("indep", "weather");
        let _ = synthesize_weather(&mut w_rng, &env);
        let mut a_rng2 = Mulberry32::fork("indep", "anomaly");
        let after_weather = synthesize_anomalies(&mut a_rng2, &env);

        assert_eq!(direct, after_weather);
    }
}
