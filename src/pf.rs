//! Priority Forecast (PF): an online logistic model over alert context.
//!
//! The model produces a probability per (alert, time) that the alert will be
//! worth keeping. Two consumers: the `PriorityFresh` policy adds the model's
//! boost to its eviction score, and the push gate compares the probability
//! against its threshold.
//!
//! Design points:
//! - The caller never supplies features; the model owns the per-region
//!   weather/anomaly context it was built with and extracts the fixed-order
//!   vector itself.
//! - Updates are AdaGrad-style on a squared-error objective over the linear
//!   output. A step that would produce a non-finite weight is discarded
//!   wholesale.
//! - The model is **seedable** and owns its RNG fork, so epsilon-greedy
//!   exploration never perturbs the engine's stream.

use std::collections::BTreeMap;

use crate::environment::Environment;
use crate::history::{AnomalyRecord, WeatherRecord};
use crate::rng::{fnv1a32, Mulberry32};
use crate::{Alert, Severity, Urgency};

/// Fixed (non-hashed) feature count; the full vector is `23 + hash_buckets`.
pub const PF_FIXED_FEATURES: usize = 23;

/// Normalizer for the handcrafted base score.
const BASE_NORM: f64 = 15.0;

/// Sigmoid input clamp; beyond this the output saturates anyway.
const SIGMOID_CLAMP: f64 = 40.0;

/// Hyperparameters for the PF model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfConfig {
    pub learning_rate: f64,
    pub regularization: f64,
    /// Exponential decay applied to the AdaGrad accumulator each step.
    pub decay: f64,
    /// Temperature dividing the logit before the sigmoid.
    pub temperature: f64,
    /// Epsilon-greedy exploration probability for eviction scoring.
    pub epsilon: f64,
    /// Number of hashed context buckets appended to the fixed features.
    pub hash_buckets: usize,
}

impl Default for PfConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            regularization: 0.0005,
            decay: 0.99,
            temperature: 1.0,
            epsilon: 0.0,
            hash_buckets: 32,
        }
    }
}

/// Serializable PF snapshot, sufficient to resume training.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfState {
    pub weights: Vec<f64>,
    pub grad_accum: Vec<f64>,
    pub temperature: f64,
    pub learning_rate: f64,
    pub regularization: f64,
    pub decay: f64,
    pub hash_bucket_count: usize,
    pub feature_count: usize,
}

/// One labelled training example for historical pre-training.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfSample {
    pub features: Vec<f64>,
    pub label: f64,
}

/// Detailed scoring output for one (alert, time).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfScoreDetail {
    /// Handcrafted base score (severity/urgency term).
    pub base: f64,
    /// Model contribution: `base * (p - 0.5)` plus any exploration term.
    pub boost: f64,
    /// `base + boost`.
    pub total: f64,
    /// Sigmoid output in `(0, 1)`.
    pub probability: f64,
    /// Exploration noise included in `boost` (zero unless drawn).
    pub exploration: f64,
}

/// The online Priority Forecast model.
#[derive(Debug, Clone)]
pub struct PfModel {
    cfg: PfConfig,
    weights: Vec<f64>,
    grad_accum: Vec<f64>,
    rng: Mulberry32,
    region_factors: BTreeMap<String, f64>,
    region_levels: BTreeMap<String, f64>,
    weather: BTreeMap<String, WeatherRecord>,
    anomalies: BTreeMap<String, AnomalyRecord>,
}

fn severity_value(s: Severity) -> f64 {
    match s {
        Severity::Extreme => 1.0,
        Severity::Severe => 0.75,
        Severity::Moderate => 0.45,
        Severity::Minor => 0.25,
        Severity::Unknown => 0.4,
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

impl PfModel {
    /// Build a model bound to the run's environment and history context.
    ///
    /// `rng` should be the run seed's `|pf` fork.
    pub fn new(
        cfg: PfConfig,
        env: &Environment,
        weather: BTreeMap<String, WeatherRecord>,
        anomalies: BTreeMap<String, AnomalyRecord>,
        rng: Mulberry32,
    ) -> Self {
        let n = PF_FIXED_FEATURES + cfg.hash_buckets;
        let region_factors = env
            .regions
            .iter()
            .map(|r| (r.id.clone(), r.local_factor))
            .collect();
        let region_levels = env
            .regions
            .iter()
            .map(|r| (r.id.clone(), r.severity.level()))
            .collect();
        Self {
            cfg,
            weights: vec![0.0; n],
            grad_accum: vec![0.0; n],
            rng,
            region_factors,
            region_levels,
            weather,
            anomalies,
        }
    }

    /// Total feature-vector length.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        PF_FIXED_FEATURES + self.cfg.hash_buckets
    }

    /// Extract the fixed-order feature vector for an alert at `now`.
    #[must_use]
    pub fn features(&self, alert: &Alert, now: u64) -> Vec<f64> {
        let sev = severity_value(alert.severity);
        let urg = if alert.urgency == Urgency::Immediate {
            1.0
        } else {
            0.0
        };
        let local_factor = self
            .region_factors
            .get(&alert.region_id)
            .copied()
            .unwrap_or(1.0);
        let region_level = self
            .region_levels
            .get(&alert.region_id)
            .copied()
            .unwrap_or(0.45);
        let w = self.weather.get(&alert.region_id);
        let a = self.anomalies.get(&alert.region_id);

        let flood = w.map_or(0.0, |w| w.flood_frequency);
        let rainfall = w.map_or(0.0, |w| w.rainfall_mean_mm);
        let volatility = w.map_or(0.0, |w| w.rainfall_volatility);
        let drainage = w.map_or(0.5, |w| w.drainage_score);
        let shelter = w.map_or(0.0, |w| w.shelter_demand_index);

        let false_alarm = a.map_or(0.0, |a| a.false_alarm_rate);
        let diversion = a.map_or(0.0, |a| a.last_minute_diversion_rate);
        let accuracy = a.map_or(0.5, |a| a.historical_accuracy);
        let lead_time = a.map_or(0.0, |a| a.typical_lead_time_sec);
        let under = a.map_or(0.0, |a| a.underestimation_rate);
        let over = a.map_or(0.0, |a| a.overestimation_rate);
        let trend = a.map_or(1.0, |a| a.accuracy_trend);

        let reliability_composite = clip01(
            accuracy * 0.5 + (1.0 - false_alarm) * 0.25 + (1.0 - diversion) * 0.15 + trend * 0.1,
        );

        let tod = (now % 86_400) as f64;
        let phase = std::f64::consts::TAU * tod / 86_400.0;

        let mut x = Vec::with_capacity(self.feature_count());
        x.push(1.0);
        x.push(sev);
        x.push(urg);
        x.push(alert.ttl_sec as f64 / 3600.0);
        x.push(alert.freshness(now));
        x.push(region_level);
        x.push((local_factor - 0.7) / 0.6);
        x.push(flood);
        x.push(rainfall / 160.0);
        x.push(volatility);
        x.push(1.0 - drainage);
        x.push(shelter);
        x.push(self.base_score(alert) / BASE_NORM);
        x.push(false_alarm);
        x.push(diversion);
        x.push(accuracy);
        x.push(lead_time / 3600.0);
        x.push(under);
        x.push(over);
        x.push(reliability_composite);
        x.push(phase.sin());
        x.push(phase.cos());
        x.push(f64::from(alert.update_no) / 4.0);

        let buckets = self.cfg.hash_buckets;
        let start = x.len();
        x.resize(start + buckets, 0.0);
        if buckets > 0 {
            let items = [
                alert.event_type.as_str(),
                alert.region_id.as_str(),
                alert.thread_key.as_str(),
            ];
            let present: Vec<&str> = items.iter().copied().filter(|s| !s.is_empty()).collect();
            let share = 1.0 / present.len().max(1) as f64;
            for item in present {
                let k = (fnv1a32(item) as usize) % buckets;
                x[start + k] += share;
            }
        }

        debug_assert_eq!(x.len(), self.feature_count());
        x
    }

    /// Handcrafted severity/urgency base score (also feature 12, normalized).
    #[must_use]
    pub fn base_score(&self, alert: &Alert) -> f64 {
        let imm = if alert.urgency == Urgency::Immediate {
            2.0
        } else {
            0.0
        };
        BASE_NORM * 0.6 + severity_value(alert.severity) * 3.0 + imm
    }

    /// Predicted keep-probability for an alert at `now`.
    #[must_use]
    pub fn predict(&self, alert: &Alert, now: u64) -> f64 {
        self.predict_features(&self.features(alert, now))
    }

    fn predict_features(&self, x: &[f64]) -> f64 {
        assert_eq!(x.len(), self.weights.len(), "feature vector length mismatch");
        let z: f64 = self
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, xi)| w * xi)
            .sum();
        let t = if self.cfg.temperature.is_finite() && self.cfg.temperature > 0.0 {
            self.cfg.temperature
        } else {
            1.0
        };
        sigmoid((z / t).clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP))
    }

    /// Score an alert. With `explore`, an epsilon-greedy noise term may be
    /// added to the boost (drawn from the model's own RNG).
    pub fn score(&mut self, alert: &Alert, now: u64, explore: bool) -> PfScoreDetail {
        let base = self.base_score(alert);
        let probability = self.predict(alert, now);
        let exploration = if explore
            && self.cfg.epsilon > 0.0
            && self.rng.next() < self.cfg.epsilon
        {
            (self.rng.next() - 0.5) * base * 0.6
        } else {
            0.0
        };
        let boost = base * (probability - 0.5) + exploration;
        PfScoreDetail {
            base,
            boost,
            total: base + boost,
            probability,
            exploration,
        }
    }

    /// Train toward `label` on an explicit feature vector.
    ///
    /// The label is clamped to `[0, 1]`. If any resulting weight or
    /// accumulator entry would be non-finite, the whole step is discarded.
    pub fn train(&mut self, x: &[f64], label: f64) {
        assert_eq!(x.len(), self.weights.len(), "feature vector length mismatch");
        let label = clip01(label);
        let p = self.predict_features(x);
        let err = label - p;
        if !err.is_finite() {
            return;
        }

        let lr = self.cfg.learning_rate;
        let reg = self.cfg.regularization;
        let decay = self.cfg.decay;

        let mut new_w = self.weights.clone();
        let mut new_g2 = self.grad_accum.clone();
        for i in 0..new_w.len() {
            let g = err * x[i];
            new_g2[i] = decay * new_g2[i] + g * g;
            let step = lr / (new_g2[i] + 1e-6).sqrt() * g;
            new_w[i] = (1.0 - reg) * new_w[i] + step;
        }
        if new_w.iter().all(|w| w.is_finite()) && new_g2.iter().all(|g| g.is_finite()) {
            self.weights = new_w;
            self.grad_accum = new_g2;
        }
    }

    /// Positive observation: the alert was retrieved `latency_sec` after
    /// issue, against an optional first-delivery SLA.
    pub fn observe_retrieval(
        &mut self,
        alert: &Alert,
        now: u64,
        latency_sec: f64,
        sla_sec: Option<f64>,
    ) {
        let timeliness = match sla_sec {
            Some(sla) if sla > 0.0 => clip01(1.0 - latency_sec / (1.5 * sla)),
            _ => 0.6,
        };
        let urg = if alert.urgency == Urgency::Immediate {
            1.0
        } else {
            0.0
        };
        let label = clip01(
            0.4 * severity_value(alert.severity)
                + 0.2 * urg
                + 0.25 * alert.freshness(now)
                + 0.15 * timeliness,
        );
        let x = self.features(alert, now);
        self.train(&x, label);
    }

    /// Negative observation: the alert was dropped or missed.
    pub fn observe_drop(&mut self, alert: &Alert, now: u64) {
        let x = self.features(alert, now);
        self.train(&x, 0.0);
    }

    /// Pre-train from historical labelled samples before a run.
    pub fn ingest_historical_samples(&mut self, samples: &[PfSample]) {
        for s in samples {
            self.train(&s.features, s.label);
        }
    }

    /// Snapshot sufficient to resume training.
    #[must_use]
    pub fn state(&self) -> PfState {
        PfState {
            weights: self.weights.clone(),
            grad_accum: self.grad_accum.clone(),
            temperature: self.cfg.temperature,
            learning_rate: self.cfg.learning_rate,
            regularization: self.cfg.regularization,
            decay: self.cfg.decay,
            hash_bucket_count: self.cfg.hash_buckets,
            feature_count: self.feature_count(),
        }
    }

    /// Restore weights and hyperparameters from a snapshot.
    ///
    /// Panics if the snapshot is internally inconsistent — a malformed
    /// snapshot is a bug, not a configuration error.
    pub fn restore(&mut self, state: PfState) {
        assert_eq!(
            state.feature_count,
            PF_FIXED_FEATURES + state.hash_bucket_count,
            "PF state feature count inconsistent with bucket count"
        );
        assert_eq!(
            state.weights.len(),
            state.feature_count,
            "PF state weight vector length mismatch"
        );
        assert_eq!(
            state.grad_accum.len(),
            state.feature_count,
            "PF state accumulator length mismatch"
        );
        assert!(
            state.weights.iter().all(|w| w.is_finite()),
            "PF state weights must be finite"
        );
        self.cfg.temperature = state.temperature;
        self.cfg.learning_rate = state.learning_rate;
        self.cfg.regularization = state.regularization;
        self.cfg.decay = state.decay;
        self.cfg.hash_buckets = state.hash_bucket_count;
        self.weights = state.weights;
        self.grad_accum = state.grad_accum;
    }
}
