//! The fixed-step simulation engine.
//!
//! A run is a pure function of its [`RunOptions`]: every random draw comes
//! from the seed string's Mulberry32 streams, time advances one integer
//! second at a time, and the engine performs no I/O. Each second the engine
//! processes arrivals, pending retries, and queries, decides pushes for
//! fresh deliveries, and appends one timeline sample.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use crate::environment::Environment;
use crate::error::ConfigError;
use crate::history::{synthesize_anomalies, synthesize_weather};
use crate::metrics::{Metrics, RegionStats, Sample};
use crate::pf::{PfConfig, PfModel, PfSample, PfState};
use crate::policy::{CachePolicy, EvictionWeights, PolicyKind};
use crate::rng::Mulberry32;
use crate::scenario::{Scenario, PLANE_HEIGHT, PLANE_WIDTH};
use crate::stream::synthesize_alert_stream;
use crate::Alert;

/// Push-notification controls. `rate_limit_per_min = 0` disables pushes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PushOptions {
    /// Max pushes in any sliding 60-second window; 0 disables pushing.
    pub rate_limit_per_min: u32,
    /// Minimum spacing between pushes of the same thread; 0 disables dedup.
    pub dedup_window_sec: u64,
    /// Forecast-probability threshold for non-high-impact alerts.
    pub threshold: f64,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            rate_limit_per_min: 0,
            dedup_window_sec: 60,
            threshold: 0.5,
        }
    }
}

/// Delivery retry controls.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeliveryOptions {
    /// Seconds between attempts; clamped to at least 1 when retries run.
    pub retry_interval_sec: u64,
    /// Total attempts including the first; 1 disables retries.
    pub max_attempts: u32,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            retry_interval_sec: 30,
            max_attempts: 3,
        }
    }
}

/// Priority Forecast configuration for a run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfOptions {
    /// Eviction weight overrides for the `PriorityFresh` score.
    pub weights: EvictionWeights,
    pub config: PfConfig,
    /// Labelled samples applied before the run starts.
    pub historical_samples: Vec<PfSample>,
}

/// Everything a run needs. Construct, tweak fields, then call
/// [`run_simulation`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunOptions {
    pub scenario: String,
    pub policy: String,
    pub cache_size: usize,
    pub alert_target: usize,
    pub baseline_reliability: f64,
    pub horizon_sec: u64,
    pub query_rate_per_min: f64,
    pub seed: String,
    /// Builds the forecast model when the policy is `PriorityFresh`.
    pub pf: Option<PfOptions>,
    pub push: PushOptions,
    pub delivery: DeliveryOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            scenario: "Urban".to_string(),
            policy: "PriorityFresh".to_string(),
            cache_size: 128,
            alert_target: 400,
            baseline_reliability: 0.9,
            horizon_sec: 900,
            query_rate_per_min: 60.0,
            seed: "demo".to_string(),
            pf: None,
            push: PushOptions::default(),
            delivery: DeliveryOptions::default(),
        }
    }
}

impl RunOptions {
    /// Fail-fast validation; returns the resolved scenario and policy kind.
    pub fn validate(&self) -> Result<(Scenario, PolicyKind), ConfigError> {
        if self.seed.is_empty() {
            return Err(ConfigError::EmptySeed);
        }
        if self.cache_size == 0 {
            return Err(ConfigError::InvalidCacheSize(self.cache_size));
        }
        if !(0.0..=1.0).contains(&self.baseline_reliability)
            || !self.baseline_reliability.is_finite()
        {
            return Err(ConfigError::InvalidReliability(self.baseline_reliability));
        }
        if self.horizon_sec == 0 {
            return Err(ConfigError::InvalidHorizon(self.horizon_sec));
        }
        if self.alert_target == 0 {
            return Err(ConfigError::InvalidAlertTarget(self.alert_target));
        }
        if !self.query_rate_per_min.is_finite() || self.query_rate_per_min < 0.0 {
            return Err(ConfigError::InvalidQueryRate(self.query_rate_per_min));
        }
        let scenario = Scenario::named(&self.scenario)?;
        let policy: PolicyKind = self.policy.parse()?;
        Ok((scenario, policy))
    }
}

/// Complete output of one simulation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunResult {
    pub metrics: Metrics,
    pub timeline: Vec<Sample>,
    pub issued_alerts: Vec<Alert>,
    pub delivered_alerts: Vec<Alert>,
    pub environment: Environment,
    pub region_stats: BTreeMap<String, RegionStats>,
    pub scenario: String,
    pub baseline_reliability: f64,
    pub seed: String,
    pub pf_state: Option<PfState>,
    /// Human-readable one-line run summary.
    pub info: String,
    /// The options that produced this result, echoed for exports.
    pub options: RunOptions,
}

/// A delivery waiting for its next attempt.
#[derive(Debug, Clone, Copy)]
struct PendingDelivery {
    alert_idx: usize,
    next_attempt_at: u64,
    attempts_left: u32,
}

/// First-retrieval record for a thread.
#[derive(Debug, Clone, Copy)]
struct ThreadFirstRetrieval {
    latency_sec: u64,
    actionable: bool,
}

struct Engine {
    options: RunOptions,
    scenario: Scenario,
    rng: Mulberry32,
    environment: Environment,
    policy: CachePolicy,
    pf: Option<PfModel>,
    alerts: Vec<Rc<Alert>>,
    arrivals_by_second: BTreeMap<u64, Vec<usize>>,
    pending: Vec<PendingDelivery>,

    delivered: u64,
    dropped: u64,
    duplicate_delivered: u64,
    delivered_alerts: Vec<Alert>,
    thread_deliveries: BTreeMap<String, u64>,

    hits: u64,
    misses: u64,
    freshness_sum: f64,
    stale_hits: u64,
    first_retrieval_at: BTreeMap<String, u64>,
    thread_first_retrieval: BTreeMap<String, ThreadFirstRetrieval>,

    pushes_sent: u64,
    push_suppress_count: u64,
    push_duplicates: u64,
    push_window: VecDeque<u64>,
    last_push_for_thread: BTreeMap<String, u64>,
    first_push_latency: BTreeMap<String, u64>,

    region_stats: BTreeMap<String, RegionStats>,
    timeline: Vec<Sample>,
}

/// Run one simulation to completion.
///
/// Deterministic: identical options (including the seed string) produce a
/// field-by-field identical [`RunResult`], down to the forecast weights.
pub fn run_simulation(options: &RunOptions) -> Result<RunResult, ConfigError> {
    let (scenario, policy_kind) = options.validate()?;

    let mut env_rng = Mulberry32::fork(&options.seed, "env");
    let environment = Environment::generate(
        &mut env_rng,
        PLANE_WIDTH,
        PLANE_HEIGHT,
        scenario.region_target,
    );

    let weights = options
        .pf
        .as_ref()
        .map(|p| p.weights)
        .unwrap_or_default();
    let policy = CachePolicy::with_weights(policy_kind, options.cache_size, weights)?;

    let pf = match (&options.pf, policy_kind) {
        (Some(pf_opts), PolicyKind::PriorityFresh) => {
            let mut w_rng = Mulberry32::fork(&options.seed, "weather");
            let weather = synthesize_weather(&mut w_rng, &environment);
            let mut a_rng = Mulberry32::fork(&options.seed, "anomaly");
            let anomalies = synthesize_anomalies(&mut a_rng, &environment);
            let mut model = PfModel::new(
                pf_opts.config,
                &environment,
                weather,
                anomalies,
                Mulberry32::fork(&options.seed, "pf"),
            );
            model.ingest_historical_samples(&pf_opts.historical_samples);
            Some(model)
        }
        _ => None,
    };

    let mut rng = Mulberry32::from_seed(&options.seed);
    let issued = synthesize_alert_stream(
        &mut rng,
        &scenario,
        &environment,
        options.alert_target,
        options.horizon_sec,
    );
    let alerts: Vec<Rc<Alert>> = issued.into_iter().map(Rc::new).collect();

    let mut arrivals_by_second: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (idx, a) in alerts.iter().enumerate() {
        arrivals_by_second.entry(a.issued_at).or_default().push(idx);
    }

    let region_stats: BTreeMap<String, RegionStats> = environment
        .regions
        .iter()
        .map(|r| (r.id.clone(), RegionStats::default()))
        .collect();

    let engine = Engine {
        options: options.clone(),
        scenario,
        rng,
        environment,
        policy,
        pf,
        alerts,
        arrivals_by_second,
        pending: Vec::new(),
        delivered: 0,
        dropped: 0,
        duplicate_delivered: 0,
        delivered_alerts: Vec::new(),
        thread_deliveries: BTreeMap::new(),
        hits: 0,
        misses: 0,
        freshness_sum: 0.0,
        stale_hits: 0,
        first_retrieval_at: BTreeMap::new(),
        thread_first_retrieval: BTreeMap::new(),
        pushes_sent: 0,
        push_suppress_count: 0,
        push_duplicates: 0,
        push_window: VecDeque::new(),
        last_push_for_thread: BTreeMap::new(),
        first_push_latency: BTreeMap::new(),
        region_stats,
        timeline: Vec::with_capacity(options.horizon_sec as usize),
    };

    Ok(engine.run())
}

impl Engine {
    fn run(mut self) -> RunResult {
        for t in 0..self.options.horizon_sec {
            self.process_arrivals(t);
            self.process_retries(t);
            self.process_queries(t);
            self.timeline.push(Sample {
                time: t,
                cache_size: self.policy.len(),
                hits: self.hits,
                misses: self.misses,
            });
        }
        // Anything still waiting at the horizon never made it.
        let leftover: Vec<usize> = self.pending.iter().map(|p| p.alert_idx).collect();
        for idx in leftover {
            self.record_drop(idx);
        }
        self.pending.clear();
        self.finalize()
    }

    fn process_arrivals(&mut self, t: u64) {
        let Some(indices) = self.arrivals_by_second.get(&t).cloned() else {
            return;
        };
        for idx in indices {
            if self.attempt_delivery(idx, t) {
                continue;
            }
            if self.options.delivery.max_attempts > 1 {
                self.pending.push(PendingDelivery {
                    alert_idx: idx,
                    next_attempt_at: t + self.retry_interval(),
                    attempts_left: self.options.delivery.max_attempts - 1,
                });
            } else {
                self.record_drop(idx);
            }
        }
    }

    /// Retry cadence, clamped to at least one second.
    fn retry_interval(&self) -> u64 {
        self.options.delivery.retry_interval_sec.max(1)
    }

    fn process_retries(&mut self, t: u64) {
        let pending = std::mem::take(&mut self.pending);
        for mut entry in pending {
            let alert = self.alerts[entry.alert_idx].clone();
            if alert.is_expired(t) {
                self.record_drop(entry.alert_idx);
                continue;
            }
            if t < entry.next_attempt_at {
                self.pending.push(entry);
                continue;
            }
            if self.attempt_delivery(entry.alert_idx, t) {
                continue;
            }
            entry.attempts_left -= 1;
            if entry.attempts_left == 0 {
                self.record_drop(entry.alert_idx);
            } else {
                entry.next_attempt_at = t + self.retry_interval();
                self.pending.push(entry);
            }
        }
    }

    fn attempt_delivery(&mut self, idx: usize, t: u64) -> bool {
        let alert = self.alerts[idx].clone();
        let segment = self.scenario.active_segment(t);
        let local_factor = self
            .environment
            .region(&alert.region_id)
            .map_or(1.0, |r| r.local_factor);
        let r_eff = (self.options.baseline_reliability * segment.reliability * local_factor)
            .clamp(0.0, 1.0);
        if self.rng.next() >= r_eff {
            return false;
        }

        self.delivered += 1;
        if let Some(stats) = self.region_stats.get_mut(&alert.region_id) {
            stats.delivered += 1;
        }
        self.delivered_alerts.push((*alert).clone());
        let count = self
            .thread_deliveries
            .entry(alert.thread_key.clone())
            .or_insert(0);
        *count += 1;
        if *count >= 2 {
            self.duplicate_delivered += 1;
        }

        self.policy.put(alert.clone(), t, self.pf.as_mut());
        self.decide_push(&alert, t);
        true
    }

    fn record_drop(&mut self, idx: usize) {
        self.dropped += 1;
        let region_id = self.alerts[idx].region_id.clone();
        if let Some(stats) = self.region_stats.get_mut(&region_id) {
            stats.dropped += 1;
        }
    }

    fn decide_push(&mut self, alert: &Alert, t: u64) {
        let rate_limit = self.options.push.rate_limit_per_min;
        if rate_limit == 0 {
            return;
        }
        // Prune before the rate check: the window is (t - 60, t].
        while let Some(&front) = self.push_window.front() {
            if front + 60 <= t {
                self.push_window.pop_front();
            } else {
                break;
            }
        }
        let within_rate = (self.push_window.len() as u32) < rate_limit;

        let dedup = self.options.push.dedup_window_sec;
        let not_duplicate = dedup == 0
            || self
                .last_push_for_thread
                .get(&alert.thread_key)
                .map_or(true, |last| t - last > dedup);

        let probability = match self.pf.as_mut() {
            Some(model) => model.score(alert, t, false).probability,
            None => 0.0,
        };
        let epsilon = self
            .options
            .pf
            .as_ref()
            .map_or(0.0, |p| p.config.epsilon);
        let explore = self.pf.is_some() && epsilon > 0.0 && self.rng.next() < epsilon;
        let high_impact = alert.is_high_impact();

        if within_rate
            && not_duplicate
            && (probability >= self.options.push.threshold || explore || high_impact)
        {
            self.pushes_sent += 1;
            self.push_window.push_back(t);
            if self.last_push_for_thread.contains_key(&alert.thread_key) {
                self.push_duplicates += 1;
            }
            self.last_push_for_thread
                .insert(alert.thread_key.clone(), t);
            self.first_push_latency
                .entry(alert.thread_key.clone())
                .or_insert_with(|| t.saturating_sub(alert.issued_at));
        } else {
            self.push_suppress_count += 1;
        }
    }

    fn process_queries(&mut self, t: u64) {
        let segment = self.scenario.active_segment(t);
        let rate = (self.options.query_rate_per_min / 60.0) * segment.query_rate_mul;
        let count = self.rng.poisson(rate);
        for _ in 0..count {
            self.run_one_query(t);
        }
    }

    fn run_one_query(&mut self, t: u64) {
        let entries = self.policy.entries(t);
        if entries.is_empty() {
            self.misses += 1;
            return;
        }
        let weights: Vec<f64> = entries.iter().map(|a| a.query_weight(t)).collect();
        let total: f64 = weights.iter().sum();
        let mut pick = entries.len() - 1;
        if total > 0.0 {
            let mut threshold = self.rng.next() * total;
            for (i, w) in weights.iter().enumerate() {
                threshold -= w;
                if threshold <= 0.0 {
                    pick = i;
                    break;
                }
            }
        }
        let wanted = entries[pick].clone();

        match self.policy.get(&wanted.id, t) {
            Some(alert) => self.record_hit(&alert, t),
            None => {
                self.misses += 1;
                if let Some(model) = self.pf.as_mut() {
                    model.observe_drop(&wanted, t);
                }
            }
        }
    }

    fn record_hit(&mut self, alert: &Alert, t: u64) {
        self.hits += 1;
        let freshness = alert.freshness(t);
        self.freshness_sum += freshness;
        if freshness == 0.0 {
            self.stale_hits += 1;
        }

        let latency = t.saturating_sub(alert.issued_at);
        if !self.first_retrieval_at.contains_key(&alert.id) {
            self.first_retrieval_at.insert(alert.id.clone(), t);
            if let Some(stats) = self.region_stats.get_mut(&alert.region_id) {
                stats.first_retrievals += 1;
                stats.first_lat_sum += latency as f64;
            }
        }
        self.thread_first_retrieval
            .entry(alert.thread_key.clone())
            .or_insert(ThreadFirstRetrieval {
                latency_sec: latency,
                actionable: alert.is_high_impact(),
            });

        if let Some(model) = self.pf.as_mut() {
            model.observe_retrieval(
                alert,
                t,
                latency as f64,
                Some(self.scenario.target_first_delivery_sec as f64),
            );
        }
    }

    fn finalize(mut self) -> RunResult {
        let issued = self.alerts.len() as u64;
        debug_assert_eq!(self.delivered + self.dropped, issued);

        let queries = self.hits + self.misses;
        let cache_hit_rate = if queries == 0 {
            0.0
        } else {
            self.hits as f64 / queries as f64
        };
        let avg_freshness = if self.hits == 0 {
            0.0
        } else {
            self.freshness_sum / self.hits as f64
        };
        let stale_access_rate = if self.hits == 0 {
            0.0
        } else {
            self.stale_hits as f64 / self.hits as f64
        };
        let redundancy_index = if self.delivered == 0 {
            0.0
        } else {
            self.duplicate_delivered as f64 / self.delivered as f64
        };

        let threads: std::collections::BTreeSet<&str> = self
            .alerts
            .iter()
            .map(|a| a.thread_key.as_str())
            .collect();
        let thread_count = threads.len() as u64;

        let retrieved_threads = self.thread_first_retrieval.len() as u64;
        let actionable_threads = self
            .thread_first_retrieval
            .values()
            .filter(|r| r.actionable)
            .count() as u64;
        let actionability_first_ratio =
            actionable_threads as f64 / retrieved_threads.max(1) as f64;

        let sla = self.scenario.target_first_delivery_sec;
        let timely_threads = self
            .thread_first_retrieval
            .values()
            .filter(|r| r.latency_sec <= sla)
            .count() as u64;
        let timeliness_consistency = if thread_count == 0 {
            0.0
        } else {
            timely_threads as f64 / thread_count as f64
        };

        let push_suppress_rate = if self.delivered == 0 {
            0.0
        } else {
            self.push_suppress_count as f64 / self.delivered as f64
        };
        let push_duplicate_rate = if self.pushes_sent == 0 {
            0.0
        } else {
            self.push_duplicates as f64 / self.pushes_sent as f64
        };
        let pushed_threads = self.first_push_latency.len() as u64;
        let timely_pushes = self
            .first_push_latency
            .values()
            .filter(|lat| **lat <= sla)
            .count() as u64;
        let push_timely_first_ratio = if pushed_threads == 0 {
            0.0
        } else {
            timely_pushes as f64 / pushed_threads as f64
        };

        let metrics = Metrics {
            cache_hit_rate,
            delivery_rate: self.delivered as f64 / self.options.alert_target as f64,
            avg_freshness,
            stale_access_rate,
            redundancy_index,
            actionability_first_ratio,
            timeliness_consistency,
            pushes_sent: self.pushes_sent,
            push_suppress_rate,
            push_duplicate_rate,
            push_timely_first_ratio,
        };

        for stats in self.region_stats.values_mut() {
            stats.finalize();
        }

        let info = format!(
            "{} / {} / seed {:?}: {} issued, {} delivered, {} dropped, {} pushes, hit rate {:.3}",
            self.options.scenario,
            self.options.policy,
            self.options.seed,
            issued,
            self.delivered,
            self.dropped,
            self.pushes_sent,
            cache_hit_rate,
        );

        RunResult {
            metrics,
            timeline: self.timeline,
            issued_alerts: self.alerts.iter().map(|a| (**a).clone()).collect(),
            delivered_alerts: self.delivered_alerts,
            environment: self.environment,
            region_stats: self.region_stats,
            scenario: self.options.scenario.clone(),
            baseline_reliability: self.options.baseline_reliability,
            seed: self.options.seed.clone(),
            pf_state: self.pf.as_ref().map(|m| m.state()),
            info,
            options: self.options,
        }
    }
}
