//! Cache replacement policies.
//!
//! All four disciplines live behind one sum type with a uniform surface
//! (`put` / `get` / `has` / `len` / `entries`), so the engine and the batch
//! comparisons swap policies without glue code. Each variant owns its
//! bookkeeping: a recency deque for LRU, a FIFO for TTL-only, first-seen
//! order plus scores for priority eviction, and a frequency sketch plus
//! insertion order for TinyLFU admission.
//!
//! Every read path (`get`, `has`, `entries`) purges entries whose TTL has
//! lapsed before answering; `put` purges before judging overflow so live
//! entries are never evicted to make room next to dead ones.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::pf::PfModel;
use crate::sketch::FrequencySketch;
use crate::Alert;

/// Decay constant for the priority-eviction freshness term (per second).
const PRIORITY_FRESH_LAMBDA: f64 = 1.0 / 600.0;

/// How many of the oldest entries TinyLFU samples when picking a victim.
const TINYLFU_VICTIM_SAMPLE: usize = 8;

/// Which cache discipline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolicyKind {
    Lru,
    TtlOnly,
    PriorityFresh,
    PafTinyLfu,
}

impl PolicyKind {
    /// All policies, in the canonical comparison order.
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Lru,
        PolicyKind::TtlOnly,
        PolicyKind::PriorityFresh,
        PolicyKind::PafTinyLfu,
    ];

    /// Stable display name, matching the exported CSV vocabulary.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Lru => "LRU",
            PolicyKind::TtlOnly => "TTLOnly",
            PolicyKind::PriorityFresh => "PriorityFresh",
            PolicyKind::PafTinyLfu => "PAFTinyLFU",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LRU" => Ok(PolicyKind::Lru),
            "TTLOnly" => Ok(PolicyKind::TtlOnly),
            "PriorityFresh" => Ok(PolicyKind::PriorityFresh),
            "PAFTinyLFU" => Ok(PolicyKind::PafTinyLfu),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Weights for the priority-eviction score. Overridable per run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvictionWeights {
    pub severity: f64,
    pub urgency: f64,
    pub freshness: f64,
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            severity: 2.0,
            urgency: 3.0,
            freshness: 4.0,
        }
    }
}

/// A capacity-bounded alert cache under one of the four disciplines.
#[derive(Debug, Clone)]
pub enum CachePolicy {
    Lru(LruCache),
    TtlOnly(TtlCache),
    PriorityFresh(PriorityFreshCache),
    PafTinyLfu(TinyLfuCache),
}

impl CachePolicy {
    /// Build a policy with the default configuration for its kind.
    pub fn new(kind: PolicyKind, capacity: usize) -> Result<Self, ConfigError> {
        Self::with_weights(kind, capacity, EvictionWeights::default())
    }

    /// Build a policy, overriding the priority-eviction weights (only
    /// meaningful for `PriorityFresh`; other kinds ignore them).
    pub fn with_weights(
        kind: PolicyKind,
        capacity: usize,
        weights: EvictionWeights,
    ) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCacheSize(capacity));
        }
        Ok(match kind {
            PolicyKind::Lru => CachePolicy::Lru(LruCache::new(capacity)),
            PolicyKind::TtlOnly => CachePolicy::TtlOnly(TtlCache::new(capacity)),
            PolicyKind::PriorityFresh => {
                CachePolicy::PriorityFresh(PriorityFreshCache::new(capacity, weights))
            }
            PolicyKind::PafTinyLfu => CachePolicy::PafTinyLfu(TinyLfuCache::new(capacity)),
        })
    }

    /// The discipline this cache runs.
    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        match self {
            CachePolicy::Lru(_) => PolicyKind::Lru,
            CachePolicy::TtlOnly(_) => PolicyKind::TtlOnly,
            CachePolicy::PriorityFresh(_) => PolicyKind::PriorityFresh,
            CachePolicy::PafTinyLfu(_) => PolicyKind::PafTinyLfu,
        }
    }

    /// Admit an alert at time `now`. `pf` is consulted by `PriorityFresh`
    /// for its eviction boost and ignored by the other disciplines.
    pub fn put(&mut self, alert: Rc<Alert>, now: u64, pf: Option<&mut PfModel>) {
        match self {
            CachePolicy::Lru(c) => c.put(alert, now),
            CachePolicy::TtlOnly(c) => c.put(alert, now),
            CachePolicy::PriorityFresh(c) => c.put(alert, now, pf),
            CachePolicy::PafTinyLfu(c) => c.put(alert, now),
        }
    }

    /// Fetch an alert by id, if present and unexpired.
    pub fn get(&mut self, id: &str, now: u64) -> Option<Rc<Alert>> {
        match self {
            CachePolicy::Lru(c) => c.get(id, now),
            CachePolicy::TtlOnly(c) => c.get(id, now),
            CachePolicy::PriorityFresh(c) => c.get(id, now),
            CachePolicy::PafTinyLfu(c) => c.get(id, now),
        }
    }

    /// Whether an unexpired entry exists for `id`.
    pub fn has(&mut self, id: &str, now: u64) -> bool {
        match self {
            CachePolicy::Lru(c) => {
                c.purge(now);
                c.map.contains_key(id)
            }
            CachePolicy::TtlOnly(c) => {
                c.purge(now);
                c.map.contains_key(id)
            }
            CachePolicy::PriorityFresh(c) => {
                c.purge(now);
                c.map.contains_key(id)
            }
            CachePolicy::PafTinyLfu(c) => {
                c.purge(now);
                c.map.contains_key(id)
            }
        }
    }

    /// Current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CachePolicy::Lru(c) => c.map.len(),
            CachePolicy::TtlOnly(c) => c.map.len(),
            CachePolicy::PriorityFresh(c) => c.map.len(),
            CachePolicy::PafTinyLfu(c) => c.map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live entries at `now`, in the policy's deterministic order.
    pub fn entries(&mut self, now: u64) -> Vec<Rc<Alert>> {
        match self {
            CachePolicy::Lru(c) => c.entries(now),
            CachePolicy::TtlOnly(c) => c.entries(now),
            CachePolicy::PriorityFresh(c) => c.entries(now),
            CachePolicy::PafTinyLfu(c) => c.entries(now),
        }
    }
}

fn remove_key(order: &mut VecDeque<String>, id: &str) {
    if let Some(pos) = order.iter().position(|k| k == id) {
        order.remove(pos);
    }
}

// ---------------------------------------------------------------------------
// LRU
// ---------------------------------------------------------------------------

/// Recency-only cache: overflow evicts the least recently used entry.
#[derive(Debug, Clone)]
pub struct LruCache {
    capacity: usize,
    map: BTreeMap<String, Rc<Alert>>,
    /// Front = least recently used, back = most recently used.
    recency: VecDeque<String>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: BTreeMap::new(),
            recency: VecDeque::new(),
        }
    }

    fn purge(&mut self, now: u64) {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, a)| a.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.map.remove(&id);
            remove_key(&mut self.recency, &id);
        }
    }

    fn put(&mut self, alert: Rc<Alert>, now: u64) {
        self.purge(now);
        let id = alert.id.clone();
        if self.map.contains_key(&id) {
            self.map.insert(id.clone(), alert);
            remove_key(&mut self.recency, &id);
            self.recency.push_back(id);
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(victim) = self.recency.pop_front() {
                self.map.remove(&victim);
            }
        }
        self.map.insert(id.clone(), alert);
        self.recency.push_back(id);
    }

    fn get(&mut self, id: &str, now: u64) -> Option<Rc<Alert>> {
        let alert = self.map.get(id)?.clone();
        if alert.is_expired(now) {
            self.map.remove(id);
            remove_key(&mut self.recency, id);
            return None;
        }
        remove_key(&mut self.recency, id);
        self.recency.push_back(id.to_string());
        Some(alert)
    }

    fn entries(&mut self, now: u64) -> Vec<Rc<Alert>> {
        self.purge(now);
        self.recency
            .iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TTL-only (FIFO)
// ---------------------------------------------------------------------------

/// Insertion-ordered cache: overflow evicts the oldest insertion; expiry is
/// handled on access.
#[derive(Debug, Clone)]
pub struct TtlCache {
    capacity: usize,
    map: BTreeMap<String, Rc<Alert>>,
    /// Front = oldest insertion.
    order: VecDeque<String>,
}

impl TtlCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: BTreeMap::new(),
            order: VecDeque::new(),
        }
    }

    fn purge(&mut self, now: u64) {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, a)| a.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.map.remove(&id);
            remove_key(&mut self.order, &id);
        }
    }

    fn put(&mut self, alert: Rc<Alert>, now: u64) {
        self.purge(now);
        let id = alert.id.clone();
        if self.map.contains_key(&id) {
            // Refresh payload; the entry keeps its original queue position.
            self.map.insert(id, alert);
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(victim) = self.order.pop_front() {
                self.map.remove(&victim);
            }
        }
        self.map.insert(id.clone(), alert);
        self.order.push_back(id);
    }

    fn get(&mut self, id: &str, now: u64) -> Option<Rc<Alert>> {
        let alert = self.map.get(id)?.clone();
        if alert.is_expired(now) {
            self.map.remove(id);
            remove_key(&mut self.order, id);
            return None;
        }
        Some(alert)
    }

    fn entries(&mut self, now: u64) -> Vec<Rc<Alert>> {
        self.purge(now);
        self.order
            .iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PriorityFresh
// ---------------------------------------------------------------------------

/// Priority-aware cache: overflow evicts the lowest
/// `w_S * severity + w_U * urgency + w_F * exp(-age/600)` score, optionally
/// boosted by the PF model. On tied scores the first-seen entry wins: the
/// most recently seen of the tied entries is the victim.
#[derive(Debug, Clone)]
pub struct PriorityFreshCache {
    capacity: usize,
    weights: EvictionWeights,
    map: BTreeMap<String, Rc<Alert>>,
    /// First-seen order; the deterministic tie-break.
    seen: VecDeque<String>,
}

impl PriorityFreshCache {
    fn new(capacity: usize, weights: EvictionWeights) -> Self {
        Self {
            capacity,
            weights,
            map: BTreeMap::new(),
            seen: VecDeque::new(),
        }
    }

    fn purge(&mut self, now: u64) {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, a)| a.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.map.remove(&id);
            remove_key(&mut self.seen, &id);
        }
    }

    /// The eviction score of an alert at `now`.
    #[must_use]
    pub fn score(&self, alert: &Alert, now: u64, pf: Option<&mut PfModel>) -> f64 {
        let age = now.saturating_sub(alert.issued_at) as f64;
        let fresh = (-PRIORITY_FRESH_LAMBDA * age).exp();
        let base = self.weights.severity * alert.severity.weight()
            + self.weights.urgency * alert.urgency.weight()
            + self.weights.freshness * fresh;
        match pf {
            Some(model) => base + model.score(alert, now, true).boost,
            None => base,
        }
    }

    fn put(&mut self, alert: Rc<Alert>, now: u64, mut pf: Option<&mut PfModel>) {
        self.purge(now);
        let id = alert.id.clone();
        if self.map.contains_key(&id) {
            self.map.insert(id, alert);
            return;
        }
        if self.map.len() >= self.capacity {
            let mut victim: Option<(String, f64)> = None;
            for id in &self.seen {
                let Some(entry) = self.map.get(id) else {
                    continue;
                };
                let s = self.score(entry, now, pf.as_deref_mut());
                // A tie replaces the victim, so first-seen entries survive.
                match &victim {
                    Some((_, best)) if s > *best => {}
                    _ => victim = Some((id.clone(), s)),
                }
            }
            if let Some((victim_id, _)) = victim {
                self.map.remove(&victim_id);
                remove_key(&mut self.seen, &victim_id);
            }
        }
        self.map.insert(id.clone(), alert);
        self.seen.push_back(id);
    }

    fn get(&mut self, id: &str, now: u64) -> Option<Rc<Alert>> {
        let alert = self.map.get(id)?.clone();
        if alert.is_expired(now) {
            self.map.remove(id);
            remove_key(&mut self.seen, id);
            return None;
        }
        Some(alert)
    }

    fn entries(&mut self, now: u64) -> Vec<Rc<Alert>> {
        self.purge(now);
        self.seen
            .iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PAF TinyLFU
// ---------------------------------------------------------------------------

/// TinyLFU-style admission over a recency base: a count-min sketch tracks
/// thread popularity, and a full cache only admits a candidate whose
/// estimated frequency matches or beats the weakest of the oldest entries.
#[derive(Debug, Clone)]
pub struct TinyLfuCache {
    capacity: usize,
    map: BTreeMap<String, Rc<Alert>>,
    /// Front = least recently used.
    recency: VecDeque<String>,
    /// Front = oldest insertion; the victim sample pool.
    insertion: VecDeque<String>,
    sketch: FrequencySketch,
}

fn sketch_key(alert: &Alert) -> &str {
    if alert.thread_key.is_empty() {
        &alert.id
    } else {
        &alert.thread_key
    }
}

impl TinyLfuCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: BTreeMap::new(),
            recency: VecDeque::new(),
            insertion: VecDeque::new(),
            sketch: FrequencySketch::for_expected_keys(capacity),
        }
    }

    /// Read access to the admission sketch.
    #[must_use]
    pub fn sketch(&self) -> &FrequencySketch {
        &self.sketch
    }

    fn purge(&mut self, now: u64) {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, a)| a.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.map.remove(&id);
            remove_key(&mut self.recency, &id);
            remove_key(&mut self.insertion, &id);
        }
    }

    fn put(&mut self, alert: Rc<Alert>, now: u64) {
        self.sketch.increment(sketch_key(&alert));
        self.purge(now);
        let id = alert.id.clone();
        if self.map.contains_key(&id) {
            self.map.insert(id.clone(), alert);
            remove_key(&mut self.recency, &id);
            self.recency.push_back(id);
            return;
        }
        if self.map.len() >= self.capacity {
            let candidate_freq = self.sketch.estimate(sketch_key(&alert));
            let mut victim: Option<(String, u32)> = None;
            for id in self.insertion.iter().take(TINYLFU_VICTIM_SAMPLE) {
                let Some(entry) = self.map.get(id) else {
                    continue;
                };
                let freq = self.sketch.estimate(sketch_key(entry));
                match &victim {
                    Some((_, best)) if freq >= *best => {}
                    _ => victim = Some((id.clone(), freq)),
                }
            }
            let Some((victim_id, victim_freq)) = victim else {
                return;
            };
            if candidate_freq < victim_freq {
                // Candidate is colder than everything sampled: reject.
                return;
            }
            self.map.remove(&victim_id);
            remove_key(&mut self.recency, &victim_id);
            remove_key(&mut self.insertion, &victim_id);
        }
        self.map.insert(id.clone(), alert);
        self.recency.push_back(id.clone());
        self.insertion.push_back(id);
    }

    fn get(&mut self, id: &str, now: u64) -> Option<Rc<Alert>> {
        let alert = self.map.get(id)?.clone();
        if alert.is_expired(now) {
            self.map.remove(id);
            remove_key(&mut self.recency, id);
            remove_key(&mut self.insertion, id);
            return None;
        }
        remove_key(&mut self.recency, id);
        self.recency.push_back(id.to_string());
        self.sketch.increment(sketch_key(&alert));
        Some(alert)
    }

    fn entries(&mut self, now: u64) -> Vec<Rc<Alert>> {
        self.purge(now);
        self.insertion
            .iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }
}
