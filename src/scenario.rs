//! Scenario catalogue: named bundles of alert rate, TTL, SLA target, and
//! piecewise temporal segments.
//!
//! A segment is a half-open interval `[start, end)` carrying the network
//! reliability for that phase plus optional alert/query rate multipliers.
//! The last segment of every scenario is open-ended, so `active_segment`
//! is total over the horizon.

use crate::error::ConfigError;

/// Default plane dimensions for environment generation.
pub const PLANE_WIDTH: f64 = 960.0;
pub const PLANE_HEIGHT: f64 = 540.0;

/// One temporal phase of a scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub start_sec: u64,
    /// Exclusive end; `None` means the segment runs to the horizon.
    pub end_sec: Option<u64>,
    /// Network reliability multiplier during this phase.
    pub reliability: f64,
    /// Multiplier on the base alert arrival rate.
    pub alert_rate_mul: f64,
    /// Multiplier on the query rate.
    pub query_rate_mul: f64,
}

impl Segment {
    fn new(start_sec: u64, end_sec: Option<u64>, reliability: f64) -> Self {
        Self {
            start_sec,
            end_sec,
            reliability,
            alert_rate_mul: 1.0,
            query_rate_mul: 1.0,
        }
    }

    fn alert_mul(mut self, m: f64) -> Self {
        self.alert_rate_mul = m;
        self
    }

    fn query_mul(mut self, m: f64) -> Self {
        self.query_rate_mul = m;
        self
    }

    /// Whether `t` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, t: u64) -> bool {
        t >= self.start_sec && self.end_sec.map_or(true, |end| t < end)
    }
}

/// A named simulation scenario.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scenario {
    pub name: String,
    pub base_alert_rate_per_min: f64,
    pub mean_ttl_sec: f64,
    /// SLA: a thread's first retrieval/push should land within this.
    pub target_first_delivery_sec: u64,
    /// Region count for environment generation.
    pub region_target: usize,
    pub segments: Vec<Segment>,
}

impl Scenario {
    /// Dense urban deployment: high alert volume, short TTLs, a mid-run
    /// connectivity collapse followed by a query surge.
    #[must_use]
    pub fn urban() -> Self {
        Self {
            name: "Urban".to_string(),
            base_alert_rate_per_min: 36.0,
            mean_ttl_sec: 900.0,
            target_first_delivery_sec: 120,
            region_target: 18,
            segments: vec![
                Segment::new(0, Some(180), 0.95),
                Segment::new(180, Some(420), 0.6).alert_mul(1.5),
                Segment::new(420, Some(900), 0.88).query_mul(1.8),
                Segment::new(900, None, 0.96),
            ],
        }
    }

    /// Suburban deployment: moderate volume, longer degradation phase.
    #[must_use]
    pub fn suburban() -> Self {
        Self {
            name: "Suburban".to_string(),
            base_alert_rate_per_min: 12.0,
            mean_ttl_sec: 1200.0,
            target_first_delivery_sec: 180,
            region_target: 12,
            segments: vec![
                Segment::new(0, Some(240), 0.92),
                Segment::new(240, Some(720), 0.75).alert_mul(1.2),
                Segment::new(720, Some(1200), 0.85).query_mul(1.4),
                Segment::new(1200, None, 0.93),
            ],
        }
    }

    /// Sparse rural deployment: low volume, long TTLs, a deep and long
    /// connectivity trough with reduced querying during the outage.
    #[must_use]
    pub fn rural() -> Self {
        Self {
            name: "Rural".to_string(),
            base_alert_rate_per_min: 6.0,
            mean_ttl_sec: 1800.0,
            target_first_delivery_sec: 300,
            region_target: 8,
            segments: vec![
                Segment::new(0, Some(300), 0.9),
                Segment::new(300, Some(900), 0.55).alert_mul(1.2).query_mul(0.8),
                Segment::new(900, Some(1500), 0.8).query_mul(1.5),
                Segment::new(1500, None, 0.92),
            ],
        }
    }

    /// Scenario names accepted by [`Scenario::named`], in catalogue order.
    #[must_use]
    pub fn names() -> [&'static str; 3] {
        ["Urban", "Suburban", "Rural"]
    }

    /// Look a scenario up by name.
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        match name {
            "Urban" => Ok(Self::urban()),
            "Suburban" => Ok(Self::suburban()),
            "Rural" => Ok(Self::rural()),
            other => Err(ConfigError::UnknownScenario(other.to_string())),
        }
    }

    /// The segment active at second `t`.
    ///
    /// Every catalogue scenario ends with an open segment, so this is total;
    /// a hand-built scenario with a gap falls back to the last segment.
    #[must_use]
    pub fn active_segment(&self, t: u64) -> &Segment {
        self.segments
            .iter()
            .find(|s| s.contains(t))
            .unwrap_or_else(|| self.segments.last().expect("scenario has segments"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_lookup_matches_catalogue() {
        assert_eq!(Scenario::named("Urban").unwrap(), Scenario::urban());
        assert_eq!(Scenario::named("Suburban").unwrap(), Scenario::suburban());
        assert_eq!(Scenario::named("Rural").unwrap(), Scenario::rural());
        assert!(matches!(
            Scenario::named("Metropolis"),
            Err(ConfigError::UnknownScenario(_))
        ));
    }

    #[test]
    fn urban_segments_cover_the_timeline() {
        let s = Scenario::urban();
        assert_eq!(s.active_segment(0).reliability, 0.95);
        assert_eq!(s.active_segment(179).reliability, 0.95);
        // Boundary belongs to the next phase.
        assert_eq!(s.active_segment(180).reliability, 0.6);
        assert_eq!(s.active_segment(180).alert_rate_mul, 1.5);
        assert_eq!(s.active_segment(500).query_rate_mul, 1.8);
        assert_eq!(s.active_segment(900).reliability, 0.96);
        assert_eq!(s.active_segment(1_000_000).reliability, 0.96);
    }

    #[test]
    fn rural_outage_reduces_queries() {
        let s = Scenario::rural();
        let outage = s.active_segment(600);
        assert_eq!(outage.reliability, 0.55);
        assert_eq!(outage.alert_rate_mul, 1.2);
        assert_eq!(outage.query_rate_mul, 0.8);
    }

    #[test]
    fn region_targets_follow_density() {
        assert_eq!(Scenario::urban().region_target, 18);
        assert_eq!(Scenario::suburban().region_target, 12);
        assert_eq!(Scenario::rural().region_target, 8);
    }

    #[test]
    fn default_multipliers_are_identity() {
        for name in Scenario::names() {
            let s = Scenario::named(name).unwrap();
            let first = &s.segments[0];
            assert_eq!(first.alert_rate_mul, 1.0);
            assert_eq!(first.query_rate_mul, 1.0);
        }
    }
}
