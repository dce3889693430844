// src/clustering.rs
//
// Greedy single-pass grouping of classified events into "critical zones".
//
// Each event joins the FIRST zone (creation order) whose centroid lies within
// `radius_deg`, measured as planar distance in degrees. Not the nearest zone:
// the first-match rule is what makes the output reproducible against earlier
// reports, so a spatial index that changed the match rule would change
// results. Cost is O(n·k) for k zones, fine for a few thousand points.

use crate::aggregation::{ComplianceAggregator, Stats};
use crate::geo::{degree_distance, is_valid_coordinate};
use crate::types::{Severity, ViolationEvent};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_RADIUS_DEG: f64 = 0.01;

/// Severities counted when the caller does not pass a filter.
pub const VIOLATION_SEVERITIES: [Severity; 3] =
    [Severity::Light, Severity::Moderate, Severity::Severe];

#[derive(Debug, Clone, Serialize)]
pub struct Zone {
    /// 1-based, assigned by `rank`.
    pub rank: Option<usize>,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    /// Members matching the ranking filter, filled in by `rank`.
    pub violation_count: usize,
    pub members: Vec<ViolationEvent>,
}

impl Zone {
    fn new(event: ViolationEvent) -> Self {
        Self {
            rank: None,
            centroid_lat: event.lat,
            centroid_lon: event.lon,
            violation_count: 0,
            members: vec![event],
        }
    }

    fn push(&mut self, event: ViolationEvent) {
        self.members.push(event);
        self.recompute_centroid();
    }

    /// Full mean over all members, not an incremental update.
    fn recompute_centroid(&mut self) {
        let n = self.members.len() as f64;
        let (sum_lat, sum_lon) = self
            .members
            .iter()
            .fold((0.0, 0.0), |(la, lo), e| (la + e.lat, lo + e.lon));
        self.centroid_lat = sum_lat / n;
        self.centroid_lon = sum_lon / n;
    }

    pub fn contains(&self, lat: f64, lon: f64, radius_deg: f64) -> bool {
        degree_distance(self.centroid_lat, self.centroid_lon, lat, lon) <= radius_deg
    }

    pub fn count_matching(&self, filter: &[Severity]) -> usize {
        self.members
            .iter()
            .filter(|e| filter.contains(&e.severity))
            .count()
    }

    pub fn stats(&self, aggregator: &ComplianceAggregator) -> Stats {
        aggregator.aggregate(&self.members)
    }
}

#[derive(Debug, Clone)]
pub struct SpatialClusterer {
    radius_deg: f64,
}

impl Default for SpatialClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_DEG)
    }
}

impl SpatialClusterer {
    pub fn new(radius_deg: f64) -> Self {
        Self { radius_deg }
    }

    /// Zones in creation order. Events with unusable coordinates are skipped.
    pub fn cluster(&self, events: &[ViolationEvent]) -> Vec<Zone> {
        let mut zones: Vec<Zone> = Vec::new();
        let mut skipped = 0usize;

        for event in events {
            if !is_valid_coordinate(event.lat, event.lon) {
                skipped += 1;
                continue;
            }

            match zones
                .iter_mut()
                .find(|z| z.contains(event.lat, event.lon, self.radius_deg))
            {
                Some(zone) => zone.push(event.clone()),
                None => zones.push(Zone::new(event.clone())),
            }
        }

        debug!(
            "Clustered {} events into {} zones ({} skipped, radius {}°)",
            events.len() - skipped,
            zones.len(),
            skipped,
            self.radius_deg
        );
        zones
    }

    /// Order by matching-member count, descending. The sort is stable, so ties
    /// keep creation order. Zones with no matching member are dropped.
    pub fn rank(&self, zones: Vec<Zone>, filter: &[Severity], top_n: usize) -> Vec<Zone> {
        let mut ranked: Vec<Zone> = zones
            .into_iter()
            .map(|mut z| {
                z.violation_count = z.count_matching(filter);
                z
            })
            .filter(|z| z.violation_count > 0)
            .collect();

        ranked.sort_by(|a, b| b.violation_count.cmp(&a.violation_count));
        ranked.truncate(top_n);

        for (i, zone) in ranked.iter_mut().enumerate() {
            zone.rank = Some(i + 1);
        }
        ranked
    }

    pub fn critical_zones(
        &self,
        events: &[ViolationEvent],
        filter: &[Severity],
        top_n: usize,
    ) -> Vec<Zone> {
        self.rank(self.cluster(events), filter, top_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoadType;
    use chrono::{TimeZone, Utc};

    fn ev(lat: f64, lon: f64, severity: Severity) -> ViolationEvent {
        ViolationEvent {
            session_id: "s".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            lat,
            lon,
            speed_kmh: 80.0,
            limit_kmh: 60.0,
            excess_kmh: 20.0,
            severity,
            road_type: RoadType::Urban,
            in_base_zone: false,
            emergency_light_on: false,
        }
    }

    #[test]
    fn test_close_events_merge() {
        let c = SpatialClusterer::default();
        let zones = c.cluster(&[
            ev(-12.000, -77.000, Severity::Light),
            ev(-12.005, -77.000, Severity::Severe),
        ]);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].members.len(), 2);
        assert!((zones[0].centroid_lat - -12.0025).abs() < 1e-12);
    }

    #[test]
    fn test_distant_events_split() {
        let c = SpatialClusterer::default();
        let zones = c.cluster(&[
            ev(-12.00, -77.00, Severity::Light),
            ev(-12.02, -77.00, Severity::Light),
        ]);
        assert_eq!(zones.len(), 2);
    }

    #[test]
    fn test_first_match_not_nearest() {
        let c = SpatialClusterer::new(0.01);
        // Zones at 0.000 and 0.015; the third point is 0.008 from the first
        // and 0.007 from the second, and must join the first.
        let zones = c.cluster(&[
            ev(-12.000, -77.0, Severity::Light),
            ev(-12.015, -77.0, Severity::Light),
            ev(-12.008, -77.0, Severity::Light),
        ]);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].members.len(), 2);
        assert_eq!(zones[1].members.len(), 1);
        assert!((zones[0].centroid_lat - -12.004).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_is_full_mean() {
        let c = SpatialClusterer::new(0.01);
        let zones = c.cluster(&[
            ev(-12.000, -77.000, Severity::Light),
            ev(-12.006, -77.000, Severity::Light),
            ev(-12.006, -77.003, Severity::Light),
        ]);
        assert_eq!(zones.len(), 1);
        assert!((zones[0].centroid_lat - -12.004).abs() < 1e-12);
        assert!((zones[0].centroid_lon - -77.001).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_coordinates_skipped() {
        let c = SpatialClusterer::default();
        let zones = c.cluster(&[
            ev(f64::NAN, -77.0, Severity::Severe),
            ev(0.0, 0.0, Severity::Severe),
            ev(-12.0, -77.0, Severity::Severe),
        ]);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].members.len(), 1);
    }

    #[test]
    fn test_rank_orders_by_count_with_stable_ties() {
        let c = SpatialClusterer::default();
        let events = vec![
            ev(-12.0, -77.0, Severity::Light),
            ev(-13.0, -77.0, Severity::Severe),
            ev(-13.0, -77.0, Severity::Moderate),
            ev(-14.0, -77.0, Severity::Light),
            ev(-15.0, -77.0, Severity::Correct),
        ];
        let ranked = c.critical_zones(&events, &VIOLATION_SEVERITIES, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].centroid_lat, -13.0);
        assert_eq!(ranked[0].rank, Some(1));
        assert_eq!(ranked[0].violation_count, 2);
        // Tie between -12 and -14 keeps creation order.
        assert_eq!(ranked[1].centroid_lat, -12.0);
        assert_eq!(ranked[2].centroid_lat, -14.0);
        assert_eq!(ranked[2].rank, Some(3));
    }

    #[test]
    fn test_rank_with_severity_filter_and_top_n() {
        let c = SpatialClusterer::default();
        let events = vec![
            ev(-12.0, -77.0, Severity::Light),
            ev(-12.0, -77.0, Severity::Light),
            ev(-13.0, -77.0, Severity::Severe),
            ev(-14.0, -77.0, Severity::Severe),
        ];
        let ranked = c.critical_zones(&events, &[Severity::Severe], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].centroid_lat, -13.0);
        assert_eq!(ranked[0].violation_count, 1);
    }
}
