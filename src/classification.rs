// src/classification.rs
//
// Speed-compliance classification for emergency fleet vehicles.
//
// ┌─────────────────────────────────────────────────────────────────────────┐
// │  ROAD TYPE (inferred from travelling speed)                             │
// │    inside a base zone        → urban                                    │
// │    speed > 100 km/h          → highway                                  │
// │    speed > 70 km/h           → interurban                               │
// │    otherwise                 → urban                                    │
// │                                                                         │
// │  APPLICABLE LIMIT                                                       │
// │    inside a base zone        → fixed reduced limit (20 km/h)            │
// │    rotativo ON               → emergency tier for the road type         │
// │    rotativo OFF              → posted limit from the resolver           │
// │                                (standard tier if the posted one is bad) │
// │                                                                         │
// │  SEVERITY (excess = max(0, speed − limit))                              │
// │    ≤ 0 correct   ≤ 10 light   ≤ 20 moderate   > 20 severe               │
// │    inside a base zone any excess is at least moderate                   │
// └─────────────────────────────────────────────────────────────────────────┘

use crate::geo::{degree_distance, is_valid_coordinate};
use crate::speed_limit::SpeedLimitResolver;
use crate::types::{
    BaseLocation, Config, LimitSource, LimitTier, RoadType, Severity, SpeedLimitLookup,
    TelemetryPoint, ViolationEvent,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

pub const HIGHWAY_MIN_SPEED_KMH: f64 = 100.0;
pub const INTERURBAN_MIN_SPEED_KMH: f64 = 70.0;
pub const LIGHT_MAX_EXCESS_KMH: f64 = 10.0;
pub const MODERATE_MAX_EXCESS_KMH: f64 = 20.0;

// ============================================================================
// PURE RULES
// ============================================================================

pub fn road_type(speed_kmh: f64, in_base_zone: bool) -> RoadType {
    if in_base_zone {
        RoadType::Urban
    } else if speed_kmh > HIGHWAY_MIN_SPEED_KMH {
        RoadType::Highway
    } else if speed_kmh > INTERURBAN_MIN_SPEED_KMH {
        RoadType::Interurban
    } else {
        RoadType::Urban
    }
}

pub fn severity(excess_kmh: f64) -> Severity {
    if excess_kmh <= 0.0 {
        Severity::Correct
    } else if excess_kmh <= LIGHT_MAX_EXCESS_KMH {
        Severity::Light
    } else if excess_kmh <= MODERATE_MAX_EXCESS_KMH {
        Severity::Moderate
    } else {
        Severity::Severe
    }
}

// ============================================================================
// REGULATORY POLICY
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegulatoryPolicy {
    pub standard: LimitTier,
    pub emergency: LimitTier,
    pub base_zone_limit_kmh: f64,
    pub base_zone_radius_deg: f64,
    pub bases: Vec<BaseLocation>,
}

impl RegulatoryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            standard: config.policy.standard,
            emergency: config.policy.emergency,
            base_zone_limit_kmh: config.policy.base_zone_limit_kmh,
            base_zone_radius_deg: config.policy.base_zone_radius_deg,
            bases: config.bases.clone(),
        }
    }

    /// First configured base within the zone radius, if any.
    pub fn base_zone_at(&self, lat: f64, lon: f64) -> Option<&BaseLocation> {
        if !is_valid_coordinate(lat, lon) {
            return None;
        }
        self.bases
            .iter()
            .find(|b| degree_distance(lat, lon, b.lat, b.lon) <= self.base_zone_radius_deg)
    }

    pub fn in_base_zone(&self, lat: f64, lon: f64) -> bool {
        self.base_zone_at(lat, lon).is_some()
    }

    /// Severity of an excess at this location. Speeding inside a base zone
    /// is never rated light.
    pub fn severity_for(&self, excess_kmh: f64, in_base_zone: bool) -> Severity {
        let tier = severity(excess_kmh);
        if in_base_zone && tier == Severity::Light {
            Severity::Moderate
        } else {
            tier
        }
    }

    pub fn applicable_limit(
        &self,
        road_type: RoadType,
        emergency_light_on: bool,
        in_base_zone: bool,
        posted_limit_kmh: f64,
    ) -> f64 {
        if in_base_zone {
            self.base_zone_limit_kmh
        } else if emergency_light_on {
            self.emergency.limit_for(road_type)
        } else if posted_limit_kmh.is_finite() && posted_limit_kmh > 0.0 {
            posted_limit_kmh
        } else {
            self.standard.limit_for(road_type)
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Clone)]
pub struct ViolationClassifier {
    policy: Arc<RegulatoryPolicy>,
    resolver: Arc<SpeedLimitResolver>,
}

impl ViolationClassifier {
    pub fn new(policy: Arc<RegulatoryPolicy>, resolver: Arc<SpeedLimitResolver>) -> Self {
        Self { policy, resolver }
    }

    /// Resolves the posted limit once and classifies the sample.
    pub async fn classify(&self, point: &TelemetryPoint, speed_kmh: f64) -> ViolationEvent {
        let lookup = self.resolver.resolve(point.lat, point.lon).await;
        self.build_event(point, speed_kmh, &lookup)
    }

    /// The synchronous half of `classify`, for callers that already hold a lookup.
    pub fn build_event(
        &self,
        point: &TelemetryPoint,
        speed_kmh: f64,
        lookup: &SpeedLimitLookup,
    ) -> ViolationEvent {
        let speed_kmh = if speed_kmh.is_finite() && speed_kmh >= 0.0 {
            speed_kmh
        } else {
            0.0
        };
        let in_base_zone = self.policy.in_base_zone(point.lat, point.lon);
        let road_type = road_type(speed_kmh, in_base_zone);
        let limit_kmh = self.policy.applicable_limit(
            road_type,
            point.emergency_light_on,
            in_base_zone,
            lookup.speed_limit_kmh,
        );
        let excess_kmh = (speed_kmh - limit_kmh).max(0.0);

        ViolationEvent {
            session_id: point.session_id.clone(),
            timestamp: point.timestamp,
            lat: point.lat,
            lon: point.lon,
            speed_kmh,
            limit_kmh,
            excess_kmh,
            severity: self.policy.severity_for(excess_kmh, in_base_zone),
            road_type,
            in_base_zone,
            emergency_light_on: point.emergency_light_on,
        }
    }

    /// Classify many samples with at most `max_concurrency` limit lookups in
    /// flight. Output order matches input order; `speeds` is parallel to
    /// `points`.
    pub async fn classify_batch(
        &self,
        points: &[TelemetryPoint],
        speeds: &[f64],
        max_concurrency: usize,
    ) -> Vec<ViolationEvent> {
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, point) in points.iter().enumerate() {
            let classifier = self.clone();
            let point = point.clone();
            let speed = speeds.get(idx).copied().unwrap_or(0.0);
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                (idx, classifier.classify(&point, speed).await)
            });
        }

        let mut slots: Vec<Option<ViolationEvent>> = vec![None; points.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, event)) => slots[idx] = Some(event),
                Err(e) => error!("Classification task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    debug!("Classifying sample {} against the static limit", idx);
                    let point = &points[idx];
                    let lookup = self.static_lookup(point);
                    self.build_event(point, speeds.get(idx).copied().unwrap_or(0.0), &lookup)
                })
            })
            .collect()
    }

    fn static_lookup(&self, point: &TelemetryPoint) -> SpeedLimitLookup {
        SpeedLimitLookup {
            lat: point.lat,
            lon: point.lon,
            speed_limit_kmh: self.resolver.fallback_limit_kmh(),
            road_type: None,
            source: LimitSource::Static,
            fetched_at: point.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::pipeline::metrics::PipelineMetrics;
    use crate::speed_limit::testing::{FakeProvider, TableProvider};
    use crate::speed_limit::{ProviderLimit, SpeedLimitProvider};
    use chrono::{TimeZone, Utc};

    const BASE_LAT: f64 = -12.0464;
    const BASE_LON: f64 = -77.0428;

    fn config() -> Config {
        let mut c = Config::default();
        c.bases = vec![BaseLocation {
            name: "Central".into(),
            lat: BASE_LAT,
            lon: BASE_LON,
        }];
        c
    }

    fn classifier(provider: Arc<dyn SpeedLimitProvider>) -> ViolationClassifier {
        let c = config();
        let resolver = SpeedLimitResolver::new(
            &c,
            provider,
            Arc::new(SystemClock),
            PipelineMetrics::new(),
        );
        ViolationClassifier::new(
            Arc::new(RegulatoryPolicy::from_config(&c)),
            Arc::new(resolver),
        )
    }

    fn point(lat: f64, lon: f64, rotativo: bool) -> TelemetryPoint {
        TelemetryPoint {
            session_id: "unit-7".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 2, 10, 14, 30, 0).unwrap(),
            lat,
            lon,
            speed: None,
            emergency_light_on: rotativo,
        }
    }

    #[test]
    fn test_road_type_thresholds() {
        assert_eq!(road_type(130.0, true), RoadType::Urban);
        assert_eq!(road_type(100.5, false), RoadType::Highway);
        assert_eq!(road_type(100.0, false), RoadType::Interurban);
        assert_eq!(road_type(70.5, false), RoadType::Interurban);
        assert_eq!(road_type(70.0, false), RoadType::Urban);
        assert_eq!(road_type(0.0, false), RoadType::Urban);
    }

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(severity(-5.0), Severity::Correct);
        assert_eq!(severity(0.0), Severity::Correct);
        assert_eq!(severity(0.0001), Severity::Light);
        assert_eq!(severity(10.0), Severity::Light);
        assert_eq!(severity(10.0001), Severity::Moderate);
        assert_eq!(severity(20.0), Severity::Moderate);
        assert_eq!(severity(20.0001), Severity::Severe);
    }

    #[test]
    fn test_base_zone_excess_is_at_least_moderate() {
        let p = RegulatoryPolicy::from_config(&config());
        assert_eq!(p.severity_for(0.0, true), Severity::Correct);
        assert_eq!(p.severity_for(0.5, true), Severity::Moderate);
        assert_eq!(p.severity_for(10.0, true), Severity::Moderate);
        assert_eq!(p.severity_for(25.0, true), Severity::Severe);
        assert_eq!(p.severity_for(5.0, false), Severity::Light);
    }

    #[test]
    fn test_base_zone_radius() {
        let p = RegulatoryPolicy::from_config(&config());
        assert!(p.in_base_zone(BASE_LAT, BASE_LON));
        assert!(p.in_base_zone(BASE_LAT + 0.006, BASE_LON + 0.006));
        assert!(!p.in_base_zone(BASE_LAT + 0.008, BASE_LON + 0.008));
        assert!(!p.in_base_zone(f64::NAN, BASE_LON));
        assert_eq!(p.base_zone_at(BASE_LAT, BASE_LON).unwrap().name, "Central");
    }

    #[test]
    fn test_applicable_limit_policy() {
        let p = RegulatoryPolicy::from_config(&config());
        assert_eq!(p.applicable_limit(RoadType::Highway, true, true, 100.0), 20.0);
        assert_eq!(p.applicable_limit(RoadType::Highway, true, false, 100.0), 120.0);
        assert_eq!(p.applicable_limit(RoadType::Urban, true, false, 30.0), 70.0);
        assert_eq!(p.applicable_limit(RoadType::Interurban, false, false, 80.0), 80.0);
        assert_eq!(p.applicable_limit(RoadType::Interurban, false, false, 0.0), 90.0);
        assert_eq!(p.applicable_limit(RoadType::Urban, false, false, f64::NAN), 50.0);
    }

    #[tokio::test]
    async fn test_classify_severe_highway_sample() {
        let c = classifier(Arc::new(FakeProvider::live(90.0, RoadType::Interurban)));
        let e = c.classify(&point(-13.2, -76.3, false), 130.0).await;
        assert_eq!(e.limit_kmh, 90.0);
        assert_eq!(e.excess_kmh, 40.0);
        assert_eq!(e.severity, Severity::Severe);
        assert_eq!(e.road_type, RoadType::Highway);
        assert!(!e.in_base_zone);
    }

    #[tokio::test]
    async fn test_classify_in_base_uses_reduced_limit() {
        let c = classifier(Arc::new(FakeProvider::live(60.0, RoadType::Urban)));
        let e = c.classify(&point(BASE_LAT, BASE_LON, true), 25.0).await;
        assert!(e.in_base_zone);
        assert_eq!(e.limit_kmh, 20.0);
        assert_eq!(e.excess_kmh, 5.0);
        assert_eq!(e.severity, Severity::Moderate);
        assert_eq!(e.road_type, RoadType::Urban);

        let same_excess_outside = c.classify(&point(-13.2, -76.3, false), 65.0).await;
        assert_eq!(same_excess_outside.excess_kmh, 5.0);
        assert_eq!(same_excess_outside.severity, Severity::Light);
    }

    #[tokio::test]
    async fn test_rotativo_raises_limit() {
        let c = classifier(Arc::new(FakeProvider::live(60.0, RoadType::Urban)));
        let off = c.classify(&point(-13.2, -76.3, false), 95.0).await;
        let on = c.classify(&point(-13.2, -76.3, true), 95.0).await;
        assert_eq!(off.severity, Severity::Severe);
        assert_eq!(on.limit_kmh, 110.0);
        assert_eq!(on.severity, Severity::Correct);
        assert_eq!(on.excess_kmh, 0.0);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_static_limit() {
        let c = classifier(Arc::new(FakeProvider::failing(
            crate::error::ProviderError::Unavailable { status: 500 },
        )));
        let e = c.classify(&point(-13.2, -76.3, false), 65.0).await;
        assert_eq!(e.limit_kmh, 60.0);
        assert_eq!(e.severity, Severity::Light);
    }

    #[tokio::test]
    async fn test_invalid_speed_is_treated_as_stationary() {
        let c = classifier(Arc::new(FakeProvider::live(60.0, RoadType::Urban)));
        let e = c.classify(&point(-13.2, -76.3, false), f64::INFINITY).await;
        assert_eq!(e.speed_kmh, 0.0);
        assert_eq!(e.severity, Severity::Correct);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let limit = |kmh| ProviderLimit {
            speed_limit_kmh: kmh,
            road_type: RoadType::Urban,
        };
        let coords = [(-13.10, -76.10), (-13.20, -76.20), (-13.30, -76.30), (-13.40, -76.40)];
        let provider = Arc::new(TableProvider::new(vec![
            (coords[0], limit(30.0)),
            (coords[1], limit(40.0)),
            (coords[2], limit(50.0)),
            (coords[3], limit(60.0)),
        ]));
        let c = classifier(provider.clone());
        let points: Vec<_> = coords.iter().map(|(la, lo)| point(*la, *lo, false)).collect();
        let speeds = [45.0, 45.0, 45.0, 45.0];

        let events = c.classify_batch(&points, &speeds, 2).await;
        let limits: Vec<f64> = events.iter().map(|e| e.limit_kmh).collect();
        assert_eq!(limits, vec![30.0, 40.0, 50.0, 60.0]);
        assert_eq!(events[0].severity, Severity::Moderate);
        assert_eq!(events[1].severity, Severity::Light);
        assert_eq!(events[2].severity, Severity::Correct);
        assert_eq!(provider.calls(), 4);
    }
}
