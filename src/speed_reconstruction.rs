// src/speed_reconstruction.rs
//
// Repairs missing or implausible device speed from consecutive fixes of the
// same session. A corrupt fix must never inflate violation counts, so every
// path that cannot produce a trustworthy number falls back to 0 km/h. The
// sample itself is kept for clustering and statistics.

use crate::config::MAX_GAP_SECS;
use crate::geo::haversine_km;
use crate::types::{ReconstructionConfig, TelemetryPoint};
use chrono::Duration;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedOrigin {
    /// Device speed was valid and used as-is.
    Reported,
    /// Derived from the distance to the previous fix of the session.
    Reconstructed,
    /// No usable previous fix, or the derivation was not finite.
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructedSpeed {
    pub speed_kmh: f64,
    pub origin: SpeedOrigin,
}

#[derive(Debug, Clone)]
pub struct SpeedReconstructor {
    max_valid_speed_kmh: f64,
    max_gap: Duration,
}

impl Default for SpeedReconstructor {
    fn default() -> Self {
        Self::new(&ReconstructionConfig::default())
    }
}

impl SpeedReconstructor {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            max_valid_speed_kmh: config.max_valid_speed_kmh,
            max_gap: Duration::seconds(config.max_gap_secs.clamp(0, MAX_GAP_SECS)),
        }
    }

    /// Speed for `curr` in km/h. Always finite and non-negative.
    pub fn reconstruct(&self, prev: Option<&TelemetryPoint>, curr: &TelemetryPoint) -> f64 {
        self.reconstruct_with_origin(prev, curr).speed_kmh
    }

    pub fn reconstruct_with_origin(
        &self,
        prev: Option<&TelemetryPoint>,
        curr: &TelemetryPoint,
    ) -> ReconstructedSpeed {
        if let Some(speed) = curr.speed {
            if speed.is_finite() && (0.0..=self.max_valid_speed_kmh).contains(&speed) {
                return ReconstructedSpeed {
                    speed_kmh: speed,
                    origin: SpeedOrigin::Reported,
                };
            }
        }

        let defaulted = ReconstructedSpeed {
            speed_kmh: 0.0,
            origin: SpeedOrigin::Defaulted,
        };

        let prev = match prev {
            Some(p) if p.session_id == curr.session_id => p,
            _ => return defaulted,
        };

        let elapsed = curr.timestamp - prev.timestamp;
        if elapsed <= Duration::zero() || elapsed > self.max_gap {
            return defaulted;
        }

        let hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;
        let km = haversine_km(prev.lat, prev.lon, curr.lat, curr.lon);
        let speed = km / hours;

        if speed.is_finite() && speed >= 0.0 {
            ReconstructedSpeed {
                speed_kmh: speed,
                origin: SpeedOrigin::Reconstructed,
            }
        } else {
            defaulted
        }
    }

    /// One speed per input point. The predecessor of each point is the last
    /// point seen *of the same session*, so interleaved streams work too.
    pub fn reconstruct_sequence(&self, points: &[TelemetryPoint]) -> Vec<ReconstructedSpeed> {
        let mut last_by_session: HashMap<&str, &TelemetryPoint> = HashMap::new();
        let mut out = Vec::with_capacity(points.len());

        for point in points {
            let prev = last_by_session.get(point.session_id.as_str()).copied();
            out.push(self.reconstruct_with_origin(prev, point));
            last_by_session.insert(point.session_id.as_str(), point);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    // 1 km of latitude on a 6371 km sphere.
    const ONE_KM_DEG: f64 = 1.0 / 111.194_926_644_558_73;

    fn pt(session: &str, secs: i64, lat: f64, speed: Option<f64>) -> TelemetryPoint {
        TelemetryPoint {
            session_id: session.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::seconds(secs),
            lat,
            lon: -77.0,
            speed,
            emergency_light_on: false,
        }
    }

    #[test]
    fn test_valid_reported_speed_passes_through() {
        let r = SpeedReconstructor::default();
        assert_eq!(r.reconstruct(None, &pt("s", 0, -12.0, Some(87.5))), 87.5);
        assert_eq!(r.reconstruct(None, &pt("s", 0, -12.0, Some(0.0))), 0.0);
        assert_eq!(r.reconstruct(None, &pt("s", 0, -12.0, Some(160.0))), 160.0);
    }

    #[test]
    fn test_one_km_in_sixty_seconds_is_sixty_kmh() {
        let r = SpeedReconstructor::default();
        let a = pt("s", 0, -12.0, None);
        let b = pt("s", 60, -12.0 + ONE_KM_DEG, Some(f64::NAN));
        let res = r.reconstruct_with_origin(Some(&a), &b);
        assert!((res.speed_kmh - 60.0).abs() < 0.6, "got {}", res.speed_kmh);
        assert_eq!(res.origin, SpeedOrigin::Reconstructed);
    }

    #[test]
    fn test_gap_over_two_minutes_skips_reconstruction() {
        let r = SpeedReconstructor::default();
        let a = pt("s", 0, -12.0, None);
        let b = pt("s", 130, -12.0 + ONE_KM_DEG, None);
        assert_eq!(r.reconstruct(Some(&a), &b), 0.0);
    }

    #[test]
    fn test_oversized_gap_setting_is_clamped() {
        let r = SpeedReconstructor::new(&ReconstructionConfig {
            max_valid_speed_kmh: 160.0,
            max_gap_secs: 10_000_000_000_000_000,
        });
        let a = pt("s", 0, -12.0, None);
        let b = pt("s", 60, -12.0 + ONE_KM_DEG, None);
        assert!((r.reconstruct(Some(&a), &b) - 60.0).abs() < 0.6);

        let late = pt("s", MAX_GAP_SECS + 60, -12.0 + ONE_KM_DEG, None);
        assert_eq!(r.reconstruct(Some(&a), &late), 0.0);
    }

    #[test]
    fn test_out_of_range_speed_is_reconstructed() {
        let r = SpeedReconstructor::default();
        let a = pt("s", 0, -12.0, Some(50.0));
        let b = pt("s", 60, -12.0 + ONE_KM_DEG, Some(412.0));
        let v = r.reconstruct(Some(&a), &b);
        assert!((v - 60.0).abs() < 0.6);

        let c = pt("s", 60, -12.0 + ONE_KM_DEG, Some(-3.0));
        assert!((r.reconstruct(Some(&a), &c) - 60.0).abs() < 0.6);
    }

    #[test]
    fn test_other_session_or_same_timestamp_defaults_to_zero() {
        let r = SpeedReconstructor::default();
        let a = pt("other", 0, -12.0, None);
        let b = pt("s", 60, -12.0 + ONE_KM_DEG, None);
        assert_eq!(r.reconstruct(Some(&a), &b), 0.0);

        let same = pt("s", 60, -12.0, None);
        assert_eq!(r.reconstruct(Some(&same), &b), 0.0);
        assert_eq!(r.reconstruct(None, &b), 0.0);
    }

    #[test]
    fn test_corrupt_coordinates_default_to_zero() {
        let r = SpeedReconstructor::default();
        let a = pt("s", 0, f64::NAN, None);
        let b = pt("s", 30, -12.0, None);
        let res = r.reconstruct_with_origin(Some(&a), &b);
        assert_eq!(res.speed_kmh, 0.0);
        assert_eq!(res.origin, SpeedOrigin::Defaulted);
    }

    #[test]
    fn test_sequence_tracks_sessions_independently() {
        let r = SpeedReconstructor::default();
        let points = vec![
            pt("a", 0, -12.0, None),
            pt("b", 10, -13.0, None),
            pt("a", 60, -12.0 + ONE_KM_DEG, None),
            pt("b", 70, -13.0, Some(33.0)),
        ];
        let out = r.reconstruct_sequence(&points);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].origin, SpeedOrigin::Defaulted);
        assert_eq!(out[1].origin, SpeedOrigin::Defaulted);
        assert_eq!(out[2].origin, SpeedOrigin::Reconstructed);
        assert!((out[2].speed_kmh - 60.0).abs() < 0.6);
        assert_eq!(out[3].speed_kmh, 33.0);
    }
}
