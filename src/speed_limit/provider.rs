// src/speed_limit/provider.rs
//
// HTTP client for the external road-snapping service that knows posted
// speed limits.
//
// Wire format (POST, API key as `key` query parameter):
//   request:  { "points": [{ "latitude": .., "longitude": .. }] }
//   response: { "snappedPoints": [{ "roadProperties": {
//                   "speedLimit": 60, "functionalRoadClass": "FRC3" } }] }
//
// The service is reached through a primary endpoint and, when that fails,
// through the older endpoint name that some deployments still proxy. The
// two attempts are sequential, each bounded by the client timeout.

use crate::error::ProviderError;
use crate::types::{ProviderConfig, RoadType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A posted limit as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderLimit {
    pub speed_limit_kmh: f64,
    pub road_type: RoadType,
}

#[async_trait]
pub trait SpeedLimitProvider: Send + Sync {
    /// False when no credentials are available; the resolver then skips the
    /// network entirely.
    fn is_configured(&self) -> bool;

    async fn fetch_limit(&self, lat: f64, lon: f64) -> Result<ProviderLimit, ProviderError>;
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SnapRequest {
    pub points: Vec<LatLng>,
}

#[derive(Debug, Serialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapResponse {
    #[serde(default)]
    pub snapped_points: Vec<SnappedPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnappedPoint {
    pub road_properties: Option<RoadProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadProperties {
    pub speed_limit: Option<serde_json::Value>,
    pub functional_road_class: Option<serde_json::Value>,
}

/// Extract the first usable limit. Empty lists, missing properties,
/// non-positive limits and unknown road classes are all malformed.
pub fn parse_snap_response(response: &SnapResponse) -> Result<ProviderLimit, ProviderError> {
    let props = response
        .snapped_points
        .iter()
        .find_map(|p| p.road_properties.as_ref())
        .ok_or_else(|| ProviderError::Malformed("no snapped points".into()))?;

    let speed_limit_kmh = props
        .speed_limit
        .as_ref()
        .and_then(parse_speed_limit)
        .ok_or_else(|| ProviderError::Malformed("missing or invalid speedLimit".into()))?;

    let road_type = props
        .functional_road_class
        .as_ref()
        .and_then(parse_road_class)
        .ok_or_else(|| ProviderError::Malformed("unrecognised functionalRoadClass".into()))?;

    Ok(ProviderLimit {
        speed_limit_kmh,
        road_type,
    })
}

fn parse_speed_limit(value: &serde_json::Value) -> Option<f64> {
    let limit = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        // Some regions answer "60 km/h".
        serde_json::Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (limit.is_finite() && limit > 0.0).then_some(limit)
}

/// FRC0-1 are motorways and major roads, FRC2-3 connect towns, the rest are
/// local streets.
fn parse_road_class(value: &serde_json::Value) -> Option<RoadType> {
    let class = match value {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => {
            let s = s.trim().to_ascii_uppercase();
            s.strip_prefix("FRC").unwrap_or(&s).parse::<u64>().ok()?
        }
        _ => return None,
    };
    match class {
        0 | 1 => Some(RoadType::Highway),
        2 | 3 => Some(RoadType::Interurban),
        4..=7 => Some(RoadType::Urban),
        _ => None,
    }
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct HttpSpeedLimitProvider {
    http_client: reqwest::Client,
    primary_url: String,
    legacy_url: String,
    api_key: Option<String>,
}

impl HttpSpeedLimitProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            http_client,
            primary_url: config.primary_url.clone(),
            legacy_url: config.legacy_url.clone(),
            api_key,
        })
    }

    async fn post_once(
        &self,
        url: &str,
        key: &str,
        request: &SnapRequest,
    ) -> Result<ProviderLimit, ProviderError> {
        let response = self
            .http_client
            .post(url)
            .query(&[("key", key)])
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }

        let payload = response
            .json::<SnapResponse>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parse_snap_response(&payload)
    }
}

#[async_trait]
impl SpeedLimitProvider for HttpSpeedLimitProvider {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_limit(&self, lat: f64, lon: f64) -> Result<ProviderLimit, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;
        let request = SnapRequest {
            points: vec![LatLng {
                latitude: lat,
                longitude: lon,
            }],
        };

        let primary_err = match self.post_once(&self.primary_url, key, &request).await {
            Ok(limit) => {
                debug!("🌐 Limit {:.0} km/h at {:.5},{:.5}", limit.speed_limit_kmh, lat, lon);
                return Ok(limit);
            }
            Err(e) => e,
        };

        warn!("🌐 Primary speed-limit endpoint failed ({}), trying legacy", primary_err);

        match self.post_once(&self.legacy_url, key, &request).await {
            Ok(limit) => Ok(limit),
            Err(legacy_err) => Err(worst_of(primary_err, legacy_err)),
        }
    }
}

/// The error reported after both endpoints failed: the first one that
/// should open the circuit, otherwise the primary's.
fn worst_of(primary: ProviderError, legacy: ProviderError) -> ProviderError {
    if primary.opens_circuit() || !legacy.opens_circuit() {
        primary
    } else {
        legacy
    }
}
