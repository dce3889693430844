use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub policy: PolicyConfig,
    pub bases: Vec<BaseLocation>,
    pub reconstruction: ReconstructionConfig,
    pub clustering: ClusteringConfig,
    pub query: QueryConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub primary_url: String,
    /// Older endpoint name kept for deployments that still proxy it.
    pub legacy_url: String,
    /// Overridden by `SPEED_LIMIT_API_KEY` when set.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://roads.example.com/v2/snapToRoads".to_string(),
            legacy_url: "https://roads.example.com/v1/speedLimits".to_string(),
            api_key: None,
            timeout_secs: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a live provider answer (7 days).
    pub ttl_secs: u64,
    /// Lifetime of a static fallback entry. Unset means the live TTL applies;
    /// a shorter value lets a recovered provider be asked again sooner.
    pub fallback_ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn effective_fallback_ttl_secs(&self) -> u64 {
        self.fallback_ttl_secs.unwrap_or(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 3600,
            fallback_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
        }
    }
}

/// Speed limits per road type for one regulatory tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitTier {
    pub urban: f64,
    pub interurban: f64,
    pub highway: f64,
}

impl LimitTier {
    pub fn limit_for(&self, road_type: RoadType) -> f64 {
        match road_type {
            RoadType::Urban => self.urban,
            RoadType::Interurban => self.interurban,
            RoadType::Highway => self.highway,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Conservative heavy-vehicle limit used whenever no live limit is available.
    pub fallback_limit_kmh: f64,
    pub base_zone_limit_kmh: f64,
    pub base_zone_radius_deg: f64,
    /// Used when the posted limit is unusable and the beacon is off.
    pub standard: LimitTier,
    /// Elevated limits while the emergency beacon ("rotativo") is on.
    pub emergency: LimitTier,
    /// Excess values above this are sensor artifacts for averaging purposes.
    pub max_plausible_excess_kmh: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fallback_limit_kmh: 60.0,
            base_zone_limit_kmh: 20.0,
            base_zone_radius_deg: 0.01,
            standard: LimitTier {
                urban: 50.0,
                interurban: 90.0,
                highway: 100.0,
            },
            emergency: LimitTier {
                urban: 70.0,
                interurban: 110.0,
                highway: 120.0,
            },
            max_plausible_excess_kmh: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub max_valid_speed_kmh: f64,
    pub max_gap_secs: i64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_valid_speed_kmh: 160.0,
            max_gap_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub radius_deg: f64,
    pub top_n: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_deg: 0.01,
            top_n: 10,
        }
    }
}

/// Row caps for the two read paths. `None` means "process all".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub zone_row_limit: Option<usize>,
    pub stats_row_limit: Option<usize>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            zone_row_limit: Some(5000),
            stats_row_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrent_lookups: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "speed_compliance=info".to_string(),
        }
    }
}

// ============================================================================
// TELEMETRY
// ============================================================================

/// One GPS sample as delivered by the telemetry store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Device-reported speed in km/h. May be missing, NaN or garbage.
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default, alias = "rotativo")]
    pub emergency_light_on: bool,
}

// ============================================================================
// SPEED LIMITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadType {
    Urban,
    Interurban,
    Highway,
}

impl RoadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadType::Urban => "urban",
            RoadType::Interurban => "interurban",
            RoadType::Highway => "highway",
        }
    }
}

impl std::fmt::Display for RoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitSource {
    Live,
    Cache,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimitLookup {
    pub lat: f64,
    pub lon: f64,
    pub speed_limit_kmh: f64,
    /// `None` for static fallbacks: the fallback does not know the road.
    pub road_type: Option<RoadType>,
    pub source: LimitSource,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// VIOLATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Correct,
    Light,
    Moderate,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Correct,
        Severity::Light,
        Severity::Moderate,
        Severity::Severe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Correct => "correct",
            Severity::Light => "light",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    pub fn is_violation(&self) -> bool {
        !matches!(self, Severity::Correct)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correct" => Ok(Severity::Correct),
            "light" | "leve" => Ok(Severity::Light),
            "moderate" | "moderada" => Ok(Severity::Moderate),
            "severe" | "grave" => Ok(Severity::Severe),
            other => {
                let known: Vec<&str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
                Err(format!(
                    "unknown severity '{}', expected one of {}",
                    other,
                    known.join(", ")
                ))
            }
        }
    }
}

/// A classified telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
    pub limit_kmh: f64,
    pub excess_kmh: f64,
    pub severity: Severity,
    pub road_type: RoadType,
    pub in_base_zone: bool,
    pub emergency_light_on: bool,
}
