//! Speed-compliance analysis for emergency fleet telemetry.
//!
//! Raw GPS samples flow through speed reconstruction, speed-limit resolution
//! (cache, circuit breaker, external provider, static fallback) and
//! severity classification, and end up either as ranked geographic critical
//! zones or as aggregate compliance statistics.

pub mod aggregation;
pub mod classification;
pub mod clock;
pub mod clustering;
pub mod config;
pub mod error;
pub mod geo;
pub mod pipeline;
pub mod speed_limit;
pub mod speed_reconstruction;
pub mod telemetry_source;
pub mod types;

pub use aggregation::{ComplianceAggregator, Stats};
pub use classification::{RegulatoryPolicy, ViolationClassifier};
pub use clustering::{SpatialClusterer, Zone};
pub use pipeline::{PipelineMetrics, PipelineOrchestrator};
pub use speed_limit::SpeedLimitResolver;
pub use speed_reconstruction::SpeedReconstructor;
pub use types::{
    Config, LimitSource, RoadType, Severity, SpeedLimitLookup, TelemetryPoint, ViolationEvent,
};
