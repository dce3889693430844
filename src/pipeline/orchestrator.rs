// src/pipeline/orchestrator.rs
//
// Wires the stages together:
//
//   TelemetrySource → SpeedReconstructor → ViolationClassifier ─┬→ SpatialClusterer  (zones)
//                                          (SpeedLimitResolver)  └→ ComplianceAggregator (stats)
//
// The zone view and the stats view read telemetry with their own row caps.
// A bad sample never aborts a run; it degrades inside the stage that sees it.

use crate::aggregation::{ComplianceAggregator, Stats};
use crate::classification::{RegulatoryPolicy, ViolationClassifier};
use crate::clustering::{SpatialClusterer, Zone};
use crate::pipeline::metrics::PipelineMetrics;
use crate::speed_limit::SpeedLimitResolver;
use crate::speed_reconstruction::{SpeedOrigin, SpeedReconstructor};
use crate::telemetry_source::{RowLimit, TelemetryQuery, TelemetrySource};
use crate::types::{Config, Severity, TelemetryPoint, ViolationEvent};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_lookups: usize,
    pub zone_row_limit: RowLimit,
    pub stats_row_limit: RowLimit,
    pub top_n: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_lookups: config.pipeline.max_concurrent_lookups,
            zone_row_limit: config.query.zone_row_limit.into(),
            stats_row_limit: config.query.stats_row_limit.into(),
            top_n: config.clustering.top_n,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct PipelineOrchestrator {
    source: Arc<dyn TelemetrySource>,
    reconstructor: SpeedReconstructor,
    classifier: ViolationClassifier,
    clusterer: SpatialClusterer,
    aggregator: ComplianceAggregator,
    settings: OrchestratorConfig,
    metrics: PipelineMetrics,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &Config,
        source: Arc<dyn TelemetrySource>,
        resolver: Arc<SpeedLimitResolver>,
        metrics: PipelineMetrics,
    ) -> Self {
        let policy = Arc::new(RegulatoryPolicy::from_config(config));
        Self {
            source,
            reconstructor: SpeedReconstructor::new(&config.reconstruction),
            classifier: ViolationClassifier::new(policy, resolver),
            clusterer: SpatialClusterer::new(config.clustering.radius_deg),
            aggregator: ComplianceAggregator::new(config.policy.max_plausible_excess_kmh),
            settings: OrchestratorConfig::from_config(config),
            metrics,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Reconstruct speeds and classify every point, in input order. Points
    /// must be ordered by time within each session.
    pub async fn classify_points(&self, points: &[TelemetryPoint]) -> Vec<ViolationEvent> {
        let reconstructed = self.reconstructor.reconstruct_sequence(points);
        let speeds: Vec<f64> = reconstructed.iter().map(|r| r.speed_kmh).collect();

        for r in &reconstructed {
            match r.origin {
                SpeedOrigin::Reported => {}
                SpeedOrigin::Reconstructed => self.metrics.inc(&self.metrics.speeds_reconstructed),
                SpeedOrigin::Defaulted => self.metrics.inc(&self.metrics.speeds_defaulted),
            }
        }

        let events = self
            .classifier
            .classify_batch(points, &speeds, self.settings.max_concurrent_lookups)
            .await;

        for event in &events {
            self.metrics.inc(&self.metrics.points_processed);
            self.metrics.record_severity(event.severity);
        }
        events
    }

    /// Flat event list; the caller's row limit is used as given.
    pub async fn violation_events(&self, query: &TelemetryQuery) -> Result<Vec<ViolationEvent>> {
        let points = self.source.fetch(query).await?;
        Ok(self.classify_points(&points).await)
    }

    /// Ranked critical zones built from events whose severity is in `filter`.
    pub async fn critical_zones(
        &self,
        query: &TelemetryQuery,
        filter: &[Severity],
        top_n: Option<usize>,
    ) -> Result<Vec<Zone>> {
        let query = query.clone().with_limit(self.settings.zone_row_limit);
        let points = self.source.fetch(&query).await?;
        let events: Vec<ViolationEvent> = self
            .classify_points(&points)
            .await
            .into_iter()
            .filter(|e| filter.contains(&e.severity))
            .collect();

        let zones = self.clusterer.critical_zones(
            &events,
            filter,
            top_n.unwrap_or(self.settings.top_n),
        );
        info!(
            "📍 {} critical zones from {} points ({} matching events)",
            zones.len(),
            points.len(),
            events.len()
        );
        Ok(zones)
    }

    pub async fn compliance_stats(&self, query: &TelemetryQuery) -> Result<Stats> {
        let query = query.clone().with_limit(self.settings.stats_row_limit);
        let points = self.source.fetch(&query).await?;
        let events = self.classify_points(&points).await;
        let stats = self.aggregator.aggregate(&events);
        info!(
            "📊 {} samples: {} light, {} moderate, {} severe, avg excess {:.1} km/h",
            stats.total, stats.light, stats.moderate, stats.severe, stats.avg_excess_kmh
        );
        Ok(stats)
    }

    pub fn zone_stats(&self, zone: &Zone) -> Stats {
        zone.stats(&self.aggregator)
    }
}
