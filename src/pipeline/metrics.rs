// src/pipeline/metrics.rs
//
// Counters shared by the resolver and the orchestrator. Cloning shares the
// underlying atomics, so one instance can be handed to every component.

use crate::types::Severity;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub points_processed: Arc<AtomicU64>,
    pub speeds_reconstructed: Arc<AtomicU64>,
    pub speeds_defaulted: Arc<AtomicU64>,
    pub cache_hits: Arc<AtomicU64>,
    pub live_lookups: Arc<AtomicU64>,
    pub static_fallbacks: Arc<AtomicU64>,
    pub provider_failures: Arc<AtomicU64>,
    pub circuit_openings: Arc<AtomicU64>,
    pub correct: Arc<AtomicU64>,
    pub light: Arc<AtomicU64>,
    pub moderate: Arc<AtomicU64>,
    pub severe: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            points_processed: Arc::new(AtomicU64::new(0)),
            speeds_reconstructed: Arc::new(AtomicU64::new(0)),
            speeds_defaulted: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            live_lookups: Arc::new(AtomicU64::new(0)),
            static_fallbacks: Arc::new(AtomicU64::new(0)),
            provider_failures: Arc::new(AtomicU64::new(0)),
            circuit_openings: Arc::new(AtomicU64::new(0)),
            correct: Arc::new(AtomicU64::new(0)),
            light: Arc::new(AtomicU64::new(0)),
            moderate: Arc::new(AtomicU64::new(0)),
            severe: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_severity(&self, severity: Severity) {
        let counter = match severity {
            Severity::Correct => &self.correct,
            Severity::Light => &self.light,
            Severity::Moderate => &self.moderate,
            Severity::Severe => &self.severe,
        };
        self.inc(counter);
    }

    pub fn points_per_sec(&self) -> f64 {
        let points = self.points_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            points as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            points_processed: self.points_processed.load(Ordering::Relaxed),
            points_per_sec: self.points_per_sec(),
            speeds_reconstructed: self.speeds_reconstructed.load(Ordering::Relaxed),
            speeds_defaulted: self.speeds_defaulted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            live_lookups: self.live_lookups.load(Ordering::Relaxed),
            static_fallbacks: self.static_fallbacks.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            circuit_openings: self.circuit_openings.load(Ordering::Relaxed),
            correct: self.correct.load(Ordering::Relaxed),
            light: self.light.load(Ordering::Relaxed),
            moderate: self.moderate.load(Ordering::Relaxed),
            severe: self.severe.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub points_processed: u64,
    pub points_per_sec: f64,
    pub speeds_reconstructed: u64,
    pub speeds_defaulted: u64,
    pub cache_hits: u64,
    pub live_lookups: u64,
    pub static_fallbacks: u64,
    pub provider_failures: u64,
    pub circuit_openings: u64,
    pub correct: u64,
    pub light: u64,
    pub moderate: u64,
    pub severe: u64,
    pub elapsed_secs: f64,
}
