// src/aggregation.rs
//
// Roll-up of classified events into severity counts and an average excess
// that is not biased by compliant samples or sensor artifacts.

use crate::types::{Severity, ViolationEvent};
use serde::Serialize;

pub const DEFAULT_MAX_PLAUSIBLE_EXCESS_KMH: f64 = 80.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub correct: usize,
    pub light: usize,
    pub moderate: usize,
    pub severe: usize,
    /// Violations (non-correct) with the emergency beacon on.
    pub violations_with_emergency_light: usize,
    /// Violations (non-correct) with the emergency beacon off.
    pub violations_without_emergency_light: usize,
    /// Mean excess over violations within the plausible band, one decimal.
    pub avg_excess_kmh: f64,
    /// Number of events that fed `avg_excess_kmh`.
    pub excess_samples: usize,
    /// Violations left out of the average as sensor artifacts.
    pub excluded_outliers: usize,
    /// Share of compliant samples, 0.0 when there are no samples.
    pub compliance_rate: f64,
}

impl Stats {
    pub fn violations(&self) -> usize {
        self.light + self.moderate + self.severe
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Correct => self.correct,
            Severity::Light => self.light,
            Severity::Moderate => self.moderate,
            Severity::Severe => self.severe,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceAggregator {
    max_plausible_excess_kmh: f64,
}

impl Default for ComplianceAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PLAUSIBLE_EXCESS_KMH)
    }
}

impl ComplianceAggregator {
    pub fn new(max_plausible_excess_kmh: f64) -> Self {
        Self {
            max_plausible_excess_kmh,
        }
    }

    /// Single ordered pass; the result depends only on input order.
    pub fn aggregate(&self, events: &[ViolationEvent]) -> Stats {
        let mut stats = Stats::default();
        let mut excess_sum = 0.0;

        for event in events {
            stats.total += 1;
            match event.severity {
                Severity::Correct => {
                    stats.correct += 1;
                    continue;
                }
                Severity::Light => stats.light += 1,
                Severity::Moderate => stats.moderate += 1,
                Severity::Severe => stats.severe += 1,
            }

            if event.emergency_light_on {
                stats.violations_with_emergency_light += 1;
            } else {
                stats.violations_without_emergency_light += 1;
            }

            if (0.0..=self.max_plausible_excess_kmh).contains(&event.excess_kmh) {
                excess_sum += event.excess_kmh;
                stats.excess_samples += 1;
            } else {
                stats.excluded_outliers += 1;
            }
        }

        if stats.excess_samples > 0 {
            stats.avg_excess_kmh = round1(excess_sum / stats.excess_samples as f64);
        }
        if stats.total > 0 {
            stats.compliance_rate = stats.correct as f64 / stats.total as f64;
        }
        stats
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
