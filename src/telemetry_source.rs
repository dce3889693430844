// src/telemetry_source.rs
//
// Read-only access to stored telemetry. The relational store lives outside
// this crate; a JSONL export (one TelemetryPoint per line) and an in-memory
// source cover the CLI and embedding cases.

use crate::types::TelemetryPoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Cap on rows fetched. The zone view and the stats view historically use
/// different caps, so each caller chooses its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLimit {
    #[default]
    Unbounded,
    Max(usize),
}

impl From<Option<usize>> for RowLimit {
    fn from(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => RowLimit::Max(n),
            None => RowLimit::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryQuery {
    pub session_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: RowLimit,
}

impl TelemetryQuery {
    pub fn with_limit(mut self, limit: RowLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, point: &TelemetryPoint) -> bool {
        if let Some(ref session) = self.session_id {
            if &point.session_id != session {
                return false;
            }
        }
        if let Some(from) = self.from {
            if point.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if point.timestamp > to {
                return false;
            }
        }
        true
    }

    /// Filter, order by timestamp (stable, so equal timestamps keep their
    /// stored order) and apply the row cap.
    pub fn apply(&self, points: impl IntoIterator<Item = TelemetryPoint>) -> Vec<TelemetryPoint> {
        let mut selected: Vec<TelemetryPoint> =
            points.into_iter().filter(|p| self.matches(p)).collect();
        selected.sort_by_key(|p| p.timestamp);
        if let RowLimit::Max(n) = self.limit {
            selected.truncate(n);
        }
        selected
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryPoint>>;
}

// ============================================================================
// JSONL FILE
// ============================================================================

pub struct JsonlTelemetrySource {
    path: PathBuf,
}

impl JsonlTelemetrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TelemetrySource for JsonlTelemetrySource {
    async fn fetch(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryPoint>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read telemetry file {}", self.path.display()))?;

        let (points, skipped) = parse_jsonl(&contents);
        if skipped > 0 {
            warn!(
                "Skipped {} unreadable telemetry rows in {}",
                skipped,
                self.path.display()
            );
        }

        let selected = query.apply(points);
        debug!("Loaded {} telemetry points from {}", selected.len(), self.path.display());
        Ok(selected)
    }
}

/// Parse one point per line. Blank lines are ignored; unparsable lines are
/// counted and skipped so a single corrupt row does not sink the file.
pub fn parse_jsonl(contents: &str) -> (Vec<TelemetryPoint>, usize) {
    let mut points = Vec::new();
    let mut skipped = 0;

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TelemetryPoint>(line) {
            Ok(p) => points.push(p),
            Err(e) => {
                debug!("Telemetry line {}: {}", line_no + 1, e);
                skipped += 1;
            }
        }
    }

    (points, skipped)
}

// ============================================================================
// IN MEMORY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryTelemetrySource {
    points: Vec<TelemetryPoint>,
}

impl InMemoryTelemetrySource {
    pub fn new(points: Vec<TelemetryPoint>) -> Self {
        Self { points }
    }
}

#[async_trait]
impl TelemetrySource for InMemoryTelemetrySource {
    async fn fetch(&self, query: &TelemetryQuery) -> Result<Vec<TelemetryPoint>> {
        Ok(query.apply(self.points.iter().cloned()))
    }
}
