// src/main.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use speed_compliance::clock::SystemClock;
use speed_compliance::clustering::VIOLATION_SEVERITIES;
use speed_compliance::speed_limit::HttpSpeedLimitProvider;
use speed_compliance::telemetry_source::{JsonlTelemetrySource, RowLimit, TelemetryQuery};
use speed_compliance::{Config, PipelineMetrics, PipelineOrchestrator, Severity, SpeedLimitResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speed-compliance", version, about = "Speed-limit compliance for fleet GPS telemetry")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "SPEED_COMPLIANCE_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Telemetry export, one JSON point per line.
    #[arg(long)]
    input: PathBuf,

    #[command(flatten)]
    query: QueryArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long)]
    session: Option<String>,

    /// RFC 3339 lower bound (inclusive).
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// RFC 3339 upper bound (inclusive).
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Command {
    /// Ranked critical zones.
    Zones {
        #[arg(long)]
        top: Option<usize>,

        /// Severities to count, e.g. "moderate,severe". Defaults to every violation.
        #[arg(long, value_delimiter = ',')]
        severity: Vec<Severity>,
    },
    /// Aggregate compliance statistics.
    Stats,
    /// Every classified sample.
    Events {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if Path::new(&cli.config).exists() {
        Some(Config::load(&cli.config)?)
    } else {
        None
    };
    let config_found = config.is_some();
    let config = config.unwrap_or_else(|| {
        let mut c = Config::default();
        c.apply_env_overrides();
        c
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if config_found {
        info!("✓ Configuration loaded from {}", cli.config);
    } else {
        warn!("Config {} not found, using built-in defaults", cli.config);
    }

    let metrics = PipelineMetrics::new();
    let provider = Arc::new(HttpSpeedLimitProvider::new(&config.provider)?);
    let resolver = Arc::new(SpeedLimitResolver::new(
        &config,
        provider,
        Arc::new(SystemClock),
        metrics.clone(),
    ));
    let source = Arc::new(JsonlTelemetrySource::new(cli.input.clone()));
    let orchestrator = PipelineOrchestrator::new(&config, source, resolver, metrics.clone());

    let query = TelemetryQuery {
        session_id: cli.query.session,
        from: cli.query.from,
        to: cli.query.to,
        limit: RowLimit::Unbounded,
    };

    let output = match cli.command {
        Command::Zones { top, severity } => {
            let filter: Vec<Severity> = if severity.is_empty() {
                VIOLATION_SEVERITIES.to_vec()
            } else {
                severity
            };
            let zones = orchestrator.critical_zones(&query, &filter, top).await?;
            serde_json::to_string_pretty(&zones)
        }
        Command::Stats => {
            let stats = orchestrator.compliance_stats(&query).await?;
            serde_json::to_string_pretty(&stats)
        }
        Command::Events { limit } => {
            let query = query.with_limit(limit.into());
            let events = orchestrator.violation_events(&query).await?;
            serde_json::to_string_pretty(&events)
        }
    }
    .context("Failed to serialize output")?;

    println!("{}", output);

    let summary = metrics.summary();
    info!(
        "Processed {} points ({:.0}/s): {} cache hits, {} live, {} static, {} provider failures",
        summary.points_processed,
        summary.points_per_sec,
        summary.cache_hits,
        summary.live_lookups,
        summary.static_fallbacks,
        summary.provider_failures,
    );

    Ok(())
}
