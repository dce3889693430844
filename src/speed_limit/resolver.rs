// src/speed_limit/resolver.rs
//
// cache -> circuit breaker -> provider (primary, then legacy) -> static fallback
//
// One resolver is built per process and shared by reference (Arc) with every
// caller. resolve() never fails: anything that prevents a live answer turns
// into the configured static heavy-vehicle limit.

use super::cache::LimitCache;
use super::circuit_breaker::{BreakerStatus, CircuitBreaker};
use super::provider::SpeedLimitProvider;
use crate::clock::Clock;
use crate::error::ProviderError;
use crate::geo::{is_valid_coordinate, CellKey};
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{Config, LimitSource, SpeedLimitLookup};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SpeedLimitResolver {
    provider: Arc<dyn SpeedLimitProvider>,
    clock: Arc<dyn Clock>,
    cache: LimitCache,
    breaker: CircuitBreaker,
    live_ttl: Duration,
    fallback_ttl: Duration,
    fallback_limit_kmh: f64,
    metrics: PipelineMetrics,
    missing_key_warned: AtomicBool,
}

impl SpeedLimitResolver {
    pub fn new(
        config: &Config,
        provider: Arc<dyn SpeedLimitProvider>,
        clock: Arc<dyn Clock>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            provider,
            clock,
            cache: LimitCache::new(),
            breaker: CircuitBreaker::new(secs(config.circuit_breaker.cooldown_secs)),
            live_ttl: secs(config.cache.ttl_secs),
            fallback_ttl: secs(config.cache.effective_fallback_ttl_secs()),
            fallback_limit_kmh: config.policy.fallback_limit_kmh,
            metrics,
            missing_key_warned: AtomicBool::new(false),
        }
    }

    pub async fn resolve(&self, lat: f64, lon: f64) -> SpeedLimitLookup {
        let now = self.clock.now();

        if !is_valid_coordinate(lat, lon) {
            debug!("Invalid coordinate {},{}; using static limit", lat, lon);
            return self.static_lookup(lat, lon, now);
        }

        let key = CellKey::from_coordinate(lat, lon);

        if let Some(mut hit) = self.cache.get(&key, now) {
            self.metrics.inc(&self.metrics.cache_hits);
            // Fallback entries keep saying "static" so callers can tell them apart.
            if hit.source == LimitSource::Live {
                hit.source = LimitSource::Cache;
            }
            return hit;
        }

        if self.breaker.is_open(now) {
            if self.breaker.should_warn(now) {
                if let BreakerStatus::Open { until } = self.breaker.status(now) {
                    warn!(
                        "🔌 Speed-limit provider circuit open until {}, using static limit {:.0} km/h",
                        until, self.fallback_limit_kmh
                    );
                }
            }
            return self.cache_fallback(key, lat, lon, now);
        }

        if !self.provider.is_configured() {
            self.warn_missing_key();
            return self.static_lookup(lat, lon, now);
        }

        match self.provider.fetch_limit(lat, lon).await {
            Ok(limit) => {
                self.metrics.inc(&self.metrics.live_lookups);
                let lookup = SpeedLimitLookup {
                    lat,
                    lon,
                    speed_limit_kmh: limit.speed_limit_kmh,
                    road_type: Some(limit.road_type),
                    source: LimitSource::Live,
                    fetched_at: self.clock.now(),
                };
                self.cache.insert(key, lookup.clone(), self.live_ttl);
                lookup
            }
            Err(e) if e.opens_circuit() => {
                self.metrics.inc(&self.metrics.provider_failures);
                self.metrics.inc(&self.metrics.circuit_openings);
                let now = self.clock.now();
                let until = self.breaker.trip(now);
                self.breaker.should_warn(now);
                warn!("🔌 {}; circuit open until {}", e, until);
                self.cache_fallback(key, lat, lon, now)
            }
            Err(ProviderError::NotConfigured) => {
                self.warn_missing_key();
                self.static_lookup(lat, lon, self.clock.now())
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.provider_failures);
                warn!("🌐 Speed-limit lookup failed at {}: {}", key, e);
                self.static_lookup(lat, lon, self.clock.now())
            }
        }
    }

    /// Administrative: drop every cached limit. Breaker state is untouched.
    pub fn clear_cache(&self) -> usize {
        let dropped = self.cache.clear();
        debug!("Speed-limit cache cleared ({} entries)", dropped);
        dropped
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status(self.clock.now())
    }

    pub fn fallback_limit_kmh(&self) -> f64 {
        self.fallback_limit_kmh
    }

    fn static_lookup(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> SpeedLimitLookup {
        self.metrics.inc(&self.metrics.static_fallbacks);
        SpeedLimitLookup {
            lat,
            lon,
            speed_limit_kmh: self.fallback_limit_kmh,
            road_type: None,
            source: LimitSource::Static,
            fetched_at: now,
        }
    }

    fn cache_fallback(
        &self,
        key: CellKey,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
    ) -> SpeedLimitLookup {
        let lookup = self.static_lookup(lat, lon, now);
        self.cache.insert(key, lookup.clone(), self.fallback_ttl);
        lookup
    }

    fn warn_missing_key(&self) {
        if !self.missing_key_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "⚠️  No speed-limit API key configured; every lookup uses the static limit {:.0} km/h",
                self.fallback_limit_kmh
            );
        }
    }
}

/// Config values are clamped to a century so timestamp arithmetic cannot overflow.
fn secs(s: u64) -> Duration {
    const MAX_SECS: u64 = 100 * 365 * 24 * 3600;
    Duration::seconds(s.min(MAX_SECS) as i64)
}
