use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use tracing::debug;

pub const API_KEY_ENV: &str = "SPEED_LIMIT_API_KEY";

/// Longest accepted reconstruction gap (one day).
pub const MAX_GAP_SECS: i64 = 24 * 3600;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!("Config loaded from {} ({} bases)", path, config.bases.len());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("Invalid config YAML")?;
        Ok(config)
    }

    /// The API key is a secret, so the environment wins over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !positive(self.clustering.radius_deg) {
            bail!("clustering.radius_deg must be positive");
        }
        if !positive(self.policy.base_zone_radius_deg) {
            bail!("policy.base_zone_radius_deg must be positive");
        }
        if !positive(self.policy.fallback_limit_kmh) {
            bail!("policy.fallback_limit_kmh must be positive");
        }
        if self.cache.ttl_secs == 0 || self.cache.fallback_ttl_secs == Some(0) {
            bail!("cache TTLs must be non-zero");
        }
        if self.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs must be at least 1");
        }
        if self.pipeline.max_concurrent_lookups == 0 {
            bail!("pipeline.max_concurrent_lookups must be at least 1");
        }
        if !(1..=MAX_GAP_SECS).contains(&self.reconstruction.max_gap_secs) {
            bail!(
                "reconstruction.max_gap_secs must be between 1 and {}",
                MAX_GAP_SECS
            );
        }
        if !positive(self.reconstruction.max_valid_speed_kmh) {
            bail!("reconstruction.max_valid_speed_kmh must be positive");
        }
        Ok(())
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}
