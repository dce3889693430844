// src/speed_limit/mod.rs
//
// Speed-limit resolution for a coordinate.
//
//   resolve(lat, lon)
//     ├─ LimitCache        (~11 m cells, per-entry TTL)
//     ├─ CircuitBreaker    (lazy CLOSED/OPEN, 1 h cooldown)
//     ├─ SpeedLimitProvider (HTTP primary → legacy endpoint)
//     └─ static fallback   (conservative heavy-vehicle limit)

pub mod cache;
pub mod circuit_breaker;
pub mod provider;
pub mod resolver;

pub use circuit_breaker::BreakerStatus;
pub use provider::{HttpSpeedLimitProvider, ProviderLimit, SpeedLimitProvider};
pub use resolver::SpeedLimitResolver;
