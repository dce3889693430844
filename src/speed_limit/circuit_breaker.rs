// src/speed_limit/circuit_breaker.rs
//
// CLOSED -> OPEN on a qualifying provider failure; OPEN -> CLOSED lazily the
// first time a caller observes now >= open_until. There is no half-open
// trial request and no timer: every transition happens inside a resolve() call.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum BreakerStatus {
    Closed,
    Open { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct BreakerState {
    open_until: Option<DateTime<Utc>>,
    last_warn_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether calls should bypass the provider. Closes the breaker as a side
    /// effect once the cooldown has elapsed.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.open_until {
            Some(until) if now < until => true,
            Some(_) => {
                state.open_until = None;
                info!("🔌 Speed-limit provider circuit closed, retrying live lookups");
                false
            }
            None => false,
        }
    }

    /// Open (or re-open) the breaker. Returns the end of the cooldown.
    pub fn trip(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = now + self.cooldown;
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .open_until = Some(until);
        until
    }

    /// At most one "still open" warning per cooldown period.
    pub fn should_warn(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let due = match state.last_warn_at {
            Some(last) => now - last >= self.cooldown,
            None => true,
        };
        if due {
            state.last_warn_at = Some(now);
        }
        due
    }

    /// Read-only view; does not close an expired breaker.
    pub fn status(&self, now: DateTime<Utc>) -> BreakerStatus {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.open_until {
            Some(until) if now < until => BreakerStatus::Open { until },
            _ => BreakerStatus::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_starts_closed() {
        let b = CircuitBreaker::new(Duration::hours(1));
        assert!(!b.is_open(t0()));
        assert_eq!(b.status(t0()), BreakerStatus::Closed);
    }

    #[test]
    fn test_open_for_cooldown_then_closes_lazily() {
        let b = CircuitBreaker::new(Duration::hours(1));
        let until = b.trip(t0());
        assert_eq!(until, t0() + Duration::hours(1));
        assert!(b.is_open(t0() + Duration::minutes(59)));
        assert_eq!(b.status(t0() + Duration::minutes(30)), BreakerStatus::Open { until });
        assert!(!b.is_open(t0() + Duration::hours(1)));
        assert!(!b.is_open(t0() + Duration::minutes(61)));
    }

    #[test]
    fn test_warning_throttled_to_once_per_cooldown() {
        let b = CircuitBreaker::new(Duration::hours(1));
        assert!(b.should_warn(t0()));
        assert!(!b.should_warn(t0() + Duration::minutes(10)));
        assert!(b.should_warn(t0() + Duration::hours(1)));
    }
}
