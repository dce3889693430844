// src/error.rs

use thiserror::Error;

/// Why the speed-limit provider could not produce a usable answer.
///
/// None of these reach batch callers: the resolver maps every variant to the
/// static fallback. Only `Unavailable` opens the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Auth rejected, endpoint gone or server failing (401/403/404/5xx).
    #[error("provider unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// Any other non-success status (400, 429 ...).
    #[error("provider rejected request (HTTP {status})")]
    Rejected { status: u16 },

    /// 2xx with an empty or unrecognisable payload.
    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("no provider API key configured")]
    NotConfigured,

    /// Timeout, DNS, connection refused.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 | 404 | 500..=599 => ProviderError::Unavailable { status },
            _ => ProviderError::Rejected { status },
        }
    }

    pub fn opens_circuit(&self) -> bool {
        matches!(self, ProviderError::Unavailable { .. })
    }
}
