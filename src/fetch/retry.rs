use std::time::Duration;

use crate::fetch::error::ApiError;

/// Attempt limits and backoff shape for transient API failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub rate_limit_attempts: u32,
    pub unavailable_attempts: u32,
    pub auth_attempts: u32,
    pub base_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 5,
            unavailable_attempts: 3,
            auth_attempts: 2,
            base_delay: Duration::from_secs(1),
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed for calls failing with `err`. Errors that are not
    /// retried get a single attempt.
    pub fn max_attempts(&self, err: &ApiError) -> u32 {
        match err {
            ApiError::RateLimited => self.rate_limit_attempts,
            ApiError::Unavailable => self.unavailable_attempts,
            ApiError::Unauthorized => self.auth_attempts,
            _ => 1,
        }
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based).
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// `base * 2^attempt` plus uniform jitter in `[0, jitter_fraction * that)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let spread = base.as_secs_f64() * self.jitter_fraction;
        if spread <= 0.0 {
            return base;
        }
        base + Duration::from_secs_f64(rand::random::<f64>() * spread)
    }
}
