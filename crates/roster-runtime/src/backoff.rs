use std::time::Duration;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 5_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Capped exponential backoff applied between reconnect attempts.
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated; the failure that reaches this count terminates.
    pub max_attempts: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    Retry { attempt: usize, wait: Duration },
    Exhausted { attempt: usize },
}

impl BackoffPolicy {
    /// `min(base * 2^(attempt - 1), max_delay)`; attempt numbering starts at 1.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn decide(&self, attempt: usize) -> BackoffDecision {
        if attempt >= self.max_attempts.max(1) {
            BackoffDecision::Exhausted { attempt }
        } else {
            BackoffDecision::Retry {
                attempt,
                wait: self.delay_for_attempt(attempt),
            }
        }
    }
}
