//! Retry delay policy.
//!
//! `delay(attempt) = min(base * 2^attempt, cap) + jitter`, with the jitter
//! drawn uniformly from `[0, jitter_max)`. Shared by the deployment workflow
//! and the warmup verifier; each supplies its own numbers.

use rand::Rng;
use std::time::Duration;

/// Upper bound of the random jitter added to every delay.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry (attempt 0), before jitter.
    pub base: Duration,
    /// Ceiling applied before jitter is added.
    pub cap: Duration,
    /// Exclusive upper bound of the jitter.
    pub jitter_max: Duration,
    /// Total attempts allowed for one logical operation.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            jitter_max: DEFAULT_JITTER_MAX,
            max_attempts,
        }
    }

    /// Push and deploy: network plus platform queuing.
    pub fn deployment() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 3)
    }

    /// Readiness polling: application cold start.
    pub fn warmup() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30), 5)
    }

    pub fn with_jitter_max(mut self, jitter_max: Duration) -> Self {
        self.jitter_max = jitter_max;
        self
    }

    /// The exponential part of the delay, capped, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        // 2^31 * base overflows long before it matters; saturate instead.
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay to sleep before retrying after `attempt` (0-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + self.jitter()
    }

    /// Whether another attempt is allowed after `attempts_used` attempts.
    pub fn allows_retry(&self, attempts_used: u32) -> bool {
        attempts_used < self.max_attempts
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::deployment()
    }
}
